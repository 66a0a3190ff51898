//! The error type for all calendar operations.

use std::borrow::Cow;
use std::fmt;

/// The category of a [`CalendarError`].
///
/// The kinds mirror the layering of the parse path: scalar values fail
/// with [`ErrorKind::InvalidValue`], which the property layer catches
/// and re-raises as [`ErrorKind::InvalidProperty`], and so on up to the
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Top-level container data is malformed.
    InvalidData,
    /// A component body is malformed.
    InvalidComponent,
    /// A property line is malformed.
    InvalidProperty,
    /// A scalar value is malformed.
    InvalidValue,
    /// A TZID could not be resolved from the timezone database.
    NoTimezoneInDatabase,
    /// A recurrence expansion exceeded the caller-supplied ceiling.
    TooManyInstances,
    /// An underlying I/O failure.
    Io,
    /// An internal assertion; not expected to be observable.
    Assert,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidData => "invalid data",
            Self::InvalidComponent => "invalid component",
            Self::InvalidProperty => "invalid property",
            Self::InvalidValue => "invalid value",
            Self::NoTimezoneInDatabase => "no timezone in database",
            Self::TooManyInstances => "too many instances",
            Self::Io => "i/o error",
            Self::Assert => "assertion failed",
        })
    }
}

/// The error returned by the calendar library.
///
/// Carries a kind, a human readable reason and, where available, the
/// offending input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarError {
    kind: ErrorKind,
    msg: Cow<'static, str>,
    data: Option<String>,
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.msg.is_empty() {
            write!(f, ": {}", self.msg)?;
        }
        if let Some(data) = &self.data {
            write!(f, " [{data}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for CalendarError {}

impl CalendarError {
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            msg: Cow::Borrowed(""),
            data: None,
        }
    }

    #[must_use]
    pub const fn invalid_data() -> Self {
        Self::new(ErrorKind::InvalidData)
    }

    #[must_use]
    pub const fn invalid_component() -> Self {
        Self::new(ErrorKind::InvalidComponent)
    }

    #[must_use]
    pub const fn invalid_property() -> Self {
        Self::new(ErrorKind::InvalidProperty)
    }

    #[must_use]
    pub const fn invalid_value() -> Self {
        Self::new(ErrorKind::InvalidValue)
    }

    #[must_use]
    pub const fn no_timezone() -> Self {
        Self::new(ErrorKind::NoTimezoneInDatabase)
    }

    #[must_use]
    pub const fn too_many_instances() -> Self {
        Self::new(ErrorKind::TooManyInstances)
    }

    #[must_use]
    pub const fn assert() -> Self {
        Self::new(ErrorKind::Assert)
    }

    /// Attach a human readable reason to this error.
    #[must_use]
    pub fn with_message<S: Into<Cow<'static, str>>>(mut self, msg: S) -> Self {
        self.msg = msg.into();
        self
    }

    /// Attach the offending input slice to this error.
    #[must_use]
    pub fn with_data<S: Into<String>>(mut self, data: S) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Re-raise this error at the next layer up, keeping reason and
    /// input slice.
    #[must_use]
    pub fn escalate(mut self, kind: ErrorKind) -> Self {
        // Resource style errors keep their identity across layers.
        if matches!(
            self.kind,
            ErrorKind::NoTimezoneInDatabase | ErrorKind::TooManyInstances | ErrorKind::Io
        ) {
            return self;
        }
        self.kind = kind;
        self
    }
}

impl From<std::io::Error> for CalendarError {
    fn from(value: std::io::Error) -> Self {
        Self::new(ErrorKind::Io).with_message(value.to_string())
    }
}

/// The result type used throughout the crate.
pub type CalendarResult<T> = Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_rewrites_kind() {
        let err = CalendarError::invalid_value().with_message("bad integer");
        let err = err.escalate(ErrorKind::InvalidProperty);
        assert_eq!(err.kind(), ErrorKind::InvalidProperty);
        assert_eq!(err.message(), "bad integer");
    }

    #[test]
    fn escalation_keeps_resource_kinds() {
        let err = CalendarError::too_many_instances();
        let err = err.escalate(ErrorKind::InvalidComponent);
        assert_eq!(err.kind(), ErrorKind::TooManyInstances);
    }
}
