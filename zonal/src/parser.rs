//! Line-oriented parsing of zoneinfo source files.

use core::num::ParseIntError;
use core::str::SplitWhitespace;

#[derive(Debug)]
pub enum ZonalParseError {
    InvalidZoneHeader(u32),
    MissingIdentifier(u32),
    UnexpectedEndOfLine(u32, &'static str),
    UnknownValue(u32, String),
    ParseIntError(u32, ParseIntError, &'static str),
}

impl ZonalParseError {
    pub(crate) fn unexpected_eol(ctx: &LineParseContext) -> Self {
        Self::UnexpectedEndOfLine(ctx.line_number, ctx.span())
    }

    pub(crate) fn unknown(ctx: &LineParseContext, value: &str) -> Self {
        Self::UnknownValue(ctx.line_number, value.to_owned())
    }
}

impl core::fmt::Display for ZonalParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidZoneHeader(line) => write!(f, "line {line}: invalid zone header"),
            Self::MissingIdentifier(line) => write!(f, "line {line}: missing identifier"),
            Self::UnexpectedEndOfLine(line, span) => {
                write!(f, "line {line}: unexpected end of line in {span}")
            }
            Self::UnknownValue(line, value) => {
                write!(f, "line {line}: unknown value '{value}'")
            }
            Self::ParseIntError(line, err, span) => {
                write!(f, "line {line}: {err} in {span}")
            }
        }
    }
}

impl std::error::Error for ZonalParseError {}

/// Tracks the physical line and the named span being parsed, for
/// error reporting.
#[derive(Debug, Clone)]
pub struct LineParseContext {
    pub line_number: u32,
    spans: Vec<&'static str>,
}

impl Default for LineParseContext {
    fn default() -> Self {
        Self {
            line_number: 1,
            spans: vec!["undefined"],
        }
    }
}

impl LineParseContext {
    pub fn enter(&mut self, name: &'static str) {
        self.spans.push(name);
    }

    pub fn exit(&mut self) {
        self.spans.pop();
    }

    pub fn span(&self) -> &'static str {
        self.spans.last().expect("span stack is never empty")
    }
}

/// Types parsed from a whitespace-delimited field with access to the
/// line context.
pub trait FieldParse: Sized {
    fn field_parse(field: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError>;
}

impl FieldParse for i64 {
    fn field_parse(field: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        field
            .parse::<i64>()
            .map_err(|e| ZonalParseError::ParseIntError(ctx.line_number, e, ctx.span()))
    }
}

/// Extension for parsing a field through [`FieldParse`].
pub trait ParseField {
    fn parse_field<T: FieldParse>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, ZonalParseError>;
}

impl ParseField for str {
    fn parse_field<T: FieldParse>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, ZonalParseError> {
        T::field_parse(self, ctx)
    }
}

/// The next whitespace field, or an end-of-line error in the current
/// span.
pub(crate) fn next_field<'a>(
    fields: &mut SplitWhitespace<'a>,
    ctx: &LineParseContext,
) -> Result<&'a str, ZonalParseError> {
    fields
        .next()
        .ok_or_else(|| ZonalParseError::unexpected_eol(ctx))
}

/// Strip a trailing `#` comment.
pub(crate) fn remove_comments(line: &str) -> &str {
    match line.split_once('#') {
        Some((cleaned, _)) => cleaned,
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_stripping() {
        assert_eq!(remove_comments("Zone X 1:00 - CET # comment"), "Zone X 1:00 - CET ");
        assert_eq!(remove_comments("no comment"), "no comment");
    }

    #[test]
    fn span_stack_reports_innermost() {
        let mut ctx = LineParseContext::default();
        ctx.enter("Rule");
        ctx.enter("Time");
        assert_eq!(ctx.span(), "Time");
        ctx.exit();
        assert_eq!(ctx.span(), "Rule");
    }
}
