//! The zone binding attached to a [`DateTime`](crate::datetime::DateTime).

use std::fmt::Write;
use std::sync::RwLock;

use crate::datetime::DateTime;
use crate::tzdb::TimezoneDatabase;

/// A timezone binding: UTC, floating (no binding), a named TZID
/// resolved through the timezone database, or a fixed offset in
/// seconds.
///
/// Floating instants are compared structurally and never converted, so
/// their offset is always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timezone {
    Utc,
    Floating,
    Named(String),
    FixedOffset(i64),
}

static DEFAULT_TIMEZONE: RwLock<Timezone> = RwLock::new(Timezone::Utc);

impl Timezone {
    /// Construct from a TZID string; `"utc"` in any case maps to UTC.
    #[must_use]
    pub fn named<S: Into<String>>(tzid: S) -> Self {
        let tzid = tzid.into();
        if tzid.eq_ignore_ascii_case("utc") {
            Self::Utc
        } else {
            Self::Named(tzid)
        }
    }

    /// The process-wide default zone, applied to new date-times that
    /// do not specify a binding.
    #[must_use]
    pub fn default_zone() -> Self {
        DEFAULT_TIMEZONE
            .read()
            .expect("default timezone lock poisoned")
            .clone()
    }

    pub fn set_default_zone(zone: Self) {
        *DEFAULT_TIMEZONE
            .write()
            .expect("default timezone lock poisoned") = zone;
    }

    #[must_use]
    pub fn is_utc(&self) -> bool {
        matches!(self, Self::Utc)
    }

    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Floating)
    }

    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Named(id) => Some(id),
            _ => None,
        }
    }

    /// Two bindings are equivalent when either is floating, or when
    /// they denote the same zone.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.is_floating() || other.is_floating() {
            return true;
        }
        match (self, other) {
            (Self::Utc, Self::Utc) => true,
            (Self::Named(a), Self::Named(b)) => a.eq_ignore_ascii_case(b),
            (Self::FixedOffset(a), Self::FixedOffset(b)) => a == b,
            _ => false,
        }
    }

    /// The UTC offset in effect at `dt` under this binding, in
    /// seconds. `relative_to_utc` selects whether `dt` is interpreted
    /// as a UTC instant rather than local wall time.
    #[must_use]
    pub fn offset_seconds(&self, dt: &DateTime, relative_to_utc: bool) -> i64 {
        match self {
            Self::Utc | Self::Floating => 0,
            Self::FixedOffset(offset) => *offset,
            Self::Named(tzid) => TimezoneDatabase::timezone_offset_seconds(tzid, dt, relative_to_utc),
        }
    }

    /// Human readable descriptor for the zone at `dt`: the regime name
    /// when one is defined, otherwise a `±HHMM` offset string.
    #[must_use]
    pub fn descriptor(&self, dt: &DateTime) -> String {
        match self {
            Self::Utc => "(UTC)".to_owned(),
            Self::Floating => String::new(),
            Self::FixedOffset(offset) => offset_descriptor(*offset),
            Self::Named(tzid) => TimezoneDatabase::timezone_descriptor(tzid, dt),
        }
    }
}

pub(crate) fn offset_descriptor(offset: i64) -> String {
    let sign = if offset < 0 { '-' } else { '+' };
    let abs = offset.abs();
    let mut out = String::with_capacity(5);
    let _ = write!(out, "{}{:02}{:02}", sign, abs / 3600, (abs / 60) % 60);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_aliases_fold_to_utc() {
        assert_eq!(Timezone::named("UTC"), Timezone::Utc);
        assert_eq!(Timezone::named("utc"), Timezone::Utc);
        assert!(matches!(Timezone::named("Europe/Berlin"), Timezone::Named(_)));
    }

    #[test]
    fn floating_is_equivalent_to_anything() {
        let berlin = Timezone::named("Europe/Berlin");
        assert!(Timezone::Floating.equivalent(&berlin));
        assert!(berlin.equivalent(&Timezone::Floating));
        assert!(!berlin.equivalent(&Timezone::Utc));
    }

    #[test]
    fn fixed_offset_descriptor() {
        assert_eq!(offset_descriptor(-18000), "-0500");
        assert_eq!(offset_descriptor(3600), "+0100");
        assert_eq!(offset_descriptor(20700), "+0545");
    }
}
