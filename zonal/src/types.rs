//! Field types shared by rule and zone lines.

use calendar_rs::{DateTime, Weekday};

use crate::parser::{FieldParse, LineParseContext, ParseField, ZonalParseError};

pub(crate) const MONTH_NAMES: [&str; 13] = [
    "", "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn month_from_name(name: &str) -> Option<i64> {
    MONTH_NAMES
        .iter()
        .position(|m| *m == name)
        .filter(|idx| *idx > 0)
        .map(|idx| idx as i64)
}

pub(crate) fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "Sun" => Some(Weekday::Sunday),
        "Mon" => Some(Weekday::Monday),
        "Tue" => Some(Weekday::Tuesday),
        "Wed" => Some(Weekday::Wednesday),
        "Thu" => Some(Weekday::Thursday),
        "Fri" => Some(Weekday::Friday),
        "Sat" => Some(Weekday::Saturday),
    _ => None,
    }
}

/// A signed `h[:m[:s]]` quantity in seconds (offsets and savings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockTime {
    pub seconds: i64,
}

impl ClockTime {
    pub const fn from_seconds(seconds: i64) -> Self {
        Self { seconds }
    }
}

impl FieldParse for ClockTime {
    fn field_parse(field: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        ctx.enter("time");
        let (field, sign) = match field.strip_prefix('-') {
            Some(rest) => (rest, -1),
            None => (field, 1),
        };
        let mut parts = field.split(':');
        let hours: i64 = parts
            .next()
            .ok_or_else(|| ZonalParseError::unknown(ctx, field))?
            .parse_field(ctx)?;
        let minutes: i64 = match parts.next() {
            Some(m) => m.parse_field(ctx)?,
            None => 0,
        };
        let seconds: i64 = match parts.next() {
            Some(s) => s.parse_field(ctx)?,
            None => 0,
        };
        ctx.exit();
        Ok(Self {
            seconds: sign * ((hours * 60 + minutes) * 60 + seconds),
        })
    }
}

/// How an AT or UNTIL time is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeKind {
    /// Wall clock, including any daylight saving.
    #[default]
    Wall,
    /// Local standard time.
    Standard,
    /// Universal time.
    Universal,
}

/// An AT field: clock time plus its anchoring suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleTime {
    pub time: ClockTime,
    pub kind: TimeKind,
}

impl FieldParse for RuleTime {
    fn field_parse(field: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        let (rest, kind) = if let Some(rest) = field.strip_suffix('s') {
            (rest, TimeKind::Standard)
        } else if let Some(rest) = field
            .strip_suffix('u')
            .or_else(|| field.strip_suffix('g'))
            .or_else(|| field.strip_suffix('z'))
        {
            (rest, TimeKind::Universal)
        } else if let Some(rest) = field.strip_suffix('w') {
            (rest, TimeKind::Wall)
        } else {
            (field, TimeKind::Wall)
        };
        Ok(Self {
            time: ClockTime::field_parse(rest, ctx)?,
            kind,
        })
    }
}

/// A local instant paired with its anchoring, convertible to UTC once
/// the active offsets are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonalDateTime {
    pub dt: DateTime,
    pub kind: TimeKind,
}

impl ZonalDateTime {
    pub fn new(dt: DateTime, kind: TimeKind) -> Self {
        Self { dt, kind }
    }

    /// Convert to UTC given the full offset and the standard offset
    /// in effect.
    #[must_use]
    pub fn get_utc(&self, offset: i64, std_offset: i64) -> DateTime {
        let mut utc = self.dt.clone();
        match self.kind {
            TimeKind::Universal => {}
            TimeKind::Standard => utc.offset_seconds(-std_offset),
            TimeKind::Wall => utc.offset_seconds(-offset),
        }
        utc
    }
}

/// The ON field of a rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDay {
    Day(i64),
    Last(Weekday),
    /// `Xxx>=N`
    OnOrAfter(Weekday, i64),
    /// `Xxx<=N`
    OnOrBefore(Weekday, i64),
}

impl OnDay {
    /// Apply to a date already positioned at the right year and
    /// month.
    pub fn apply(&self, dt: &mut DateTime) {
        match self {
            Self::Day(day) => dt.set_day(*day),
            Self::Last(weekday) => {
                dt.set_day_of_week_in_month(-1, *weekday);
            }
            Self::OnOrAfter(weekday, day) => dt.set_next_day_of_week(*day, *weekday),
            Self::OnOrBefore(weekday, day) => {
                // Step back from the first matching day after the
                // bound.
                dt.set_next_day_of_week(*day, *weekday);
                if dt.day() != *day {
                    dt.offset_day(-7);
                }
            }
        }
    }
}

impl FieldParse for OnDay {
    fn field_parse(field: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        ctx.enter("on-day");
        let result = if let Some(name) = field.strip_prefix("last") {
            weekday_from_name(name)
                .map(OnDay::Last)
                .ok_or_else(|| ZonalParseError::unknown(ctx, field))
        } else if let Some((name, day)) = field.split_once(">=") {
            let weekday =
                weekday_from_name(name).ok_or_else(|| ZonalParseError::unknown(ctx, field))?;
            Ok(OnDay::OnOrAfter(weekday, day.parse_field(ctx)?))
        } else if let Some((name, day)) = field.split_once("<=") {
            let weekday =
                weekday_from_name(name).ok_or_else(|| ZonalParseError::unknown(ctx, field))?;
            Ok(OnDay::OnOrBefore(weekday, day.parse_field(ctx)?))
        } else {
            field.parse_field(ctx).map(OnDay::Day)
        };
        ctx.exit();
        result
    }
}

/// The FORMAT column of a zone line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneFormat {
    Fixed(String),
    /// Contains `%s`, substituted with the rule's letter.
    Formattable(String),
    /// `STD/DST` pair.
    Pair(String, String),
    /// `%z`: render the offset numerically.
    Numeric,
}

impl ZoneFormat {
    #[must_use]
    pub fn format(&self, offset: i64, letter: Option<&str>, is_dst: bool) -> String {
        match self {
            Self::Fixed(name) => name.clone(),
            Self::Formattable(pattern) => pattern.replace("%s", letter.unwrap_or("")),
            Self::Pair(std, dst) => {
                if is_dst {
                    dst.clone()
                } else {
                    std.clone()
                }
            }
            Self::Numeric => {
                let sign = if offset < 0 { "-" } else { "+" };
                let abs = offset.abs();
                let (hours, minutes) = (abs / 3600, (abs / 60) % 60);
                if minutes > 0 {
                    format!("{sign}{hours:02}{minutes:02}")
                } else {
                    format!("{sign}{hours:02}")
                }
            }
        }
    }

    #[must_use]
    pub fn is_lmt(&self) -> bool {
        matches!(self, Self::Fixed(name) if name == "LMT")
    }
}

impl FieldParse for ZoneFormat {
    fn field_parse(field: &str, _ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        if field.contains("%s") {
            Ok(Self::Formattable(field.to_owned()))
        } else if field.contains("%z") {
            Ok(Self::Numeric)
        } else if let Some((std, dst)) = field.split_once('/') {
            Ok(Self::Pair(std.to_owned(), dst.to_owned()))
        } else {
            Ok(Self::Fixed(field.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LineParseContext {
        LineParseContext::default()
    }

    #[test]
    fn clock_time_forms() {
        assert_eq!(ClockTime::field_parse("2:00", &mut ctx()).unwrap().seconds, 7200);
        assert_eq!(ClockTime::field_parse("-5:50:36", &mut ctx()).unwrap().seconds, -21036);
        assert_eq!(ClockTime::field_parse("0", &mut ctx()).unwrap().seconds, 0);
        assert_eq!(ClockTime::field_parse("1", &mut ctx()).unwrap().seconds, 3600);
    }

    #[test]
    fn rule_time_suffixes() {
        let wall = RuleTime::field_parse("2:00", &mut ctx()).unwrap();
        assert_eq!(wall.kind, TimeKind::Wall);
        let std = RuleTime::field_parse("23:00s", &mut ctx()).unwrap();
        assert_eq!(std.kind, TimeKind::Standard);
        assert_eq!(std.time.seconds, 23 * 3600);
        let utc = RuleTime::field_parse("18:00u", &mut ctx()).unwrap();
        assert_eq!(utc.kind, TimeKind::Universal);
    }

    #[test]
    fn on_day_forms() {
        assert_eq!(OnDay::field_parse("14", &mut ctx()).unwrap(), OnDay::Day(14));
        assert_eq!(
            OnDay::field_parse("lastSun", &mut ctx()).unwrap(),
            OnDay::Last(Weekday::Sunday)
        );
        assert_eq!(
            OnDay::field_parse("Sun>=8", &mut ctx()).unwrap(),
            OnDay::OnOrAfter(Weekday::Sunday, 8)
        );
    }

    #[test]
    fn on_day_application() {
        // Second Sunday of March 2024 via the Sun>=8 form.
        let mut dt = DateTime::new_date(2024, 3, 1);
        OnDay::OnOrAfter(Weekday::Sunday, 8).apply(&mut dt);
        assert_eq!(dt.day(), 10);

        let mut dt = DateTime::new_date(2024, 10, 1);
        OnDay::Last(Weekday::Sunday).apply(&mut dt);
        assert_eq!(dt.day(), 27);
    }

    #[test]
    fn zone_formats() {
        let fmt = ZoneFormat::field_parse("C%sT", &mut ctx()).unwrap();
        assert_eq!(fmt.format(0, Some("D"), true), "CDT");
        let pair = ZoneFormat::field_parse("CET/CEST", &mut ctx()).unwrap();
        assert_eq!(pair.format(0, None, false), "CET");
        assert_eq!(pair.format(0, None, true), "CEST");
        let numeric = ZoneFormat::field_parse("%z", &mut ctx()).unwrap();
        assert_eq!(numeric.format(3600, None, false), "+01");
        assert_eq!(numeric.format(20700, None, false), "+0545");
    }
}
