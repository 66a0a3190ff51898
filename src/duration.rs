//! Signed ISO-style durations.

use std::cmp::Ordering;
use std::fmt::Write;

use crate::error::{CalendarError, CalendarResult};
use crate::gregorian::SECONDS_PER_WEEK;
use crate::parser::{ParserContext, ParserPolicy};

/// A signed duration in the normal form: an exact multiple of one week
/// is stored as weeks only, anything else decomposes into days, hours,
/// minutes and seconds with weeks zero.
#[derive(Debug, Clone, Default)]
pub struct Duration {
    forward: bool,
    weeks: i64,
    days: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
}

impl Duration {
    #[must_use]
    pub fn from_seconds(total: i64) -> Self {
        let mut duration = Self {
            forward: true,
            ..Self::default()
        };
        duration.set_total_seconds(total);
        duration
    }

    /// Normalize from a signed total.
    pub fn set_total_seconds(&mut self, total: i64) {
        self.forward = total >= 0;
        let mut remainder = total.abs();
        self.weeks = 0;
        self.days = 0;
        self.hours = 0;
        self.minutes = 0;
        self.seconds = 0;
        if remainder % SECONDS_PER_WEEK == 0 {
            self.weeks = remainder / SECONDS_PER_WEEK;
        } else {
            self.seconds = remainder % 60;
            remainder /= 60;
            self.minutes = remainder % 60;
            remainder /= 60;
            self.hours = remainder % 24;
            self.days = remainder / 24;
        }
    }

    /// The comparison key.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        let magnitude = self.seconds
            + 60 * (self.minutes + 60 * (self.hours + 24 * (self.days + 7 * self.weeks)));
        if self.forward {
            magnitude
        } else {
            -magnitude
        }
    }

    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    #[must_use]
    pub fn weeks(&self) -> i64 {
        self.weeks
    }

    #[must_use]
    pub fn days(&self) -> i64 {
        self.days
    }

    pub fn parse(data: &str, ctx: &ParserContext) -> CalendarResult<Self> {
        Parser { data, offset: 0 }.run(ctx).map_err(|e| e.with_data(data))
    }

    pub fn generate(&self, out: &mut String) {
        if !self.forward && self.total_seconds() != 0 {
            out.push('-');
        }
        out.push('P');
        if self.weeks != 0 {
            let _ = write!(out, "{}W", self.weeks);
            return;
        }
        if self.days != 0 {
            let _ = write!(out, "{}D", self.days);
        }
        if self.hours != 0 || self.minutes != 0 || self.seconds != 0 {
            out.push('T');
            if self.hours != 0 {
                let _ = write!(out, "{}H", self.hours);
            }
            if self.minutes != 0 || (self.hours != 0 && self.seconds != 0) {
                let _ = write!(out, "{}M", self.minutes);
            }
            if self.seconds != 0 {
                let _ = write!(out, "{}S", self.seconds);
            }
        } else if self.days == 0 {
            out.push_str("T0S");
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.total_seconds() == other.total_seconds()
    }
}

impl Eq for Duration {}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_seconds().cmp(&other.total_seconds())
    }
}

impl std::hash::Hash for Duration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.total_seconds().hash(state);
    }
}

struct Parser<'a> {
    data: &'a str,
    offset: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.data.as_bytes().get(self.offset).copied()
    }

    fn bump(&mut self) {
        self.offset += 1;
    }

    fn number(&mut self) -> CalendarResult<i64> {
        let start = self.offset;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if start == self.offset {
            return Err(CalendarError::invalid_value().with_message("duration: expected digits"));
        }
        self.data[start..self.offset]
            .parse::<i64>()
            .map_err(|_| CalendarError::invalid_value().with_message("duration: number out of range"))
    }

    fn at_end(&self) -> bool {
        self.offset == self.data.len()
    }

    fn trailing(&self, ctx: &ParserContext) -> CalendarResult<()> {
        if self.at_end() || ctx.invalid_duration_value != ParserPolicy::Raise {
            Ok(())
        } else {
            Err(CalendarError::invalid_value().with_message("duration: unexpected trailing data"))
        }
    }

    fn run(mut self, ctx: &ParserContext) -> CalendarResult<Duration> {
        let mut result = Duration {
            forward: true,
            ..Duration::default()
        };
        match self.peek() {
            Some(b'+') => self.bump(),
            Some(b'-') => {
                result.forward = false;
                self.bump();
            }
            _ => {}
        }
        if self.peek() != Some(b'P') {
            return Err(CalendarError::invalid_value().with_message("duration: missing 'P'"));
        }
        self.bump();

        if self.peek() != Some(b'T') {
            let num = self.number()?;
            match self.peek() {
                Some(b'W') => {
                    result.weeks = num;
                    self.bump();
                    self.trailing(ctx)?;
                    return Ok(result);
                }
                Some(b'D') => {
                    result.days = num;
                    self.bump();
                    if self.at_end() {
                        return Ok(result);
                    }
                    if self.peek() != Some(b'T') {
                        return Err(CalendarError::invalid_value()
                            .with_message("duration: expected 'T' after days"));
                    }
                }
                _ => {
                    return Err(CalendarError::invalid_value()
                        .with_message("duration: expected 'D' or 'W'"))
                }
            }
        }
        // Consume the 'T'.
        self.bump();
        if self.at_end() {
            return if ctx.invalid_duration_value == ParserPolicy::Raise {
                Err(CalendarError::invalid_value().with_message("duration: empty time part"))
            } else {
                Ok(result)
            };
        }

        let mut num = self.number()?;
        if self.peek() == Some(b'H') {
            result.hours = num;
            self.bump();
            if self.at_end() {
                return Ok(result);
            }
            num = self.number()?;
        }
        if self.peek() == Some(b'M') {
            result.minutes = num;
            self.bump();
            if self.at_end() {
                return Ok(result);
            }
            num = self.number()?;
        }
        if self.peek() == Some(b'S') {
            result.seconds = num;
            self.bump();
            if self.at_end() {
                return Ok(result);
            }
        }
        self.trailing(ctx)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Duration {
        Duration::parse(s, &ParserContext::strict()).unwrap()
    }

    #[test]
    fn exact_weeks_normalize_to_weeks() {
        let d = Duration::from_seconds(14 * 24 * 3600);
        assert_eq!(d.to_text(), "P2W");
        assert_eq!(d.weeks(), 2);
        assert_eq!(d.days(), 0);
    }

    #[test]
    fn non_week_multiples_drop_weeks() {
        let d = Duration::from_seconds(8 * 24 * 3600 + 3600);
        assert_eq!(d.to_text(), "P8DT1H");
        assert_eq!(d.weeks(), 0);
    }

    #[test]
    fn zero_duration_emits_t0s() {
        assert_eq!(Duration::from_seconds(0).to_text(), "PT0S");
    }

    #[test]
    fn negative_round_trip() {
        let d = parse("-PT15M");
        assert_eq!(d.total_seconds(), -900);
        assert_eq!(d.to_text(), "-PT15M");
    }

    #[test]
    fn parse_forms() {
        assert_eq!(parse("P1W").total_seconds(), 7 * 86400);
        assert_eq!(parse("P1DT2H3M4S").total_seconds(), 86400 + 7384);
        assert_eq!(parse("PT5S").total_seconds(), 5);
        assert_eq!(parse("P7D").total_seconds(), 7 * 86400);
        // An exact week given in days re-normalizes on emission.
        assert_eq!(parse("P7D").to_text(), "P1W");
    }

    #[test]
    fn trailing_data_policy() {
        assert!(Duration::parse("P1W2D", &ParserContext::strict()).is_err());
        let d = Duration::parse("P1W2D", &ParserContext::lenient()).unwrap();
        assert_eq!(d.total_seconds(), 7 * 86400);
    }

    #[test]
    fn minutes_emitted_between_hours_and_seconds() {
        let d = Duration::from_seconds(3600 + 5);
        assert_eq!(d.to_text(), "PT1H0M5S");
    }
}
