//! Rule lines and their year expansion.

use std::cell::OnceCell;

use calendar_rs::DateTime;

use crate::parser::{next_field, LineParseContext, ParseField, ZonalParseError};
use crate::types::{month_from_name, ClockTime, OnDay, RuleTime, TimeKind, ZonalDateTime};

/// The TO column: a literal year, `only`, or `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToYear {
    Only,
    Max,
    Year(i64),
}

pub(crate) const MAX_YEAR: i64 = 9999;

/// One `Rule` line.
#[derive(Debug, Clone)]
pub struct RuleLine {
    pub name: String,
    pub from_year: i64,
    pub to_year: ToYear,
    pub in_month: i64,
    pub on_day: OnDay,
    pub at: RuleTime,
    pub save: ClockTime,
    pub letter: Option<String>,
    expansion: OnceCell<Vec<ZonalDateTime>>,
}

impl PartialEq for RuleLine {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.from_year == other.from_year
            && self.to_year == other.to_year
            && self.in_month == other.in_month
            && self.on_day == other.on_day
            && self.at == other.at
            && self.save == other.save
            && self.letter == other.letter
    }
}

impl RuleLine {
    pub fn parse(line: &str, ctx: &mut LineParseContext) -> Result<Self, ZonalParseError> {
        ctx.enter("Rule");
        let mut fields = line.split_whitespace();
        let tag = next_field(&mut fields, ctx)?;
        debug_assert_eq!(tag, "Rule");
        let name = next_field(&mut fields, ctx)?.to_owned();
        let from_year: i64 = next_field(&mut fields, ctx)?.parse_field(ctx)?;
        let to_field = next_field(&mut fields, ctx)?;
        let to_year = match to_field {
            "only" => ToYear::Only,
            "max" => ToYear::Max,
            year => ToYear::Year(year.parse_field(ctx)?),
        };
        // The TYPE column is always '-'.
        next_field(&mut fields, ctx)?;
        let month_field = next_field(&mut fields, ctx)?;
        let in_month = month_from_name(month_field)
            .ok_or_else(|| ZonalParseError::unknown(ctx, month_field))?;
        let on_day: OnDay = next_field(&mut fields, ctx)?.parse_field(ctx)?;
        let at: RuleTime = next_field(&mut fields, ctx)?.parse_field(ctx)?;
        let save: ClockTime = next_field(&mut fields, ctx)?.parse_field(ctx)?;
        let letter_field = next_field(&mut fields, ctx)?;
        let letter = if letter_field == "-" {
            None
        } else {
            Some(letter_field.to_owned())
        };
        ctx.exit();
        Ok(Self {
            name,
            from_year,
            to_year,
            in_month,
            on_day,
            at,
            save,
            letter,
            expansion: OnceCell::new(),
        })
    }

    pub fn start_year(&self) -> i64 {
        self.from_year
    }

    pub fn end_year(&self) -> i64 {
        match self.to_year {
            ToYear::Only => self.from_year,
            ToYear::Max => MAX_YEAR,
            ToYear::Year(year) => year,
        }
    }

    pub fn save_seconds(&self) -> i64 {
        self.save.seconds
    }

    pub fn is_dst(&self) -> bool {
        self.save.seconds != 0
    }

    /// The activation instant in `year`, as a local value awaiting
    /// offset resolution. A `24:00` time is encoded as the end-of-day
    /// boundary `23:59:59`.
    #[must_use]
    pub fn datetime_for_year(&self, year: i64) -> ZonalDateTime {
        let mut dt = DateTime::new_date(year, self.in_month, 1);
        self.on_day.apply(&mut dt);
        dt.set_date_only(false);
        let at = self.at.time.seconds;
        if at >= 24 * 3600 {
            dt.set_hhmmss(23, 59, 59);
        } else {
            dt.set_hhmmss(at / 3600, (at / 60) % 60, at % 60);
        }
        ZonalDateTime::new(dt, self.at.kind)
    }

    /// All activation instants up to `max_year`, computed once.
    fn full_expansion(&self, max_year: i64) -> &[ZonalDateTime] {
        self.expansion.get_or_init(|| {
            let end = self.end_year().min(max_year - 1);
            (self.start_year()..=end)
                .map(|year| self.datetime_for_year(year))
                .collect()
        })
    }

    /// Append `(instant, offset, rule-index)` activations for this
    /// rule to `results`.
    pub(crate) fn expand(
        &self,
        results: &mut Vec<(ZonalDateTime, i64, usize)>,
        index: usize,
        zone_offset: i64,
        max_year: i64,
    ) {
        if self.start_year() >= max_year {
            return;
        }
        let offset = zone_offset + self.save.seconds;
        for instant in self.full_expansion(max_year) {
            results.push((instant.clone(), offset, index));
        }
    }
}

/// All rule lines sharing one name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<RuleLine>,
}

impl RuleSet {
    pub fn push(&mut self, rule: RuleLine) {
        if self.name.is_empty() {
            self.name = rule.name.clone();
        }
        debug_assert_eq!(self.name, rule.name);
        self.rules.push(rule);
    }

    pub(crate) fn expand(
        &self,
        results: &mut Vec<(ZonalDateTime, i64, usize)>,
        zone_offset: i64,
        max_year: i64,
    ) {
        for (index, rule) in self.rules.iter().enumerate() {
            rule.expand(results, index, zone_offset, max_year);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> RuleLine {
        RuleLine::parse(line, &mut LineParseContext::default()).unwrap()
    }

    #[test]
    fn parses_us_rule() {
        let rule = parse("Rule\tUS\t2007\tmax\t-\tMar\tSun>=8\t2:00\t1:00\tD");
        assert_eq!(rule.name, "US");
        assert_eq!(rule.from_year, 2007);
        assert_eq!(rule.to_year, ToYear::Max);
        assert_eq!(rule.in_month, 3);
        assert_eq!(rule.save_seconds(), 3600);
        assert_eq!(rule.letter.as_deref(), Some("D"));
        assert!(rule.is_dst());
    }

    #[test]
    fn only_rule_spans_one_year() {
        let rule = parse("Rule\tAlgeria\t1916\tonly\t-\tJun\t14\t23:00s\t1:00\tS");
        assert_eq!(rule.start_year(), 1916);
        assert_eq!(rule.end_year(), 1916);
        assert_eq!(rule.at.kind, TimeKind::Standard);
    }

    #[test]
    fn activation_instants() {
        let rule = parse("Rule\tUS\t2007\tmax\t-\tMar\tSun>=8\t2:00\t1:00\tD");
        let instant = rule.datetime_for_year(2024);
        assert_eq!(instant.dt.to_text(), "20240310T020000");
        assert_eq!(instant.kind, TimeKind::Wall);
    }

    #[test]
    fn end_of_day_boundary() {
        let rule = parse("Rule\tMorocco\t2012\tonly\t-\tSep\t30\t24:00\t0\t-");
        let instant = rule.datetime_for_year(2012);
        assert_eq!(instant.dt.to_text(), "20120930T235959");
    }

    #[test]
    fn expansion_is_bounded_by_max_year() {
        let rule = parse("Rule\tUS\t2007\tmax\t-\tNov\tSun>=1\t2:00\t0\tS");
        let mut results = Vec::new();
        rule.expand(&mut results, 0, -18000, 2010);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1, -18000);
    }
}
