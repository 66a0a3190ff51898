//! Zone lines and transition expansion.

use calendar_rs::DateTime;
use hashbrown::HashMap;

use crate::parser::{remove_comments, FieldParse, LineParseContext, ParseField, ZonalParseError};
use crate::rule::{RuleSet, MAX_YEAR};
use crate::types::{month_from_name, ClockTime, OnDay, RuleTime, TimeKind, ZoneFormat, ZonalDateTime};

/// The RULES column of a zone line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneRuleRef {
    /// `-`: standard time throughout.
    None,
    /// A literal savings offset.
    Offset(i64),
    /// A named rule set.
    Named(String),
}

/// One zone line (the header fields, or one continuation line).
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneLine {
    pub gmt_offset: i64,
    pub rule: ZoneRuleRef,
    pub format: ZoneFormat,
    pub until: Option<ZonalDateTime>,
}

impl ZoneLine {
    pub(crate) fn parse_fields(
        fields: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZonalParseError> {
        ctx.enter("zone line");
        if fields.len() < 3 {
            let err = ZonalParseError::unexpected_eol(ctx);
            ctx.exit();
            return Err(err);
        }
        let gmt_offset = ClockTime::field_parse(fields[0], ctx)?.seconds;
        let rule_field = fields[1];
        let rule = if rule_field == "-" {
            ZoneRuleRef::None
        } else if rule_field
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '-')
        {
            ZoneRuleRef::Offset(ClockTime::field_parse(rule_field, ctx)?.seconds)
        } else {
            ZoneRuleRef::Named(rule_field.to_owned())
        };
        let format: ZoneFormat = fields[2].parse_field(ctx)?;
        let until = if fields.len() > 3 {
            Some(parse_until(&fields[3..], ctx)?)
        } else {
            None
        };
        ctx.exit();
        Ok(Self {
            gmt_offset,
            rule,
            format,
            until,
        })
    }

    /// The UNTIL instant, defaulting to the open-ended bound.
    #[must_use]
    pub fn until_date(&self) -> ZonalDateTime {
        self.until.clone().unwrap_or_else(|| {
            ZonalDateTime::new(
                {
                    let mut dt = DateTime::new_date(MAX_YEAR, 12, 1);
                    dt.set_date_only(false);
                    dt
                },
                TimeKind::Wall,
            )
        })
    }

    fn is_named_rule(&self) -> bool {
        matches!(self.rule, ZoneRuleRef::Named(_))
    }

    fn numeric_offset(&self) -> i64 {
        match &self.rule {
            ZoneRuleRef::Offset(offset) => *offset,
            _ => 0,
        }
    }

    /// Expand this line's transitions into `results` as
    /// `(utc, offset-to, line-index, rule)` tuples, returning the
    /// offsets in effect afterwards.
    #[allow(clippy::too_many_arguments)]
    fn expand(
        &self,
        rules: &HashMap<String, RuleSet>,
        results: &mut Vec<RawTransition>,
        last_until_utc: &DateTime,
        last_offset: i64,
        last_std_offset: i64,
        max_year: i64,
        line_index: usize,
    ) -> (i64, i64) {
        let ZoneRuleRef::Named(name) = &self.rule else {
            let to_offset = self.gmt_offset + self.numeric_offset();
            results.push(RawTransition {
                utc: last_until_utc.clone(),
                offset_to: to_offset,
                line_index,
                rule: None,
            });
            return (to_offset, self.gmt_offset);
        };

        let rule_set = rules
            .get(name)
            .unwrap_or_else(|| panic!("rule '{name}' was not defined"));
        let mut activations = Vec::new();
        rule_set.expand(&mut activations, self.gmt_offset, max_year);
        activations.sort_by(|a, b| a.0.dt.cmp(&b.0.dt));

        let mut found_one = false;
        let mut found_start = false;
        let mut last_offset = last_offset;
        let mut last_std_offset = last_std_offset;
        let mut last_rule: Option<RuleKey> = None;
        let final_until = self.until_date();

        for (instant, to_offset, rule_index) in activations {
            let key = RuleKey {
                set: name.clone(),
                index: rule_index,
            };
            let mut utc = instant.get_utc(last_offset, last_std_offset);
            if utc >= *last_until_utc {
                if !found_start && utc != *last_until_utc {
                    if !found_one {
                        last_offset = self.gmt_offset;
                        last_std_offset = self.gmt_offset;
                        utc = instant.get_utc(last_offset, last_std_offset);
                    }
                    results.push(RawTransition {
                        utc: last_until_utc.clone(),
                        offset_to: last_offset,
                        line_index,
                        rule: last_rule.clone(),
                    });
                }
                found_start = true;
                if utc >= final_until.get_utc(last_offset, last_std_offset) {
                    break;
                }
                results.push(RawTransition {
                    utc,
                    offset_to: to_offset,
                    line_index,
                    rule: Some(key.clone()),
                });
            }
            last_offset = to_offset;
            last_std_offset = self.gmt_offset;
            last_rule = Some(key);
            found_one = true;
        }
        if !found_start {
            results.push(RawTransition {
                utc: last_until_utc.clone(),
                offset_to: last_offset,
                line_index,
                rule: None,
            });
        }
        (last_offset, last_std_offset)
    }
}

fn parse_until(
    fields: &[&str],
    ctx: &mut LineParseContext,
) -> Result<ZonalDateTime, ZonalParseError> {
    ctx.enter("until");
    let year: i64 = fields[0].parse_field(ctx)?;
    let mut dt = DateTime::new_date(year, 1, 1);
    dt.set_date_only(false);
    let mut kind = TimeKind::Wall;
    if let Some(month_field) = fields.get(1) {
        let month = month_from_name(month_field)
            .ok_or_else(|| ZonalParseError::unknown(ctx, month_field))?;
        dt.set_month(month);
        if let Some(day_field) = fields.get(2) {
            let on_day: OnDay = day_field.parse_field(ctx)?;
            on_day.apply(&mut dt);
            if let Some(time_field) = fields.get(3) {
                let time: RuleTime = time_field.parse_field(ctx)?;
                let seconds = time.time.seconds;
                dt.set_hhmmss(seconds / 3600, (seconds / 60) % 60, seconds % 60);
                kind = time.kind;
            }
        }
    }
    ctx.exit();
    Ok(ZonalDateTime::new(dt, kind))
}

/// Identity of a rule line within its rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub set: String,
    pub index: usize,
}

#[derive(Debug, Clone)]
struct RawTransition {
    utc: DateTime,
    offset_to: i64,
    line_index: usize,
    rule: Option<RuleKey>,
}

/// A resolved transition: local instant, the offsets either side, the
/// zone line it came from, and the rule that produced it (absent for
/// steady-state lines and collapsed collisions).
#[derive(Debug, Clone)]
pub struct ZoneTransition {
    pub local: DateTime,
    pub offset_from: i64,
    pub offset_to: i64,
    pub line_index: usize,
    pub rule: Option<RuleKey>,
}

/// A zone: its name plus the header line and all continuation lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub lines: Vec<ZoneLine>,
}

impl Zone {
    /// Parse the header line plus any continuation lines (leading
    /// whitespace) that follow it in `following`.
    pub fn parse<'a, I: Iterator<Item = &'a str>>(
        header: &str,
        following: &mut core::iter::Peekable<I>,
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZonalParseError> {
        ctx.enter("zone");
        let cleaned = remove_comments(header);
        let mut fields = cleaned.split_whitespace();
        if fields.next() != Some("Zone") {
            ctx.exit();
            return Err(ZonalParseError::InvalidZoneHeader(ctx.line_number));
        }
        let name = fields
            .next()
            .ok_or(ZonalParseError::MissingIdentifier(ctx.line_number))?
            .to_owned();
        let header_fields: Vec<&str> = fields.collect();
        let mut lines = vec![ZoneLine::parse_fields(&header_fields, ctx)?];

        while let Some(line) = following.peek() {
            if !line.starts_with([' ', '\t']) {
                break;
            }
            let line = following.next().expect("peeked continuation line");
            ctx.line_number += 1;
            let cleaned = remove_comments(line);
            if cleaned.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = cleaned.split_whitespace().collect();
            lines.push(ZoneLine::parse_fields(&fields, ctx)?);
        }
        ctx.exit();
        Ok(Self { name, lines })
    }

    /// Expand all transitions within `[min_year, max_year]`.
    ///
    /// Two transitions landing on the same instant collapse: the later
    /// one wins, and an already-emitted collider is rewritten in place
    /// to share the new target offset.
    pub fn expand(
        &self,
        rules: &HashMap<String, RuleSet>,
        min_year: i64,
        max_year: i64,
    ) -> Vec<ZoneTransition> {
        let start = {
            let mut dt = DateTime::new_date(1800, 1, 1);
            dt.set_date_only(false);
            dt
        };
        let start_offset = self.lines[0].gmt_offset;

        let mut raw: Vec<RawTransition> = Vec::new();
        let mut last_until_utc = start.clone();
        let mut last_offset = start_offset;
        let mut last_std_offset = start_offset;
        let mut first = true;
        for (index, line) in self.lines.iter().enumerate() {
            let (offset, std_offset) = line.expand(
                rules,
                &mut raw,
                &last_until_utc,
                last_offset,
                last_std_offset,
                max_year,
                index,
            );
            last_offset = offset;
            last_std_offset = std_offset;
            last_until_utc = line.until_date().get_utc(last_offset, last_std_offset);
            if first && self.lines.len() > 1 {
                raw.clear();
                first = false;
            }
        }

        raw.sort_by(|a, b| a.utc.cmp(&b.utc));

        let mut results: Vec<ZoneTransition> = Vec::new();
        let mut last = (start, start_offset, start_offset);
        for transition in raw {
            let mut local = transition.utc.clone();
            local.offset_seconds(last.1);
            if transition.utc.year() >= min_year {
                if local > last.0 {
                    results.push(ZoneTransition {
                        local: local.clone(),
                        offset_from: last.1,
                        offset_to: transition.offset_to,
                        line_index: transition.line_index,
                        rule: transition.rule.clone(),
                    });
                } else if let Some(previous) = results.last_mut() {
                    previous.offset_to = transition.offset_to;
                    previous.line_index = transition.line_index;
                    previous.rule = None;
                } else {
                    results.push(ZoneTransition {
                        local: last.0.clone(),
                        offset_from: last.1,
                        offset_to: last.2,
                        line_index: transition.line_index,
                        rule: None,
                    });
                }
            }
            last = (local, transition.offset_to, last.2);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleLine;

    const CHICAGO: &str = "Zone America/Chicago\t-5:50:36 -\tLMT\t1883 Nov 18 18:00u
\t\t\t-6:00\tUS\tC%sT\t1920
\t\t\t-6:00\t-\tCST";

    fn parse_zone(data: &str) -> Zone {
        let mut lines = data.lines();
        let header = lines.next().unwrap();
        let mut rest = lines.peekable();
        Zone::parse(header, &mut rest, &mut LineParseContext::default()).unwrap()
    }

    fn us_rules() -> HashMap<String, RuleSet> {
        let mut set = RuleSet::default();
        for line in [
            "Rule\tUS\t1918\t1919\t-\tMar\tlastSun\t2:00\t1:00\tD",
            "Rule\tUS\t1918\t1919\t-\tOct\tlastSun\t2:00\t0\tS",
        ] {
            set.push(RuleLine::parse(line, &mut LineParseContext::default()).unwrap());
        }
        let mut map = HashMap::new();
        map.insert("US".to_owned(), set);
        map
    }

    #[test]
    fn parses_header_and_continuations() {
        let zone = parse_zone(CHICAGO);
        assert_eq!(zone.name, "America/Chicago");
        assert_eq!(zone.lines.len(), 3);
        assert_eq!(zone.lines[0].gmt_offset, -21036);
        assert!(matches!(zone.lines[1].rule, ZoneRuleRef::Named(_)));
        assert!(zone.lines[2].until.is_none());
    }

    #[test]
    fn expands_rule_transitions() {
        let zone = parse_zone(CHICAGO);
        let transitions = zone.expand(&us_rules(), 1900, 1925);
        // 1918/1919 each have a spring and an autumn transition, plus
        // the 1920 handoff to plain CST.
        let springs: Vec<&ZoneTransition> = transitions
            .iter()
            .filter(|t| t.offset_to == -18000)
            .collect();
        assert_eq!(springs.len(), 2);
        // The onset is expressed on the pre-transition clock.
        assert_eq!(springs[0].local.to_text(), "19180331T020000");
        assert_eq!(springs[0].offset_from, -21600);
        let autumns: Vec<&ZoneTransition> = transitions
            .iter()
            .filter(|t| t.offset_from == -18000)
            .collect();
        assert_eq!(autumns[0].local.to_text(), "19181027T020000");
    }

    #[test]
    fn steady_state_line_emits_single_transition() {
        let zone = parse_zone("Zone Etc/GMT-1 1:00 - +01");
        let transitions = zone.expand(&HashMap::new(), 1900, 2000);
        assert_eq!(transitions.len(), 0);
    }
}
