//! Compilation of parsed zoneinfo data into iCalendar timezone
//! components.

use std::collections::BTreeMap;
use std::path::Path;

use calendar_rs::component::{Component, ComponentKind};
use calendar_rs::gregorian::days_in_month;
use calendar_rs::recur::{Frequency, Recurrence};
use calendar_rs::value::{MultiValue, Value, ValueType};
use calendar_rs::{Calendar, DateTime, Property, TimezoneInclusion, Weekday};
use hashbrown::HashMap;

use crate::parser::{remove_comments, LineParseContext, ZonalParseError};
use crate::rule::{RuleLine, RuleSet, ToYear, MAX_YEAR};
use crate::zone::{RuleKey, Zone, ZoneLine, ZoneTransition};
use crate::ZonalError;

/// Days from a month's first day back to the end of the year,
/// indexed by month. Drives the negative BYYEARDAY fallback for
/// last-weekday rules that straddle a month boundary.
const DAYS_BACK_TO_START_OF_MONTH: [i64; 13] =
    [365, 334, 306, 275, 245, 214, 184, 153, 122, 92, 61, 31, 0];

/// Parsed zoneinfo source: rule sets, zones and link aliases.
#[derive(Debug, Clone, Default)]
pub struct ZonalCompiler {
    pub rules: HashMap<String, RuleSet>,
    pub zones: HashMap<String, Zone>,
    /// alias -> target
    pub links: HashMap<String, String>,
}

impl ZonalCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one zoneinfo source file's content.
    pub fn parse_str(&mut self, src: &str) -> Result<(), ZonalParseError> {
        let mut ctx = LineParseContext::default();
        let mut lines = src.lines().peekable();
        while let Some(line) = lines.next() {
            if line.is_empty() || line.starts_with('#') {
                ctx.line_number += 1;
                continue;
            }
            if line.starts_with("Rule") {
                let rule = RuleLine::parse(remove_comments(line), &mut ctx)?;
                self.rules.entry(rule.name.clone()).or_default().push(rule);
            } else if line.starts_with("Zone") {
                let zone = Zone::parse(line, &mut lines, &mut ctx)?;
                self.zones.insert(zone.name.clone(), zone);
            } else if line.starts_with("Link") {
                let mut fields = remove_comments(line).split_whitespace();
                fields.next();
                let target = fields
                    .next()
                    .ok_or_else(|| ZonalParseError::MissingIdentifier(ctx.line_number))?;
                let alias = fields
                    .next()
                    .ok_or_else(|| ZonalParseError::MissingIdentifier(ctx.line_number))?;
                self.links.insert(alias.to_owned(), target.to_owned());
            } else if !line.trim().is_empty() {
                return Err(ZonalParseError::UnknownValue(
                    ctx.line_number,
                    line.to_owned(),
                ));
            }
            ctx.line_number += 1;
        }
        Ok(())
    }

    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ZonalError> {
        let data = std::fs::read_to_string(path)?;
        self.parse_str(&data).map_err(ZonalError::Parse)
    }

    /// Parse the well-known source files found under `dir`.
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self, ZonalError> {
        let mut compiler = Self::new();
        let mut found = false;
        for name in crate::ZONEINFO_FILES {
            let path = dir.as_ref().join(name);
            if path.is_file() {
                log::debug!("parsing zoneinfo source {}", path.display());
                compiler.parse_file(path)?;
                found = true;
            }
        }
        if !found {
            return Err(ZonalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no zoneinfo source files in directory",
            )));
        }
        Ok(compiler)
    }

    #[must_use]
    pub fn zone_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.zones.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Expand a zone to `(local, offset-from, offset-to)` transition
    /// tuples.
    #[must_use]
    pub fn expand_zone(
        &self,
        name: &str,
        min_year: i64,
        max_year: i64,
    ) -> Option<Vec<(DateTime, i64, i64)>> {
        let zone = self.zones.get(name)?;
        Some(
            zone.expand(&self.rules, min_year, max_year)
                .into_iter()
                .map(|t| (t.local, t.offset_from, t.offset_to))
                .collect(),
        )
    }

    /// Compile one zone into a VTIMEZONE component.
    #[must_use]
    pub fn vtimezone(&self, name: &str, min_year: i64, max_year: i64) -> Option<Component> {
        let zone = self.zones.get(name)?;
        let transitions = zone.expand(&self.rules, min_year, max_year);

        let mut vtz = Component::new(ComponentKind::Vtimezone);
        vtz.add_property(Property::new_text("TZID", name));
        vtz.add_property(Property::new_text("X-LIC-LOCATION", name));

        let mut builder = RegimeBuilder {
            compiler: self,
            zone,
            order: Vec::new(),
            map: BTreeMap::new(),
        };
        let mut last_line: Option<usize> = None;
        for transition in &transitions {
            if zone.lines[transition.line_index].format.is_lmt() {
                last_line = Some(transition.line_index);
                continue;
            }
            if let Some(last) = last_line {
                if last != transition.line_index {
                    builder.flush(&mut vtz, last);
                }
            }
            builder.record(transition);
            last_line = Some(transition.line_index);
        }
        if let Some(last) = last_line {
            builder.flush(&mut vtz, last);
        }

        compress_rdate_regimes(&mut vtz);
        vtz.finalise();
        Some(vtz)
    }

    /// A calendar holding one compiled VTIMEZONE.
    #[must_use]
    pub fn calendar_for_zone(&self, name: &str, min_year: i64, max_year: i64) -> Option<Calendar> {
        let vtz = self.vtimezone(name, min_year, max_year)?;
        let mut calendar = Calendar::new();
        calendar.add_component(vtz);
        Some(calendar)
    }

    /// Write one `.ics` per zone under `outdir`, resolve links by
    /// textual substitution, and write the `links.txt` alias index.
    pub fn write_zoneinfo<P: AsRef<Path>>(
        &self,
        outdir: P,
        min_year: i64,
        max_year: i64,
    ) -> Result<(), ZonalError> {
        let outdir = outdir.as_ref();
        if outdir.exists() {
            std::fs::remove_dir_all(outdir)?;
        }
        std::fs::create_dir_all(outdir)?;

        for name in self.zone_names() {
            let calendar = self
                .calendar_for_zone(name, min_year, max_year)
                .expect("zone_names only yields known zones");
            let path = outdir.join(format!("{name}.ics"));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, calendar.get_text(TimezoneInclusion::None))?;
            log::debug!("wrote {}", path.display());
        }

        let mut link_lines = Vec::new();
        let mut links: Vec<(&String, &String)> = self.links.iter().collect();
        links.sort();
        for (alias, target) in links {
            let from_path = outdir.join(format!("{target}.ics"));
            let Ok(data) = std::fs::read_to_string(&from_path) else {
                log::warn!("missing link target: {target} for {alias}");
                continue;
            };
            let to_path = outdir.join(format!("{alias}.ics"));
            if let Some(parent) = to_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&to_path, data.replace(target.as_str(), alias))?;
            link_lines.push(format!("{alias}\t{target}"));
        }
        std::fs::write(outdir.join("links.txt"), link_lines.join("\n"))?;
        Ok(())
    }
}

/// Accumulates contiguous transition runs per producing rule and
/// turns them into regimes when the zone line changes.
struct RegimeBuilder<'a> {
    compiler: &'a ZonalCompiler,
    zone: &'a Zone,
    order: Vec<Option<RuleKey>>,
    map: BTreeMap<usize, Vec<(DateTime, i64, i64)>>,
}

impl RegimeBuilder<'_> {
    fn record(&mut self, transition: &ZoneTransition) {
        let index = match self.order.iter().position(|key| *key == transition.rule) {
            Some(index) => index,
            None => {
                self.order.push(transition.rule.clone());
                self.order.len() - 1
            }
        };
        self.map.entry(index).or_default().push((
            transition.local.clone(),
            transition.offset_from,
            transition.offset_to,
        ));
    }

    fn flush(&mut self, vtz: &mut Component, line_index: usize) {
        let zone_line = &self.zone.lines[line_index];
        let order = std::mem::take(&mut self.order);
        let mut map = std::mem::take(&mut self.map);
        for (index, key) in order.iter().enumerate() {
            let Some(entries) = map.remove(&index) else {
                continue;
            };
            match key {
                Some(rule_key) => {
                    let rule = &self.compiler.rules[&rule_key.set].rules[rule_key.index];
                    // Split the run wherever the offset pair changes.
                    let mut last_pair = (entries[0].1, entries[0].2);
                    let mut start_index = 0;
                    for index in 0..entries.len() {
                        let pair = (entries[index].1, entries[index].2);
                        if pair != last_pair {
                            emit_rule_regime(
                                vtz,
                                rule,
                                zone_line,
                                &entries[start_index].0,
                                &entries[index - 1].0,
                                entries[start_index].1,
                                entries[start_index].2,
                                index - start_index,
                            );
                            last_pair = pair;
                            start_index = index;
                        }
                    }
                    emit_rule_regime(
                        vtz,
                        rule,
                        zone_line,
                        &entries[start_index].0,
                        &entries[entries.len() - 1].0,
                        entries[start_index].1,
                        entries[start_index].2,
                        entries.len(),
                    );
                }
                None => {
                    emit_steady_regime(vtz, zone_line, &entries[0].0, entries[0].1, entries[0].2);
                }
            }
        }
    }
}

/// Emit one regime driven by a named rule, as an RRULE when it has
/// more than one instance and a bounded RDATE otherwise.
#[allow(clippy::too_many_arguments)]
fn emit_rule_regime(
    vtz: &mut Component,
    rule: &RuleLine,
    zone_line: &ZoneLine,
    start: &DateTime,
    end: &DateTime,
    offset_from: i64,
    offset_to: i64,
    instance_count: usize,
) {
    let kind = if rule.save_seconds() == 0 {
        ComponentKind::Standard
    } else {
        ComponentKind::Daylight
    };
    let mut comp = Component::new(kind);
    comp.add_property(Property::new("TZOFFSETFROM", Value::UtcOffset(offset_from)));
    comp.add_property(Property::new("TZOFFSETTO", Value::UtcOffset(offset_to)));
    let tzname = zone_line
        .format
        .format(offset_to, rule.letter.as_deref(), rule.is_dst());
    comp.add_property(Property::new_text("TZNAME", tzname));
    comp.add_property(Property::new("DTSTART", Value::DateTime(start.clone())));

    let instance_count = if start == end { 1 } else { instance_count };
    if rule.to_year != ToYear::Only && instance_count != 1 {
        let mut rrule = Recurrence::new(Frequency::Yearly);
        rrule.set_by_month(Some(vec![rule.in_month]));
        apply_on_day(&mut rrule, rule, start);
        if zone_line.until_date().dt.year() < MAX_YEAR || rule.end_year() < MAX_YEAR {
            let mut until = end.clone();
            until.offset_seconds(-offset_from);
            until.set_timezone_utc(true);
            rrule.set_until(Some(until));
        }
        comp.add_property(Property::new("RRULE", Value::Recur(rrule)));
    } else {
        comp.add_property(rdate_property(start));
    }
    vtz.add_component(comp);
}

/// Emit a steady-state regime (a zone line without a named rule) as a
/// single RDATE.
fn emit_steady_regime(
    vtz: &mut Component,
    zone_line: &ZoneLine,
    start: &DateTime,
    offset_from: i64,
    offset_to: i64,
) {
    let is_dst = offset_to != offset_from && offset_to != zone_line.gmt_offset;
    let kind = if offset_to != zone_line.gmt_offset {
        ComponentKind::Daylight
    } else {
        ComponentKind::Standard
    };
    let mut comp = Component::new(kind);
    comp.add_property(Property::new("TZOFFSETFROM", Value::UtcOffset(offset_from)));
    comp.add_property(Property::new("TZOFFSETTO", Value::UtcOffset(offset_to)));
    comp.add_property(Property::new_text(
        "TZNAME",
        zone_line.format.format(offset_to, Some("S"), is_dst),
    ));
    comp.add_property(Property::new("DTSTART", Value::DateTime(start.clone())));
    comp.add_property(rdate_property(start));
    vtz.add_component(comp);
}

fn rdate_property(start: &DateTime) -> Property {
    let mut multi = MultiValue::new(ValueType::DateTime);
    multi.add(Value::DateTime(start.clone()));
    Property::new("RDATE", Value::Multi(multi))
}

/// Translate the rule's ON field into RRULE by-parts, anchored at the
/// run's first onset.
fn apply_on_day(rrule: &mut Recurrence, rule: &RuleLine, start: &DateTime) {
    match rule.on_day {
        crate::types::OnDay::Day(day) => {
            rrule.set_by_month_day(Some(vec![day]));
        }
        crate::types::OnDay::Last(weekday) => {
            let day_of_week = start.day_of_week();
            if day_of_week == weekday {
                rrule.set_by_day(Some(vec![(-1, weekday)]));
            } else if day_of_week.number() < weekday.number()
                || (day_of_week == Weekday::Saturday && weekday == Weekday::Sunday)
            {
                // The onset drifted into the window before the last
                // indicated weekday; re-anchor on the onset's weekday.
                let fake_offset = days_in_month(start.month(), start.year()) - 6;
                let (offset, day, by_month_day) = on_day_details(start, weekday, fake_offset);
                if let Some(by_month_day) = by_month_day {
                    rrule.set_by_month_day(Some(by_month_day));
                }
                rrule.set_by_day(Some(vec![(offset, day)]));
            } else {
                // The onset drifted past the month boundary: anchor
                // with a negative year-day window instead.
                rrule.set_by_month(None);
                let days_back = DAYS_BACK_TO_START_OF_MONTH[rule.in_month as usize];
                rrule.set_by_year_day(Some((0..7).map(|i| -(days_back + i)).collect()));
                rrule.set_by_day(Some(vec![(0, day_of_week)]));
            }
        }
        crate::types::OnDay::OnOrAfter(weekday, day)
        | crate::types::OnDay::OnOrBefore(weekday, day) => {
            let (offset, day, by_month_day) = on_day_details(start, weekday, day);
            if let Some(by_month_day) = by_month_day {
                rrule.set_by_month_day(Some(by_month_day));
            }
            rrule.set_by_day(Some(vec![(offset, day)]));
        }
    }
}

/// Map an on-day window to an `(ordinal, weekday)` pair, or a
/// `BYMONTHDAY` window plus plain weekday when no ordinal fits.
///
/// The onset's actual weekday may sit one day either side of the
/// indicated weekday (the AT time pushed it across midnight); the
/// window shifts accordingly.
fn on_day_details(
    start: &DateTime,
    indicated_day: Weekday,
    indicated_offset: i64,
) -> (i64, Weekday, Option<Vec<i64>>) {
    let mut month = start.month();
    let year = start.year();
    let day_of_week = start.day_of_week();
    let mut offset = indicated_offset;
    if indicated_day != day_of_week {
        match day_of_week.number() - indicated_day.number() {
            1 | -6 => {
                offset += 1;
                if start.day() == 1 {
                    month -= 1;
                    if month < 1 {
                        month = 12;
                    }
                }
            }
            -1 | 6 => {
                offset -= 1;
            }
            _ => {}
        }
    }
    let day = day_of_week;
    let by_month_day;
    let ordinal = match offset {
        1 => 1,
        8 => 2,
        15 => 3,
        22 => 4,
        _ => {
            let dim = days_in_month(month, year);
            match dim - offset {
                6 => -1,
                13 => -2,
                20 => -3,
                _ => {
                    by_month_day =
                        Some((0..7).map(|i| offset + i).filter(|d| *d <= dim).collect());
                    return (0, day, by_month_day);
                }
            }
        }
    };
    (ordinal, day, None)
}

/// Merge regimes that differ only in their RDATEs: any two sharing
/// kind, name and offset pair collapse into one.
fn compress_rdate_regimes(vtz: &mut Component) {
    type Key = (String, Option<String>, Option<i64>, Option<i64>);
    let key_of = |comp: &Component| -> Key {
        (
            comp.type_name().to_owned(),
            comp.load_value_string("TZNAME").map(str::to_owned),
            comp.load_value_utc_offset("TZOFFSETTO"),
            comp.load_value_utc_offset("TZOFFSETFROM"),
        )
    };

    let mut merged: Vec<Component> = Vec::new();
    let mut keys: Vec<Option<Key>> = Vec::new();
    for comp in vtz.children_mut().drain(..) {
        if !comp.has_property("RDATE") {
            merged.push(comp);
            keys.push(None);
            continue;
        }
        let key = key_of(&comp);
        if let Some(index) = keys.iter().position(|k| k.as_ref() == Some(&key)) {
            let rdates: Vec<Property> = comp.properties_of("RDATE").to_vec();
            for rdate in rdates {
                merged[index].add_property(rdate);
            }
        } else {
            keys.push(Some(key_of(&comp)));
            merged.push(comp);
        }
    }
    *vtz.children_mut() = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_rs::vtimezone::TimezoneDescriptor;

    const US_SOURCE: &str = "\
# US daylight saving, post-2007 subset
Rule\tUS\t2007\tmax\t-\tMar\tSun>=8\t2:00\t1:00\tD
Rule\tUS\t2007\tmax\t-\tNov\tSun>=1\t2:00\t0\tS

Zone America/New_York\t-4:56:02 -\tLMT\t1883 Nov 18 17:00u
\t\t\t-5:00\tUS\tE%sT

Link\tAmerica/New_York\tUS/Eastern
";

    fn compiler() -> ZonalCompiler {
        let mut compiler = ZonalCompiler::new();
        compiler.parse_str(US_SOURCE).unwrap();
        compiler
    }

    #[test]
    fn parses_rules_zones_and_links() {
        let compiler = compiler();
        assert_eq!(compiler.rules["US"].rules.len(), 2);
        assert!(compiler.zones.contains_key("America/New_York"));
        assert_eq!(
            compiler.links.get("US/Eastern").map(String::as_str),
            Some("America/New_York")
        );
    }

    #[test]
    fn us_rule_becomes_second_sunday_rrule() {
        let compiler = compiler();
        let vtz = compiler.vtimezone("America/New_York", 2000, 2030).unwrap();
        let daylight = vtz
            .components_of(&ComponentKind::Daylight)
            .into_iter()
            .next()
            .expect("a DAYLIGHT regime is emitted");
        let rrule = daylight
            .first_property("RRULE")
            .and_then(Property::recurrence_value)
            .expect("the run compiles to an RRULE");
        assert_eq!(rrule.to_text(), "FREQ=YEARLY;BYDAY=2SU;BYMONTH=3");
        assert_eq!(daylight.load_value_utc_offset("TZOFFSETFROM"), Some(-18000));
        assert_eq!(daylight.load_value_utc_offset("TZOFFSETTO"), Some(-14400));
        assert_eq!(daylight.load_value_string("TZNAME"), Some("EDT"));

        let standard = vtz
            .components_of(&ComponentKind::Standard)
            .into_iter()
            .next()
            .expect("a STANDARD regime is emitted");
        let rrule = standard
            .first_property("RRULE")
            .and_then(Property::recurrence_value)
            .unwrap();
        assert_eq!(rrule.to_text(), "FREQ=YEARLY;BYDAY=1SU;BYMONTH=11");
    }

    #[test]
    fn compiled_zone_resolves_offsets() {
        let compiler = compiler();
        let vtz = compiler.vtimezone("America/New_York", 2000, 2030).unwrap();
        let mut descriptor = TimezoneDescriptor::from_component(&vtz).unwrap();
        let winter = DateTime::parse("20240115T120000", false).unwrap();
        let summer = DateTime::parse("20240615T120000", false).unwrap();
        assert_eq!(descriptor.offset_seconds(&winter, false).unwrap(), -18000);
        assert_eq!(descriptor.offset_seconds(&summer, false).unwrap(), -14400);
    }

    #[test]
    fn expanded_transitions_match_descriptor_expansion() {
        let compiler = compiler();
        let zone_side = compiler.expand_zone("America/New_York", 2020, 2025).unwrap();
        let vtz = compiler.vtimezone("America/New_York", 2020, 2025).unwrap();
        let mut descriptor = TimezoneDescriptor::from_component(&vtz).unwrap();
        let end = DateTime::parse("20250101T000000", false).unwrap();
        let calendar_side = descriptor.expand_all(None, &end).unwrap();
        for (local, from, to) in &zone_side {
            if local.year() < 2020 {
                continue;
            }
            assert!(
                calendar_side.iter().any(|t| t.local == *local
                    && t.offset_from == *from
                    && t.offset_to == *to),
                "zone transition {} {from}->{to} missing from descriptor",
                local.to_text()
            );
        }
    }

    #[test]
    fn literal_day_rule_uses_bymonthday() {
        let source = "\
Rule\tFixed\t1990\t2005\t-\tApr\t15\t2:00\t1:00\tD
Rule\tFixed\t1990\t2005\t-\tOct\t15\t2:00\t0\tS
Zone Test/Fixed\t-5:00 -\tLMT\t1900
\t\t\t-5:00\tFixed\tT%sT
";
        let mut compiler = ZonalCompiler::new();
        compiler.parse_str(source).unwrap();
        let vtz = compiler.vtimezone("Test/Fixed", 1980, 2010).unwrap();
        let daylight = vtz
            .components_of(&ComponentKind::Daylight)
            .into_iter()
            .next()
            .unwrap();
        let rrule = daylight
            .first_property("RRULE")
            .and_then(Property::recurrence_value)
            .unwrap();
        // A bounded rule set carries an UNTIL in UTC.
        let text = rrule.to_text();
        assert!(text.contains("BYMONTHDAY=15"), "got {text}");
        assert!(text.contains("UNTIL=2005"), "got {text}");
    }

    #[test]
    fn single_instance_run_emits_rdate() {
        let source = "\
Rule\tOnce\t1985\tonly\t-\tJun\t1\t0:00\t1:00\tS
Rule\tOnce\t1985\tonly\t-\tSep\t1\t0:00\t0\t-
Zone Test/Once\t3:00 -\tLMT\t1900
\t\t\t3:00\tOnce\t+03/+04
";
        let mut compiler = ZonalCompiler::new();
        compiler.parse_str(source).unwrap();
        let vtz = compiler.vtimezone("Test/Once", 1980, 2000).unwrap();
        for regime in vtz.children() {
            assert!(
                regime.has_property("RDATE"),
                "one-shot rules must compile to RDATEs"
            );
            assert!(!regime.has_property("RRULE"));
        }
    }

    #[test]
    fn rdate_compression_merges_equal_regimes() {
        let source = "\
Rule\tTwice\t1985\tonly\t-\tJun\t1\t0:00\t1:00\t-
Rule\tTwice\t1985\tonly\t-\tSep\t1\t0:00\t0\t-
Rule\tTwice\t1987\tonly\t-\tJun\t1\t0:00\t1:00\t-
Rule\tTwice\t1987\tonly\t-\tSep\t1\t0:00\t0\t-
Zone Test/Twice\t3:00 -\tLMT\t1900
\t\t\t3:00\tTwice\t+03/+04
";
        let mut compiler = ZonalCompiler::new();
        compiler.parse_str(source).unwrap();
        let vtz = compiler.vtimezone("Test/Twice", 1980, 2000).unwrap();
        let daylight = vtz.components_of(&ComponentKind::Daylight);
        assert_eq!(daylight.len(), 1, "equal RDATE regimes merge into one");
        assert_eq!(daylight[0].properties_of("RDATE").len(), 2);
    }
}
