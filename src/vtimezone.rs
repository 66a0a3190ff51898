//! The timezone resolution engine: offset regimes and descriptor
//! expansion.

use std::collections::HashMap;

use crate::component::{Component, ComponentKind};
use crate::datetime::DateTime;
use crate::error::{CalendarError, CalendarResult};
use crate::period::Period;
use crate::recur::RecurrenceSet;
use crate::timezone::offset_descriptor;

/// Whether a regime is standard or daylight time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeKind {
    Standard,
    Daylight,
}

/// One observance of a timezone: a UTC offset pair, an onset and the
/// recurrence of subsequent onsets.
///
/// The recurrence is expanded with a float-offset of `offset_from`, so
/// that wall-clock by-parts resolve against the previous regime's
/// clock. Getting this wrong shifts every transition by the savings
/// delta.
#[derive(Debug, Clone)]
pub struct OffsetRegime {
    kind: RegimeKind,
    start: DateTime,
    tzname: Option<String>,
    offset_from: i64,
    offset_to: i64,
    recurrences: RecurrenceSet,
    cached_expand_below: Option<DateTime>,
    cached_items: Vec<DateTime>,
}

/// A single expanded transition: the local wall instant of the
/// changeover, its UTC instant, and the offsets either side.
#[derive(Debug, Clone)]
pub struct Transition {
    pub local: DateTime,
    pub utc: DateTime,
    pub offset_from: i64,
    pub offset_to: i64,
    pub name: Option<String>,
}

impl OffsetRegime {
    pub fn from_component(component: &Component) -> CalendarResult<Self> {
        let kind = match component.kind() {
            ComponentKind::Standard => RegimeKind::Standard,
            ComponentKind::Daylight => RegimeKind::Daylight,
            other => {
                return Err(CalendarError::invalid_component().with_message(format!(
                    "'{}' is not a timezone observance",
                    other.name()
                )))
            }
        };
        let mut start = component
            .load_value_datetime("DTSTART")
            .cloned()
            .ok_or_else(|| {
                CalendarError::invalid_component()
                    .with_message("timezone observance is missing DTSTART")
            })?;
        // Regime onsets are local wall times; a stray TZID binding
        // would recurse into the timezone database.
        if start.zone().tzid().is_some() {
            start.set_timezone_utc(false);
        }
        let offset_to = component.load_value_utc_offset("TZOFFSETTO").ok_or_else(|| {
            CalendarError::invalid_component().with_message("timezone observance is missing TZOFFSETTO")
        })?;
        // TZOFFSETFROM is inherited from TZOFFSETTO when absent.
        let offset_from = component
            .load_value_utc_offset("TZOFFSETFROM")
            .unwrap_or(offset_to);
        let mut recurrences = RecurrenceSet::new();
        component.load_value_rrule("RRULE", &mut recurrences, true);
        component.load_value_rdate("RDATE", &mut recurrences, true);
        component.load_value_rrule("EXRULE", &mut recurrences, false);
        component.load_value_rdate("EXDATE", &mut recurrences, false);
        Ok(Self {
            kind,
            start,
            tzname: component.load_value_string("TZNAME").map(str::to_owned),
            offset_from,
            offset_to,
            recurrences,
            cached_expand_below: None,
            cached_items: Vec::new(),
        })
    }

    pub fn kind(&self) -> RegimeKind {
        self.kind
    }

    pub fn start(&self) -> &DateTime {
        &self.start
    }

    pub fn offset_from(&self) -> i64 {
        self.offset_from
    }

    pub fn offset_to(&self) -> i64 {
        self.offset_to
    }

    pub fn tzname(&self) -> Option<&str> {
        self.tzname.as_deref()
    }

    fn ensure_expanded(&mut self, end_year_start: &DateTime) -> CalendarResult<()> {
        let covered = self
            .cached_expand_below
            .as_ref()
            .is_some_and(|below| below.naive_seconds() >= end_year_start.naive_seconds());
        if covered {
            return Ok(());
        }
        self.cached_items.clear();
        let window = Period::new(self.start.clone(), end_year_start.clone());
        self.recurrences.expand(
            &self.start,
            &window,
            &mut self.cached_items,
            self.offset_from,
            None,
        )?;
        self.cached_items.sort_by_key(DateTime::naive_seconds);
        self.cached_expand_below = Some(end_year_start.clone());
        Ok(())
    }

    /// All onsets of this regime in `[start, end)`, as local wall
    /// instants.
    pub fn expand_all(
        &mut self,
        start: Option<&DateTime>,
        end: &DateTime,
    ) -> CalendarResult<Vec<DateTime>> {
        let range_start = start.unwrap_or(&self.start).clone();
        if self.start.naive_seconds() > end.naive_seconds() {
            return Ok(Vec::new());
        }
        if !self.recurrences.has_recurrence() {
            if self.start.naive_seconds() >= range_start.naive_seconds() {
                return Ok(vec![self.start.clone()]);
            }
            return Ok(Vec::new());
        }
        let mut year_start = DateTime::new(end.year(), 1, 1, 0, 0, 0, self.start.zone().clone());
        if end.naive_seconds() > year_start.naive_seconds() {
            year_start.set_year(end.year() + 1);
        }
        self.ensure_expanded(&year_start)?;
        Ok(self
            .cached_items
            .iter()
            .filter(|dt| {
                dt.naive_seconds() >= range_start.naive_seconds()
                    && dt.naive_seconds() < end.naive_seconds()
            })
            .cloned()
            .collect())
    }
}

const OFFSET_CACHE_MAX_ENTRIES: usize = 100_000;

/// A compiled timezone: an identifier plus its ordered regimes, with
/// the expanded transition list and a bounded lookup memo.
#[derive(Debug, Clone)]
pub struct TimezoneDescriptor {
    id: String,
    component: Component,
    regimes: Vec<OffsetRegime>,
    expansion: Vec<Transition>,
    expansion_max_year: Option<i64>,
    offset_memo: HashMap<(i64, i64, i64, i64, i64, bool), usize>,
}

impl TimezoneDescriptor {
    pub fn from_component(component: &Component) -> CalendarResult<Self> {
        if component.kind() != &ComponentKind::Vtimezone {
            return Err(CalendarError::invalid_component()
                .with_message("timezone descriptor requires a VTIMEZONE"));
        }
        let id = component
            .load_value_string("TZID")
            .ok_or_else(|| {
                CalendarError::invalid_component().with_message("VTIMEZONE is missing TZID")
            })?
            .to_owned();
        let mut regimes = Vec::new();
        for child in component.children() {
            regimes.push(OffsetRegime::from_component(child)?);
        }
        Ok(Self {
            id,
            component: component.clone(),
            regimes,
            expansion: Vec::new(),
            expansion_max_year: None,
            offset_memo: HashMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The VTIMEZONE this descriptor was compiled from.
    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn regimes(&self) -> &[OffsetRegime] {
        &self.regimes
    }

    /// Sort key for ordering timezones west to east: the average of
    /// the first two regimes' offsets.
    #[must_use]
    pub fn utc_offset_sort_key(&self) -> i64 {
        match self.regimes.as_slice() {
            [] => 0,
            [only] => only.offset_to(),
            [first, second, ..] => (first.offset_to() + second.offset_to()) / 2,
        }
    }

    /// Expand every regime across `[start, end)` and merge into the
    /// sorted transition list.
    pub fn expand_all(
        &mut self,
        start: Option<&DateTime>,
        end: &DateTime,
    ) -> CalendarResult<Vec<Transition>> {
        let mut results = Vec::new();
        for regime in &mut self.regimes {
            let offset_from = regime.offset_from();
            let offset_to = regime.offset_to();
            let name = regime.tzname().map(str::to_owned);
            for local in regime.expand_all(start, end)? {
                let mut utc = local.clone();
                utc.offset_seconds(-offset_from);
                utc.set_timezone_utc(true);
                results.push(Transition {
                    local,
                    utc,
                    offset_from,
                    offset_to,
                    name: name.clone(),
                });
            }
        }
        results.sort_by_key(|t| t.local.naive_seconds());
        results.dedup_by(|a, b| {
            a.local.naive_seconds() == b.local.naive_seconds()
                && a.offset_from == b.offset_from
                && a.offset_to == b.offset_to
        });
        Ok(results)
    }

    fn extend_cache(&mut self, dt: &DateTime) -> CalendarResult<()> {
        let needs_extension = self
            .expansion_max_year
            .is_none_or(|max_year| dt.year() >= max_year);
        if !needs_extension {
            return Ok(());
        }
        let cache_max = DateTime::new(dt.year() + 2, 1, 1, 0, 0, 0, dt.zone().clone());
        self.expansion = self.expand_all(None, &cache_max)?;
        self.expansion_max_year = Some(cache_max.year());
        self.offset_memo.clear();
        Ok(())
    }

    /// The UTC offset in effect at `dt`, which is interpreted as local
    /// wall time, or as a UTC instant when `relative_to_utc`.
    pub fn offset_seconds(&mut self, dt: &DateTime, relative_to_utc: bool) -> CalendarResult<i64> {
        let mut naked = dt.clone();
        naked.set_timezone_utc(false);
        self.extend_cache(&naked)?;
        if self.expansion.is_empty() {
            return Ok(0);
        }
        let memo_key = (
            naked.year(),
            naked.month(),
            naked.day(),
            naked.hours(),
            naked.minutes(),
            relative_to_utc,
        );
        let index = match self.offset_memo.get(&memo_key) {
            Some(index) => *index,
            None => {
                let index = self.bisect_right(&naked, relative_to_utc);
                if self.offset_memo.len() >= OFFSET_CACHE_MAX_ENTRIES {
                    self.offset_memo.clear();
                }
                self.offset_memo.insert(memo_key, index);
                index
            }
        };
        if index == 0 {
            return Ok(0);
        }
        Ok(self.expansion[index - 1].offset_to)
    }

    /// Insertion point of `dt` in the expansion, comparing against the
    /// local wall column, or the UTC column when `relative_to_utc`.
    fn bisect_right(&self, dt: &DateTime, relative_to_utc: bool) -> usize {
        let target = dt.naive_seconds();
        let mut low = 0;
        let mut high = self.expansion.len();
        while low < high {
            let mid = (low + high) / 2;
            let probe = if relative_to_utc {
                self.expansion[mid].utc.naive_seconds()
            } else {
                self.expansion[mid].local.naive_seconds()
            };
            if target < probe {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low
    }

    /// The display descriptor at `dt`: the regime name when present,
    /// else a `±HHMM` offset string, or empty when nothing applies.
    pub fn descriptor(&mut self, dt: &DateTime) -> CalendarResult<String> {
        let mut naked = dt.clone();
        naked.set_timezone_utc(false);
        self.extend_cache(&naked)?;
        let index = self.bisect_right(&naked, false);
        if index == 0 {
            return Ok(String::new());
        }
        let transition = &self.expansion[index - 1];
        Ok(match &transition.name {
            Some(name) => format!("({name})"),
            None => offset_descriptor(transition.offset_to),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserContext;
    use crate::property::Property;
    use crate::value::Variant;

    fn prop(line: &str) -> Property {
        Property::parse_text(line, Variant::ICalendar, &ParserContext::lenient()).unwrap()
    }

    /// An America/New_York style VTIMEZONE with post-2007 US rules.
    fn new_york() -> Component {
        let mut standard = Component::new(ComponentKind::Standard);
        standard.add_property(prop("DTSTART:20071104T020000"));
        standard.add_property(prop("TZOFFSETFROM:-0400"));
        standard.add_property(prop("TZOFFSETTO:-0500"));
        standard.add_property(prop("TZNAME:EST"));
        standard.add_property(prop("RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU"));

        let mut daylight = Component::new(ComponentKind::Daylight);
        daylight.add_property(prop("DTSTART:20070311T020000"));
        daylight.add_property(prop("TZOFFSETFROM:-0500"));
        daylight.add_property(prop("TZOFFSETTO:-0400"));
        daylight.add_property(prop("TZNAME:EDT"));
        daylight.add_property(prop("RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU"));

        let mut vtz = Component::new(ComponentKind::Vtimezone);
        vtz.add_property(prop("TZID:America/New_York"));
        vtz.add_component(standard);
        vtz.add_component(daylight);
        vtz.finalise();
        vtz
    }

    fn local(text: &str) -> DateTime {
        DateTime::parse(text, false).unwrap()
    }

    #[test]
    fn offsets_around_spring_forward() {
        let mut descriptor = TimezoneDescriptor::from_component(&new_york()).unwrap();
        // 2024 transition to EDT happened at 2024-03-10T02:00 local.
        assert_eq!(
            descriptor.offset_seconds(&local("20240310T013000"), false).unwrap(),
            -18000
        );
        assert_eq!(
            descriptor.offset_seconds(&local("20240310T023000"), false).unwrap(),
            -14400
        );
        // Relative to UTC the switch is at 07:00Z.
        assert_eq!(
            descriptor.offset_seconds(&local("20240310T063000"), true).unwrap(),
            -18000
        );
        assert_eq!(
            descriptor.offset_seconds(&local("20240310T070000"), true).unwrap(),
            -14400
        );
    }

    #[test]
    fn transition_sandwich() {
        let mut descriptor = TimezoneDescriptor::from_component(&new_york()).unwrap();
        let end = local("20250101T000000");
        let transitions = descriptor.expand_all(None, &end).unwrap();
        // Pick the 2024 spring transition and probe either side of it.
        let spring = transitions
            .iter()
            .find(|t| t.utc.to_text() == "20240310T070000Z")
            .expect("2024 spring transition expands");
        assert_eq!(spring.offset_from, -18000);
        assert_eq!(spring.offset_to, -14400);

        let mut before = spring.utc.clone();
        before.offset_seconds(spring.offset_from - 1);
        before.set_timezone_utc(false);
        assert_eq!(descriptor.offset_seconds(&before, false).unwrap(), spring.offset_from);

        let mut after = spring.utc.clone();
        after.offset_seconds(spring.offset_to);
        after.set_timezone_utc(false);
        assert_eq!(descriptor.offset_seconds(&after, false).unwrap(), spring.offset_to);
    }

    #[test]
    fn descriptor_strings() {
        let mut descriptor = TimezoneDescriptor::from_component(&new_york()).unwrap();
        assert_eq!(
            descriptor.descriptor(&local("20240115T120000")).unwrap(),
            "(EST)"
        );
        assert_eq!(
            descriptor.descriptor(&local("20240615T120000")).unwrap(),
            "(EDT)"
        );
    }

    #[test]
    fn before_first_transition_returns_zero() {
        let mut descriptor = TimezoneDescriptor::from_component(&new_york()).unwrap();
        assert_eq!(
            descriptor.offset_seconds(&local("19000101T000000"), false).unwrap(),
            0
        );
    }

    #[test]
    fn rdate_only_regime() {
        let mut standard = Component::new(ComponentKind::Standard);
        standard.add_property(prop("DTSTART:19810329T020000"));
        standard.add_property(prop("TZOFFSETFROM:+0100"));
        standard.add_property(prop("TZOFFSETTO:+0200"));
        standard.add_property(prop("RDATE:19810329T020000,19820328T020000"));
        let mut vtz = Component::new(ComponentKind::Vtimezone);
        vtz.add_property(prop("TZID:Test/Zone"));
        vtz.add_component(standard);
        let mut descriptor = TimezoneDescriptor::from_component(&vtz).unwrap();
        let transitions = descriptor
            .expand_all(None, &local("19830101T000000"))
            .unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].utc.to_text(), "19810329T010000Z");
    }
}
