//! Recurrence set arithmetic: inclusion and exclusion rules, explicit
//! dates and periods.

use crate::datetime::DateTime;
use crate::error::{CalendarError, CalendarResult};
use crate::period::Period;
use crate::recur::Recurrence;

/// The six membership lists of a recurrence set.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceSet {
    rules: Vec<Recurrence>,
    exrules: Vec<Recurrence>,
    dates: Vec<DateTime>,
    exdates: Vec<DateTime>,
    periods: Vec<Period>,
    experiods: Vec<Period>,
}

impl RecurrenceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_recurrence(&self) -> bool {
        !self.rules.is_empty()
            || !self.dates.is_empty()
            || !self.periods.is_empty()
            || !self.exrules.is_empty()
            || !self.exdates.is_empty()
            || !self.experiods.is_empty()
    }

    pub fn add_rule(&mut self, rule: Recurrence) {
        self.rules.push(rule);
    }

    pub fn subtract_rule(&mut self, rule: Recurrence) {
        self.exrules.push(rule);
    }

    pub fn add_date(&mut self, dt: DateTime) {
        self.dates.push(dt);
    }

    pub fn subtract_date(&mut self, dt: DateTime) {
        self.exdates.push(dt);
    }

    pub fn add_period(&mut self, period: Period) {
        self.periods.push(period);
    }

    pub fn subtract_period(&mut self, period: Period) {
        self.experiods.push(period);
    }

    pub fn rules(&self) -> &[Recurrence] {
        &self.rules
    }

    pub fn exrules(&self) -> &[Recurrence] {
        &self.exrules
    }

    pub fn dates(&self) -> &[DateTime] {
        &self.dates
    }

    pub fn exdates(&self) -> &[DateTime] {
        &self.exdates
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn experiods(&self) -> &[Period] {
        &self.experiods
    }

    /// Order-insensitive comparison of all six lists.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        fn rules_equal(a: &[Recurrence], b: &[Recurrence]) -> bool {
            if a.len() != b.len() {
                return false;
            }
            let mut remaining: Vec<&Recurrence> = b.iter().collect();
            for rule in a {
                match remaining.iter().position(|other| *other == rule) {
                    Some(idx) => {
                        remaining.swap_remove(idx);
                    }
                    None => return false,
                }
            }
            true
        }
        fn sorted<T: Clone + Ord>(v: &[T]) -> Vec<T> {
            let mut v = v.to_vec();
            v.sort();
            v
        }
        rules_equal(&self.rules, &other.rules)
            && rules_equal(&self.exrules, &other.exrules)
            && sorted(&self.dates) == sorted(&other.dates)
            && sorted(&self.exdates) == sorted(&other.exdates)
            && sorted(&self.periods) == sorted(&other.periods)
            && sorted(&self.experiods) == sorted(&other.experiods)
    }

    /// Expand the set for master start `start` within `range`,
    /// appending the sorted unique surviving instances to `items`.
    /// Returns whether any constituent was limited by the window.
    pub fn expand(
        &mut self,
        start: &DateTime,
        range: &Period,
        items: &mut Vec<DateTime>,
        float_offset: i64,
        max_instances: Option<usize>,
    ) -> CalendarResult<bool> {
        let mut limited = false;
        let mut include: Vec<DateTime> = Vec::new();

        if range.contains(start) {
            include.push(start.clone());
        } else {
            limited = true;
        }
        for rule in &mut self.rules {
            if rule.expand(start, range, &mut include, float_offset, max_instances)? {
                limited = true;
            }
        }
        for date in &self.dates {
            if range.contains(date) {
                include.push(date.clone());
                check_ceiling(include.len(), max_instances)?;
            } else {
                limited = true;
            }
        }
        for period in &self.periods {
            if range.overlaps(period) {
                include.push(period.start().clone());
                check_ceiling(include.len(), max_instances)?;
            } else {
                limited = true;
            }
        }
        include.sort();
        include.dedup();

        let mut exclude: Vec<DateTime> = Vec::new();
        for rule in &mut self.exrules {
            rule.expand(start, range, &mut exclude, float_offset, None)?;
        }
        for date in &self.exdates {
            if range.contains(date) {
                exclude.push(date.clone());
            }
        }
        for period in &self.experiods {
            if range.overlaps(period) {
                exclude.push(period.start().clone());
            }
        }
        exclude.sort();
        exclude.dedup();

        items.extend(
            include
                .into_iter()
                .filter(|item| exclude.binary_search(item).is_err()),
        );
        Ok(limited)
    }

    /// Invalidate the caches of all owned rules after a mutation of
    /// the master start.
    pub fn changed(&mut self) {
        for rule in &mut self.rules {
            rule.clear();
        }
        for rule in &mut self.exrules {
            rule.clear();
        }
    }

    /// Cut the set off before `exclude`.
    pub fn exclude_future_recurrence(&mut self, exclude: &DateTime) {
        for rule in &mut self.rules {
            rule.exclude_future_recurrence(exclude);
        }
        self.dates.retain(|dt| dt < exclude);
        self.periods.retain(|period| period.start() < exclude);
    }

    /// Whether a basic picker UI can represent this set: at most one
    /// simple rule and nothing else.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        if self.rules.len() > 1
            || !self.exrules.is_empty()
            || !self.dates.is_empty()
            || !self.periods.is_empty()
        {
            false
        } else if self.rules.len() == 1 {
            self.rules[0].is_simple()
        } else {
            true
        }
    }
}

fn check_ceiling(len: usize, max_instances: Option<usize>) -> CalendarResult<()> {
    if let Some(max) = max_instances {
        if len > max {
            return Err(CalendarError::too_many_instances()
                .with_message("recurrence set exceeded the instance ceiling"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserContext;

    fn window(text: &str) -> Period {
        Period::parse(text, false, &ParserContext::strict()).unwrap()
    }

    fn dt(text: &str) -> DateTime {
        DateTime::parse(text, false).unwrap()
    }

    #[test]
    fn exdate_removes_only_that_instance() {
        let mut set = RecurrenceSet::new();
        set.add_rule(Recurrence::parse("FREQ=DAILY;COUNT=4").unwrap());
        set.subtract_date(dt("20240102T090000Z"));

        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        set.expand(&start, &range, &mut items, 0, None).unwrap();
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        assert_eq!(
            texts,
            vec!["20240101T090000Z", "20240103T090000Z", "20240104T090000Z"]
        );
    }

    #[test]
    fn rdate_outside_window_sets_limited() {
        let mut set = RecurrenceSet::new();
        set.add_date(dt("20270101T000000Z"));
        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        let limited = set.expand(&start, &range, &mut items, 0, None).unwrap();
        assert!(limited);
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        assert_eq!(texts, vec!["20240101T090000Z"]);
    }

    #[test]
    fn rperiod_contributes_its_start() {
        let mut set = RecurrenceSet::new();
        set.add_period(
            Period::parse("20240115T100000Z/PT2H", false, &ParserContext::strict()).unwrap(),
        );
        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        set.expand(&start, &range, &mut items, 0, None).unwrap();
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        assert_eq!(texts, vec!["20240101T090000Z", "20240115T100000Z"]);
    }

    #[test]
    fn duplicates_are_unified() {
        let mut set = RecurrenceSet::new();
        set.add_rule(Recurrence::parse("FREQ=DAILY;COUNT=2").unwrap());
        set.add_date(dt("20240101T090000Z"));
        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        set.expand(&start, &range, &mut items, 0, None).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn exrule_subtracts_instances() {
        let mut set = RecurrenceSet::new();
        set.add_rule(Recurrence::parse("FREQ=DAILY;COUNT=6").unwrap());
        set.subtract_rule(Recurrence::parse("FREQ=DAILY;INTERVAL=2").unwrap());
        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        set.expand(&start, &range, &mut items, 0, None).unwrap();
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        // The every-other-day exclusion removes the odd instances.
        assert_eq!(
            texts,
            vec!["20240102T090000Z", "20240104T090000Z", "20240106T090000Z"]
        );
    }

    #[test]
    fn future_exclusion_truncates_the_set() {
        let mut set = RecurrenceSet::new();
        set.add_rule(Recurrence::parse("FREQ=DAILY").unwrap());
        set.add_date(dt("20240120T090000Z"));
        let cutoff = dt("20240104T090000Z");
        set.exclude_future_recurrence(&cutoff);
        assert!(set.dates().is_empty());

        let start = dt("20240101T090000Z");
        let range = window("20240101T000000Z/20240201T000000Z");
        let mut items = Vec::new();
        let limited = set.expand(&start, &range, &mut items, 0, None).unwrap();
        assert!(!limited, "a truncated rule is fully expanded");
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        assert_eq!(
            texts,
            vec!["20240101T090000Z", "20240102T090000Z", "20240103T090000Z"]
        );
    }

    #[test]
    fn set_equality_is_order_insensitive() {
        let mut a = RecurrenceSet::new();
        a.add_rule(Recurrence::parse("FREQ=DAILY").unwrap());
        a.add_rule(Recurrence::parse("FREQ=WEEKLY").unwrap());
        let mut b = RecurrenceSet::new();
        b.add_rule(Recurrence::parse("FREQ=WEEKLY").unwrap());
        b.add_rule(Recurrence::parse("FREQ=DAILY").unwrap());
        assert!(a.equals(&b));
    }
}
