//! Recurrence rule parsing, emission and expansion.

use std::fmt::Write;

use serde_json::{json, Value as Json};

use crate::datetime::{iso_weeks_in_year, DateTime, Weekday};
use crate::error::{CalendarError, CalendarResult};
use crate::gregorian::{days_in_month, days_in_year};
use crate::period::Period;

/// Recurrence frequency, finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn name(self) -> &'static str {
        match self {
            Self::Secondly => "SECONDLY",
            Self::Minutely => "MINUTELY",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "SECONDLY" => Some(Self::Secondly),
            "MINUTELY" => Some(Self::Minutely),
            "HOURLY" => Some(Self::Hourly),
            "DAILY" => Some(Self::Daily),
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            "YEARLY" => Some(Self::Yearly),
        _ => None,
        }
    }
}

/// A `BYDAY` entry: optional ordinal (0 means "every") plus weekday.
pub type WeekdayNum = (i64, Weekday);

/// A single recurrence rule with its expansion cache.
///
/// Every mutating setter invalidates the cache.
#[derive(Debug, Clone, Default)]
pub struct Recurrence {
    freq: Option<Frequency>,
    count: Option<u64>,
    until: Option<DateTime>,
    interval: Option<u64>,
    by_seconds: Option<Vec<i64>>,
    by_minutes: Option<Vec<i64>>,
    by_hours: Option<Vec<i64>>,
    by_day: Option<Vec<WeekdayNum>>,
    by_month_day: Option<Vec<i64>>,
    by_year_day: Option<Vec<i64>>,
    by_week_no: Option<Vec<i64>>,
    by_month: Option<Vec<i64>>,
    by_set_pos: Option<Vec<i64>>,
    week_start: Option<Weekday>,
    cache: Option<ExpansionCache>,
}

#[derive(Debug, Clone)]
struct ExpansionCache {
    start: DateTime,
    upto: DateTime,
    fully_expanded: bool,
    instances: Vec<DateTime>,
}

impl PartialEq for Recurrence {
    fn eq(&self, other: &Self) -> bool {
        fn sorted<T: Clone + Ord>(v: &Option<Vec<T>>) -> Vec<T> {
            let mut v = v.clone().unwrap_or_default();
            v.sort();
            v
        }
        self.freq == other.freq
            && self.count == other.count
            && self.until == other.until
            && self.interval() == other.interval()
            && sorted(&self.by_seconds) == sorted(&other.by_seconds)
            && sorted(&self.by_minutes) == sorted(&other.by_minutes)
            && sorted(&self.by_hours) == sorted(&other.by_hours)
            && sorted(&self.by_day) == sorted(&other.by_day)
            && sorted(&self.by_month_day) == sorted(&other.by_month_day)
            && sorted(&self.by_year_day) == sorted(&other.by_year_day)
            && sorted(&self.by_week_no) == sorted(&other.by_week_no)
            && sorted(&self.by_month) == sorted(&other.by_month)
            && sorted(&self.by_set_pos) == sorted(&other.by_set_pos)
            && self.week_start() == other.week_start()
    }
}

impl Eq for Recurrence {}

impl Recurrence {
    #[must_use]
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq: Some(freq),
            ..Self::default()
        }
    }

    pub fn freq(&self) -> Frequency {
        self.freq.unwrap_or(Frequency::Yearly)
    }

    pub fn set_freq(&mut self, freq: Frequency) {
        if self.freq != Some(freq) {
            self.clear();
            self.freq = Some(freq);
        }
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn set_count(&mut self, count: Option<u64>) {
        if self.count != count {
            self.clear();
            self.count = count;
        }
    }

    pub fn until(&self) -> Option<&DateTime> {
        self.until.as_ref()
    }

    pub fn set_until(&mut self, until: Option<DateTime>) {
        if self.until != until {
            self.clear();
            self.until = until;
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval.unwrap_or(1).max(1)
    }

    pub fn set_interval(&mut self, interval: u64) {
        if self.interval() != interval.max(1) {
            self.clear();
            self.interval = Some(interval.max(1));
        }
    }

    pub fn by_month(&self) -> Option<&[i64]> {
        self.by_month.as_deref()
    }

    pub fn set_by_month(&mut self, by: Option<Vec<i64>>) {
        if self.by_month != by {
            self.clear();
            self.by_month = by;
        }
    }

    pub fn by_month_day(&self) -> Option<&[i64]> {
        self.by_month_day.as_deref()
    }

    pub fn set_by_month_day(&mut self, by: Option<Vec<i64>>) {
        if self.by_month_day != by {
            self.clear();
            self.by_month_day = by;
        }
    }

    pub fn by_year_day(&self) -> Option<&[i64]> {
        self.by_year_day.as_deref()
    }

    pub fn set_by_year_day(&mut self, by: Option<Vec<i64>>) {
        if self.by_year_day != by {
            self.clear();
            self.by_year_day = by;
        }
    }

    pub fn by_day(&self) -> Option<&[WeekdayNum]> {
        self.by_day.as_deref()
    }

    pub fn set_by_day(&mut self, by: Option<Vec<WeekdayNum>>) {
        if self.by_day != by {
            self.clear();
            self.by_day = by;
        }
    }

    pub fn by_set_pos(&self) -> Option<&[i64]> {
        self.by_set_pos.as_deref()
    }

    pub fn set_by_set_pos(&mut self, by: Option<Vec<i64>>) {
        if self.by_set_pos != by {
            self.clear();
            self.by_set_pos = by;
        }
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start.unwrap_or(Weekday::Monday)
    }

    pub fn set_week_start(&mut self, wkst: Weekday) {
        if self.week_start() != wkst {
            self.clear();
            self.week_start = Some(wkst);
        }
    }

    /// Drop the expansion cache. Invoked by every mutating setter.
    pub fn clear(&mut self) {
        self.cache = None;
    }

    /// Terminate this rule before `exclude`.
    pub fn exclude_future_recurrence(&mut self, exclude: &DateTime) {
        let mut until = exclude.clone();
        until.offset_seconds(-1);
        self.count = None;
        self.until = Some(until);
        self.clear();
    }

    /// A rule a basic picker UI can represent: frequency, interval and
    /// at most simple BYDAY/BYMONTHDAY parts.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.by_seconds.is_none()
            && self.by_minutes.is_none()
            && self.by_hours.is_none()
            && self.by_year_day.is_none()
            && self.by_week_no.is_none()
            && self.by_set_pos.is_none()
            && self
                .by_day
                .as_ref()
                .map_or(true, |days| days.iter().all(|(num, _)| *num == 0))
    }

    // ==== grammar ====

    pub fn parse(data: &str) -> CalendarResult<Self> {
        Self::parse_variant(data, false)
    }

    pub fn parse_variant(data: &str, full_iso: bool) -> CalendarResult<Self> {
        let mut rule = Self::default();
        for part in data.split(';') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CalendarError::invalid_value()
                    .with_message("recurrence: expected KEY=VALUE")
                    .with_data(data)
            })?;
            rule.parse_part(&key.to_ascii_uppercase(), value, full_iso)
                .map_err(|e| e.with_data(data))?;
        }
        if rule.freq.is_none() {
            return Err(CalendarError::invalid_value()
                .with_message("recurrence: FREQ is required")
                .with_data(data));
        }
        if rule.count.is_some() && rule.until.is_some() {
            return Err(CalendarError::invalid_value()
                .with_message("recurrence: UNTIL and COUNT are mutually exclusive")
                .with_data(data));
        }
        Ok(rule)
    }

    fn parse_part(&mut self, key: &str, value: &str, full_iso: bool) -> CalendarResult<()> {
        let bad = |msg: &'static str| CalendarError::invalid_value().with_message(msg);
        match key {
            "FREQ" => {
                self.freq = Some(
                    Frequency::from_name(&value.to_ascii_uppercase())
                        .ok_or_else(|| bad("recurrence: unknown FREQ"))?,
                );
            }
            "UNTIL" => {
                self.until = Some(DateTime::parse(value, full_iso)?);
            }
            "COUNT" => {
                let count: u64 = value.parse().map_err(|_| bad("recurrence: bad COUNT"))?;
                if count == 0 {
                    return Err(bad("recurrence: COUNT must be positive"));
                }
                self.count = Some(count);
            }
            "INTERVAL" => {
                let interval: u64 = value.parse().map_err(|_| bad("recurrence: bad INTERVAL"))?;
                if interval == 0 {
                    return Err(bad("recurrence: INTERVAL must be positive"));
                }
                self.interval = Some(interval);
            }
            "BYSECOND" => self.by_seconds = Some(int_list(value, 0, 59, false)?),
            "BYMINUTE" => self.by_minutes = Some(int_list(value, 0, 59, false)?),
            "BYHOUR" => self.by_hours = Some(int_list(value, 0, 23, false)?),
            "BYMONTHDAY" => self.by_month_day = Some(int_list(value, 1, 31, true)?),
            "BYYEARDAY" => self.by_year_day = Some(int_list(value, 1, 366, true)?),
            "BYWEEKNO" => self.by_week_no = Some(int_list(value, 1, 53, true)?),
            "BYMONTH" => self.by_month = Some(int_list(value, 1, 12, false)?),
            "BYSETPOS" => self.by_set_pos = Some(int_list(value, 1, 366, true)?),
            "BYDAY" => {
                let mut days = Vec::new();
                for item in value.split(',') {
                    let split = item.len().saturating_sub(2);
                    let (num_text, day_text) = item.split_at(split);
                    let day = Weekday::from_abbreviation(&day_text.to_ascii_uppercase())
                        .ok_or_else(|| bad("recurrence: unknown weekday in BYDAY"))?;
                    let num = if num_text.is_empty() {
                        0
                    } else {
                        num_text
                            .parse::<i64>()
                            .map_err(|_| bad("recurrence: bad ordinal in BYDAY"))?
                    };
                    if num.abs() > 53 {
                        return Err(bad("recurrence: BYDAY ordinal out of range"));
                    }
                    days.push((num, day));
                }
                self.by_day = Some(days);
            }
            "WKST" => {
                self.week_start = Some(
                    Weekday::from_abbreviation(&value.to_ascii_uppercase())
                        .ok_or_else(|| bad("recurrence: unknown WKST"))?,
                );
            }
            _ => return Err(bad("recurrence: unknown rule part")),
        }
        Ok(())
    }

    pub fn generate(&self, out: &mut String) {
        let _ = write!(out, "FREQ={}", self.freq().name());
        if let Some(count) = self.count {
            let _ = write!(out, ";COUNT={count}");
        } else if let Some(until) = &self.until {
            out.push_str(";UNTIL=");
            until.generate(out);
        }
        if self.interval() > 1 {
            let _ = write!(out, ";INTERVAL={}", self.interval());
        }
        write_int_list(out, "BYSECOND", self.by_seconds.as_deref());
        write_int_list(out, "BYMINUTE", self.by_minutes.as_deref());
        write_int_list(out, "BYHOUR", self.by_hours.as_deref());
        if let Some(days) = &self.by_day {
            out.push_str(";BYDAY=");
            for (idx, (num, day)) in days.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                if *num != 0 {
                    let _ = write!(out, "{num}");
                }
                out.push_str(day.abbreviation());
            }
        }
        write_int_list(out, "BYMONTHDAY", self.by_month_day.as_deref());
        write_int_list(out, "BYYEARDAY", self.by_year_day.as_deref());
        write_int_list(out, "BYWEEKNO", self.by_week_no.as_deref());
        write_int_list(out, "BYMONTH", self.by_month.as_deref());
        write_int_list(out, "BYSETPOS", self.by_set_pos.as_deref());
        if self.week_start() != Weekday::Monday {
            let _ = write!(out, ";WKST={}", self.week_start().abbreviation());
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }

    /// The element list of the XML rendition.
    #[must_use]
    pub fn xml_items(&self) -> Vec<(&'static str, String)> {
        let mut items = vec![("freq", self.freq().name().to_owned())];
        if let Some(count) = self.count {
            items.push(("count", count.to_string()));
        } else if let Some(until) = &self.until {
            items.push(("until", until.xml_text()));
        }
        if self.interval() > 1 {
            items.push(("interval", self.interval().to_string()));
        }
        let mut push_list = |name: &'static str, list: Option<&[i64]>| {
            for value in list.unwrap_or_default() {
                items.push((name, value.to_string()));
            }
        };
        push_list("bysecond", self.by_seconds.as_deref());
        push_list("byminute", self.by_minutes.as_deref());
        push_list("byhour", self.by_hours.as_deref());
        if let Some(days) = &self.by_day {
            for (num, day) in days {
                let text = if *num != 0 {
                    format!("{num}{}", day.abbreviation())
                } else {
                    day.abbreviation().to_owned()
                };
                items.push(("byday", text));
            }
        }
        let mut push_list = |name: &'static str, list: Option<&[i64]>| {
            for value in list.unwrap_or_default() {
                items.push((name, value.to_string()));
            }
        };
        push_list("bymonthday", self.by_month_day.as_deref());
        push_list("byyearday", self.by_year_day.as_deref());
        push_list("byweekno", self.by_week_no.as_deref());
        push_list("bymonth", self.by_month.as_deref());
        push_list("bysetpos", self.by_set_pos.as_deref());
        if self.week_start() != Weekday::Monday {
            items.push(("wkst", self.week_start().abbreviation().to_owned()));
        }
        items
    }

    #[must_use]
    pub fn json_value(&self) -> Json {
        let mut map = serde_json::Map::new();
        map.insert("freq".into(), json!(self.freq().name()));
        if let Some(count) = self.count {
            map.insert("count".into(), json!(count));
        } else if let Some(until) = &self.until {
            map.insert("until".into(), json!(until.xml_text()));
        }
        if self.interval() > 1 {
            map.insert("interval".into(), json!(self.interval()));
        }
        let mut insert_list = |name: &str, list: Option<&[i64]>| {
            if let Some(list) = list {
                map.insert(name.into(), json!(list));
            }
        };
        insert_list("bysecond", self.by_seconds.as_deref());
        insert_list("byminute", self.by_minutes.as_deref());
        insert_list("byhour", self.by_hours.as_deref());
        insert_list("bymonthday", self.by_month_day.as_deref());
        insert_list("byyearday", self.by_year_day.as_deref());
        insert_list("byweekno", self.by_week_no.as_deref());
        insert_list("bymonth", self.by_month.as_deref());
        insert_list("bysetpos", self.by_set_pos.as_deref());
        if let Some(days) = &self.by_day {
            let days: Vec<String> = days
                .iter()
                .map(|(num, day)| {
                    if *num != 0 {
                        format!("{num}{}", day.abbreviation())
                    } else {
                        day.abbreviation().to_owned()
                    }
                })
                .collect();
            map.insert("byday".into(), json!(days));
        }
        if self.week_start() != Weekday::Monday {
            map.insert("wkst".into(), json!(self.week_start().abbreviation()));
        }
        Json::Object(map)
    }

    pub fn parse_json(value: &Json) -> CalendarResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            CalendarError::invalid_value().with_message("recurrence: JSON value must be an object")
        })?;
        let mut parts = Vec::new();
        for (key, value) in object {
            let rendered = match value {
                Json::Array(values) => values
                    .iter()
                    .map(json_scalar_text)
                    .collect::<CalendarResult<Vec<_>>>()?
                    .join(","),
                other => json_scalar_text(other)?,
            };
            parts.push(format!("{}={}", key.to_ascii_uppercase(), rendered));
        }
        Self::parse_variant(&parts.join(";"), true)
    }

    // ==== expansion ====

    /// Expand this rule for the master start `start` within `range`,
    /// appending instances to `items`. Returns whether the expansion
    /// was limited by the window.
    ///
    /// `float_offset` shifts a UTC `UNTIL` into the floating frame the
    /// caller is expanding in (used by timezone regimes, which expand
    /// against the previous regime's wall clock).
    pub fn expand(
        &mut self,
        start: &DateTime,
        range: &Period,
        items: &mut Vec<DateTime>,
        float_offset: i64,
        max_instances: Option<usize>,
    ) -> CalendarResult<bool> {
        let upto = range.end();
        let cached_ok = self.cache.as_ref().is_some_and(|cache| {
            cache.start.structural_eq(start) && (cache.fully_expanded || cache.upto >= upto)
        });
        if !cached_ok {
            let (instances, fully_expanded) =
                self.compute(start, &upto, float_offset, max_instances)?;
            self.cache = Some(ExpansionCache {
                start: start.clone(),
                upto,
                fully_expanded,
                instances,
            });
        }
        let cache = self.cache.as_ref().expect("cache was just installed");
        let mut limited = !cache.fully_expanded;
        for instance in &cache.instances {
            if range.contains(instance) {
                items.push(instance.clone());
            } else {
                limited = true;
            }
        }
        Ok(limited)
    }

    /// Generate all instances in `[start, upto)`, honoring UNTIL and
    /// COUNT. The second return is true when the rule was exhausted
    /// (no instances exist at or beyond `upto`).
    fn compute(
        &self,
        start: &DateTime,
        upto: &DateTime,
        float_offset: i64,
        max_instances: Option<usize>,
    ) -> CalendarResult<(Vec<DateTime>, bool)> {
        let until = self.until.as_ref().map(|until| {
            let mut until = until.clone();
            if float_offset != 0 && until.zone().is_utc() {
                until.offset_seconds(float_offset);
                until.set_timezone_utc(false);
            }
            until
        });

        let mut results: Vec<DateTime> = Vec::new();
        let mut count_left = self.count;
        let mut fully_expanded = false;

        'periods: for k in 0.. {
            if self.period_floor(start, k) >= *upto {
                break;
            }
            let mut instances = self.instances_for_period(start, k);
            instances.sort_by_key(DateTime::naive_seconds);
            instances.dedup_by(|a, b| a.naive_seconds() == b.naive_seconds());
            let instances = self.apply_set_pos(instances);
            for instance in instances {
                if instance < *start {
                    continue;
                }
                if let Some(until) = &until {
                    if instance > *until {
                        fully_expanded = true;
                        break 'periods;
                    }
                }
                if let Some(left) = &mut count_left {
                    if *left == 0 {
                        fully_expanded = true;
                        break 'periods;
                    }
                    *left -= 1;
                }
                if instance >= *upto {
                    break 'periods;
                }
                results.push(instance);
                if let Some(max) = max_instances {
                    if results.len() > max {
                        return Err(CalendarError::too_many_instances()
                            .with_message("recurrence expansion exceeded the instance ceiling"));
                    }
                }
            }
            if count_left == Some(0) {
                fully_expanded = true;
                break;
            }
        }
        results.sort_by_key(DateTime::posix_time);
        Ok((results, fully_expanded))
    }

    /// The lower bound of period `k`; no instance of period `k` or any
    /// later period precedes it. Drives loop termination.
    fn period_floor(&self, start: &DateTime, k: u64) -> DateTime {
        let step = (k * self.interval()) as i64;
        let mut floor = start.clone();
        match self.freq() {
            Frequency::Yearly => {
                floor.set_year(start.year() + step);
                floor.set_month(1);
                floor.set_day(1);
                floor.set_hhmmss(0, 0, 0);
            }
            Frequency::Monthly => {
                floor.set_day(1);
                floor.set_hhmmss(0, 0, 0);
                floor.offset_month(step);
            }
            Frequency::Weekly => {
                let wkst = self.week_start().number();
                let back = (start.day_of_week().number() - wkst).rem_euclid(7);
                floor.set_hhmmss(0, 0, 0);
                floor.offset_day(step * 7 - back);
            }
            Frequency::Daily => {
                floor.set_hhmmss(0, 0, 0);
                floor.offset_day(step);
            }
            Frequency::Hourly => {
                floor.set_hhmmss(start.hours(), 0, 0);
                floor.offset_seconds(step * 3600);
            }
            Frequency::Minutely => {
                floor.set_hhmmss(start.hours(), start.minutes(), 0);
                floor.offset_seconds(step * 60);
            }
            Frequency::Secondly => {
                floor.offset_seconds(step);
            }
        }
        floor
    }

    fn instances_for_period(&self, start: &DateTime, k: u64) -> Vec<DateTime> {
        let step = (k * self.interval()) as i64;
        match self.freq() {
            Frequency::Yearly => self.yearly_instances(start, step),
            Frequency::Monthly => self.monthly_instances(start, step),
            Frequency::Weekly => self.weekly_instances(start, step),
            Frequency::Daily => {
                let mut seed = start.clone();
                seed.offset_day(step);
                self.sub_day_instances(self.filter_date_parts(vec![seed], false))
            }
            Frequency::Hourly => {
                let mut seed = start.clone();
                seed.offset_seconds(step * 3600);
                let seeds = self.filter_date_parts(vec![seed], true);
                let seeds = filter_list(seeds, self.by_hours.as_deref(), |dt| dt.hours());
                let seeds = expand_minutes(seeds, self.by_minutes.as_deref());
                expand_seconds(seeds, self.by_seconds.as_deref())
            }
            Frequency::Minutely => {
                let mut seed = start.clone();
                seed.offset_seconds(step * 60);
                let seeds = self.filter_date_parts(vec![seed], true);
                let seeds = filter_list(seeds, self.by_hours.as_deref(), |dt| dt.hours());
                let seeds = filter_list(seeds, self.by_minutes.as_deref(), |dt| dt.minutes());
                expand_seconds(seeds, self.by_seconds.as_deref())
            }
            Frequency::Secondly => {
                let mut seed = start.clone();
                seed.offset_seconds(step);
                let seeds = self.filter_date_parts(vec![seed], true);
                let seeds = filter_list(seeds, self.by_hours.as_deref(), |dt| dt.hours());
                let seeds = filter_list(seeds, self.by_minutes.as_deref(), |dt| dt.minutes());
                filter_list(seeds, self.by_seconds.as_deref(), |dt| dt.seconds())
            }
        }
    }

    fn yearly_instances(&self, start: &DateTime, step: i64) -> Vec<DateTime> {
        let year = start.year() + step;
        let mut seed = start.clone();
        seed.set_year(year);

        let mut items = vec![seed];
        if let Some(months) = &self.by_month {
            items = items
                .iter()
                .flat_map(|item| {
                    months.iter().map(move |month| {
                        let mut copy = item.clone();
                        copy.set_month(*month);
                        copy
                    })
                })
                .collect();
        }
        if let Some(weeks) = &self.by_week_no {
            items = items
                .iter()
                .flat_map(|item| {
                    weeks.iter().filter_map(move |week| {
                        let mut copy = item.clone();
                        let total = iso_weeks_in_year(copy.year());
                        let week = if *week > 0 { *week } else { total + *week + 1 };
                        if week < 1 || week > total {
                            return None;
                        }
                        copy.set_week_no(week);
                        (copy.week_no() == week).then_some(copy)
                    })
                })
                .collect();
        }
        if let Some(year_days) = &self.by_year_day {
            items = items
                .iter()
                .flat_map(|item| {
                    year_days.iter().filter_map(move |year_day| {
                        let mut copy = item.clone();
                        set_year_day(&mut copy, *year_day).then_some(copy)
                    })
                })
                .collect();
        }
        if let Some(month_days) = &self.by_month_day {
            items = expand_month_days(items, month_days);
        }
        if let Some(days) = &self.by_day {
            if self.by_year_day.is_some() || self.by_week_no.is_some() {
                items.retain(|item| days.iter().any(|(_, day)| item.day_of_week() == *day));
            } else if self.by_month_day.is_some() {
                items.retain(|item| days.iter().any(|(_, day)| item.day_of_week() == *day));
            } else if self.by_month.is_some() {
                items = expand_by_day_in_month(items, days);
            } else {
                items = expand_by_day_in_year(items, days);
            }
        }
        items.retain(valid_date);
        self.sub_day_instances(items)
    }

    fn monthly_instances(&self, start: &DateTime, step: i64) -> Vec<DateTime> {
        let mut seed = start.clone();
        let month_index = (start.year() * 12 + start.month() - 1) + step;
        seed.set_year(month_index.div_euclid(12));
        seed.set_month(month_index.rem_euclid(12) + 1);

        let mut items = vec![seed];
        if let Some(months) = &self.by_month {
            items.retain(|item| months.contains(&item.month()));
        }
        if let Some(month_days) = &self.by_month_day {
            items = expand_month_days(items, month_days);
        }
        if let Some(days) = &self.by_day {
            if self.by_month_day.is_some() {
                items.retain(|item| days.iter().any(|(_, day)| item.day_of_week() == *day));
            } else {
                items = expand_by_day_in_month(items, days);
            }
        }
        items.retain(valid_date);
        self.sub_day_instances(items)
    }

    fn weekly_instances(&self, start: &DateTime, step: i64) -> Vec<DateTime> {
        let mut seed = start.clone();
        seed.offset_day(step * 7);

        let mut items = Vec::new();
        if let Some(days) = &self.by_day {
            let wkst = self.week_start().number();
            let back = (seed.day_of_week().number() - wkst).rem_euclid(7);
            for (_, day) in days {
                let mut copy = seed.clone();
                copy.offset_day((day.number() - wkst).rem_euclid(7) - back);
                items.push(copy);
            }
        } else {
            items.push(seed);
        }
        if let Some(months) = &self.by_month {
            items.retain(|item| months.contains(&item.month()));
        }
        self.sub_day_instances(items)
    }

    /// Date-part contraction used by the sub-daily frequencies; the
    /// DAILY path skips the BYYEARDAY filter.
    fn filter_date_parts(&self, mut items: Vec<DateTime>, with_year_day: bool) -> Vec<DateTime> {
        if let Some(months) = &self.by_month {
            items.retain(|item| months.contains(&item.month()));
        }
        if with_year_day {
            if let Some(year_days) = &self.by_year_day {
                items.retain(|item| {
                    year_days.iter().any(|yd| {
                        let resolved = if *yd > 0 {
                            *yd
                        } else {
                            days_in_year(item.year()) + *yd + 1
                        };
                        item.day_of_year() == resolved
                    })
                });
            }
        }
        if let Some(month_days) = &self.by_month_day {
            items.retain(|item| {
                month_days.iter().any(|md| {
                    let resolved = if *md > 0 {
                        *md
                    } else {
                        days_in_month(item.month(), item.year()) + *md + 1
                    };
                    item.day() == resolved
                })
            });
        }
        if let Some(days) = &self.by_day {
            items.retain(|item| days.iter().any(|(_, day)| item.day_of_week() == *day));
        }
        items
    }

    /// Expand BYHOUR/BYMINUTE/BYSECOND beneath a daily-or-coarser
    /// frequency.
    fn sub_day_instances(&self, items: Vec<DateTime>) -> Vec<DateTime> {
        let items = expand_hours(items, self.by_hours.as_deref());
        let items = expand_minutes(items, self.by_minutes.as_deref());
        expand_seconds(items, self.by_seconds.as_deref())
    }

    fn apply_set_pos(&self, items: Vec<DateTime>) -> Vec<DateTime> {
        let Some(positions) = &self.by_set_pos else {
            return items;
        };
        let len = items.len() as i64;
        let mut selected: Vec<DateTime> = positions
            .iter()
            .filter_map(|pos| {
                let index = if *pos > 0 { *pos - 1 } else { len + *pos };
                if (0..len).contains(&index) {
                    Some(items[index as usize].clone())
                } else {
                    None
                }
            })
            .collect();
        selected.sort_by_key(DateTime::naive_seconds);
        selected.dedup_by(|a, b| a.naive_seconds() == b.naive_seconds());
        selected
    }
}

fn json_scalar_text(value: &Json) -> CalendarResult<String> {
    match value {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        _ => Err(CalendarError::invalid_value()
            .with_message("recurrence: unexpected JSON value type")),
    }
}

fn int_list(value: &str, low: i64, high: i64, signed: bool) -> CalendarResult<Vec<i64>> {
    let mut result = Vec::new();
    for item in value.split(',') {
        let num: i64 = item.trim().parse().map_err(|_| {
            CalendarError::invalid_value().with_message("recurrence: bad integer list")
        })?;
        let in_range = if signed {
            (low..=high).contains(&num.abs()) && num != 0
        } else {
            (low..=high).contains(&num)
        };
        if !in_range {
            return Err(
                CalendarError::invalid_value().with_message("recurrence: integer out of range")
            );
        }
        result.push(num);
    }
    Ok(result)
}

fn write_int_list(out: &mut String, key: &str, list: Option<&[i64]>) {
    if let Some(list) = list {
        let _ = write!(out, ";{key}=");
        for (idx, value) in list.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            let _ = write!(out, "{value}");
        }
    }
}

fn valid_date(dt: &DateTime) -> bool {
    (1..=12).contains(&dt.month()) && (1..=days_in_month(dt.month(), dt.year())).contains(&dt.day())
}

fn set_year_day(dt: &mut DateTime, year_day: i64) -> bool {
    let total = days_in_year(dt.year());
    let resolved = if year_day > 0 {
        year_day
    } else {
        total + year_day + 1
    };
    if resolved < 1 || resolved > total {
        return false;
    }
    dt.set_month(1);
    dt.set_day(1);
    dt.offset_day(resolved - 1);
    true
}

fn expand_month_days(items: Vec<DateTime>, month_days: &[i64]) -> Vec<DateTime> {
    items
        .iter()
        .flat_map(|item| {
            month_days.iter().filter_map(move |md| {
                let dim = days_in_month(item.month(), item.year());
                let resolved = if *md > 0 { *md } else { dim + *md + 1 };
                if resolved < 1 || resolved > dim {
                    // Out-of-month days are skipped, never rolled over.
                    return None;
                }
                let mut copy = item.clone();
                copy.set_day(resolved);
                Some(copy)
            })
        })
        .collect()
}

fn expand_by_day_in_month(items: Vec<DateTime>, days: &[WeekdayNum]) -> Vec<DateTime> {
    let mut result = Vec::new();
    for item in items {
        for (num, day) in days {
            if *num != 0 {
                let mut copy = item.clone();
                if copy.set_day_of_week_in_month(*num, *day) {
                    result.push(copy);
                }
            } else {
                // Every matching weekday of the month.
                let dim = days_in_month(item.month(), item.year());
                for ordinal in 1..=5 {
                    let mut copy = item.clone();
                    if copy.set_day_of_week_in_month(ordinal, *day) && copy.day() <= dim {
                        result.push(copy);
                    }
                }
            }
        }
    }
    result
}

fn expand_by_day_in_year(items: Vec<DateTime>, days: &[WeekdayNum]) -> Vec<DateTime> {
    let mut result = Vec::new();
    for item in items {
        let year = item.year();
        for (num, day) in days {
            if *num > 0 {
                let mut copy = item.clone();
                copy.set_month(1);
                copy.set_day(1);
                let first_dow = copy.day_of_week().number();
                copy.offset_day((day.number() - first_dow).rem_euclid(7) + (*num - 1) * 7);
                if copy.year() == year {
                    result.push(copy);
                }
            } else if *num < 0 {
                let mut copy = item.clone();
                copy.set_month(12);
                copy.set_day(31);
                let last_dow = copy.day_of_week().number();
                copy.offset_day(-((last_dow - day.number()).rem_euclid(7)) + (*num + 1) * 7);
                if copy.year() == year {
                    result.push(copy);
                }
            } else {
                // Every matching weekday across the year.
                let mut copy = item.clone();
                copy.set_month(1);
                copy.set_day(1);
                let first_dow = copy.day_of_week().number();
                copy.offset_day((day.number() - first_dow).rem_euclid(7));
                while copy.year() == year {
                    result.push(copy.clone());
                    copy.offset_day(7);
                }
            }
        }
    }
    result
}

fn expand_hours(items: Vec<DateTime>, hours: Option<&[i64]>) -> Vec<DateTime> {
    let Some(hours) = hours else { return items };
    items
        .iter()
        .flat_map(|item| {
            hours.iter().map(move |hour| {
                let mut copy = item.clone();
                copy.set_hhmmss(*hour, item.minutes(), item.seconds());
                copy
            })
        })
        .collect()
}

fn expand_minutes(items: Vec<DateTime>, minutes: Option<&[i64]>) -> Vec<DateTime> {
    let Some(minutes) = minutes else { return items };
    items
        .iter()
        .flat_map(|item| {
            minutes.iter().map(move |minute| {
                let mut copy = item.clone();
                copy.set_hhmmss(item.hours(), *minute, item.seconds());
                copy
            })
        })
        .collect()
}

fn expand_seconds(items: Vec<DateTime>, seconds: Option<&[i64]>) -> Vec<DateTime> {
    let Some(seconds) = seconds else { return items };
    items
        .iter()
        .flat_map(|item| {
            seconds.iter().map(move |second| {
                let mut copy = item.clone();
                copy.set_hhmmss(item.hours(), item.minutes(), *second);
                copy
            })
        })
        .collect()
}

fn filter_list<F: Fn(&DateTime) -> i64>(
    mut items: Vec<DateTime>,
    list: Option<&[i64]>,
    accessor: F,
) -> Vec<DateTime> {
    if let Some(list) = list {
        items.retain(|item| list.contains(&accessor(item)));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserContext;

    fn window(start: &str, end: &str) -> Period {
        Period::parse(&format!("{start}/{end}"), false, &ParserContext::strict()).unwrap()
    }

    fn expand(rule_text: &str, start_text: &str, range: &Period) -> Vec<String> {
        let mut rule = Recurrence::parse(rule_text).unwrap();
        let start = DateTime::parse(start_text, false).unwrap();
        let mut items = Vec::new();
        rule.expand(&start, range, &mut items, 0, None).unwrap();
        items.iter().map(DateTime::to_text).collect()
    }

    #[test]
    fn round_trip_text() {
        for text in [
            "FREQ=DAILY;COUNT=3",
            "FREQ=MONTHLY;BYDAY=-1FR",
            "FREQ=YEARLY;INTERVAL=2;BYMONTH=2;BYMONTHDAY=29",
            "FREQ=WEEKLY;BYDAY=MO,WE,FR;WKST=SU",
            "FREQ=YEARLY;UNTIL=20301101T000000Z;BYMONTH=3",
        ] {
            let rule = Recurrence::parse(text).unwrap();
            assert_eq!(rule.to_text(), text);
        }
    }

    #[test]
    fn until_and_count_are_exclusive() {
        assert!(Recurrence::parse("FREQ=DAILY;COUNT=3;UNTIL=20300101T000000Z").is_err());
    }

    #[test]
    fn bounds_are_validated() {
        assert!(Recurrence::parse("FREQ=YEARLY;BYMONTH=13").is_err());
        assert!(Recurrence::parse("FREQ=YEARLY;BYMONTHDAY=0").is_err());
        assert!(Recurrence::parse("FREQ=YEARLY;BYWEEKNO=54").is_err());
        assert!(Recurrence::parse("FREQ=DAILY;BYHOUR=24").is_err());
    }

    #[test]
    fn daily_count() {
        let range = window("20240101T000000Z", "20250101T000000Z");
        let items = expand("FREQ=DAILY;COUNT=3", "20240310T013000Z", &range);
        assert_eq!(
            items,
            vec!["20240310T013000Z", "20240311T013000Z", "20240312T013000Z"]
        );
    }

    #[test]
    fn monthly_last_friday() {
        // First three instances of the last-Friday rule.
        let range = window("20240101T000000Z", "20240401T000000Z");
        let items = expand("FREQ=MONTHLY;BYDAY=-1FR", "20240101T090000Z", &range);
        assert_eq!(
            items,
            vec!["20240126T090000Z", "20240223T090000Z", "20240329T090000Z"]
        );
    }

    #[test]
    fn yearly_leap_day_skips_common_years() {
        let range = window("20200101T000000Z", "20320101T000000Z");
        let items = expand("FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=29", "20200229T000000Z", &range);
        assert_eq!(
            items,
            vec!["20200229T000000Z", "20240229T000000Z", "20280229T000000Z"]
        );
    }

    #[test]
    fn monthly_day_preservation_skips_short_months() {
        let range = window("20240101T000000Z", "20240701T000000Z");
        let items = expand("FREQ=MONTHLY", "20240131T120000Z", &range);
        assert_eq!(
            items,
            vec![
                "20240131T120000Z",
                "20240331T120000Z",
                "20240531T120000Z",
            ]
        );
    }

    #[test]
    fn weekly_with_byday_and_wkst() {
        let range = window("20240101T000000Z", "20240115T000000Z");
        let items = expand("FREQ=WEEKLY;BYDAY=MO,FR", "20240101T080000Z", &range);
        // 2024-01-01 was a Monday.
        assert_eq!(
            items,
            vec![
                "20240101T080000Z",
                "20240105T080000Z",
                "20240108T080000Z",
                "20240112T080000Z",
            ]
        );
    }

    #[test]
    fn yearly_last_friday_of_year_without_bymonth() {
        let range = window("20240101T000000Z", "20260101T000000Z");
        let items = expand("FREQ=YEARLY;BYDAY=-1FR", "20240101T090000Z", &range);
        assert_eq!(items, vec!["20241227T090000Z", "20251226T090000Z"]);
    }

    #[test]
    fn until_is_inclusive() {
        let range = window("20240101T000000Z", "20250101T000000Z");
        let items = expand(
            "FREQ=DAILY;UNTIL=20240312T013000Z",
            "20240310T013000Z",
            &range,
        );
        assert_eq!(
            items,
            vec!["20240310T013000Z", "20240311T013000Z", "20240312T013000Z"]
        );
    }

    #[test]
    fn bysetpos_selects_from_period() {
        // Last weekday of each month.
        let range = window("20240101T000000Z", "20240401T000000Z");
        let items = expand(
            "FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1",
            "20240101T170000Z",
            &range,
        );
        assert_eq!(
            items,
            vec!["20240131T170000Z", "20240229T170000Z", "20240329T170000Z"]
        );
    }

    #[test]
    fn hourly_with_byminute() {
        let range = window("20240310T000000Z", "20240310T040000Z");
        let items = expand(
            "FREQ=HOURLY;INTERVAL=2;BYMINUTE=0,30",
            "20240310T000000Z",
            &range,
        );
        assert_eq!(
            items,
            vec![
                "20240310T000000Z",
                "20240310T003000Z",
                "20240310T020000Z",
                "20240310T023000Z",
            ]
        );
    }

    #[test]
    fn expansion_is_idempotent_and_sorted() {
        let mut rule = Recurrence::parse("FREQ=WEEKLY;BYDAY=MO,FR").unwrap();
        let start = DateTime::parse("20240101T080000Z", false).unwrap();
        let range = window("20240101T000000Z", "20240301T000000Z");
        let mut first = Vec::new();
        rule.expand(&start, &range, &mut first, 0, None).unwrap();
        let mut second = Vec::new();
        rule.expand(&start, &range, &mut second, 0, None).unwrap();
        assert_eq!(first, second);
        for pair in first.windows(2) {
            assert!(pair[0] < pair[1], "expansion must be strictly increasing");
        }
    }

    #[test]
    fn cache_is_invalidated_on_mutation() {
        let mut rule = Recurrence::parse("FREQ=DAILY;COUNT=5").unwrap();
        let start = DateTime::parse("20240101T000000Z", false).unwrap();
        let range = window("20240101T000000Z", "20240201T000000Z");
        let mut items = Vec::new();
        rule.expand(&start, &range, &mut items, 0, None).unwrap();
        assert_eq!(items.len(), 5);

        rule.set_count(Some(2));
        let mut items = Vec::new();
        rule.expand(&start, &range, &mut items, 0, None).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn instance_ceiling_raises() {
        let mut rule = Recurrence::parse("FREQ=SECONDLY").unwrap();
        let start = DateTime::parse("20240101T000000Z", false).unwrap();
        let range = window("20240101T000000Z", "20240102T000000Z");
        let mut items = Vec::new();
        let err = rule.expand(&start, &range, &mut items, 0, Some(1000)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TooManyInstances);
    }

    #[test]
    fn limited_reflects_window_truncation() {
        let mut rule = Recurrence::parse("FREQ=DAILY").unwrap();
        let start = DateTime::parse("20240101T000000Z", false).unwrap();
        let range = window("20240101T000000Z", "20240105T000000Z");
        let mut items = Vec::new();
        let limited = rule.expand(&start, &range, &mut items, 0, None).unwrap();
        assert!(limited);

        let mut rule = Recurrence::parse("FREQ=DAILY;COUNT=2").unwrap();
        let mut items = Vec::new();
        let limited = rule.expand(&start, &range, &mut items, 0, None).unwrap();
        assert!(!limited);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn float_offset_shifts_utc_until() {
        // The UNTIL is 07:00Z; in the -05:00 floating frame the final
        // instance is 02:00 local.
        let mut rule = Recurrence::parse("FREQ=DAILY;UNTIL=20240312T070000Z").unwrap();
        let start = DateTime::parse("20240310T020000", false).unwrap();
        let range = window("20240101T000000", "20250101T000000");
        let mut items = Vec::new();
        rule.expand(&start, &range, &mut items, -18000, None).unwrap();
        let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
        assert_eq!(
            texts,
            vec!["20240310T020000", "20240311T020000", "20240312T020000"]
        );
    }

    #[test]
    fn yearly_byday_in_month() {
        // Second Sunday of March, US DST onset.
        let range = window("20240101T000000Z", "20260101T000000Z");
        let items = expand("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU", "20070311T020000", &range);
        assert_eq!(items, vec!["20240310T020000", "20250309T020000"]);
    }

    #[test]
    fn json_round_trip() {
        let rule = Recurrence::parse("FREQ=MONTHLY;COUNT=4;BYDAY=-1FR;BYSETPOS=1").unwrap();
        let json = rule.json_value();
        let back = Recurrence::parse_json(&json).unwrap();
        assert_eq!(rule, back);
    }
}
