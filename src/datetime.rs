//! Local-civil timestamps with a zone binding.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write;
use std::ops::{Add, Sub};

use crate::duration::Duration;
use crate::error::{CalendarError, CalendarResult};
use crate::gregorian::{
    day_of_week, days_in_month, days_in_year, days_since_1970, days_upto_month, SECONDS_PER_DAY,
};
use crate::locale::{LONG_DAYS, LONG_MONTHS, SHORT_DAYS, SHORT_MONTHS};
use crate::timezone::Timezone;

/// Day of week, Sunday first. The numbering matches the recurrence
/// engine's `WKST`/`BYDAY` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Weekday {
    Sunday = 0,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    #[must_use]
    pub fn from_number(num: i64) -> Self {
        match num.rem_euclid(7) {
            0 => Self::Sunday,
            1 => Self::Monday,
            2 => Self::Tuesday,
            3 => Self::Wednesday,
            4 => Self::Thursday,
            5 => Self::Friday,
            6 => Self::Saturday,
            _ => unreachable!("rem_euclid(7) is within 0..7"),
        }
    }

    #[must_use]
    pub fn number(self) -> i64 {
        self as i64
    }

    /// Two-letter form used by the recurrence grammar.
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::Sunday => "SU",
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
        }
    }

    #[must_use]
    pub fn from_abbreviation(s: &str) -> Option<Self> {
        match s {
            "SU" => Some(Self::Sunday),
            "MO" => Some(Self::Monday),
            "TU" => Some(Self::Tuesday),
            "WE" => Some(Self::Wednesday),
            "TH" => Some(Self::Thursday),
            "FR" => Some(Self::Friday),
            "SA" => Some(Self::Saturday),
            _ => None,
        }
    }
}

/// Formatting styles for [`DateTime::format_locale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleStyle {
    FullDate,
    AbbrevDate,
    NumericDate,
}

/// A local-civil timestamp plus zone binding.
///
/// Comparison, equality and hashing use the absolute flavor: the
/// computed POSIX seconds under the zone binding. Structural equality
/// is available through [`DateTime::structural_eq`]. The POSIX value
/// is cached and the cache is invalidated by every mutation.
#[derive(Debug, Clone)]
pub struct DateTime {
    year: i64,
    month: i64,
    day: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    date_only: bool,
    zone: Timezone,
    posix: Cell<Option<i64>>,
}

impl Default for DateTime {
    fn default() -> Self {
        Self {
            year: 1970,
            month: 1,
            day: 1,
            hours: 0,
            minutes: 0,
            seconds: 0,
            date_only: false,
            zone: Timezone::Floating,
            posix: Cell::new(None),
        }
    }
}

impl DateTime {
    /// A date-only value with no zone binding.
    #[must_use]
    pub fn new_date(year: i64, month: i64, day: i64) -> Self {
        Self {
            year,
            month,
            day,
            date_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn new(
        year: i64,
        month: i64,
        day: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
        zone: Timezone,
    ) -> Self {
        Self {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
            date_only: false,
            zone,
            posix: Cell::new(None),
        }
    }

    #[must_use]
    pub fn new_utc(year: i64, month: i64, day: i64, hours: i64, minutes: i64, seconds: i64) -> Self {
        Self::new(year, month, day, hours, minutes, seconds, Timezone::Utc)
    }

    fn changed(&mut self) {
        self.posix.set(None);
    }

    pub fn year(&self) -> i64 {
        self.year
    }

    pub fn month(&self) -> i64 {
        self.month
    }

    pub fn day(&self) -> i64 {
        self.day
    }

    pub fn hours(&self) -> i64 {
        self.hours
    }

    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn is_date_only(&self) -> bool {
        self.date_only
    }

    pub fn zone(&self) -> &Timezone {
        &self.zone
    }

    pub fn set_year(&mut self, year: i64) {
        self.year = year;
        self.changed();
    }

    pub fn set_month(&mut self, month: i64) {
        self.month = month;
        self.changed();
    }

    pub fn set_day(&mut self, day: i64) {
        self.day = day;
        self.changed();
    }

    pub fn set_hhmmss(&mut self, hours: i64, minutes: i64, seconds: i64) {
        self.hours = hours;
        self.minutes = minutes;
        self.seconds = seconds;
        self.changed();
    }

    /// Setting the flag forces the time components to zero.
    pub fn set_date_only(&mut self, date_only: bool) {
        self.date_only = date_only;
        if date_only {
            self.hours = 0;
            self.minutes = 0;
            self.seconds = 0;
        }
        self.changed();
    }

    pub fn set_timezone(&mut self, zone: Timezone) {
        self.zone = zone;
        self.changed();
    }

    pub fn set_timezone_utc(&mut self, utc: bool) {
        self.zone = if utc { Timezone::Utc } else { Timezone::Floating };
        self.changed();
    }

    /// Rebind to `zone` preserving the absolute instant; the wall
    /// clock fields shift by the offset difference.
    pub fn adjust_timezone(&mut self, zone: Timezone) {
        let offset_old = self.timezone_offset_seconds(false);
        self.zone = zone;
        self.changed();
        let offset_new = self.timezone_offset_seconds(false);
        self.offset_seconds(offset_new - offset_old);
    }

    /// Convert to UTC preserving the absolute instant. Date-only
    /// values are never converted.
    pub fn adjust_to_utc(&mut self) {
        if self.date_only || self.zone.is_utc() {
            return;
        }
        let offset = self.timezone_offset_seconds(false);
        self.offset_seconds(-offset);
        self.zone = Timezone::Utc;
        self.changed();
    }

    #[must_use]
    pub fn duplicate_as_utc(&self) -> Self {
        let mut other = self.clone();
        other.adjust_to_utc();
        other
    }

    /// UTC offset in effect at this instant, in seconds.
    #[must_use]
    pub fn timezone_offset_seconds(&self, relative_to_utc: bool) -> i64 {
        self.zone.offset_seconds(self, relative_to_utc)
    }

    /// Seconds since the epoch ignoring the zone binding.
    pub(crate) fn naive_seconds(&self) -> i64 {
        days_since_1970(self.year, self.month, self.day) * SECONDS_PER_DAY
            + self.hours * 3600
            + self.minutes * 60
            + self.seconds
    }

    /// Seconds since the epoch under the zone binding. Cached;
    /// invalidated on any mutation.
    #[must_use]
    pub fn posix_time(&self) -> i64 {
        if let Some(cached) = self.posix.get() {
            return cached;
        }
        let result = self.naive_seconds() - self.timezone_offset_seconds(false);
        self.posix.set(Some(result));
        result
    }

    /// True when all fields including the zone binding match.
    #[must_use]
    pub fn structural_eq(&self, other: &Self) -> bool {
        self.year == other.year
            && self.month == other.month
            && self.day == other.day
            && self.hours == other.hours
            && self.minutes == other.minutes
            && self.seconds == other.seconds
            && self.date_only == other.date_only
            && self.zone == other.zone
    }

    pub fn offset_seconds(&mut self, seconds: i64) {
        self.seconds += seconds;
        self.normalise();
    }

    pub fn offset_day(&mut self, days: i64) {
        self.day += days;
        self.normalise();
    }

    /// Month arithmetic does not clamp the day; callers that care
    /// check validity before normalising.
    pub fn offset_month(&mut self, months: i64) {
        self.month += months;
        self.normalise_month();
        self.changed();
    }

    pub fn offset_year(&mut self, years: i64) {
        self.year += years;
        self.normalise();
    }

    fn normalise_month(&mut self) {
        let zero_based = self.month - 1;
        self.year += zero_based.div_euclid(12);
        self.month = zero_based.rem_euclid(12) + 1;
    }

    /// Cascade all fields back into range.
    pub fn normalise(&mut self) {
        let mut total = self.hours * 3600 + self.minutes * 60 + self.seconds;
        let day_carry = total.div_euclid(SECONDS_PER_DAY);
        total = total.rem_euclid(SECONDS_PER_DAY);
        self.hours = total / 3600;
        self.minutes = (total / 60) % 60;
        self.seconds = total % 60;
        self.day += day_carry;

        self.normalise_month();
        while self.day > days_in_month(self.month, self.year) {
            self.day -= days_in_month(self.month, self.year);
            self.month += 1;
            self.normalise_month();
        }
        while self.day < 1 {
            self.month -= 1;
            self.normalise_month();
            self.day += days_in_month(self.month, self.year);
        }
        self.changed();
    }

    #[must_use]
    pub fn day_of_week(&self) -> Weekday {
        Weekday::from_number(day_of_week(self.year, self.month, self.day))
    }

    #[must_use]
    pub fn day_of_year(&self) -> i64 {
        self.day + days_upto_month(self.month, self.year)
    }

    #[must_use]
    pub fn days_since_1970(&self) -> i64 {
        days_since_1970(self.year, self.month, self.day)
    }

    /// ISO 8601 week number (weeks start Monday, week 1 contains the
    /// first Thursday of the year).
    #[must_use]
    pub fn week_no(&self) -> i64 {
        let monday_zero = (self.day_of_week().number() + 6).rem_euclid(7);
        let week = (self.day_of_year() - monday_zero + 9) / 7;
        if week < 1 {
            return iso_weeks_in_year(self.year - 1);
        }
        if week > iso_weeks_in_year(self.year) {
            return 1;
        }
        week
    }

    /// Move to the same weekday within ISO week `week_no` of the
    /// current year.
    pub fn set_week_no(&mut self, week_no: i64) {
        let current = self.week_no();
        // A date in early January may belong to the previous year's
        // last week; step forward into week 1 first.
        if current > week_no && self.month == 1 {
            self.offset_day(7);
            let current = self.week_no();
            self.offset_day(7 * (week_no - current));
        } else {
            self.offset_day(7 * (week_no - current));
        }
    }

    /// Set the day to the `offset`-th `day` of the current month
    /// (negative counts from the end). Returns false when the month
    /// has no such day.
    pub fn set_day_of_week_in_month(&mut self, offset: i64, weekday: Weekday) -> bool {
        let dim = days_in_month(self.month, self.year);
        let day = if offset > 0 {
            let first_dow = day_of_week(self.year, self.month, 1);
            1 + (weekday.number() - first_dow).rem_euclid(7) + (offset - 1) * 7
        } else {
            let last_dow = day_of_week(self.year, self.month, dim);
            dim - (last_dow - weekday.number()).rem_euclid(7) + (offset + 1) * 7
        };
        if day < 1 || day > dim {
            return false;
        }
        self.day = day;
        self.changed();
        true
    }

    /// Set the day to the first `weekday` on or after day `start_day`
    /// of the current month.
    pub fn set_next_day_of_week(&mut self, start_day: i64, weekday: Weekday) {
        let start_dow = day_of_week(self.year, self.month, start_day);
        self.day = start_day + (weekday.number() - start_dow).rem_euclid(7);
        self.normalise();
    }

    pub fn parse(data: &str, full_iso: bool) -> CalendarResult<Self> {
        let bad = || CalendarError::invalid_value().with_message("date-time: bad format").with_data(data);
        let digits = |s: &str| -> CalendarResult<i64> { s.parse::<i64>().map_err(|_| bad()) };

        let mut result = Self::default();
        let (date_part, time_part) = match data.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (data, None),
        };

        if full_iso {
            let mut parts = date_part.split('-');
            result.year = digits(parts.next().ok_or_else(bad)?)?;
            result.month = digits(parts.next().ok_or_else(bad)?)?;
            result.day = digits(parts.next().ok_or_else(bad)?)?;
            if parts.next().is_some() {
                return Err(bad());
            }
        } else {
            if date_part.len() != 8 {
                return Err(bad());
            }
            result.year = digits(&date_part[0..4])?;
            result.month = digits(&date_part[4..6])?;
            result.day = digits(&date_part[6..8])?;
        }

        match time_part {
            None => result.date_only = true,
            Some(time) => {
                let (time, utc) = match time.strip_suffix('Z') {
                    Some(t) => (t, true),
                    None => (time, false),
                };
                if full_iso {
                    let mut parts = time.split(':');
                    result.hours = digits(parts.next().ok_or_else(bad)?)?;
                    result.minutes = digits(parts.next().ok_or_else(bad)?)?;
                    result.seconds = digits(parts.next().ok_or_else(bad)?)?;
                } else {
                    if time.len() != 6 {
                        return Err(bad());
                    }
                    result.hours = digits(&time[0..2])?;
                    result.minutes = digits(&time[2..4])?;
                    result.seconds = digits(&time[4..6])?;
                }
                if utc {
                    result.zone = Timezone::Utc;
                }
            }
        }

        let valid = (1..=12).contains(&result.month)
            && (1..=days_in_month(result.month, result.year)).contains(&result.day)
            && (0..=23).contains(&result.hours)
            && (0..=59).contains(&result.minutes)
            && (0..=59).contains(&result.seconds);
        if !valid {
            return Err(CalendarError::invalid_value()
                .with_message("date-time: field out of range")
                .with_data(data));
        }
        Ok(result)
    }

    pub fn generate(&self, out: &mut String) {
        let _ = write!(out, "{:04}{:02}{:02}", self.year, self.month, self.day);
        if !self.date_only {
            let _ = write!(out, "T{:02}{:02}{:02}", self.hours, self.minutes, self.seconds);
            if self.zone.is_utc() {
                out.push('Z');
            }
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(16);
        self.generate(&mut out);
        out
    }

    /// The dashed/coloned form used by the XML and JSON renditions.
    #[must_use]
    pub fn xml_text(&self) -> String {
        let mut out = String::with_capacity(20);
        let _ = write!(out, "{:04}-{:02}-{:02}", self.year, self.month, self.day);
        if !self.date_only {
            let _ = write!(out, "T{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds);
            if self.zone.is_utc() {
                out.push('Z');
            }
        }
        out
    }

    #[must_use]
    pub fn format_locale(&self, style: LocaleStyle) -> String {
        match style {
            LocaleStyle::FullDate => format!(
                "{}, {} {}, {}",
                LONG_DAYS[self.day_of_week().number() as usize],
                LONG_MONTHS[self.month as usize],
                self.day,
                self.year
            ),
            LocaleStyle::AbbrevDate => format!(
                "{}, {} {}, {}",
                SHORT_DAYS[self.day_of_week().number() as usize],
                SHORT_MONTHS[self.month as usize],
                self.day,
                self.year
            ),
            LocaleStyle::NumericDate => {
                format!("{}/{}/{}", self.month, self.day, self.year)
            }
        }
    }
}

pub(crate) fn iso_weeks_in_year(year: i64) -> i64 {
    // 53-week years are those starting on Thursday, plus leap years
    // starting on Wednesday.
    let jan1 = day_of_week(year, 1, 1);
    if jan1 == 4 || (jan1 == 3 && days_in_year(year) == 366) {
        53
    } else {
        52
    }
}

impl PartialEq for DateTime {
    fn eq(&self, other: &Self) -> bool {
        self.posix_time() == other.posix_time()
    }
}

impl Eq for DateTime {}

impl PartialOrd for DateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.posix_time().cmp(&other.posix_time())
    }
}

impl std::hash::Hash for DateTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.posix_time().hash(state);
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Add<&Duration> for &DateTime {
    type Output = DateTime;

    fn add(self, rhs: &Duration) -> DateTime {
        let mut result = self.clone();
        result.offset_seconds(rhs.total_seconds());
        result
    }
}

impl Sub<&DateTime> for &DateTime {
    type Output = Duration;

    fn sub(self, rhs: &DateTime) -> Duration {
        Duration::from_seconds(self.posix_time() - rhs.posix_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_round_trip_basic_forms() {
        let date = DateTime::parse("20240310", false).unwrap();
        assert!(date.is_date_only());
        assert_eq!(date.to_text(), "20240310");

        let dt = DateTime::parse("20240310T013000", false).unwrap();
        assert!(!dt.is_date_only());
        assert!(dt.zone().is_floating());
        assert_eq!(dt.to_text(), "20240310T013000");

        let utc = DateTime::parse("20240310T070000Z", false).unwrap();
        assert!(utc.zone().is_utc());
        assert_eq!(utc.to_text(), "20240310T070000Z");
    }

    #[test]
    fn parse_full_iso() {
        let dt = DateTime::parse("2024-03-10T07:00:00Z", true).unwrap();
        assert_eq!(dt.to_text(), "20240310T070000Z");
        assert_eq!(dt.xml_text(), "2024-03-10T07:00:00Z");
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(DateTime::parse("20240230T000000", false).is_err());
        assert!(DateTime::parse("20241310", false).is_err());
        assert!(DateTime::parse("20240310T240000", false).is_err());
    }

    #[test]
    fn normalise_cascades() {
        let mut dt = DateTime::new_utc(2024, 1, 31, 23, 59, 59);
        dt.offset_seconds(1);
        assert_eq!(dt.to_text(), "20240201T000000Z");

        let mut dt = DateTime::new_utc(2024, 3, 1, 0, 0, 0);
        dt.offset_day(-1);
        assert_eq!(dt.to_text(), "20240229T000000Z");
    }

    #[test]
    fn posix_cache_invalidation() {
        let mut dt = DateTime::new_utc(1970, 1, 2, 0, 0, 0);
        assert_eq!(dt.posix_time(), 86400);
        dt.offset_day(1);
        assert_eq!(dt.posix_time(), 2 * 86400);
    }

    #[test]
    fn fixed_offset_affects_posix() {
        let local = DateTime::new(1970, 1, 1, 1, 0, 0, Timezone::FixedOffset(3600));
        assert_eq!(local.posix_time(), 0);
    }

    #[test]
    fn nth_weekday_solvers() {
        // Second Sunday of March 2024 is the 10th.
        let mut dt = DateTime::new_date(2024, 3, 1);
        assert!(dt.set_day_of_week_in_month(2, Weekday::Sunday));
        assert_eq!(dt.day(), 10);

        // Last Friday of January 2024 is the 26th.
        let mut dt = DateTime::new_date(2024, 1, 1);
        assert!(dt.set_day_of_week_in_month(-1, Weekday::Friday));
        assert_eq!(dt.day(), 26);

        // There is no fifth Monday in February 2023.
        let mut dt = DateTime::new_date(2023, 2, 1);
        assert!(!dt.set_day_of_week_in_month(5, Weekday::Monday));
    }

    #[test]
    fn next_weekday_solver() {
        // First Sunday on or after March 8 2007 (US DST rule).
        let mut dt = DateTime::new_date(2007, 3, 1);
        dt.set_next_day_of_week(8, Weekday::Sunday);
        assert_eq!(dt.day(), 11);
    }

    #[test]
    fn week_numbers() {
        assert_eq!(DateTime::new_date(2024, 1, 4).week_no(), 1);
        // 2023-01-01 was a Sunday and belongs to 2022's week 52.
        assert_eq!(DateTime::new_date(2023, 1, 1).week_no(), 52);
        assert_eq!(DateTime::new_date(2020, 12, 31).week_no(), 53);
    }

    #[test]
    fn adjust_to_utc_with_fixed_offset() {
        let mut dt = DateTime::new(2024, 3, 10, 1, 30, 0, Timezone::FixedOffset(-18000));
        let posix = dt.posix_time();
        dt.adjust_to_utc();
        assert_eq!(dt.posix_time(), posix);
        assert_eq!(dt.to_text(), "20240310T063000Z");
    }

    #[test]
    fn duration_arithmetic() {
        let start = DateTime::new_utc(2024, 3, 10, 0, 0, 0);
        let end = &start + &Duration::from_seconds(90 * 60);
        assert_eq!(end.to_text(), "20240310T013000Z");
        assert_eq!((&end - &start).total_seconds(), 5400);
    }

    #[test]
    fn locale_formats() {
        let dt = DateTime::new_date(1970, 1, 1);
        assert_eq!(dt.format_locale(LocaleStyle::FullDate), "Thursday, January 1, 1970");
        assert_eq!(dt.format_locale(LocaleStyle::AbbrevDate), "Thu, Jan 1, 1970");
        assert_eq!(dt.format_locale(LocaleStyle::NumericDate), "1/1/1970");
    }
}
