//! Half-open time intervals.

use std::cmp::Ordering;

use crate::datetime::DateTime;
use crate::duration::Duration;
use crate::error::{CalendarError, CalendarResult};
use crate::parser::ParserContext;

/// An interval `[start, end)`. The end is either an explicit instant
/// or `start + duration`; whichever form was parsed is preserved for
/// round-trip emission.
#[derive(Debug, Clone)]
pub struct Period {
    start: DateTime,
    end: Option<DateTime>,
    duration: Option<Duration>,
    use_duration: bool,
}

impl Period {
    #[must_use]
    pub fn new(start: DateTime, end: DateTime) -> Self {
        Self {
            start,
            end: Some(end),
            duration: None,
            use_duration: false,
        }
    }

    #[must_use]
    pub fn new_duration(start: DateTime, duration: Duration) -> Self {
        Self {
            start,
            end: None,
            duration: Some(duration),
            use_duration: true,
        }
    }

    pub fn parse(data: &str, full_iso: bool, ctx: &ParserContext) -> CalendarResult<Self> {
        let (start_text, end_text) = data.split_once('/').ok_or_else(|| {
            CalendarError::invalid_value()
                .with_message("period: missing '/' separator")
                .with_data(data)
        })?;
        let start = DateTime::parse(start_text, full_iso)?;
        if end_text.starts_with('P') || end_text.starts_with('+') || end_text.starts_with('-') {
            let duration = Duration::parse(end_text, ctx)?;
            Ok(Self::new_duration(start, duration))
        } else {
            let end = DateTime::parse(end_text, full_iso)?;
            Ok(Self::new(start, end))
        }
    }

    pub fn generate(&self, out: &mut String) {
        self.start.generate(out);
        out.push('/');
        if self.use_duration {
            self.duration().generate(out);
        } else {
            self.end().generate(out);
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }

    pub fn start(&self) -> &DateTime {
        &self.start
    }

    #[must_use]
    pub fn end(&self) -> DateTime {
        match &self.end {
            Some(end) => end.clone(),
            None => &self.start + self.duration.as_ref().expect("either end or duration is set"),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        match &self.duration {
            Some(duration) => duration.clone(),
            None => &self.end.clone().expect("either end or duration is set") - &self.start,
        }
    }

    pub fn use_duration(&self) -> bool {
        self.use_duration
    }

    /// Switch the emitted representation, materializing the other
    /// form on demand.
    pub fn set_use_duration(&mut self, use_duration: bool) {
        if use_duration && self.duration.is_none() {
            self.duration = Some(self.duration());
        } else if !use_duration && self.end.is_none() {
            self.end = Some(self.end());
        }
        self.use_duration = use_duration;
    }

    /// `start <= dt < end`.
    #[must_use]
    pub fn contains(&self, dt: &DateTime) -> bool {
        *dt >= self.start && *dt < self.end()
    }

    #[must_use]
    pub fn is_before(&self, dt: &DateTime) -> bool {
        *dt >= self.end()
    }

    /// Half-open interval overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.start >= other.end() || self.end() <= other.start)
    }

    /// Rebind both endpoints without converting the wall clock.
    pub fn set_timezone(&mut self, zone: crate::timezone::Timezone) {
        self.start.set_timezone(zone.clone());
        if let Some(end) = &mut self.end {
            end.set_timezone(zone);
        }
    }

    pub fn adjust_to_utc(&mut self) {
        self.start.adjust_to_utc();
        if let Some(end) = &mut self.end {
            end.adjust_to_utc();
        }
    }

    /// The two-element form used by the XML and JSON renditions.
    #[must_use]
    pub fn xml_parts(&self) -> (String, String) {
        if self.use_duration {
            (self.start.xml_text(), self.duration().to_text())
        } else {
            (self.start.xml_text(), self.end().xml_text())
        }
    }
}

impl PartialEq for Period {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end() == other.end()
    }
}

impl Eq for Period {}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end().cmp(&other.end()))
    }
}

impl std::hash::Hash for Period {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end().hash(state);
    }
}
