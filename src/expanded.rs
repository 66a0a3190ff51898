//! Expanded recurrence instances and free-busy aggregation.

use crate::component::Component;
use crate::datetime::DateTime;
use crate::period::Period;

/// One concrete instance of a (possibly recurring) component.
#[derive(Debug, Clone)]
pub struct ExpandedInstance<'a> {
    owner: &'a Component,
    instance_start: DateTime,
    instance_end: DateTime,
    recurrence_id: Option<DateTime>,
}

impl<'a> ExpandedInstance<'a> {
    pub fn new(owner: &'a Component, recurrence_id: Option<DateTime>) -> Self {
        let master_start = owner.start();
        let master_end = owner.end();
        let (instance_start, instance_end) = match &recurrence_id {
            Some(rid) => {
                let duration = &master_end - &master_start;
                let start = rid.clone();
                let end = &start + &duration;
                (start, end)
            }
            None => (master_start, master_end),
        };
        Self {
            owner,
            instance_start,
            instance_end,
            recurrence_id,
        }
    }

    pub fn owner(&self) -> &'a Component {
        self.owner
    }

    pub fn instance_start(&self) -> &DateTime {
        &self.instance_start
    }

    pub fn instance_end(&self) -> &DateTime {
        &self.instance_end
    }

    pub fn recurrence_id(&self) -> Option<&DateTime> {
        self.recurrence_id.as_ref()
    }

    /// Whether this instance was produced by recurrence expansion
    /// rather than the master itself.
    pub fn recurring(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// Sort all-day instances ahead of timed ones on the same day.
    #[must_use]
    pub fn sort_key_allday(&self) -> (i64, bool, i64) {
        (
            self.instance_start.days_since_1970(),
            !self.instance_start.is_date_only(),
            self.instance_start.posix_time(),
        )
    }
}

/// Busy classification of a free-busy period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FreeBusyType {
    Free,
    BusyTentative,
    BusyUnavailable,
    Busy,
}

impl FreeBusyType {
    #[must_use]
    pub fn from_parameter(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_uppercase).as_deref() {
            Some("FREE") => Self::Free,
            Some("BUSY-TENTATIVE") => Self::BusyTentative,
            Some("BUSY-UNAVAILABLE") => Self::BusyUnavailable,
            _ => Self::Busy,
        }
    }

    #[must_use]
    pub fn parameter_name(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::BusyTentative => "BUSY-TENTATIVE",
            Self::BusyUnavailable => "BUSY-UNAVAILABLE",
            Self::Busy => "BUSY",
        }
    }
}

/// A classified busy period.
#[derive(Debug, Clone)]
pub struct FreeBusy {
    fbtype: FreeBusyType,
    period: Period,
}

impl FreeBusy {
    #[must_use]
    pub fn new(fbtype: FreeBusyType, period: Period) -> Self {
        Self { fbtype, period }
    }

    pub fn fbtype(&self) -> FreeBusyType {
        self.fbtype
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    /// Merge overlapping or adjacent periods of the same type.
    pub fn resolve_overlaps(list: &mut Vec<FreeBusy>) {
        list.sort_by(|a, b| {
            a.period
                .start()
                .cmp(b.period.start())
                .then_with(|| a.fbtype.cmp(&b.fbtype))
        });
        let mut merged: Vec<FreeBusy> = Vec::with_capacity(list.len());
        for item in list.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.fbtype == item.fbtype && *item.period.start() <= last.period.end() {
                    if item.period.end() > last.period.end() {
                        last.period = Period::new(last.period.start().clone(), item.period.end());
                    }
                    continue;
                }
            }
            merged.push(item);
        }
        *list = merged;
    }
}
