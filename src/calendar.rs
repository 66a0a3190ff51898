//! The iCalendar container.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::component::{Component, ComponentKind};
use crate::datetime::DateTime;
use crate::error::{CalendarError, CalendarResult, ErrorKind};
use crate::expanded::{ExpandedInstance, FreeBusy, FreeBusyType};
use crate::parser::{FoldedLines, ParserContext, ParserPolicy};
use crate::period::Period;
use crate::property::Property;
use crate::tzdb::TimezoneDatabase;
use crate::value::{Value, Variant};
use crate::vtimezone::TimezoneDescriptor;

/// Which timezones [`Calendar::generate`] injects before emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimezoneInclusion {
    /// Inject a VTIMEZONE for every referenced TZID.
    All,
    /// Inject only timezones the standard database does not define.
    NonStandard,
    /// Inject nothing.
    None,
}

const BUILTIN_PROD_ID: &str = "-//calendar-rs//calendar_rs//EN";

static DEFAULT_PROD_ID: RwLock<String> = RwLock::new(String::new());

/// Override the PRODID stamped onto new calendars.
pub fn set_default_prod_id<S: Into<String>>(prod_id: S) {
    *DEFAULT_PROD_ID.write().expect("prodid lock poisoned") = prod_id.into();
}

fn default_prod_id() -> String {
    let current = DEFAULT_PROD_ID.read().expect("prodid lock poisoned");
    if current.is_empty() {
        BUILTIN_PROD_ID.to_owned()
    } else {
        current.clone()
    }
}

/// An iCalendar object: the only component without a parent.
#[derive(Debug, Clone)]
pub struct Calendar {
    root: Component,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new()
    }
}

impl Calendar {
    /// A new calendar carrying the default PRODID, VERSION and
    /// CALSCALE properties.
    #[must_use]
    pub fn new() -> Self {
        let mut calendar = Self::new_empty();
        calendar
            .root
            .add_property(Property::new_text("PRODID", default_prod_id()));
        calendar
            .root
            .add_property(Property::new_text("VERSION", "2.0"));
        calendar
            .root
            .add_property(Property::new_text("CALSCALE", "GREGORIAN"));
        calendar
    }

    #[must_use]
    pub fn new_empty() -> Self {
        Self {
            root: Component::new(ComponentKind::Vcalendar),
        }
    }

    pub(crate) fn from_root(root: Component) -> CalendarResult<Self> {
        if root.kind() != &ComponentKind::Vcalendar {
            return Err(CalendarError::invalid_data()
                .with_message("root component is not a VCALENDAR"));
        }
        Ok(Self { root })
    }

    pub fn component(&self) -> &Component {
        &self.root
    }

    pub fn component_mut(&mut self) -> &mut Component {
        &mut self.root
    }

    pub fn add_component(&mut self, component: Component) {
        self.root.add_component(component);
    }

    pub fn add_property(&mut self, property: Property) {
        self.root.add_property(property);
    }

    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.root.load_value_string("METHOD")
    }

    // ==== parsing ====

    /// Parse the line-folded text form, merging any VTIMEZONEs into
    /// the process-wide timezone database.
    pub fn parse_str(data: &str) -> CalendarResult<Self> {
        let calendar = Self::parse_str_without_merge(data)?;
        TimezoneDatabase::merge_timezones(calendar.timezones());
        Ok(calendar)
    }

    /// Parse without the database merge; used by the database itself
    /// when loading `.ics` files.
    pub(crate) fn parse_str_without_merge(data: &str) -> CalendarResult<Self> {
        Self::parse_str_with_ctx(data, &ParserContext::global())
    }

    pub(crate) fn parse_str_with_ctx(data: &str, ctx: &ParserContext) -> CalendarResult<Self> {
        let ctx = *ctx;
        let mut calendar = Self::new_empty();
        let mut lines = FoldedLines::new(data);
        let mut stack: Vec<Component> = Vec::new();
        let mut seen_begin = false;
        let mut seen_end = false;

        for line in &mut lines {
            if line.is_empty() {
                if ctx.blank_lines_in_data == ParserPolicy::Raise {
                    return Err(
                        CalendarError::invalid_data().with_message("data has blank lines")
                    );
                }
                continue;
            }
            if !seen_begin {
                if line == "BEGIN:VCALENDAR" {
                    seen_begin = true;
                    continue;
                }
                return Err(CalendarError::invalid_data()
                    .with_message("data does not start with BEGIN:VCALENDAR")
                    .with_data(line));
            }
            if seen_end {
                break;
            }
            if let Some(name) = line.strip_prefix("BEGIN:") {
                stack.push(Component::new(ComponentKind::from_name(name)));
            } else if line == "END:VCALENDAR" {
                if !stack.is_empty() {
                    return Err(CalendarError::invalid_data()
                        .with_message("unterminated component at END:VCALENDAR"));
                }
                seen_end = true;
            } else if let Some(name) = line.strip_prefix("END:") {
                let component = stack.pop().ok_or_else(|| {
                    CalendarError::invalid_data()
                        .with_message("END without matching BEGIN")
                        .with_data(line.clone())
                })?;
                if !component.type_name().eq_ignore_ascii_case(name) {
                    return Err(CalendarError::invalid_data()
                        .with_message("mismatched END delimiter")
                        .with_data(line.clone()));
                }
                let mut component = component;
                component.finalise();
                match stack.last_mut() {
                    Some(parent) => parent.add_component(component),
                    None => calendar.root.add_component(component),
                }
            } else {
                let property = Property::parse_text(&line, Variant::ICalendar, &ctx)
                    .map_err(|e| e.escalate(ErrorKind::InvalidComponent))?;
                match stack.last_mut() {
                    Some(component) => component.add_property(property),
                    None => {
                        if !valid_calendar_property(&property) {
                            return Err(CalendarError::invalid_data()
                                .with_message("invalid calendar property")
                                .with_data(line.clone()));
                        }
                        calendar.root.add_property(property);
                    }
                }
            }
        }
        if !seen_end {
            return Err(CalendarError::invalid_data().with_message("data is not complete"));
        }
        Ok(calendar)
    }

    // ==== emission ====

    pub fn generate(&self, out: &mut String, include_timezones: TimezoneInclusion) {
        let mut copy = self.clone();
        copy.include_missing_timezones(include_timezones);
        copy.root.generate(out);
    }

    #[must_use]
    pub fn get_text(&self, include_timezones: TimezoneInclusion) -> String {
        let mut out = String::new();
        self.generate(&mut out, include_timezones);
        out
    }

    // ==== timezones ====

    #[must_use]
    pub fn timezones(&self) -> Vec<&Component> {
        self.root.components_of(&ComponentKind::Vtimezone)
    }

    #[must_use]
    pub fn timezone_component(&self, tzid: &str) -> Option<&Component> {
        self.timezones()
            .into_iter()
            .find(|component| component.load_value_string("TZID") == Some(tzid))
    }

    /// Offset lookup against this calendar's own VTIMEZONEs.
    #[must_use]
    pub fn timezone_offset_seconds(&self, tzid: &str, dt: &DateTime, relative_to_utc: bool) -> i64 {
        self.timezone_component(tzid)
            .and_then(|component| TimezoneDescriptor::from_component(component).ok())
            .map_or(0, |mut descriptor| {
                descriptor
                    .offset_seconds(dt, relative_to_utc)
                    .unwrap_or_default()
            })
    }

    #[must_use]
    pub fn timezone_descriptor(&self, tzid: &str, dt: &DateTime) -> String {
        self.timezone_component(tzid)
            .and_then(|component| TimezoneDescriptor::from_component(component).ok())
            .map_or_else(String::new, |mut descriptor| {
                descriptor.descriptor(dt).unwrap_or_default()
            })
    }

    /// Inject VTIMEZONE components for TZIDs referenced by the other
    /// components, per the inclusion mode.
    pub fn include_missing_timezones(&mut self, mode: TimezoneInclusion) {
        if mode == TimezoneInclusion::None {
            return;
        }
        let mut tzids = BTreeSet::new();
        for component in self.root.children() {
            if component.kind() != &ComponentKind::Vtimezone {
                component.get_timezones(&mut tzids);
            }
        }
        for tzid in tzids {
            if mode == TimezoneInclusion::NonStandard
                && TimezoneDatabase::is_standard_timezone(&tzid)
            {
                continue;
            }
            if self.timezone_component(&tzid).is_some() {
                continue;
            }
            if let Some(component) = TimezoneDatabase::timezone_component(&tzid) {
                self.root.add_component(component);
            }
        }
    }

    /// Remove VTIMEZONEs the standard database already defines.
    /// Returns whether anything was removed.
    pub fn strip_standard_timezones(&mut self) -> bool {
        let before = self.root.children().len();
        self.root.children_mut().retain(|component| {
            if component.kind() != &ComponentKind::Vtimezone {
                return true;
            }
            match component.load_value_string("TZID") {
                Some(tzid) => !TimezoneDatabase::is_standard_timezone(tzid),
                None => true,
            }
        });
        before != self.root.children().len()
    }

    // ==== recurrence ====

    /// The master (non-overridden) recurring component, if any.
    #[must_use]
    pub fn master_component(&self) -> Option<&Component> {
        self.root
            .children()
            .iter()
            .find(|component| component.kind().is_recurring() && component.recurrence_id().is_none())
    }

    /// Override instances for `uid`, i.e. components carrying a
    /// RECURRENCE-ID.
    #[must_use]
    pub fn overridden_components(&self, uid: &str) -> Vec<&Component> {
        self.root
            .children()
            .iter()
            .filter(|component| {
                component.kind().is_recurring()
                    && component.uid() == Some(uid)
                    && component.recurrence_id().is_some()
            })
            .collect()
    }

    /// Build an override instance for `recurrence_id` from the master:
    /// the recurrence properties are dropped, the timing shifted, and
    /// a RECURRENCE-ID added.
    #[must_use]
    pub fn derive_component(&self, recurrence_id: &DateTime) -> Option<Component> {
        let master = self.master_component()?;
        let mut derived = master.clone();
        for name in ["RRULE", "RDATE", "EXRULE", "EXDATE", "RECURRENCE-ID"] {
            derived.remove_properties(name);
        }
        let start = master.start();
        let end = master.end();
        let old_duration = &end - &start;

        let mut new_start = recurrence_id.clone();
        if start.is_date_only() {
            new_start.set_date_only(true);
        } else if start.zone().tzid().is_some() {
            new_start.adjust_timezone(start.zone().clone());
        }
        derived.remove_properties("DTSTART");
        derived.remove_properties("DTEND");
        derived.add_property(Property::new("DTSTART", Value::DateTime(new_start.clone())));
        if !derived.uses_duration() {
            derived.add_property(Property::new(
                "DTEND",
                Value::DateTime(&new_start + &old_duration),
            ));
        }
        derived.add_property(Property::new(
            "RECURRENCE-ID",
            Value::DateTime(new_start),
        ));
        Some(derived)
    }

    /// Expand every VEVENT into its concrete instances within
    /// `period`, all-day instances first when requested.
    pub fn get_vevents(
        &self,
        period: &Period,
        all_day_at_top: bool,
    ) -> CalendarResult<Vec<ExpandedInstance<'_>>> {
        let mut results = Vec::new();
        for component in self.root.components_of(&ComponentKind::Vevent) {
            self.expand_component(component, period, &mut results)?;
        }
        if all_day_at_top {
            results.sort_by_key(ExpandedInstance::sort_key_allday);
        } else {
            results.sort_by_key(|instance| instance.instance_start().posix_time());
        }
        Ok(results)
    }

    fn expand_component<'a>(
        &'a self,
        component: &'a Component,
        period: &Period,
        results: &mut Vec<ExpandedInstance<'a>>,
    ) -> CalendarResult<()> {
        let is_override = component.recurrence_id().is_some();
        match component.recurrence_set() {
            Some(mut set) if !is_override => {
                let mut items = Vec::new();
                set.expand(&component.start(), period, &mut items, 0, None)?;
                let overrides: Vec<DateTime> = component
                    .uid()
                    .map(|uid| {
                        self.overridden_components(uid)
                            .iter()
                            .filter_map(|c| c.recurrence_id().cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                for item in items {
                    if overrides.contains(&item) {
                        continue;
                    }
                    results.push(ExpandedInstance::new(component, Some(item)));
                }
            }
            _ => {
                let instance = ExpandedInstance::new(component, component.recurrence_id().cloned());
                let start = instance.instance_start().clone();
                let end = instance.instance_end().clone();
                if end > *period.start() && start < period.end() {
                    results.push(instance);
                }
            }
        }
        Ok(())
    }

    /// Busy periods within `period`: non-transparent, non-cancelled,
    /// timed event instances plus FREEBUSY data, with overlaps
    /// merged.
    pub fn get_free_busy(&self, period: &Period) -> CalendarResult<Vec<FreeBusy>> {
        let mut list = Vec::new();
        for instance in self.get_vevents(period, false)? {
            if instance.instance_start().is_date_only() {
                continue;
            }
            let owner = instance.owner();
            if owner
                .load_value_string("TRANSP")
                .is_some_and(|transp| transp.eq_ignore_ascii_case("TRANSPARENT"))
            {
                continue;
            }
            let status = owner
                .load_value_string("STATUS")
                .map(str::to_ascii_uppercase);
            let fbtype = match status.as_deref() {
                Some("CANCELLED") => continue,
                Some("TENTATIVE") => FreeBusyType::BusyTentative,
                _ => FreeBusyType::Busy,
            };
            list.push(FreeBusy::new(
                fbtype,
                Period::new(
                    instance.instance_start().clone(),
                    instance.instance_end().clone(),
                ),
            ));
        }
        for component in self.root.components_of(&ComponentKind::Vfreebusy) {
            for property in component.properties_of("FREEBUSY") {
                let fbtype = FreeBusyType::from_parameter(property.parameter_value("FBTYPE"));
                let periods: Vec<Period> = match property.multi_value() {
                    Some(multi) => multi
                        .values()
                        .iter()
                        .filter_map(|value| match value {
                            Value::Period(p) => Some(p.clone()),
                            _ => None,
                        })
                        .collect(),
                    None => Vec::new(),
                };
                for p in periods {
                    if period.overlaps(&p) {
                        list.push(FreeBusy::new(fbtype, p));
                    }
                }
            }
        }
        FreeBusy::resolve_overlaps(&mut list);
        Ok(list)
    }

    /// Walk the tree producing repaired and outstanding diagnostics.
    pub fn validate(&mut self, do_fix: bool) -> (Vec<String>, Vec<String>) {
        crate::validation::validate(&mut self.root, Variant::ICalendar, do_fix)
    }
}

fn valid_calendar_property(property: &Property) -> bool {
    match property.upper_name().as_str() {
        "VERSION" => property.text_value() == Some("2.0"),
        "CALSCALE" => property
            .text_value()
            .is_some_and(|text| text.eq_ignore_ascii_case("GREGORIAN")),
        _ => true,
    }
}
