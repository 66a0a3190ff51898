//! The recursive component tree.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::{json, Value as Json};

use crate::datetime::DateTime;
use crate::duration::Duration;
use crate::error::{CalendarError, CalendarResult, ErrorKind};
use crate::parser::ParserContext;
use crate::property::Property;
use crate::recur::RecurrenceSet;
use crate::value::{Value, Variant};
use crate::xml::XmlElement;

/// The set of known component types plus an opaque fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Vcalendar,
    Vevent,
    Vtodo,
    Vjournal,
    Vfreebusy,
    Vtimezone,
    Standard,
    Daylight,
    Valarm,
    Vavailability,
    Available,
    Vcard,
    Unknown(String),
}

impl ComponentKind {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "VCALENDAR" => Self::Vcalendar,
            "VEVENT" => Self::Vevent,
            "VTODO" => Self::Vtodo,
            "VJOURNAL" => Self::Vjournal,
            "VFREEBUSY" => Self::Vfreebusy,
            "VTIMEZONE" => Self::Vtimezone,
            "STANDARD" => Self::Standard,
            "DAYLIGHT" => Self::Daylight,
            "VALARM" => Self::Valarm,
            "VAVAILABILITY" => Self::Vavailability,
            "AVAILABLE" => Self::Available,
            "VCARD" => Self::Vcard,
            other => Self::Unknown(other.to_owned()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Vcalendar => "VCALENDAR",
            Self::Vevent => "VEVENT",
            Self::Vtodo => "VTODO",
            Self::Vjournal => "VJOURNAL",
            Self::Vfreebusy => "VFREEBUSY",
            Self::Vtimezone => "VTIMEZONE",
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
            Self::Valarm => "VALARM",
            Self::Vavailability => "VAVAILABILITY",
            Self::Available => "AVAILABLE",
            Self::Vcard => "VCARD",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this kind binds DTSTART and a recurrence set.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            Self::Vevent | Self::Vtodo | Self::Vjournal | Self::Available
        )
    }

    /// Properties that must appear exactly once.
    #[must_use]
    pub fn cardinality_1(&self) -> &'static [&'static str] {
        match self {
            Self::Vcalendar => &["PRODID", "VERSION"],
            Self::Vevent | Self::Vtodo | Self::Vjournal | Self::Vfreebusy | Self::Vavailability => {
                &["DTSTAMP", "UID"]
            }
            Self::Vtimezone => &["TZID"],
            Self::Standard | Self::Daylight => &["DTSTART", "TZOFFSETTO", "TZOFFSETFROM"],
            Self::Valarm => &["ACTION", "TRIGGER"],
            Self::Available => &["DTSTART"],
            Self::Vcard => &["VERSION", "N"],
            Self::Unknown(_) => &[],
        }
    }

    /// Properties that must appear exactly once, repairable by
    /// inserting an empty value.
    #[must_use]
    pub fn cardinality_1_fix_empty(&self) -> &'static [&'static str] {
        match self {
            Self::Available => &["DTSTAMP", "UID"],
            _ => &[],
        }
    }

    /// Properties that may appear at most once.
    #[must_use]
    pub fn cardinality_0_1(&self) -> &'static [&'static str] {
        match self {
            Self::Vcalendar => &["CALSCALE", "METHOD"],
            Self::Vevent => &[
                "CLASS",
                "CREATED",
                "DESCRIPTION",
                "GEO",
                "LAST-MODIFIED",
                "LOCATION",
                "ORGANIZER",
                "PRIORITY",
                "SEQUENCE",
                "SUMMARY",
                "TRANSP",
                "URL",
                "RECURRENCE-ID",
                "RRULE",
                "DTEND",
                "DURATION",
            ],
            Self::Vtodo => &[
                "CLASS",
                "COMPLETED",
                "CREATED",
                "DESCRIPTION",
                "DTSTART",
                "GEO",
                "LAST-MODIFIED",
                "LOCATION",
                "ORGANIZER",
                "PERCENT-COMPLETE",
                "PRIORITY",
                "RECURRENCE-ID",
                "SEQUENCE",
                "SUMMARY",
                "URL",
                "RRULE",
                "DUE",
                "DURATION",
            ],
            Self::Vjournal => &[
                "CLASS",
                "CREATED",
                "DTSTART",
                "LAST-MODIFIED",
                "ORGANIZER",
                "RECURRENCE-ID",
                "SEQUENCE",
                "SUMMARY",
                "URL",
                "RRULE",
            ],
            Self::Vfreebusy => &["CONTACT", "DTSTART", "DTEND", "ORGANIZER", "URL"],
            Self::Vtimezone => &["LAST-MODIFIED", "TZURL"],
            Self::Standard | Self::Daylight => &["RRULE"],
            Self::Valarm => &["DURATION", "REPEAT"],
            Self::Vavailability => &[
                "BUSYTYPE",
                "CLASS",
                "CREATED",
                "DESCRIPTION",
                "DTSTART",
                "LAST-MODIFIED",
                "ORGANIZER",
                "SEQUENCE",
                "SUMMARY",
                "URL",
                "RECURRENCE-ID",
                "DTEND",
                "DURATION",
            ],
            Self::Available => &[
                "CREATED",
                "DESCRIPTION",
                "LAST-MODIFIED",
                "RECURRENCE-ID",
                "RRULE",
                "SUMMARY",
                "DTEND",
                "DURATION",
            ],
            Self::Vcard => &["BDAY", "PRODID", "REV", "UID"],
            Self::Unknown(_) => &[],
        }
    }

    /// Properties that must appear at least once.
    #[must_use]
    pub fn cardinality_1_more(&self) -> &'static [&'static str] {
        match self {
            Self::Vcard => &["FN"],
            _ => &[],
        }
    }

    /// Kinds where duplicate STATUS properties are repaired by keeping
    /// a CANCELLED one.
    #[must_use]
    pub fn status_fix(&self) -> bool {
        matches!(self, Self::Vevent | Self::Vtodo | Self::Vjournal)
    }

    /// Emission order of the leading property names; the remainder
    /// sorts case-insensitively after these.
    #[must_use]
    pub fn sorted_property_order(&self) -> &'static [&'static str] {
        match self {
            Self::Vcalendar => &["VERSION", "CALSCALE", "METHOD", "PRODID"],
            Self::Vevent => &["UID", "RECURRENCE-ID", "DTSTART", "DURATION", "DTEND"],
            Self::Vtodo => &["UID", "RECURRENCE-ID", "DTSTART", "DURATION", "DUE", "COMPLETED"],
            Self::Vfreebusy => &["UID", "DTSTART", "DURATION", "DTEND"],
            Self::Vtimezone => &["TZID", "LAST-MODIFIED", "TZURL"],
            Self::Vcard => &["VERSION", "PRODID", "UID"],
            _ => &[],
        }
    }

    /// Emission order of the leading sub-component types.
    #[must_use]
    pub fn sorted_component_names(&self) -> &'static [&'static str] {
        match self {
            Self::Vcalendar => &[
                "VTIMEZONE",
                "VEVENT",
                "VTODO",
                "VJOURNAL",
                "VFREEBUSY",
                "VAVAILABILITY",
            ],
            _ => &[],
        }
    }

    /// VTIMEZONE preserves the insertion order of its regimes.
    #[must_use]
    pub fn sort_subcomponents(&self) -> bool {
        !matches!(self, Self::Vtimezone)
    }
}

/// A component: a property multimap preserving insertion order within
/// each name, and an ordered list of sub-components.
#[derive(Debug, Clone)]
pub struct Component {
    kind: ComponentKind,
    properties: IndexMap<String, Vec<Property>>,
    children: Vec<Component>,
}

impl Component {
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.kind.name()
    }

    #[must_use]
    pub fn begin_delimiter(&self) -> String {
        format!("BEGIN:{}", self.type_name())
    }

    #[must_use]
    pub fn end_delimiter(&self) -> String {
        format!("END:{}", self.type_name())
    }

    // ==== properties ====

    pub fn properties(&self) -> &IndexMap<String, Vec<Property>> {
        &self.properties
    }

    #[must_use]
    pub fn properties_of(&self, name: &str) -> &[Property] {
        self.properties
            .get(&name.to_ascii_uppercase())
            .map_or(&[], Vec::as_slice)
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties
            .entry(property.upper_name())
            .or_default()
            .push(property);
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.count_property(name) != 0
    }

    #[must_use]
    pub fn count_property(&self, name: &str) -> usize {
        self.properties_of(name).len()
    }

    #[must_use]
    pub fn first_property(&self, name: &str) -> Option<&Property> {
        self.properties_of(name).first()
    }

    pub fn properties_of_mut(&mut self, name: &str) -> Option<&mut Vec<Property>> {
        self.properties.get_mut(&name.to_ascii_uppercase())
    }

    pub fn remove_properties(&mut self, name: &str) {
        self.properties.shift_remove(&name.to_ascii_uppercase());
    }

    // ==== sub-components ====

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Component> {
        &mut self.children
    }

    pub fn add_component(&mut self, component: Component) {
        self.children.push(component);
    }

    #[must_use]
    pub fn components_of(&self, kind: &ComponentKind) -> Vec<&Component> {
        self.children.iter().filter(|c| c.kind() == kind).collect()
    }

    // ==== typed loads ====

    #[must_use]
    pub fn load_value_string(&self, name: &str) -> Option<&str> {
        self.first_property(name).and_then(Property::text_value)
    }

    #[must_use]
    pub fn load_value_datetime(&self, name: &str) -> Option<&DateTime> {
        self.first_property(name).and_then(Property::datetime_value)
    }

    #[must_use]
    pub fn load_value_duration(&self, name: &str) -> Option<&Duration> {
        self.first_property(name).and_then(Property::duration_value)
    }

    #[must_use]
    pub fn load_value_integer(&self, name: &str) -> Option<i64> {
        self.first_property(name).and_then(Property::integer_value)
    }

    #[must_use]
    pub fn load_value_utc_offset(&self, name: &str) -> Option<i64> {
        self.first_property(name).and_then(Property::utc_offset_value)
    }

    /// Collect all RRULE-style properties under `name` into a
    /// recurrence set.
    pub fn load_value_rrule(&self, name: &str, set: &mut RecurrenceSet, add: bool) {
        for property in self.properties_of(name) {
            if let Some(rule) = property.recurrence_value() {
                if add {
                    set.add_rule(rule.clone());
                } else {
                    set.subtract_rule(rule.clone());
                }
            }
        }
    }

    /// Collect all RDATE-style properties under `name` into a
    /// recurrence set. Periods contribute their start instant.
    pub fn load_value_rdate(&self, name: &str, set: &mut RecurrenceSet, add: bool) {
        for property in self.properties_of(name) {
            let Some(multi) = property.multi_value() else {
                continue;
            };
            for value in multi.values() {
                match value {
                    Value::DateTime(dt) => {
                        if add {
                            set.add_date(dt.clone());
                        } else {
                            set.subtract_date(dt.clone());
                        }
                    }
                    Value::Period(period) => {
                        if add {
                            set.add_period(period.clone());
                        } else {
                            set.subtract_period(period.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// The bound recurrence set of a recurring component, or `None`
    /// when it carries no recurrence properties.
    #[must_use]
    pub fn recurrence_set(&self) -> Option<RecurrenceSet> {
        if !self.has_property("RRULE")
            && !self.has_property("RDATE")
            && !self.has_property("EXRULE")
            && !self.has_property("EXDATE")
        {
            return None;
        }
        let mut set = RecurrenceSet::new();
        self.load_value_rrule("RRULE", &mut set, true);
        self.load_value_rdate("RDATE", &mut set, true);
        self.load_value_rrule("EXRULE", &mut set, false);
        self.load_value_rdate("EXDATE", &mut set, false);
        Some(set)
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.load_value_string("UID")
    }

    #[must_use]
    pub fn recurrence_id(&self) -> Option<&DateTime> {
        self.load_value_datetime("RECURRENCE-ID")
    }

    /// DTSTART, defaulting to the epoch when absent.
    #[must_use]
    pub fn start(&self) -> DateTime {
        self.load_value_datetime("DTSTART")
            .cloned()
            .unwrap_or_default()
    }

    /// The effective end: DTEND/DUE, else DTSTART + DURATION, else
    /// the day boundary convention for date-only starts.
    #[must_use]
    pub fn end(&self) -> DateTime {
        let end_name = if self.kind == ComponentKind::Vtodo {
            "DUE"
        } else {
            "DTEND"
        };
        let start = self.start();
        let end = if let Some(end) = self.load_value_datetime(end_name) {
            end.clone()
        } else if let Some(duration) = self.load_value_duration("DURATION") {
            &start + duration
        } else {
            start.clone()
        };
        if end <= start {
            // Degenerate range: extend to the next day boundary.
            let mut end = start.clone();
            end.offset_day(1);
            if !start.is_date_only() {
                end.set_hhmmss(0, 0, 0);
            }
            return end;
        }
        end
    }

    #[must_use]
    pub fn uses_duration(&self) -> bool {
        self.has_property("DURATION")
    }

    /// Collect every TZID referenced by date-time values or TZID
    /// parameters in this subtree.
    pub fn get_timezones(&self, tzids: &mut BTreeSet<String>) {
        for properties in self.properties.values() {
            for property in properties {
                if let Some(tzid) = property.parameter_value("TZID") {
                    tzids.insert(tzid.to_owned());
                }
                if let Some(dt) = property.datetime_value() {
                    if let Some(tzid) = dt.zone().tzid() {
                        tzids.insert(tzid.to_owned());
                    }
                }
            }
        }
        for child in &self.children {
            child.get_timezones(tzids);
        }
    }

    /// Kind-specific normalization applied when the closing delimiter
    /// is read: a VTIMEZONE orders its regimes by onset.
    pub fn finalise(&mut self) {
        if self.kind == ComponentKind::Vtimezone {
            self.children.sort_by_key(Component::start);
        }
    }

    // ==== emission ====

    /// Leading names from the kind's declared order, remainder sorted
    /// case-insensitively.
    #[must_use]
    pub fn sorted_property_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.properties.keys().cloned().collect();
        keys.sort();
        let mut result = Vec::with_capacity(keys.len());
        for leading in self.kind.sorted_property_order() {
            if let Some(idx) = keys.iter().position(|k| k == leading) {
                result.push(keys.remove(idx));
            }
        }
        result.extend(keys);
        result
    }

    #[must_use]
    pub fn sorted_components(&self) -> Vec<&Component> {
        let mut remaining: Vec<&Component> = self.children.iter().collect();
        let mut result = Vec::with_capacity(remaining.len());
        for name in self.kind.sorted_component_names() {
            let mut named: Vec<&Component> = Vec::new();
            remaining.retain(|component| {
                if component.type_name() == *name {
                    named.push(component);
                    false
                } else {
                    true
                }
            });
            named.sort_by_key(|component| component.sort_key());
            result.extend(named);
        }
        if self.kind.sort_subcomponents() {
            remaining.sort_by_key(|component| (component.type_name().to_owned(), component.sort_key()));
        }
        result.extend(remaining);
        result
    }

    fn sort_key(&self) -> String {
        if self.kind == ComponentKind::Vtimezone {
            self.load_value_string("TZID").unwrap_or_default().to_owned()
        } else {
            self.uid().unwrap_or_default().to_owned()
        }
    }

    pub fn generate(&self, out: &mut String) {
        out.push_str(&self.begin_delimiter());
        out.push_str("\r\n");
        for key in self.sorted_property_keys() {
            for property in &self.properties[&key] {
                property.generate(out);
            }
        }
        for component in self.sorted_components() {
            component.generate(out);
        }
        out.push_str(&self.end_delimiter());
        out.push_str("\r\n");
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }

    // ==== XML form ====

    pub fn write_xml(&self, parent: &mut XmlElement) {
        let element = parent.sub_element(self.type_name().to_ascii_lowercase());
        if !self.properties.is_empty() {
            let properties = element.sub_element("properties");
            for key in self.sorted_property_keys() {
                for property in &self.properties[&key] {
                    property.write_xml(properties);
                }
            }
        }
        if !self.children.is_empty() {
            let components = element.sub_element("components");
            for component in self.sorted_components() {
                component.write_xml(components);
            }
        }
    }

    // ==== JSON form ====

    /// The three-element jCal array.
    #[must_use]
    pub fn json_value(&self) -> Json {
        let mut properties = Vec::new();
        for key in self.sorted_property_keys() {
            for property in &self.properties[&key] {
                properties.push(property.json_value());
            }
        }
        let components: Vec<Json> = self
            .sorted_components()
            .iter()
            .map(|component| component.json_value())
            .collect();
        json!([
            self.type_name().to_ascii_lowercase(),
            properties,
            components
        ])
    }

    pub fn parse_json(data: &Json, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        Self::parse_json_impl(data, variant, ctx).map_err(|e| e.escalate(ErrorKind::InvalidComponent))
    }

    fn parse_json_impl(data: &Json, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        let array = data.as_array().filter(|a| a.len() == 3).ok_or_else(|| {
            CalendarError::invalid_component()
                .with_message("component must be a three element JSON array")
        })?;
        let name = array[0].as_str().ok_or_else(|| {
            CalendarError::invalid_component().with_message("bad component name")
        })?;
        let mut component = Component::new(ComponentKind::from_name(name));
        let properties = array[1].as_array().ok_or_else(|| {
            CalendarError::invalid_component().with_message("component properties must be an array")
        })?;
        for property in properties {
            component.add_property(Property::parse_json(property, variant, ctx)?);
        }
        let children = array[2].as_array().ok_or_else(|| {
            CalendarError::invalid_component().with_message("component children must be an array")
        })?;
        for child in children {
            component.add_component(Self::parse_json_impl(child, variant, ctx)?);
        }
        component.finalise();
        Ok(component)
    }

    /// Structural equality: same kind, property multiset and
    /// sub-component multiset.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        let mine: Vec<&Property> = self.properties.values().flatten().collect();
        let mut theirs: Vec<&Property> = other.properties.values().flatten().collect();
        if mine.len() != theirs.len() {
            return false;
        }
        for property in mine {
            match theirs.iter().position(|p| *p == property) {
                Some(idx) => {
                    theirs.swap_remove(idx);
                }
                None => return false,
            }
        }
        let mut other_children: Vec<&Component> = other.children.iter().collect();
        for child in &self.children {
            match other_children.iter().position(|c| child.same_as(c)) {
                Some(idx) => {
                    other_children.swap_remove(idx);
                }
                None => return false,
            }
        }
        other_children.is_empty()
    }
}
