//! Properties: a named, parameterized, typed value.

use indexmap::IndexMap;

use serde_json::{json, Value as Json};

use crate::datetime::DateTime;
use crate::duration::Duration;
use crate::error::{CalendarError, CalendarResult, ErrorKind};
use crate::escape::{next_token, write_folded, decode_parameter_value};
use crate::parameter::Parameter;
use crate::parser::{ParserContext, ParserPolicy};
use crate::period::Period;
use crate::recur::Recurrence;
use crate::value::{MultiValue, Value, ValueType, Variant};
use crate::xml::XmlElement;

/// The reserved parameter that overrides the declared value type.
pub const PARAM_VALUE: &str = "VALUE";

/// The declared default value type for a property name, if the name
/// is registered.
#[must_use]
pub fn default_value_type(variant: Variant, name: &str) -> Option<ValueType> {
    match variant {
        Variant::ICalendar => icalendar_default_type(name),
        Variant::VCard => vcard_default_type(name),
    }
}

fn icalendar_default_type(name: &str) -> Option<ValueType> {
    Some(match name {
        // Calendar properties
        "CALSCALE" | "METHOD" | "PRODID" | "VERSION" => ValueType::Text,
        // Descriptive properties
        "ATTACH" => ValueType::Uri,
        "CATEGORIES" | "CLASS" | "COMMENT" | "DESCRIPTION" | "LOCATION" | "RESOURCES"
        | "STATUS" | "SUMMARY" => ValueType::Text,
        "GEO" => ValueType::Float,
        "PERCENT-COMPLETE" | "PRIORITY" => ValueType::Integer,
        // Date and time properties
        "COMPLETED" | "DTEND" | "DUE" | "DTSTART" | "RECURRENCE-ID" | "EXDATE" | "RDATE"
        | "CREATED" | "DTSTAMP" | "LAST-MODIFIED" => ValueType::DateTime,
        "DURATION" | "TRIGGER" => ValueType::Duration,
        "FREEBUSY" => ValueType::Period,
        "TRANSP" => ValueType::Text,
        // Timezone properties
        "TZID" | "TZNAME" => ValueType::Text,
        "TZOFFSETFROM" | "TZOFFSETTO" => ValueType::UtcOffset,
        "TZURL" => ValueType::Uri,
        // Relationship properties
        "ATTENDEE" | "ORGANIZER" => ValueType::CalAddress,
        "CONTACT" | "RELATED-TO" | "UID" => ValueType::Text,
        "URL" => ValueType::Uri,
        // Recurrence properties
        "RRULE" | "EXRULE" => ValueType::Recur,
        // Alarm properties
        "ACTION" | "REQUEST-STATUS" => ValueType::Text,
        "REPEAT" | "SEQUENCE" => ValueType::Integer,
        // Extensions in wide use
        "X-WR-CALNAME" | "X-WR-CALDESC" | "X-LIC-LOCATION" => ValueType::Text,
        _ => return None,
    })
}

fn vcard_default_type(name: &str) -> Option<ValueType> {
    Some(match name {
        "SOURCE" | "URL" => ValueType::Uri,
        "NAME" | "PROFILE" | "FN" | "N" | "NICKNAME" | "ADR" | "LABEL" | "TEL" | "EMAIL"
        | "MAILER" | "TITLE" | "ROLE" | "ORG" | "CATEGORIES" | "NOTE" | "PRODID"
        | "SORT-STRING" | "UID" | "VERSION" | "CLASS" => ValueType::Text,
        "PHOTO" | "LOGO" | "SOUND" | "KEY" => ValueType::Binary,
        "BDAY" => ValueType::Date,
        "REV" => ValueType::DateTime,
        "TZ" => ValueType::UtcOffset,
        "GEO" => ValueType::Float,
        _ => return None,
    })
}

/// Names whose declared type is overridden by a structured codec
/// regardless of the `VALUE` parameter.
#[must_use]
pub fn special_variant(variant: Variant, name: &str) -> Option<ValueType> {
    match (variant, name) {
        (Variant::ICalendar, "GEO") => Some(ValueType::Geo),
        (Variant::VCard, "ADR") => Some(ValueType::Adr),
        (Variant::VCard, "GEO") => Some(ValueType::Geo),
        (Variant::VCard, "N") => Some(ValueType::N),
        (Variant::VCard, "ORG") => Some(ValueType::Org),
        _ => None,
    }
}

/// Names carrying a comma separated sequence of values.
#[must_use]
pub fn is_multi_value(variant: Variant, name: &str) -> bool {
    match variant {
        Variant::ICalendar => matches!(
            name,
            "CATEGORIES" | "RESOURCES" | "EXDATE" | "RDATE" | "FREEBUSY"
        ),
        Variant::VCard => matches!(name, "NICKNAME" | "CATEGORIES"),
    }
}

/// Names that carry an explicit `VALUE` parameter even when it equals
/// the default type.
#[must_use]
pub fn always_writes_value(_variant: Variant, _name: &str) -> bool {
    false
}

/// A property: case-insensitive name, ordered parameter multimap, and
/// a typed value. vCard properties may carry a group prefix.
#[derive(Debug, Clone)]
pub struct Property {
    variant: Variant,
    group: Option<String>,
    name: String,
    parameters: IndexMap<String, Vec<Parameter>>,
    value: Option<Value>,
}

impl Property {
    /// A new iCalendar property.
    #[must_use]
    pub fn new<S: Into<String>>(name: S, value: Value) -> Self {
        let mut prop = Self {
            variant: Variant::ICalendar,
            group: None,
            name: name.into(),
            parameters: IndexMap::new(),
            value: Some(value),
        };
        prop.setup_value_parameter();
        prop
    }

    #[must_use]
    pub fn new_text<S: Into<String>, T: Into<String>>(name: S, text: T) -> Self {
        Self::new(name, Value::Text(text.into()))
    }

    /// A property with no value yet; the XML and JSON readers fill it
    /// in through [`Property::set_value`].
    pub(crate) fn new_shell(variant: Variant, name: String) -> Self {
        Self {
            variant,
            group: None,
            name,
            parameters: IndexMap::new(),
            value: None,
        }
    }

    #[must_use]
    pub fn new_vcard<S: Into<String>>(group: Option<String>, name: S, value: Value) -> Self {
        let mut prop = Self {
            variant: Variant::VCard,
            group,
            name: name.into(),
            parameters: IndexMap::new(),
            value: Some(value),
        };
        prop.setup_value_parameter();
        prop
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn upper_name(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Replace the value, re-running type determination for the
    /// `VALUE` parameter.
    pub fn set_value(&mut self, value: Value) {
        self.value = Some(value);
        self.setup_value_parameter();
        self.post_create_value();
    }

    /// Bind a `TZID` parameter to the date-time payload(s).
    fn post_create_value(&mut self) {
        if self.variant != Variant::ICalendar {
            return;
        }
        let Some(tzid) = self.parameter_value("TZID").map(str::to_owned) else {
            return;
        };
        let zone = crate::timezone::Timezone::named(tzid);
        fn bind(value: &mut Value, zone: &crate::timezone::Timezone) {
            match value {
                Value::DateTime(dt) => {
                    if !dt.zone().is_utc() {
                        dt.set_timezone(zone.clone());
                    }
                }
                Value::Period(period) => period.set_timezone(zone.clone()),
                Value::Multi(multi) => {
                    for element in multi.values_mut() {
                        bind(element, zone);
                    }
                }
                _ => {}
            }
        }
        if let Some(value) = &mut self.value {
            bind(value, &zone);
        }
    }

    // ==== typed accessors ====

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn datetime_value(&self) -> Option<&DateTime> {
        match &self.value {
            Some(Value::DateTime(dt)) => Some(dt),
            _ => None,
        }
    }

    pub fn duration_value(&self) -> Option<&Duration> {
        match &self.value {
            Some(Value::Duration(duration)) => Some(duration),
            _ => None,
        }
    }

    pub fn period_value(&self) -> Option<&Period> {
        match &self.value {
            Some(Value::Period(period)) => Some(period),
            _ => None,
        }
    }

    pub fn integer_value(&self) -> Option<i64> {
        match &self.value {
            Some(Value::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn utc_offset_value(&self) -> Option<i64> {
        match &self.value {
            Some(Value::UtcOffset(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn recurrence_value(&self) -> Option<&Recurrence> {
        match &self.value {
            Some(Value::Recur(rule)) => Some(rule),
            _ => None,
        }
    }

    pub fn multi_value(&self) -> Option<&MultiValue> {
        match &self.value {
            Some(Value::Multi(multi)) => Some(multi),
            _ => None,
        }
    }

    // ==== parameters ====

    pub fn parameters(&self) -> &IndexMap<String, Vec<Parameter>> {
        &self.parameters
    }

    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(&name.to_ascii_uppercase())
    }

    /// First value of the first parameter with this name.
    #[must_use]
    pub fn parameter_value(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_uppercase())
            .and_then(|params| params.first())
            .and_then(Parameter::first_value)
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters
            .entry(parameter.name().to_ascii_uppercase())
            .or_default()
            .push(parameter);
    }

    pub fn replace_parameter(&mut self, parameter: Parameter) {
        self.parameters
            .insert(parameter.name().to_ascii_uppercase(), vec![parameter]);
    }

    pub fn remove_parameters(&mut self, name: &str) {
        self.parameters.shift_remove(&name.to_ascii_uppercase());
    }

    // ==== type determination ====

    fn declared_default(&self) -> Option<ValueType> {
        default_value_type(self.variant, &self.upper_name())
    }

    /// The type the value text parses as: declared default, `VALUE`
    /// override, then special structured variants.
    #[must_use]
    pub fn determine_value_type(&self) -> ValueType {
        let default = self.declared_default().unwrap_or(ValueType::Unknown);
        let mut vtype = default;
        if let Some(override_name) = self.parameter_value(PARAM_VALUE) {
            if let Some(explicit) = ValueType::from_type_name(&override_name.to_ascii_uppercase()) {
                vtype = explicit;
            }
        }
        if let Some(special) = special_variant(self.variant, &self.upper_name()) {
            if vtype == default {
                vtype = special;
            }
        }
        vtype
    }

    /// Synchronize the `VALUE` parameter with the actual value type:
    /// drop it when redundant, write it when it differs from the
    /// declared default.
    fn setup_value_parameter(&mut self) {
        self.parameters.shift_remove(PARAM_VALUE);
        let Some(value) = &self.value else { return };
        let default = self.declared_default();
        let actual = if special_variant(self.variant, &self.upper_name()).is_some() {
            default.unwrap_or(ValueType::Text)
        } else {
            value.value_type()
        };
        let needs_parameter = default != Some(actual)
            || always_writes_value(self.variant, &self.upper_name());
        if needs_parameter
            && actual != ValueType::Unknown
            && (default.is_some() || actual != ValueType::Text)
        {
            self.parameters.insert(
                PARAM_VALUE.to_owned(),
                vec![Parameter::new(PARAM_VALUE, actual.type_name())],
            );
        }
    }

    // ==== text form ====

    pub fn parse_text(data: &str, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        Self::parse_text_impl(data, variant, ctx)
            .map_err(|e| e.escalate(ErrorKind::InvalidProperty).with_data(data))
    }

    fn parse_text_impl(data: &str, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        let (name_token, mut rest) = next_token(data, ";:")
            .filter(|(token, _)| !token.is_empty())
            .ok_or_else(|| CalendarError::invalid_property().with_message("empty property name"))?;

        let mut prop = Self {
            variant,
            group: None,
            name: name_token.to_owned(),
            parameters: IndexMap::new(),
            value: None,
        };
        if variant == Variant::VCard {
            if let Some((group, name)) = name_token.split_once('.') {
                prop.group = Some(group.to_owned());
                prop.name = name.to_owned();
            }
        }

        loop {
            match rest.as_bytes().first() {
                Some(b';') => {
                    rest = prop.parse_parameter(&rest[1..], variant, ctx)?;
                }
                Some(b':') => {
                    rest = &rest[1..];
                    break;
                }
                _ => {
                    return Err(CalendarError::invalid_property()
                        .with_message("missing value separator"))
                }
            }
        }

        let vtype = prop.determine_value_type();
        let value = if is_multi_value(variant, &prop.upper_name()) {
            Value::Multi(MultiValue::parse(vtype, rest, variant, ctx)?)
        } else {
            Value::parse(vtype, rest, variant, ctx)?
        };
        // Re-running type determination canonicalises the VALUE
        // parameter (a redundant one is dropped).
        prop.set_value(value);
        Ok(prop)
    }

    fn parse_parameter<'a>(
        &mut self,
        text: &'a str,
        variant: Variant,
        ctx: &ParserContext,
    ) -> CalendarResult<&'a str> {
        let delims = if variant == Variant::VCard { "=:;" } else { "=" };
        let (name, mut rest) = next_token(text, delims)
            .filter(|(token, _)| !token.is_empty())
            .ok_or_else(|| CalendarError::invalid_property().with_message("empty parameter name"))?;

        if rest.as_bytes().first() != Some(&b'=') {
            if self.variant == Variant::ICalendar {
                return Err(
                    CalendarError::invalid_property().with_message("parameter missing '='")
                );
            }
            // vCard 2.1 allows bare parameter names.
            return match ctx.vcard_2_no_parameter_values {
                ParserPolicy::Raise => {
                    Err(CalendarError::invalid_property().with_message("parameter without value"))
                }
                ParserPolicy::Fix
                    if name.eq_ignore_ascii_case("BASE64")
                        && ctx.base64_parameter_synonym == ParserPolicy::Fix =>
                {
                    self.add_parameter(Parameter::new("ENCODING", "B"));
                    Ok(rest)
                }
                ParserPolicy::Allow => {
                    self.add_parameter(Parameter::new_empty(name));
                    Ok(rest)
                }
                _ => Ok(rest),
            };
        }
        rest = &rest[1..];
        let (value, mut rest) = next_token(rest, ":;,").ok_or_else(|| {
            CalendarError::invalid_property().with_message("unterminated parameter value")
        })?;
        let mut parameter = Parameter::new(name, decode_parameter_value(value));
        while rest.as_bytes().first() == Some(&b',') {
            let (value, after) = next_token(&rest[1..], ":;,").ok_or_else(|| {
                CalendarError::invalid_property().with_message("unterminated parameter value")
            })?;
            parameter.add_value(decode_parameter_value(value));
            rest = after;
        }
        self.add_parameter(parameter);
        Ok(rest)
    }

    /// Emit the folded text form including the trailing CRLF.
    pub fn generate(&self, out: &mut String) {
        self.generate_value(out, false);
    }

    pub(crate) fn generate_value(&self, out: &mut String, no_value: bool) {
        let mut line = String::new();
        if let Some(group) = &self.group {
            line.push_str(group);
            line.push('.');
        }
        line.push_str(&self.name);
        let mut keys: Vec<&String> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            for parameter in &self.parameters[key] {
                line.push(';');
                parameter.generate(&mut line);
            }
        }
        line.push(':');
        if !no_value {
            if let Some(value) = &self.value {
                value.generate(&mut line, self.variant);
            }
        }
        write_folded(&line, out);
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }

    // ==== XML form ====

    pub fn write_xml(&self, parent: &mut XmlElement) {
        let element = parent.sub_element(self.name.to_ascii_lowercase());
        let visible: Vec<&Parameter> = {
            let mut keys: Vec<&String> = self.parameters.keys().collect();
            keys.sort();
            keys.iter()
                .flat_map(|key| self.parameters[*key].iter())
                .filter(|parameter| !parameter.name().eq_ignore_ascii_case(PARAM_VALUE))
                .collect()
        };
        if !visible.is_empty() {
            let params = element.sub_element("parameters");
            for parameter in visible {
                parameter.write_xml(params);
            }
        }
        if let Some(value) = &self.value {
            value.write_xml(element);
        }
    }

    // ==== JSON form ====

    /// The four-or-more element jCal/jCard array for this property.
    #[must_use]
    pub fn json_value(&self) -> Json {
        let mut parameters = serde_json::Map::new();
        let mut keys: Vec<&String> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            for parameter in &self.parameters[key] {
                if !parameter.name().eq_ignore_ascii_case(PARAM_VALUE) {
                    parameter.json_insert(&mut parameters);
                }
            }
        }
        if let Some(group) = &self.group {
            parameters.insert("group".into(), json!(group.to_ascii_lowercase()));
        }
        let vtype = self
            .value
            .as_ref()
            .map_or(ValueType::Unknown, Value::value_type);
        let mut array = vec![
            json!(self.name.to_ascii_lowercase()),
            Json::Object(parameters),
            json!(vtype.xml_name()),
        ];
        if let Some(value) = &self.value {
            value.json_append(&mut array);
        }
        Json::Array(array)
    }

    pub fn parse_json(data: &Json, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        Self::parse_json_impl(data, variant, ctx)
            .map_err(|e| e.escalate(ErrorKind::InvalidProperty).with_data(data.to_string()))
    }

    fn parse_json_impl(data: &Json, variant: Variant, ctx: &ParserContext) -> CalendarResult<Self> {
        let array = data.as_array().ok_or_else(|| {
            CalendarError::invalid_property().with_message("property must be a JSON array")
        })?;
        if array.len() < 4 {
            return Err(CalendarError::invalid_property()
                .with_message("property array needs name, parameters, type and value"));
        }
        let name = array[0]
            .as_str()
            .ok_or_else(|| CalendarError::invalid_property().with_message("bad property name"))?
            .to_ascii_uppercase();
        let mut prop = Self {
            variant,
            group: None,
            name,
            parameters: IndexMap::new(),
            value: None,
        };
        if let Some(parameters) = array[1].as_object() {
            for (pname, pvalue) in parameters {
                if pname.eq_ignore_ascii_case("group") {
                    prop.group = pvalue.as_str().map(str::to_owned);
                    continue;
                }
                let mut parameter = Parameter::new_empty(pname.to_ascii_uppercase());
                match pvalue {
                    Json::String(s) => parameter.add_value(s.clone()),
                    Json::Array(values) => {
                        for value in values {
                            parameter.add_value(value.as_str().unwrap_or_default());
                        }
                    }
                    other => parameter.add_value(other.to_string()),
                }
                prop.add_parameter(parameter);
            }
        }
        let type_name = array[2]
            .as_str()
            .ok_or_else(|| CalendarError::invalid_property().with_message("bad value type"))?;
        let stated = ValueType::from_xml_name(type_name).unwrap_or(ValueType::Unknown);
        let default = prop.declared_default().unwrap_or(ValueType::Unknown);
        if stated != default {
            prop.add_parameter(Parameter::new(PARAM_VALUE, stated.type_name()));
        }
        let vtype = prop.determine_value_type();
        let values = &array[3..];
        let value = if is_multi_value(variant, &prop.upper_name()) {
            Value::Multi(MultiValue::parse_json(vtype, values, variant, ctx)?)
        } else {
            Value::parse_json(vtype, &values[0], variant, ctx)?
        };
        prop.set_value(value);
        Ok(prop)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        if !self.name.eq_ignore_ascii_case(&other.name)
            || self.group != other.group
            || self.value != other.value
        {
            return false;
        }
        // Parameter buckets compare order-insensitively by name, with
        // order-sensitive values inside each parameter.
        if self.parameters.len() != other.parameters.len() {
            return false;
        }
        self.parameters
            .iter()
            .all(|(key, params)| other.parameters.get(key) == Some(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParserContext {
        ParserContext::lenient()
    }

    fn parse(line: &str) -> Property {
        Property::parse_text(line, Variant::ICalendar, &ctx()).unwrap()
    }

    #[test]
    fn basic_property_round_trip() {
        let prop = parse("SUMMARY:Board meeting");
        assert_eq!(prop.upper_name(), "SUMMARY");
        assert_eq!(prop.text_value(), Some("Board meeting"));
        assert_eq!(prop.to_text(), "SUMMARY:Board meeting\r\n");
    }

    #[test]
    fn parameters_parse_with_quoting() {
        let prop = parse("ATTENDEE;CN=\"Doe; John\";ROLE=CHAIR:mailto:john@example.com");
        assert_eq!(prop.parameter_value("CN"), Some("Doe; John"));
        assert_eq!(prop.parameter_value("ROLE"), Some("CHAIR"));
        assert_eq!(
            prop.to_text(),
            "ATTENDEE;CN=\"Doe; John\";ROLE=CHAIR:mailto:john@example.com\r\n"
        );
    }

    #[test]
    fn value_parameter_overrides_type() {
        let prop = parse("DTSTART;VALUE=DATE:20240310");
        let dt = prop.datetime_value().unwrap();
        assert!(dt.is_date_only());
        // The VALUE parameter is not redundant here, so it survives.
        assert_eq!(prop.to_text(), "DTSTART;VALUE=DATE:20240310\r\n");
    }

    #[test]
    fn redundant_value_parameter_is_dropped() {
        let prop = parse("DTSTART;VALUE=DATE-TIME:20240310T013000Z");
        assert_eq!(prop.to_text(), "DTSTART:20240310T013000Z\r\n");
    }

    #[test]
    fn tzid_parameter_binds_zone() {
        let prop = parse("DTSTART;TZID=America/New_York:20240310T013000");
        assert_eq!(prop.parameter_value("TZID"), Some("America/New_York"));
    }

    #[test]
    fn multi_valued_names() {
        let prop = parse("EXDATE:20240102T090000Z,20240103T090000Z");
        let multi = prop.multi_value().unwrap();
        assert_eq!(multi.values().len(), 2);
        assert_eq!(
            prop.to_text(),
            "EXDATE:20240102T090000Z,20240103T090000Z\r\n"
        );
    }

    #[test]
    fn unknown_property_is_opaque() {
        let prop = parse("X-CUSTOM:anything;goes,here");
        assert_eq!(prop.to_text(), "X-CUSTOM:anything;goes,here\r\n");
    }

    #[test]
    fn geo_special_variant() {
        let prop = parse("GEO:37.386013;-122.082932");
        assert!(matches!(prop.value(), Some(Value::Geo { .. })));
        assert_eq!(prop.to_text(), "GEO:37.386013;-122.082932\r\n");
    }

    #[test]
    fn long_lines_fold() {
        let text = "x".repeat(200);
        let prop = Property::new_text("DESCRIPTION", text);
        let out = prop.to_text();
        for physical in out.split("\r\n") {
            assert!(physical.len() <= 75);
        }
    }

    #[test]
    fn vcard_group_prefix() {
        let prop =
            Property::parse_text("item1.EMAIL:jdoe@example.com", Variant::VCard, &ctx()).unwrap();
        assert_eq!(prop.group(), Some("item1"));
        assert_eq!(prop.upper_name(), "EMAIL");
        assert_eq!(prop.to_text(), "item1.EMAIL:jdoe@example.com\r\n");
    }

    #[test]
    fn vcard_bare_parameter_policies() {
        let strict = ParserContext::strict();
        assert!(Property::parse_text("TEL;HOME:+1-555-0100", Variant::VCard, &strict).is_err());

        let mut allow = ParserContext::lenient();
        allow.vcard_2_no_parameter_values = ParserPolicy::Allow;
        let prop = Property::parse_text("TEL;HOME:+1-555-0100", Variant::VCard, &allow).unwrap();
        assert!(prop.has_parameter("HOME"));
    }

    #[test]
    fn rrule_value_round_trip() {
        let prop = parse("RRULE:FREQ=MONTHLY;BYDAY=-1FR");
        assert!(prop.recurrence_value().is_some());
        assert_eq!(prop.to_text(), "RRULE:FREQ=MONTHLY;BYDAY=-1FR\r\n");
    }

    #[test]
    fn property_equality() {
        let a = parse("SUMMARY;LANGUAGE=en:Hello");
        let b = parse("summary;language=en:Hello");
        assert_eq!(a, b);
        let c = parse("SUMMARY:Hello");
        assert_ne!(a, c);
    }

    #[test]
    fn json_round_trip() {
        let _guard = crate::tzdb::test_lock();
        for line in [
            "SUMMARY:Board meeting",
            "DTSTART;TZID=America/New_York:20240310T013000",
            "RRULE:FREQ=DAILY;COUNT=3",
            "EXDATE:20240102T090000Z,20240103T090000Z",
            "PERCENT-COMPLETE:45",
        ] {
            let prop = parse(line);
            let json = prop.json_value();
            let back = Property::parse_json(&json, Variant::ICalendar, &ctx()).unwrap();
            assert_eq!(prop, back, "json round trip failed for {line}");
        }
    }
}
