//! Typed property values and their three textual renditions.

mod structured;

pub use structured::{Adr, NameValue};

use std::fmt::Write;

use serde_json::{json, Value as Json};

use crate::datetime::DateTime;
use crate::duration::Duration;
use crate::error::{CalendarError, CalendarResult};
use crate::escape::{decode_text, escape_text, generate_text_list, parse_text_list};
use crate::parser::{ParserContext, ParserPolicy};
use crate::period::Period;
use crate::recur::Recurrence;
use crate::xml::XmlElement;

/// Which container dialect a value is being read or written for. The
/// dialects differ in UTC offset syntax, ISO date punctuation and a
/// handful of escaping policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    ICalendar,
    VCard,
}

impl Variant {
    pub(crate) fn full_iso(self) -> bool {
        matches!(self, Self::VCard)
    }
}

/// The registry tag of a value codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ValueType {
    Binary,
    Boolean,
    CalAddress,
    Date,
    DateTime,
    Duration,
    Float,
    Geo,
    Integer,
    Period,
    Recur,
    Text,
    Time,
    Uri,
    UtcOffset,
    Adr,
    N,
    Org,
    Unknown,
}

impl ValueType {
    /// The `VALUE` parameter spelling for this type. Structured types
    /// answer TEXT, matching their declared type.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Boolean => "BOOLEAN",
            Self::CalAddress => "CAL-ADDRESS",
            Self::Date => "DATE",
            Self::DateTime => "DATE-TIME",
            Self::Duration => "DURATION",
            Self::Float | Self::Geo => "FLOAT",
            Self::Integer => "INTEGER",
            Self::Period => "PERIOD",
            Self::Recur => "RECUR",
            Self::Text | Self::Adr | Self::N | Self::Org => "TEXT",
            Self::Time => "TIME",
            Self::Uri => "URI",
            Self::UtcOffset => "UTC-OFFSET",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "BINARY" => Some(Self::Binary),
            "BOOLEAN" => Some(Self::Boolean),
            "CAL-ADDRESS" => Some(Self::CalAddress),
            "DATE" => Some(Self::Date),
            "DATE-TIME" => Some(Self::DateTime),
            "DURATION" => Some(Self::Duration),
            "FLOAT" => Some(Self::Float),
            "INTEGER" => Some(Self::Integer),
            "PERIOD" => Some(Self::Period),
            "RECUR" => Some(Self::Recur),
            "TEXT" => Some(Self::Text),
            "TIME" => Some(Self::Time),
            "URI" => Some(Self::Uri),
            "UTC-OFFSET" => Some(Self::UtcOffset),
            _ => None,
        }
    }

    /// The element name used in the XML rendition.
    #[must_use]
    pub fn xml_name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::CalAddress => "cal-address",
            Self::Date => "date",
            Self::DateTime => "date-time",
            Self::Duration => "duration",
            Self::Float | Self::Geo => "float",
            Self::Integer => "integer",
            Self::Period => "period",
            Self::Recur => "recur",
            Self::Text | Self::Adr | Self::N | Self::Org => "text",
            Self::Time => "time",
            Self::Uri => "uri",
            Self::UtcOffset => "utc-offset",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_xml_name(name: &str) -> Option<Self> {
        match name {
            "binary" => Some(Self::Binary),
            "boolean" => Some(Self::Boolean),
            "cal-address" => Some(Self::CalAddress),
            "date" => Some(Self::Date),
            "date-time" => Some(Self::DateTime),
            "duration" => Some(Self::Duration),
            "float" => Some(Self::Float),
            "integer" => Some(Self::Integer),
            "period" => Some(Self::Period),
            "recur" => Some(Self::Recur),
            "text" => Some(Self::Text),
            "time" => Some(Self::Time),
            "uri" => Some(Self::Uri),
            "utc-offset" => Some(Self::UtcOffset),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A typed scalar value. Each variant implements text parse/generate,
/// the XML rendition and the JSON rendition.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Binary(String),
    Boolean(bool),
    CalAddress(String),
    DateTime(DateTime),
    Duration(Duration),
    Float(f64),
    Geo { latitude: f64, longitude: f64 },
    Integer(i64),
    Multi(MultiValue),
    Period(Period),
    Recur(Recurrence),
    Text(String),
    Uri(String),
    UtcOffset(i64),
    Adr(Adr),
    N(NameValue),
    Org(Vec<String>),
    /// Opaque passthrough, keyed by the declared type.
    Unknown(ValueType, String),
}

impl Value {
    /// The registry tag this value answers for the `VALUE` parameter.
    /// A date-time value answers DATE when it is date-only.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Binary(_) => ValueType::Binary,
            Self::Boolean(_) => ValueType::Boolean,
            Self::CalAddress(_) => ValueType::CalAddress,
            Self::DateTime(dt) => {
                if dt.is_date_only() {
                    ValueType::Date
                } else {
                    ValueType::DateTime
                }
            }
            Self::Duration(_) => ValueType::Duration,
            Self::Float(_) => ValueType::Float,
            Self::Geo { .. } => ValueType::Geo,
            Self::Integer(_) => ValueType::Integer,
            Self::Multi(multi) => multi.element_type,
            Self::Period(_) => ValueType::Period,
            Self::Recur(_) => ValueType::Recur,
            Self::Text(_) => ValueType::Text,
            Self::Uri(_) => ValueType::Uri,
            Self::UtcOffset(_) => ValueType::UtcOffset,
            Self::Adr(_) => ValueType::Adr,
            Self::N(_) => ValueType::N,
            Self::Org(_) => ValueType::Org,
            Self::Unknown(vtype, _) => *vtype,
        }
    }

    pub fn parse(
        vtype: ValueType,
        data: &str,
        variant: Variant,
        ctx: &ParserContext,
    ) -> CalendarResult<Self> {
        let result = match vtype {
            ValueType::Binary => Self::Binary(data.to_owned()),
            ValueType::Boolean => match data.to_ascii_uppercase().as_str() {
                "TRUE" => Self::Boolean(true),
                "FALSE" => Self::Boolean(false),
                _ => {
                    return Err(CalendarError::invalid_value()
                        .with_message("boolean: expected TRUE or FALSE")
                        .with_data(data))
                }
            },
            ValueType::CalAddress => Self::CalAddress(parse_uri(data, ctx)?),
            ValueType::Uri => Self::Uri(parse_uri(data, ctx)?),
            ValueType::Date | ValueType::DateTime => {
                Self::DateTime(DateTime::parse(data, variant.full_iso())?)
            }
            ValueType::Duration => Self::Duration(Duration::parse(data, ctx)?),
            ValueType::Float => Self::Float(parse_float(data)?),
            ValueType::Geo => {
                let (lat, lon) = data.split_once(';').ok_or_else(|| {
                    CalendarError::invalid_value()
                        .with_message("geo: expected two ';' separated floats")
                        .with_data(data)
                })?;
                Self::Geo {
                    latitude: parse_float(lat)?,
                    longitude: parse_float(lon)?,
                }
            }
            ValueType::Integer => Self::Integer(data.trim().parse::<i64>().map_err(|_| {
                CalendarError::invalid_value()
                    .with_message("integer: bad value")
                    .with_data(data)
            })?),
            ValueType::Period => Self::Period(Period::parse(data, variant.full_iso(), ctx)?),
            ValueType::Recur => Self::Recur(Recurrence::parse_variant(data, variant.full_iso())?),
            ValueType::Text => Self::Text(decode_text(data, ctx)?),
            ValueType::UtcOffset => Self::UtcOffset(parse_utc_offset(data, variant)?),
            ValueType::Adr => Self::Adr(Adr::parse(data, ctx)?),
            ValueType::N => Self::N(NameValue::parse(data, ctx)?),
            ValueType::Org => Self::Org(parse_text_list(data, ';', ctx)?),
            ValueType::Time | ValueType::Unknown => Self::Unknown(vtype, data.to_owned()),
        };
        Ok(result)
    }

    pub fn generate(&self, out: &mut String, variant: Variant) {
        match self {
            Self::Binary(data) | Self::Unknown(_, data) => out.push_str(data),
            Self::Boolean(value) => out.push_str(if *value { "TRUE" } else { "FALSE" }),
            Self::CalAddress(uri) | Self::Uri(uri) => out.push_str(uri),
            Self::DateTime(dt) => dt.generate(out),
            Self::Duration(duration) => duration.generate(out),
            Self::Float(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Geo { latitude, longitude } => {
                let _ = write!(out, "{latitude};{longitude}");
            }
            Self::Integer(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Multi(multi) => multi.generate(out, variant),
            Self::Period(period) => period.generate(out),
            Self::Recur(rule) => rule.generate(out),
            Self::Text(text) => escape_text(text, out),
            Self::UtcOffset(offset) => generate_utc_offset(*offset, variant, out),
            Self::Adr(adr) => adr.generate(out),
            Self::N(n) => n.generate(out),
            Self::Org(items) => generate_text_list(items, ';', out),
        }
    }

    #[must_use]
    pub fn to_text(&self, variant: Variant) -> String {
        let mut out = String::new();
        self.generate(&mut out, variant);
        out
    }

    /// Append the typed value element(s) of the XML rendition.
    pub fn write_xml(&self, parent: &mut XmlElement) {
        match self {
            Self::Multi(multi) => {
                for value in &multi.values {
                    value.write_xml(parent);
                }
            }
            Self::Geo { latitude, longitude } => {
                parent.append(XmlElement::new_text("latitude", latitude.to_string()));
                parent.append(XmlElement::new_text("longitude", longitude.to_string()));
            }
            Self::Adr(adr) => adr.write_xml(parent),
            Self::N(n) => n.write_xml(parent),
            Self::Org(items) => {
                for item in items {
                    parent.append(XmlElement::new_text("text", item.clone()));
                }
            }
            Self::Period(period) => {
                let element = parent.sub_element("period");
                let (start, other) = period.xml_parts();
                element.append(XmlElement::new_text("start", start));
                let other_name = if period.use_duration() { "duration" } else { "end" };
                element.append(XmlElement::new_text(other_name, other));
            }
            Self::Recur(rule) => {
                let element = parent.sub_element("recur");
                for (name, text) in rule.xml_items() {
                    element.append(XmlElement::new_text(name, text));
                }
            }
            Self::DateTime(dt) => {
                parent.append(XmlElement::new_text(self.value_type().xml_name(), dt.xml_text()));
            }
            Self::UtcOffset(offset) => {
                let mut text = String::new();
                generate_utc_offset(*offset, Variant::VCard, &mut text);
                parent.append(XmlElement::new_text("utc-offset", text));
            }
            Self::Boolean(value) => {
                parent.append(XmlElement::new_text("boolean", if *value { "true" } else { "false" }));
            }
            Self::Text(text) => {
                parent.append(XmlElement::new_text("text", text.clone()));
            }
            other => {
                parent.append(XmlElement::new_text(
                    other.value_type().xml_name(),
                    other.to_text(Variant::ICalendar),
                ));
            }
        }
    }

    /// Append the value to a jCal/jCard property array.
    pub fn json_append(&self, array: &mut Vec<Json>) {
        match self {
            Self::Binary(data) | Self::Unknown(_, data) => array.push(json!(data)),
            Self::Boolean(value) => array.push(json!(value)),
            Self::CalAddress(uri) | Self::Uri(uri) => array.push(json!(uri)),
            Self::DateTime(dt) => array.push(json!(dt.xml_text())),
            Self::Duration(duration) => array.push(json!(duration.to_text())),
            Self::Float(value) => array.push(json!(value)),
            Self::Geo { latitude, longitude } => array.push(json!([latitude, longitude])),
            Self::Integer(value) => array.push(json!(value)),
            Self::Multi(multi) => {
                for value in &multi.values {
                    value.json_append(array);
                }
            }
            Self::Period(period) => {
                let (start, other) = period.xml_parts();
                array.push(json!([start, other]));
            }
            Self::Recur(rule) => array.push(rule.json_value()),
            Self::Text(text) => array.push(json!(text)),
            Self::UtcOffset(offset) => {
                let mut text = String::new();
                generate_utc_offset(*offset, Variant::VCard, &mut text);
                array.push(json!(text));
            }
            Self::Adr(adr) => array.push(adr.json_value()),
            Self::N(n) => array.push(n.json_value()),
            Self::Org(items) => {
                if items.len() == 1 {
                    array.push(json!(items[0]));
                } else {
                    array.push(json!(items));
                }
            }
        }
    }

    pub fn parse_json(
        vtype: ValueType,
        value: &Json,
        variant: Variant,
        ctx: &ParserContext,
    ) -> CalendarResult<Self> {
        let result = match vtype {
            ValueType::Boolean => Self::Boolean(value.as_bool().ok_or_else(|| bad_json("boolean"))?),
            ValueType::Integer => Self::Integer(value.as_i64().ok_or_else(|| bad_json("integer"))?),
            ValueType::Float => Self::Float(value.as_f64().ok_or_else(|| bad_json("float"))?),
            ValueType::Geo => {
                let pair = value.as_array().ok_or_else(|| bad_json("geo"))?;
                if pair.len() != 2 {
                    return Err(bad_json("geo"));
                }
                Self::Geo {
                    latitude: pair[0].as_f64().ok_or_else(|| bad_json("geo"))?,
                    longitude: pair[1].as_f64().ok_or_else(|| bad_json("geo"))?,
                }
            }
            ValueType::Period => {
                let parts = value.as_array().ok_or_else(|| bad_json("period"))?;
                let rendered = parts
                    .iter()
                    .map(|p| p.as_str().map(str::to_owned).ok_or_else(|| bad_json("period")))
                    .collect::<CalendarResult<Vec<_>>>()?
                    .join("/");
                Self::Period(Period::parse(&rendered, true, ctx)?)
            }
            ValueType::Recur => Self::Recur(Recurrence::parse_json(value)?),
            ValueType::Adr => Self::Adr(Adr::parse_json(value)?),
            ValueType::N => Self::N(NameValue::parse_json(value)?),
            ValueType::Org => match value {
                Json::String(s) => Self::Org(vec![s.clone()]),
                Json::Array(items) => Self::Org(
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_owned).ok_or_else(|| bad_json("org")))
                        .collect::<CalendarResult<Vec<_>>>()?,
                ),
                _ => return Err(bad_json("org")),
            },
            ValueType::Date | ValueType::DateTime => {
                let text = value.as_str().ok_or_else(|| bad_json("date-time"))?;
                Self::DateTime(DateTime::parse(text, true)?)
            }
            ValueType::Text => {
                Self::Text(value.as_str().ok_or_else(|| bad_json("text"))?.to_owned())
            }
            ValueType::UtcOffset => {
                let text = value.as_str().ok_or_else(|| bad_json("utc-offset"))?;
                Self::UtcOffset(parse_utc_offset(text, Variant::VCard)?)
            }
            _ => {
                let text = value.as_str().ok_or_else(|| bad_json("value"))?;
                Self::parse(vtype, text, variant, ctx)?
            }
        };
        Ok(result)
    }
}

fn bad_json(what: &'static str) -> CalendarError {
    CalendarError::invalid_value().with_message(format!("{what}: unexpected JSON value"))
}

fn parse_float(data: &str) -> CalendarResult<f64> {
    data.trim().parse::<f64>().map_err(|_| {
        CalendarError::invalid_value()
            .with_message("float: bad value")
            .with_data(data)
    })
}

fn parse_uri(data: &str, ctx: &ParserContext) -> CalendarResult<String> {
    if data.contains('\\') {
        match ctx.backslash_in_uri_value {
            ParserPolicy::Raise => {
                return Err(CalendarError::invalid_value()
                    .with_message("uri: backslash not allowed")
                    .with_data(data))
            }
            ParserPolicy::Fix => return decode_text(data, ctx),
            _ => {}
        }
    }
    Ok(data.to_owned())
}

/// `±HHMM[SS]` in the line-folded form, `±HH:MM[:SS]` in the full ISO
/// form used by vCard, XML and JSON.
fn parse_utc_offset(data: &str, variant: Variant) -> CalendarResult<i64> {
    let bad = || {
        CalendarError::invalid_value()
            .with_message("utc-offset: bad format")
            .with_data(data)
    };
    let full_iso = variant.full_iso();
    let expected: &[usize] = if full_iso { &[6, 9] } else { &[5, 7] };
    if !data.is_ascii() || !expected.contains(&data.len()) {
        return Err(bad());
    }
    let sign = match data.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(bad()),
    };
    let digits = |range: std::ops::Range<usize>| -> CalendarResult<i64> {
        data[range].parse::<i64>().map_err(|_| bad())
    };
    let hours = digits(1..3)?;
    let minute_index = if full_iso { 4 } else { 3 };
    let minutes = digits(minute_index..minute_index + 2)?;
    let seconds = if data.len() > 6 {
        let second_index = if full_iso { 7 } else { 5 };
        digits(second_index..second_index + 2)?
    } else {
        0
    };
    Ok(sign * ((hours * 60 + minutes) * 60 + seconds))
}

fn generate_utc_offset(offset: i64, variant: Variant, out: &mut String) {
    let sign = if offset < 0 { '-' } else { '+' };
    let abs = offset.abs();
    let (hours, minutes, seconds) = (abs / 3600, (abs / 60) % 60, abs % 60);
    if variant.full_iso() {
        let _ = write!(out, "{sign}{hours:02}:{minutes:02}");
        if seconds != 0 {
            let _ = write!(out, ":{seconds:02}");
        }
    } else {
        let _ = write!(out, "{sign}{hours:02}{minutes:02}");
        if seconds != 0 {
            let _ = write!(out, "{seconds:02}");
        }
    }
}

/// A comma separated sequence of values of one element type.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiValue {
    element_type: ValueType,
    values: Vec<Value>,
}

impl MultiValue {
    #[must_use]
    pub fn new(element_type: ValueType) -> Self {
        Self {
            element_type,
            values: Vec::new(),
        }
    }

    pub fn element_type(&self) -> ValueType {
        self.element_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn add(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn parse(
        element_type: ValueType,
        data: &str,
        variant: Variant,
        ctx: &ParserContext,
    ) -> CalendarResult<Self> {
        let mut multi = Self::new(element_type);
        // A backslash immediately before a comma escapes that comma.
        let mut token = String::new();
        let mut prev = '\0';
        for c in data.chars() {
            if c == ',' && prev != '\\' {
                multi
                    .values
                    .push(Value::parse(element_type, &token, variant, ctx)?);
                token.clear();
            } else {
                token.push(c);
            }
            prev = c;
        }
        multi
            .values
            .push(Value::parse(element_type, &token, variant, ctx)?);
        Ok(multi)
    }

    pub fn parse_json(
        element_type: ValueType,
        values: &[Json],
        variant: Variant,
        ctx: &ParserContext,
    ) -> CalendarResult<Self> {
        let mut multi = Self::new(element_type);
        for value in values {
            multi
                .values
                .push(Value::parse_json(element_type, value, variant, ctx)?);
        }
        Ok(multi)
    }

    pub fn generate(&self, out: &mut String, variant: Variant) {
        let mut first = true;
        for value in &self.values {
            if !first {
                out.push(',');
            }
            first = false;
            value.generate(out, variant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParserContext {
        ParserContext::lenient()
    }

    #[test]
    fn utc_offset_forms() {
        assert_eq!(
            Value::parse(ValueType::UtcOffset, "-0500", Variant::ICalendar, &ctx()).unwrap(),
            Value::UtcOffset(-18000)
        );
        assert_eq!(
            Value::parse(ValueType::UtcOffset, "+054530", Variant::ICalendar, &ctx()).unwrap(),
            Value::UtcOffset(20730)
        );
        assert_eq!(
            Value::parse(ValueType::UtcOffset, "-05:00", Variant::VCard, &ctx()).unwrap(),
            Value::UtcOffset(-18000)
        );
        assert!(Value::parse(ValueType::UtcOffset, "-05:00", Variant::ICalendar, &ctx()).is_err());

        let value = Value::UtcOffset(-18000);
        assert_eq!(value.to_text(Variant::ICalendar), "-0500");
        assert_eq!(value.to_text(Variant::VCard), "-05:00");
    }

    #[test]
    fn text_escaping_round_trip() {
        let value = Value::parse(ValueType::Text, "a\\,b\\nc", Variant::ICalendar, &ctx()).unwrap();
        assert_eq!(value, Value::Text("a,b\nc".to_owned()));
        assert_eq!(value.to_text(Variant::ICalendar), "a\\,b\\nc");
    }

    #[test]
    fn geo_pair() {
        let value = Value::parse(ValueType::Geo, "37.386013;-122.082932", Variant::ICalendar, &ctx())
            .unwrap();
        assert_eq!(
            value,
            Value::Geo {
                latitude: 37.386013,
                longitude: -122.082932
            }
        );
        assert_eq!(value.to_text(Variant::ICalendar), "37.386013;-122.082932");
    }

    #[test]
    fn date_value_answers_date_type() {
        let date = Value::parse(ValueType::Date, "20240310", Variant::ICalendar, &ctx()).unwrap();
        assert_eq!(date.value_type(), ValueType::Date);
        let dt =
            Value::parse(ValueType::DateTime, "20240310T013000Z", Variant::ICalendar, &ctx()).unwrap();
        assert_eq!(dt.value_type(), ValueType::DateTime);
    }

    #[test]
    fn uri_backslash_policy() {
        assert!(Value::parse(ValueType::Uri, "http://x/\\,y", Variant::ICalendar, &ParserContext::strict()).is_err());
        let fixed = Value::parse(ValueType::Uri, "http://x/\\,y", Variant::ICalendar, &ctx()).unwrap();
        assert_eq!(fixed, Value::Uri("http://x/,y".to_owned()));
    }

    #[test]
    fn multi_value_honors_escaped_commas() {
        let multi =
            MultiValue::parse(ValueType::Text, "one\\,two,three", Variant::ICalendar, &ctx()).unwrap();
        assert_eq!(multi.values().len(), 2);
        assert_eq!(multi.values()[0], Value::Text("one,two".to_owned()));
        let mut out = String::new();
        multi.generate(&mut out, Variant::ICalendar);
        assert_eq!(out, "one\\,two,three");
    }

    #[test]
    fn unknown_time_passthrough() {
        let value = Value::parse(ValueType::Time, "102200", Variant::VCard, &ctx()).unwrap();
        assert_eq!(value.value_type(), ValueType::Time);
        assert_eq!(value.to_text(Variant::VCard), "102200");
    }

    #[test]
    fn json_round_trips() {
        let ctx = ctx();
        for (vtype, text) in [
            (ValueType::Integer, "42"),
            (ValueType::Duration, "P1DT2H"),
            (ValueType::DateTime, "20240310T013000Z"),
        ] {
            let value = Value::parse(vtype, text, Variant::ICalendar, &ctx).unwrap();
            let mut array = Vec::new();
            value.json_append(&mut array);
            let back = Value::parse_json(vtype, &array[0], Variant::ICalendar, &ctx).unwrap();
            assert_eq!(value, back);
        }
    }
}
