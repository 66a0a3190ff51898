//! The XML renditions of both containers: emission through the
//! in-crate element tree, parsing through `roxmltree`.

use roxmltree::{Document, Node};

use crate::calendar::{Calendar, TimezoneInclusion};
use crate::card::Card;
use crate::component::{Component, ComponentKind};
use crate::error::{CalendarError, CalendarResult, ErrorKind};
use crate::parameter::Parameter;
use crate::parser::ParserContext;
use crate::property::{is_multi_value, Property};
use crate::value::{Adr, MultiValue, NameValue, Value, ValueType, Variant};
use crate::xml::{XmlElement, ICALENDAR_NAMESPACE, VCARD_NAMESPACE};

impl Calendar {
    /// The xCal document for this calendar.
    #[must_use]
    pub fn get_text_xml(&self, include_timezones: TimezoneInclusion) -> String {
        let mut copy = self.clone();
        copy.include_missing_timezones(include_timezones);
        let mut root = XmlElement::new("icalendar");
        copy.component().write_xml(&mut root);
        root.to_document(ICALENDAR_NAMESPACE)
    }

    /// Parse an xCal document.
    pub fn parse_xml_str(data: &str) -> CalendarResult<Self> {
        let ctx = ParserContext::global();
        let document = Document::parse(data).map_err(|e| {
            CalendarError::invalid_data().with_message(format!("XML error: {e}"))
        })?;
        let root = document.root_element();
        if root.tag_name().name() != "icalendar" {
            return Err(CalendarError::invalid_data()
                .with_message("XML root element is not 'icalendar'"));
        }
        let vcalendar = element_children(root)
            .find(|node| node.tag_name().name() == "vcalendar")
            .ok_or_else(|| {
                CalendarError::invalid_data().with_message("no 'vcalendar' element present")
            })?;
        let component = component_from_xml(vcalendar, Variant::ICalendar, &ctx)?;
        let calendar = Calendar::from_root(component)?;
        crate::tzdb::TimezoneDatabase::merge_timezones(calendar.timezones());
        Ok(calendar)
    }
}

impl Card {
    /// The xCard document for this card.
    #[must_use]
    pub fn get_text_xml(&self) -> String {
        let mut root = XmlElement::new("vcards");
        self.component().write_xml(&mut root);
        root.to_document(VCARD_NAMESPACE)
    }

    /// Parse an xCard document holding exactly one card.
    pub fn parse_xml_str(data: &str) -> CalendarResult<Self> {
        let ctx = ParserContext::global();
        let document = Document::parse(data).map_err(|e| {
            CalendarError::invalid_data().with_message(format!("XML error: {e}"))
        })?;
        let root = document.root_element();
        if root.tag_name().name() != "vcards" {
            return Err(
                CalendarError::invalid_data().with_message("XML root element is not 'vcards'")
            );
        }
        let vcard = element_children(root)
            .find(|node| node.tag_name().name() == "vcard")
            .ok_or_else(|| {
                CalendarError::invalid_data().with_message("no 'vcard' element present")
            })?;
        Card::from_root(component_from_xml(vcard, Variant::VCard, &ctx)?)
    }
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn component_from_xml(
    node: Node<'_, '_>,
    variant: Variant,
    ctx: &ParserContext,
) -> CalendarResult<Component> {
    let mut component = Component::new(ComponentKind::from_name(node.tag_name().name()));
    for child in element_children(node) {
        match child.tag_name().name() {
            "properties" => {
                for property in element_children(child) {
                    component.add_property(property_from_xml(property, variant, ctx)?);
                }
            }
            "components" => {
                for sub in element_children(child) {
                    component.add_component(component_from_xml(sub, variant, ctx)?);
                }
            }
            other => {
                return Err(CalendarError::invalid_component()
                    .with_message(format!("unexpected element '{other}' in component")))
            }
        }
    }
    component.finalise();
    Ok(component)
}

fn property_from_xml(
    node: Node<'_, '_>,
    variant: Variant,
    ctx: &ParserContext,
) -> CalendarResult<Property> {
    let name = node.tag_name().name().to_ascii_uppercase();
    let mut property = Property::new_shell(variant, name.clone());

    let mut value_nodes = Vec::new();
    for child in element_children(node) {
        if child.tag_name().name() == "parameters" {
            for parameter in element_children(child) {
                let mut result =
                    Parameter::new_empty(parameter.tag_name().name().to_ascii_uppercase());
                for value in element_children(parameter) {
                    result.add_value(value.text().unwrap_or_default());
                }
                property.add_parameter(result);
            }
        } else {
            value_nodes.push(child);
        }
    }
    let multi = is_multi_value(variant, &name);
    let value = value_from_xml(&name, &value_nodes, variant, multi, ctx)
        .map_err(|e| e.escalate(ErrorKind::InvalidProperty))?;
    property.set_value(value);
    Ok(property)
}

fn value_from_xml(
    name: &str,
    nodes: &[Node<'_, '_>],
    variant: Variant,
    multi: bool,
    ctx: &ParserContext,
) -> CalendarResult<Value> {
    let first = nodes.first().ok_or_else(|| {
        CalendarError::invalid_value().with_message("property has no value element")
    })?;
    let first_name = first.tag_name().name();

    // Structured values are spread over dedicated child elements.
    match first_name {
        "latitude" | "longitude" => {
            let mut latitude = 0.0;
            let mut longitude = 0.0;
            for node in nodes {
                let text = node.text().unwrap_or_default().trim().to_owned();
                let parsed = text.parse::<f64>().map_err(|_| {
                    CalendarError::invalid_value().with_message("geo: bad float").with_data(text)
                })?;
                if node.tag_name().name() == "latitude" {
                    latitude = parsed;
                } else {
                    longitude = parsed;
                }
            }
            return Ok(Value::Geo { latitude, longitude });
        }
        "surname" | "given" | "additional" | "prefix" | "suffix" if name == "N" => {
            let mut n = NameValue::default();
            for node in nodes {
                let text = node.text().unwrap_or_default().to_owned();
                let field = match node.tag_name().name() {
                    "surname" => &mut n.surname,
                    "given" => &mut n.given,
                    "additional" => &mut n.additional,
                    "prefix" => &mut n.prefix,
                    _ => &mut n.suffix,
                };
                if field.len() == 1 && field[0].is_empty() {
                    field.clear();
                }
                field.push(text);
            }
            for field in [&mut n.surname, &mut n.given, &mut n.additional, &mut n.prefix, &mut n.suffix] {
                if field.is_empty() {
                    field.push(String::new());
                }
            }
            return Ok(Value::N(n));
        }
        "pobox" | "ext" | "street" | "locality" | "region" | "code" | "country" => {
            let mut adr = Adr::default();
            for node in nodes {
                let text = node.text().unwrap_or_default().to_owned();
                let field = match node.tag_name().name() {
                    "pobox" => &mut adr.pobox,
                    "ext" => &mut adr.extended,
                    "street" => &mut adr.street,
                    "locality" => &mut adr.locality,
                    "region" => &mut adr.region,
                    "code" => &mut adr.postal_code,
                    _ => &mut adr.country,
                };
                if field.len() == 1 && field[0].is_empty() {
                    field.clear();
                }
                field.push(text);
            }
            for field in [
                &mut adr.pobox,
                &mut adr.extended,
                &mut adr.street,
                &mut adr.locality,
                &mut adr.region,
                &mut adr.postal_code,
                &mut adr.country,
            ] {
                if field.is_empty() {
                    field.push(String::new());
                }
            }
            return Ok(Value::Adr(adr));
        }
        "text" if name == "ORG" && variant == Variant::VCard => {
            let units = nodes
                .iter()
                .map(|node| node.text().unwrap_or_default().to_owned())
                .collect();
            return Ok(Value::Org(units));
        }
        "period" => {
            let mut values = Vec::new();
            for node in nodes {
                values.push(period_from_xml(*node, ctx)?);
            }
            if values.len() == 1 && !multi {
                return Ok(values.remove(0));
            }
            let mut wrapper = MultiValue::new(ValueType::Period);
            for value in values {
                wrapper.add(value);
            }
            return Ok(Value::Multi(wrapper));
        }
        "recur" => {
            return recur_from_xml(*first);
        }
        _ => {}
    }

    let vtype = ValueType::from_xml_name(first_name).unwrap_or(ValueType::Unknown);
    let mut values = Vec::new();
    for node in nodes {
        values.push(xml_scalar(vtype, node.text().unwrap_or_default(), ctx)?);
    }
    if values.len() == 1 && !multi {
        Ok(values.remove(0))
    } else {
        let mut wrapper = MultiValue::new(vtype);
        for value in values {
            wrapper.add(value);
        }
        Ok(Value::Multi(wrapper))
    }
}

fn period_from_xml(node: Node<'_, '_>, ctx: &ParserContext) -> CalendarResult<Value> {
    let mut start = None;
    let mut other = None;
    for child in element_children(node) {
        let text = child.text().unwrap_or_default();
        match child.tag_name().name() {
            "start" => start = Some(text.to_owned()),
            "end" | "duration" => other = Some(text.to_owned()),
            _ => {}
        }
    }
    let (Some(start), Some(other)) = (start, other) else {
        return Err(CalendarError::invalid_value()
            .with_message("period element needs start and end or duration"));
    };
    Ok(Value::Period(crate::period::Period::parse(
        &format!("{start}/{other}"),
        true,
        ctx,
    )?))
}

fn recur_from_xml(node: Node<'_, '_>) -> CalendarResult<Value> {
    use std::collections::BTreeMap;
    let mut parts: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for child in element_children(node) {
        let key = child.tag_name().name().to_ascii_uppercase();
        let text = child.text().unwrap_or_default().to_owned();
        if !parts.contains_key(&key) {
            order.push(key.clone());
        }
        parts.entry(key).or_default().push(text);
    }
    let rendered: Vec<String> = order
        .iter()
        .map(|key| format!("{key}={}", parts[key].join(",")))
        .collect();
    Ok(Value::Recur(crate::recur::Recurrence::parse_variant(
        &rendered.join(";"),
        true,
    )?))
}

fn xml_scalar(vtype: ValueType, text: &str, ctx: &ParserContext) -> CalendarResult<Value> {
    match vtype {
        // XML text content is not backslash escaped.
        ValueType::Text => Ok(Value::Text(text.to_owned())),
        ValueType::Unknown => Ok(Value::Unknown(ValueType::Unknown, text.to_owned())),
        // Extended punctuation forms are shared with the vCard
        // dialect.
        _ => Value::parse(vtype, text, Variant::VCard, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
        BEGIN:VEVENT\r\nUID:xml-1\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART;TZID=America/New_York:20240310T013000\r\n\
        RRULE:FREQ=MONTHLY;BYDAY=-1FR\r\nGEO:37.386013;-122.082932\r\n\
        EXDATE:20240426T013000Z,20240531T013000Z\r\n\
        SUMMARY:Review\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn calendar_xml_round_trip() {
        let _guard = crate::tzdb::test_lock();
        let calendar = Calendar::parse_str(EVENT).unwrap();
        let xml = calendar.get_text_xml(TimezoneInclusion::None);
        assert!(xml.contains("<vcalendar>"));
        assert!(xml.contains("<date-time>2024-01-01T00:00:00Z</date-time>"));
        assert!(xml.contains("<latitude>37.386013</latitude>"));
        let reparsed = Calendar::parse_xml_str(&xml).unwrap();
        assert!(calendar.component().same_as(reparsed.component()));
    }

    #[test]
    fn card_xml_round_trip() {
        let data = "BEGIN:VCARD\r\nVERSION:3.0\r\nN:Doe;John;;;\r\nFN:John Doe\r\n\
            ORG:Example Corp;Engineering\r\nEND:VCARD\r\n";
        let card = Card::parse_str(data).unwrap();
        let xml = card.get_text_xml();
        assert!(xml.contains("<surname>Doe</surname>"));
        let reparsed = Card::parse_xml_str(&xml).unwrap();
        assert!(card.component().same_as(reparsed.component()));
    }

    #[test]
    fn rejects_foreign_roots() {
        assert!(Calendar::parse_xml_str("<foo/>").is_err());
        assert!(Card::parse_xml_str("<icalendar/>").is_err());
    }
}
