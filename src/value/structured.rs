//! The vCard structured values: ADR, N and ORG.

use serde_json::{json, Value as Json};

use crate::error::{CalendarError, CalendarResult};
use crate::escape::{generate_double_nested_list, parse_double_nested_list, NestedItem};
use crate::parser::ParserContext;
use crate::xml::XmlElement;

/// A seven component delivery address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Adr {
    pub pobox: NestedItem,
    pub extended: NestedItem,
    pub street: NestedItem,
    pub locality: NestedItem,
    pub region: NestedItem,
    pub postal_code: NestedItem,
    pub country: NestedItem,
}

const ADR_COMPONENTS: usize = 7;

impl Adr {
    pub fn parse(data: &str, ctx: &ParserContext) -> CalendarResult<Self> {
        let mut items = parse_double_nested_list(data, ADR_COMPONENTS, ctx)?;
        items.truncate(ADR_COMPONENTS);
        let mut drain = items.into_iter();
        Ok(Self {
            pobox: drain.next().unwrap_or_default(),
            extended: drain.next().unwrap_or_default(),
            street: drain.next().unwrap_or_default(),
            locality: drain.next().unwrap_or_default(),
            region: drain.next().unwrap_or_default(),
            postal_code: drain.next().unwrap_or_default(),
            country: drain.next().unwrap_or_default(),
        })
    }

    fn items(&self) -> [&NestedItem; ADR_COMPONENTS] {
        [
            &self.pobox,
            &self.extended,
            &self.street,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
    }

    pub fn generate(&self, out: &mut String) {
        let items: Vec<NestedItem> = self.items().into_iter().cloned().collect();
        generate_double_nested_list(&items, out);
    }

    pub fn write_xml(&self, parent: &mut XmlElement) {
        const NAMES: [&str; ADR_COMPONENTS] =
            ["pobox", "ext", "street", "locality", "region", "code", "country"];
        for (name, item) in NAMES.iter().zip(self.items()) {
            for part in item {
                parent.append(XmlElement::new_text(*name, part.clone()));
            }
        }
    }

    #[must_use]
    pub fn json_value(&self) -> Json {
        Json::Array(self.items().into_iter().map(nested_json).collect())
    }

    pub fn parse_json(value: &Json) -> CalendarResult<Self> {
        let items = value.as_array().ok_or_else(|| {
            CalendarError::invalid_value().with_message("ADR: JSON value must be an array")
        })?;
        let mut result = Self::default();
        let fields = [
            &mut result.pobox,
            &mut result.extended,
            &mut result.street,
            &mut result.locality,
            &mut result.region,
            &mut result.postal_code,
            &mut result.country,
        ];
        for (field, item) in fields.into_iter().zip(items) {
            *field = nested_from_json(item)?;
        }
        Ok(result)
    }
}

/// A five component structured name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NameValue {
    pub surname: NestedItem,
    pub given: NestedItem,
    pub additional: NestedItem,
    pub prefix: NestedItem,
    pub suffix: NestedItem,
}

const N_COMPONENTS: usize = 5;

impl NameValue {
    pub fn parse(data: &str, ctx: &ParserContext) -> CalendarResult<Self> {
        let mut items = parse_double_nested_list(data, N_COMPONENTS, ctx)?;
        items.truncate(N_COMPONENTS);
        let mut drain = items.into_iter();
        Ok(Self {
            surname: drain.next().unwrap_or_default(),
            given: drain.next().unwrap_or_default(),
            additional: drain.next().unwrap_or_default(),
            prefix: drain.next().unwrap_or_default(),
            suffix: drain.next().unwrap_or_default(),
        })
    }

    fn items(&self) -> [&NestedItem; N_COMPONENTS] {
        [
            &self.surname,
            &self.given,
            &self.additional,
            &self.prefix,
            &self.suffix,
        ]
    }

    pub fn generate(&self, out: &mut String) {
        let items: Vec<NestedItem> = self.items().into_iter().cloned().collect();
        generate_double_nested_list(&items, out);
    }

    pub fn write_xml(&self, parent: &mut XmlElement) {
        const NAMES: [&str; N_COMPONENTS] = ["surname", "given", "additional", "prefix", "suffix"];
        for (name, item) in NAMES.iter().zip(self.items()) {
            for part in item {
                parent.append(XmlElement::new_text(*name, part.clone()));
            }
        }
    }

    #[must_use]
    pub fn json_value(&self) -> Json {
        Json::Array(self.items().into_iter().map(nested_json).collect())
    }

    pub fn parse_json(value: &Json) -> CalendarResult<Self> {
        let items = value.as_array().ok_or_else(|| {
            CalendarError::invalid_value().with_message("N: JSON value must be an array")
        })?;
        let mut result = Self::default();
        let fields = [
            &mut result.surname,
            &mut result.given,
            &mut result.additional,
            &mut result.prefix,
            &mut result.suffix,
        ];
        for (field, item) in fields.into_iter().zip(items) {
            *field = nested_from_json(item)?;
        }
        Ok(result)
    }
}

fn nested_json(item: &NestedItem) -> Json {
    if item.len() == 1 {
        json!(item[0])
    } else {
        json!(item)
    }
}

fn nested_from_json(value: &Json) -> CalendarResult<NestedItem> {
    match value {
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(values) => values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_owned).ok_or_else(|| {
                    CalendarError::invalid_value()
                        .with_message("structured value: expected string element")
                })
            })
            .collect(),
        _ => Err(CalendarError::invalid_value()
            .with_message("structured value: expected string or array")),
    }
}
