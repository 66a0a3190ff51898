//! Property parameters.

use serde_json::{json, Value as Json};

use crate::escape::encode_parameter_value;
use crate::xml::XmlElement;

/// A named parameter carrying one or more string values.
///
/// Values containing `:`, `;` or `,` are double quoted on emission;
/// line breaks, quotes and carets use the caret encoding.
#[derive(Debug, Clone, Eq)]
pub struct Parameter {
    name: String,
    values: Vec<String>,
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.values == other.values
    }
}

impl std::hash::Hash for Parameter {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.to_ascii_uppercase().hash(state);
        self.values.hash(state);
    }
}

impl Parameter {
    #[must_use]
    pub fn new<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    #[must_use]
    pub fn new_empty<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn add_value<S: Into<String>>(&mut self, value: S) {
        self.values.push(value.into());
    }

    pub fn generate(&self, out: &mut String) {
        out.push_str(&self.name);
        if self.values.is_empty() {
            return;
        }
        out.push('=');
        let mut sorted: Vec<&String> = self.values.iter().collect();
        sorted.sort();
        let mut first = true;
        for value in sorted {
            if !first {
                out.push(',');
            }
            first = false;
            let encoded = encode_parameter_value(value);
            if encoded.contains([':', ';', ',']) {
                out.push('"');
                out.push_str(&encoded);
                out.push('"');
            } else {
                out.push_str(&encoded);
            }
        }
    }

    pub fn write_xml(&self, parent: &mut XmlElement) {
        let element = parent.sub_element(self.name.to_ascii_lowercase());
        for value in &self.values {
            element.append(XmlElement::new_text("text", value.clone()));
        }
    }

    /// Insert into a jCal/jCard parameter object: a single value is a
    /// plain string, multiple values an array.
    pub fn json_insert(&self, object: &mut serde_json::Map<String, Json>) {
        let value = if self.values.len() == 1 {
            json!(self.values[0])
        } else {
            json!(self.values)
        };
        object.insert(self.name.to_ascii_lowercase(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_applies_to_reserved_characters() {
        let param = Parameter::new("CN", "Doe; John");
        let mut out = String::new();
        param.generate(&mut out);
        assert_eq!(out, "CN=\"Doe; John\"");
    }

    #[test]
    fn multi_values_emit_sorted() {
        let mut param = Parameter::new("MEMBER", "b");
        param.add_value("a");
        let mut out = String::new();
        param.generate(&mut out);
        assert_eq!(out, "MEMBER=a,b");
    }

    #[test]
    fn caret_encoding_on_emission() {
        let param = Parameter::new("X-NOTE", "line1\nline2");
        let mut out = String::new();
        param.generate(&mut out);
        assert_eq!(out, "X-NOTE=line1^nline2");
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        assert_eq!(Parameter::new("tzid", "X"), Parameter::new("TZID", "X"));
        assert_ne!(Parameter::new("TZID", "X"), Parameter::new("TZID", "Y"));
    }
}
