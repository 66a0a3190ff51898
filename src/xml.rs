//! Minimal element tree for the XML renditions.
//!
//! Emission only needs elements, text content and one namespace
//! declaration on the root, so the writer is kept in-crate; parsing
//! uses `roxmltree` (see the `xcal` module).

use std::fmt::Write;

pub const ICALENDAR_NAMESPACE: &str = "urn:ietf:params:xml:ns:icalendar-2.0";
pub const VCARD_NAMESPACE: &str = "urn:ietf:params:xml:ns:vcard-4.0";

/// An element with text content and child elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn new_text<S: Into<String>, T: Into<String>>(name: S, text: T) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        self.text = text.into();
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// Append a new child and return a handle to it.
    pub fn sub_element<S: Into<String>>(&mut self, name: S) -> &mut XmlElement {
        self.children.push(XmlElement::new(name));
        self.children.last_mut().expect("child was just pushed")
    }

    pub fn append(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.children.is_empty()
    }

    /// Serialize as a document with the namespace declared on this
    /// element.
    #[must_use]
    pub fn to_document(&self, namespace: &str) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.write(&mut out, Some(namespace));
        out
    }

    fn write(&self, out: &mut String, namespace: Option<&str>) {
        out.push('<');
        out.push_str(&self.name);
        if let Some(ns) = namespace {
            let _ = write!(out, " xmlns=\"{ns}\"");
        }
        if self.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        escape_into(&self.text, out);
        for child in &self.children {
            child.write(out, None);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_document() {
        let mut root = XmlElement::new("icalendar");
        let vcal = root.sub_element("vcalendar");
        let props = vcal.sub_element("properties");
        props.append(XmlElement::new_text("text", "a < b & c"));
        let doc = root.to_document(ICALENDAR_NAMESPACE);
        assert_eq!(
            doc,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <icalendar xmlns=\"urn:ietf:params:xml:ns:icalendar-2.0\">\
             <vcalendar><properties><text>a &lt; b &amp; c</text></properties></vcalendar>\
             </icalendar>"
        );
    }

    #[test]
    fn empty_element_self_closes() {
        let root = XmlElement::new("components");
        let mut out = String::new();
        root.write(&mut out, None);
        assert_eq!(out, "<components/>");
    }
}
