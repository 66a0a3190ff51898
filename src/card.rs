//! The vCard container.

use crate::component::{Component, ComponentKind};
use crate::error::{CalendarError, CalendarResult, ErrorKind};
use crate::parser::{FoldedLines, ParserContext, ParserPolicy};
use crate::property::Property;
use crate::value::Variant;

/// A single vCard. Several may share one text stream; see
/// [`Card::parse_all_str`].
#[derive(Debug, Clone)]
pub struct Card {
    root: Component,
}

impl Default for Card {
    fn default() -> Self {
        Self::new()
    }
}

impl Card {
    /// A new card carrying the default PRODID and VERSION.
    #[must_use]
    pub fn new() -> Self {
        let mut card = Self::new_empty();
        card.root.add_property(Property::new_vcard(
            None,
            "PRODID",
            crate::value::Value::Text("-//calendar-rs//calendar_rs//EN".to_owned()),
        ));
        card.root.add_property(Property::new_vcard(
            None,
            "VERSION",
            crate::value::Value::Text("3.0".to_owned()),
        ));
        card
    }

    #[must_use]
    pub fn new_empty() -> Self {
        Self {
            root: Component::new(ComponentKind::Vcard),
        }
    }

    pub(crate) fn from_root(root: Component) -> CalendarResult<Self> {
        if root.kind() != &ComponentKind::Vcard {
            return Err(CalendarError::invalid_data().with_message("root component is not a VCARD"));
        }
        Ok(Self { root })
    }

    pub fn component(&self) -> &Component {
        &self.root
    }

    pub fn component_mut(&mut self) -> &mut Component {
        &mut self.root
    }

    pub fn add_property(&mut self, property: Property) {
        self.root.add_property(property);
    }

    /// Parse a stream holding exactly one vCard.
    pub fn parse_str(data: &str) -> CalendarResult<Self> {
        let mut cards = Self::parse_all_str(data)?;
        match cards.len() {
            1 => Ok(cards.remove(0)),
            0 => Err(CalendarError::invalid_data().with_message("no vCard in data")),
            _ => Err(CalendarError::invalid_data().with_message("more than one vCard in data")),
        }
    }

    /// Parse a stream holding any number of vCards.
    pub fn parse_all_str(data: &str) -> CalendarResult<Vec<Self>> {
        let ctx = ParserContext::global();
        let mut results = Vec::new();
        let mut current: Option<Card> = None;
        for line in FoldedLines::new(data) {
            if line.is_empty() {
                if ctx.blank_lines_in_data == ParserPolicy::Raise {
                    return Err(
                        CalendarError::invalid_data().with_message("data has blank lines")
                    );
                }
                continue;
            }
            if current.is_none() {
                if line == "BEGIN:VCARD" {
                    current = Some(Card::new_empty());
                } else {
                    return Err(CalendarError::invalid_data()
                        .with_message("data does not start with BEGIN:VCARD")
                        .with_data(line));
                }
            } else if line == "END:VCARD" {
                let card = current.take().expect("card is being parsed");
                if !card.root.has_property("VERSION") {
                    return Err(
                        CalendarError::invalid_data().with_message("vCard missing VERSION")
                    );
                }
                results.push(card);
            } else {
                let property = Property::parse_text(&line, Variant::VCard, &ctx)
                    .map_err(|e| e.escalate(ErrorKind::InvalidData))?;
                if !valid_card_property(&property) {
                    return Err(CalendarError::invalid_data()
                        .with_message("invalid vCard property")
                        .with_data(line.clone()));
                }
                current
                    .as_mut()
                    .expect("card is being parsed")
                    .add_property(property);
            }
        }
        if current.is_some() {
            return Err(CalendarError::invalid_data().with_message("vCard data is not complete"));
        }
        Ok(results)
    }

    pub fn generate(&self, out: &mut String) {
        self.root.generate(out);
    }

    #[must_use]
    pub fn get_text(&self) -> String {
        let mut out = String::new();
        self.generate(&mut out);
        out
    }

    pub fn validate(&mut self, do_fix: bool) -> (Vec<String>, Vec<String>) {
        crate::validation::validate(&mut self.root, Variant::VCard, do_fix)
    }
}

fn valid_card_property(property: &Property) -> bool {
    match property.upper_name().as_str() {
        "VERSION" => property.text_value() == Some("3.0"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    const JDOE: &str = "BEGIN:VCARD\r\nVERSION:3.0\r\nN:Doe;John;;;\r\nFN:John Doe\r\n\
        ORG:Example Corp;Engineering\r\n\
        ADR;TYPE=WORK:;;100 Main Street;Any Town;CA;91921;USA\r\n\
        item1.EMAIL:jdoe@example.com\r\nEND:VCARD\r\n";

    #[test]
    fn parse_and_round_trip() {
        let card = Card::parse_str(JDOE).unwrap();
        let text = card.get_text();
        let reparsed = Card::parse_str(&text).unwrap();
        assert!(card.component().same_as(reparsed.component()));
    }

    #[test]
    fn structured_values_bind() {
        let card = Card::parse_str(JDOE).unwrap();
        let n = card.component().first_property("N").unwrap();
        match n.value() {
            Some(Value::N(name)) => {
                assert_eq!(name.surname, vec!["Doe"]);
                assert_eq!(name.given, vec!["John"]);
            }
            other => panic!("N did not bind as a structured name: {other:?}"),
        }
        let org = card.component().first_property("ORG").unwrap();
        match org.value() {
            Some(Value::Org(units)) => {
                assert_eq!(units, &vec!["Example Corp".to_owned(), "Engineering".to_owned()]);
            }
            other => panic!("ORG did not bind as a unit list: {other:?}"),
        }
    }

    #[test]
    fn multiple_cards_in_one_stream() {
        let data = format!("{JDOE}{JDOE}");
        let cards = Card::parse_all_str(&data).unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn validation_requires_fn() {
        let data = "BEGIN:VCARD\r\nVERSION:3.0\r\nN:Doe;John;;;\r\nEND:VCARD\r\n";
        let mut card = Card::parse_str(data).unwrap();
        let (_, unfixed) = card.validate(false);
        assert!(unfixed.iter().any(|d| d.contains("FN")));
    }

    #[test]
    fn version_must_be_3_0() {
        let data = "BEGIN:VCARD\r\nVERSION:4.0\r\nFN:X\r\nEND:VCARD\r\n";
        assert!(Card::parse_str(data).is_err());
    }
}
