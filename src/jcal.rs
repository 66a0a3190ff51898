//! The JSON (jCal/jCard) renditions of both containers.

use serde_json::Value as Json;

use crate::calendar::{Calendar, TimezoneInclusion};
use crate::card::Card;
use crate::component::Component;
use crate::error::{CalendarError, CalendarResult};
use crate::parser::ParserContext;
use crate::value::Variant;

impl Calendar {
    /// The jCal document for this calendar.
    #[must_use]
    pub fn get_text_json(&self, include_timezones: TimezoneInclusion) -> String {
        let mut copy = self.clone();
        copy.include_missing_timezones(include_timezones);
        serde_json::to_string_pretty(&copy.component().json_value())
            .expect("jCal serialization is infallible")
    }

    /// Parse a jCal document.
    pub fn parse_json_str(data: &str) -> CalendarResult<Self> {
        let ctx = ParserContext::global();
        let json: Json = serde_json::from_str(data).map_err(|e| {
            CalendarError::invalid_data().with_message(format!("JSON error: {e}"))
        })?;
        let component = Component::parse_json(&json, Variant::ICalendar, &ctx)?;
        let calendar = Calendar::from_root(component)?;
        crate::tzdb::TimezoneDatabase::merge_timezones(calendar.timezones());
        Ok(calendar)
    }
}

impl Card {
    /// The jCard document for this card.
    #[must_use]
    pub fn get_text_json(&self) -> String {
        serde_json::to_string_pretty(&self.component().json_value())
            .expect("jCard serialization is infallible")
    }

    /// Parse a jCard document holding exactly one card.
    pub fn parse_json_str(data: &str) -> CalendarResult<Self> {
        let ctx = ParserContext::global();
        let json: Json = serde_json::from_str(data).map_err(|e| {
            CalendarError::invalid_data().with_message(format!("JSON error: {e}"))
        })?;
        Card::from_root(Component::parse_json(&json, Variant::VCard, &ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
        BEGIN:VEVENT\r\nUID:json-1\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART:20240310T013000Z\r\nRRULE:FREQ=DAILY;COUNT=3\r\n\
        DURATION:PT1H\r\nSUMMARY:Sync\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn calendar_json_round_trip() {
        let calendar = Calendar::parse_str(EVENT).unwrap();
        let json = calendar.get_text_json(TimezoneInclusion::None);
        assert!(json.contains("\"vcalendar\""));
        assert!(json.contains("\"2024-03-10T01:30:00Z\""));
        let reparsed = Calendar::parse_json_str(&json).unwrap();
        assert!(calendar.component().same_as(reparsed.component()));
    }

    #[test]
    fn card_json_round_trip() {
        let data = "BEGIN:VCARD\r\nVERSION:3.0\r\nN:Doe;John;;;\r\nFN:John Doe\r\n\
            item1.EMAIL:jdoe@example.com\r\nEND:VCARD\r\n";
        let card = Card::parse_str(data).unwrap();
        let json = card.get_text_json();
        let reparsed = Card::parse_json_str(&json).unwrap();
        assert!(card.component().same_as(reparsed.component()));
    }

    #[test]
    fn format_equivalence_with_text() {
        let calendar = Calendar::parse_str(EVENT).unwrap();
        let via_json =
            Calendar::parse_json_str(&calendar.get_text_json(TimezoneInclusion::None)).unwrap();
        let via_xml =
            Calendar::parse_xml_str(&calendar.get_text_xml(TimezoneInclusion::None)).unwrap();
        assert!(via_json.component().same_as(via_xml.component()));
        assert!(via_json.component().same_as(calendar.component()));
        // And all three emit the same canonical text.
        assert_eq!(
            via_json.get_text(TimezoneInclusion::None),
            via_xml.get_text(TimezoneInclusion::None)
        );
    }
}
