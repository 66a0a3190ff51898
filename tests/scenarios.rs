//! End-to-end scenarios across the parse, recurrence and timezone
//! engines.

use std::sync::{Mutex, MutexGuard, PoisonError};

use calendar_rs::component::ComponentKind;
use calendar_rs::vtimezone::TimezoneDescriptor;
use calendar_rs::{
    Calendar, DateTime, ParserContext, Period, Property, Recurrence, TimezoneDatabase,
    TimezoneInclusion,
};

/// The timezone database is a process-wide singleton; tests touching
/// it take this lock.
fn db_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

const NEW_YORK_VTIMEZONE: &str = "BEGIN:VTIMEZONE\r\nTZID:America/New_York\r\n\
BEGIN:DAYLIGHT\r\nDTSTART:20070311T020000\r\nTZOFFSETFROM:-0500\r\nTZOFFSETTO:-0400\r\n\
TZNAME:EDT\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU\r\nEND:DAYLIGHT\r\n\
BEGIN:STANDARD\r\nDTSTART:20071104T020000\r\nTZOFFSETFROM:-0400\r\nTZOFFSETTO:-0500\r\n\
TZNAME:EST\r\nRRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n";

fn window(text: &str) -> Period {
    Period::parse(text, false, &ParserContext::strict()).unwrap()
}

/// A VEVENT in a named zone expands across the DST boundary: the
/// third daily instance keeps its wall clock but shifts to UTC-4.
#[test]
fn daily_rule_across_dst_boundary() {
    let _guard = db_lock();
    let data = format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n{NEW_YORK_VTIMEZONE}\
         BEGIN:VEVENT\r\nUID:s1\r\nDTSTAMP:20240101T000000Z\r\n\
         DTSTART;TZID=America/New_York:20240310T013000\r\n\
         RRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    );
    let calendar = Calendar::parse_str(&data).unwrap();
    let instances = calendar
        .get_vevents(&window("20240101T000000Z/20250101T000000Z"), false)
        .unwrap();
    assert_eq!(instances.len(), 3);
    let third = instances[2].instance_start();
    assert_eq!(third.to_text(), "20240312T013000");
    assert_eq!(third.timezone_offset_seconds(false), -14400);
}

/// Last-Friday-of-month expansion.
#[test]
fn monthly_last_friday() {
    let mut rule = Recurrence::parse("FREQ=MONTHLY;BYDAY=-1FR").unwrap();
    let start = DateTime::parse("20240101T090000Z", false).unwrap();
    let mut items = Vec::new();
    rule.expand(
        &start,
        &window("20240101T000000Z/20240401T000000Z"),
        &mut items,
        0,
        None,
    )
    .unwrap();
    let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
    assert_eq!(
        texts,
        vec!["20240126T090000Z", "20240223T090000Z", "20240329T090000Z"]
    );
}

/// A leap-day rule only fires in leap years.
#[test]
fn yearly_leap_day() {
    let mut rule = Recurrence::parse("FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=29").unwrap();
    let start = DateTime::parse("20200229T000000Z", false).unwrap();
    let mut items = Vec::new();
    rule.expand(
        &start,
        &window("20200101T000000Z/20320101T000000Z"),
        &mut items,
        0,
        None,
    )
    .unwrap();
    let texts: Vec<String> = items.iter().map(DateTime::to_text).collect();
    assert_eq!(
        texts,
        vec!["20200229T000000Z", "20240229T000000Z", "20280229T000000Z"]
    );
}

/// Inside the spring-forward gap the local and UTC interpretations of
/// the probe disagree.
#[test]
fn offset_query_during_transition_gap() {
    let data = format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
         {NEW_YORK_VTIMEZONE}END:VCALENDAR\r\n"
    );
    let calendar = {
        let _guard = db_lock();
        Calendar::parse_str(&data).unwrap()
    };
    let probe = DateTime::parse("20240310T023000", false).unwrap();
    assert_eq!(
        calendar.timezone_offset_seconds("America/New_York", &probe, false),
        -14400
    );
    assert_eq!(
        calendar.timezone_offset_seconds("America/New_York", &probe, true),
        -18000
    );
}

/// Timezone injection modes: a standard zone is skipped by the
/// non-standard mode and injected by the all mode.
#[test]
fn missing_timezone_injection_modes() {
    let _guard = db_lock();

    // Seed a database directory holding a Berlin definition.
    let root = std::env::temp_dir().join(format!("calendar-rs-tzdb-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(root.join("Europe")).unwrap();
    let berlin = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\n\
        BEGIN:STANDARD\r\nDTSTART:19961027T030000\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100\r\n\
        TZNAME:CET\r\nRRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU\r\nEND:STANDARD\r\n\
        BEGIN:DAYLIGHT\r\nDTSTART:19810329T020000\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\n\
        TZNAME:CEST\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU\r\nEND:DAYLIGHT\r\n\
        END:VTIMEZONE\r\nEND:VCALENDAR\r\n";
    std::fs::write(root.join("Europe/Berlin.ics"), berlin).unwrap();
    TimezoneDatabase::create_database(&root);

    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VEVENT\r\nUID:s6\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART;TZID=Europe/Berlin:20240601T100000\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let calendar = Calendar::parse_str(data).unwrap();

    // Berlin resolves through the database, so it is standard and the
    // non-standard mode injects nothing.
    let mut copy = calendar.clone();
    copy.include_missing_timezones(TimezoneInclusion::NonStandard);
    assert!(copy.timezones().is_empty());

    let text = calendar.get_text(TimezoneInclusion::All);
    assert!(text.contains("TZID:Europe/Berlin"));
    // The injected VTIMEZONE leads the emitted component list.
    let vtz_pos = text.find("BEGIN:VTIMEZONE").unwrap();
    let event_pos = text.find("BEGIN:VEVENT").unwrap();
    assert!(vtz_pos < event_pos);

    // Stripping is the inverse of injection for standard zones.
    let mut injected = calendar.clone();
    injected.include_missing_timezones(TimezoneInclusion::All);
    assert_eq!(injected.timezones().len(), 1);
    assert!(injected.strip_standard_timezones());
    assert!(injected.timezones().is_empty());

    TimezoneDatabase::clear_database();
    let _ = std::fs::remove_dir_all(&root);
}

/// Canonicalisation: emission sorts properties and strips a redundant
/// VALUE parameter.
#[test]
fn emission_is_canonical() {
    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VEVENT\r\nSUMMARY:Canonical\r\nUID:c1\r\n\
        DTSTART;VALUE=DATE-TIME:20240310T013000Z\r\nDTSTAMP:20240101T000000Z\r\n\
        END:VEVENT\r\nEND:VCALENDAR\r\n";
    let calendar = Calendar::parse_str(data).unwrap();
    let text = calendar.get_text(TimezoneInclusion::None);
    assert!(text.contains("DTSTART:20240310T013000Z\r\n"));
    let uid_pos = text.find("UID:c1").unwrap();
    let summary_pos = text.find("SUMMARY:Canonical").unwrap();
    assert!(uid_pos < summary_pos, "UID leads the declared sort order");
    // Stable under a second round trip.
    let again = Calendar::parse_str(&text).unwrap().get_text(TimezoneInclusion::None);
    assert_eq!(text, again);
}

/// Every physical line of an emission stays within 75 octets with
/// single-space continuations.
#[test]
fn emitted_lines_are_bounded() {
    let long_summary = "An event description that keeps going ".repeat(8);
    let mut calendar = Calendar::new();
    let mut event = calendar_rs::Component::new(ComponentKind::Vevent);
    event.add_property(Property::new_text("UID", "p3"));
    event.add_property(Property::new_text("SUMMARY", long_summary));
    calendar.add_component(event);
    let text = calendar.get_text(TimezoneInclusion::None);
    for line in text.split("\r\n") {
        assert!(line.len() <= 75, "physical line exceeds 75 octets");
    }
    // Round-trips intact despite the folding.
    let reparsed = Calendar::parse_str(&text).unwrap();
    assert!(calendar.component().same_as(reparsed.component()));
}

/// Exclusion soundness: an EXDATE removes exactly its instance.
#[test]
fn exdate_soundness() {
    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VEVENT\r\nUID:p5\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART:20240101T090000Z\r\nRRULE:FREQ=DAILY;COUNT=5\r\n\
        EXDATE:20240103T090000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let calendar = Calendar::parse_str(data).unwrap();
    let instances = calendar
        .get_vevents(&window("20240101T000000Z/20250101T000000Z"), false)
        .unwrap();
    let starts: Vec<String> = instances
        .iter()
        .map(|i| i.instance_start().to_text())
        .collect();
    assert_eq!(
        starts,
        vec![
            "20240101T090000Z",
            "20240102T090000Z",
            "20240104T090000Z",
            "20240105T090000Z",
        ]
    );
}

/// Timezone sandwiching across a compiled descriptor.
#[test]
fn transition_offsets_sandwich() {
    let data = format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
         {NEW_YORK_VTIMEZONE}END:VCALENDAR\r\n"
    );
    let calendar = {
        let _guard = db_lock();
        Calendar::parse_str(&data).unwrap()
    };
    let vtz = calendar.timezone_component("America/New_York").unwrap();
    let mut descriptor = TimezoneDescriptor::from_component(vtz).unwrap();
    let end = DateTime::parse("20250101T000000", false).unwrap();
    for transition in descriptor.clone().expand_all(None, &end).unwrap() {
        let mut before = transition.utc.clone();
        before.offset_seconds(transition.offset_from - 1);
        before.set_timezone_utc(false);
        assert_eq!(
            descriptor.offset_seconds(&before, false).unwrap(),
            transition.offset_from
        );
        let mut after = transition.utc.clone();
        after.offset_seconds(transition.offset_to);
        after.set_timezone_utc(false);
        assert_eq!(
            descriptor.offset_seconds(&after, false).unwrap(),
            transition.offset_to
        );
    }
}

/// The three renditions describe the same tree.
#[test]
fn format_equivalence() {
    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VEVENT\r\nUID:p2\r\nDTSTAMP:20240101T000000Z\r\n\
        DTSTART:20240310T013000Z\r\nDURATION:PT45M\r\n\
        RRULE:FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10\r\n\
        ATTENDEE;CN=Chair;ROLE=CHAIR:mailto:chair@example.com\r\n\
        CATEGORIES:MEETING,PROJECT\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let calendar = Calendar::parse_str(data).unwrap();
    let from_text = Calendar::parse_str(&calendar.get_text(TimezoneInclusion::None)).unwrap();
    let from_xml = Calendar::parse_xml_str(&calendar.get_text_xml(TimezoneInclusion::None)).unwrap();
    let from_json =
        Calendar::parse_json_str(&calendar.get_text_json(TimezoneInclusion::None)).unwrap();
    assert!(from_text.component().same_as(from_xml.component()));
    assert!(from_text.component().same_as(from_json.component()));
}

/// A stray variant check: parse policies flow through a whole parse.
#[test]
fn lenient_policies_repair_text_escapes() {
    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//scenarios//EN\r\n\
        BEGIN:VEVENT\r\nUID:esc\r\nDTSTAMP:20240101T000000Z\r\n\
        SUMMARY:Time\\: 9am\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let calendar = Calendar::parse_str(data).unwrap();
    let event = &calendar.component().children()[0];
    assert_eq!(event.load_value_string("SUMMARY"), Some("Time: 9am"));
}
