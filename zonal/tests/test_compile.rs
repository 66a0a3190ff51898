//! End-to-end compilation: Olson sources to an on-disk zoneinfo tree.

use calendar_rs::Calendar;
use zonal_rs::ZonalCompiler;

const SOURCE: &str = "\
Rule\tUS\t2007\tmax\t-\tMar\tSun>=8\t2:00\t1:00\tD
Rule\tUS\t2007\tmax\t-\tNov\tSun>=1\t2:00\t0\tS

Zone America/New_York\t-4:56:02 -\tLMT\t1883 Nov 18 17:00u
\t\t\t-5:00\tUS\tE%sT

Link\tAmerica/New_York\tUS/Eastern
";

#[test]
fn writes_zoneinfo_tree_with_links() {
    let mut compiler = ZonalCompiler::new();
    compiler.parse_str(SOURCE).unwrap();

    let outdir = std::env::temp_dir().join(format!("zonal-rs-out-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&outdir);
    compiler.write_zoneinfo(&outdir, 2000, 2030).unwrap();

    let zone_path = outdir.join("America/New_York.ics");
    let data = std::fs::read_to_string(&zone_path).unwrap();
    assert!(data.starts_with("BEGIN:VCALENDAR"));
    assert!(data.contains("TZID:America/New_York"));
    assert!(data.contains("RRULE:FREQ=YEARLY;BYDAY=2SU;BYMONTH=3"));

    // The written calendar parses back cleanly.
    let calendar = Calendar::parse_str(&data).unwrap();
    assert_eq!(calendar.timezones().len(), 1);

    // The link is resolved by textual substitution.
    let alias = std::fs::read_to_string(outdir.join("US/Eastern.ics")).unwrap();
    assert!(alias.contains("TZID:US/Eastern"));
    assert!(!alias.contains("America/New_York"));

    let links = std::fs::read_to_string(outdir.join("links.txt")).unwrap();
    assert_eq!(links.trim(), "US/Eastern\tAmerica/New_York");

    let _ = std::fs::remove_dir_all(&outdir);
}
