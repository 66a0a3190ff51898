//! Compare the expanded transitions of two timezone hierarchies.
//!
//! Each directory may hold either Olson source files or a tree of
//! compiled `.ics` files; the symmetric difference of the transition
//! tuples is printed per TZID.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use calendar_rs::vtimezone::TimezoneDescriptor;
use calendar_rs::{Calendar, DateTime};
use clap::Parser;
use zonal_rs::ZonalCompiler;

#[derive(Parser)]
#[command(about = "Expand two zoneinfo hierarchies and print differing transitions")]
struct Args {
    /// Print the full expansions being compared.
    #[arg(short)]
    verbose: bool,

    /// Only print differences.
    #[arg(short)]
    quiet: bool,

    /// First year to expand.
    #[arg(long, default_value_t = 1933)]
    start: i64,

    /// End year (exclusive).
    #[arg(long, default_value_t = 2038)]
    end: i64,

    dir1: PathBuf,
    dir2: PathBuf,
}

/// One side of the comparison: Olson sources or compiled calendars.
enum Hierarchy {
    Zones(ZonalCompiler),
    Calendars(BTreeMap<String, TimezoneDescriptor>),
}

/// A transition rendered for set comparison.
type Tuple = (String, i64, i64);

impl Hierarchy {
    fn load(dir: &Path) -> Result<Self, String> {
        let mut ics_paths = Vec::new();
        scan_for_ics(dir, &mut ics_paths);
        if ics_paths.is_empty() {
            let compiler = ZonalCompiler::from_directory(dir)
                .map_err(|err| format!("{}: {err}", dir.display()))?;
            return Ok(Self::Zones(compiler));
        }
        let mut descriptors = BTreeMap::new();
        for path in ics_paths {
            let data = std::fs::read_to_string(&path)
                .map_err(|err| format!("{}: {err}", path.display()))?;
            let calendar = Calendar::parse_str(&data)
                .map_err(|err| format!("{}: {err}", path.display()))?;
            for vtz in calendar.timezones() {
                let descriptor = TimezoneDescriptor::from_component(vtz)
                    .map_err(|err| format!("{}: {err}", path.display()))?;
                descriptors.insert(descriptor.id().to_owned(), descriptor);
            }
        }
        Ok(Self::Calendars(descriptors))
    }

    fn tzids(&self) -> BTreeSet<String> {
        match self {
            Self::Zones(compiler) => compiler
                .zone_names()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            Self::Calendars(descriptors) => descriptors.keys().cloned().collect(),
        }
    }

    fn expand(&mut self, tzid: &str, start: i64, end: i64) -> BTreeSet<Tuple> {
        match self {
            Self::Zones(compiler) => compiler
                .expand_zone(tzid, start, end)
                .unwrap_or_default()
                .into_iter()
                .map(|(dt, from, to)| (dt.to_text(), from, to))
                .collect(),
            Self::Calendars(descriptors) => {
                let Some(descriptor) = descriptors.get_mut(tzid) else {
                    return BTreeSet::new();
                };
                let mut bound = DateTime::new_date(end, 1, 1);
                bound.set_date_only(false);
                descriptor
                    .expand_all(None, &bound)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|t| t.local.year() >= start)
                    .map(|t| (t.local.to_text(), t.offset_from, t.offset_to))
                    .collect()
            }
        }
    }
}

fn scan_for_ics(dir: &Path, paths: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_for_ics(&path, paths);
        } else if path.extension().is_some_and(|ext| ext == "ics") {
            paths.push(path);
        }
    }
}

fn format_tuples(tuples: &BTreeSet<Tuple>) -> String {
    tuples
        .iter()
        .map(|(dt, from, to)| format!("({dt} {from}->{to})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut side1 = match Hierarchy::load(&args.dir1) {
        Ok(side) => side,
        Err(err) => {
            eprintln!("tzverify: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut side2 = match Hierarchy::load(&args.dir2) {
        Ok(side) => side,
        Err(err) => {
            eprintln!("tzverify: {err}");
            return ExitCode::FAILURE;
        }
    };

    let tzids1 = side1.tzids();
    let tzids2 = side2.tzids();
    let missing: Vec<&String> = tzids1.difference(&tzids2).collect();
    if !missing.is_empty() {
        println!(
            "TZIDs in hierarchy 1 not in hierarchy 2 (skipped): {}",
            missing
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut differences = 0usize;
    for tzid in tzids1.intersection(&tzids2) {
        if !args.quiet {
            println!("Checking TZID: {tzid}");
        }
        let set1 = side1.expand(tzid, args.start, args.end);
        let set2 = side2.expand(tzid, args.start, args.end);
        if args.verbose {
            println!("Hierarchy 1: {}", format_tuples(&set1));
            println!("Hierarchy 2: {}", format_tuples(&set2));
        }
        let only1: BTreeSet<Tuple> = set1.difference(&set2).cloned().collect();
        let only2: BTreeSet<Tuple> = set2.difference(&set1).cloned().collect();
        if !only1.is_empty() {
            differences += only1.len();
            println!("In 1 but not 2, tzid={tzid}: {}", format_tuples(&only1));
        }
        if !only2.is_empty() {
            differences += only2.len();
            println!("In 2 but not 1, tzid={tzid}: {}", format_tuples(&only2));
        }
    }
    if differences == 0 {
        if !args.quiet {
            println!("All transitions match");
        }
        ExitCode::SUCCESS
    } else {
        println!("{differences} differing transitions");
        ExitCode::FAILURE
    }
}
