//! Olson zoneinfo parsing and compilation into iCalendar timezone
//! components.
//!
//! The pipeline: [`ZonalCompiler`] parses `Rule`, `Zone` and `Link`
//! lines from zoneinfo source files; [`zone::Zone::expand`] turns a
//! zone's continuation lines and their rule sets into a transition
//! list; and the compiler emits each contiguous run of transitions as
//! a STANDARD or DAYLIGHT regime, preferring a compact RRULE and
//! falling back to explicit RDATEs.

use std::io;

pub mod compiler;
pub mod parser;
pub mod rule;
pub mod types;
pub mod zone;

pub use compiler::ZonalCompiler;
pub use parser::ZonalParseError;

/// Well-known zoneinfo source files.
pub const ZONEINFO_FILES: [&str; 9] = [
    "africa",
    "antarctica",
    "asia",
    "australasia",
    "backward",
    "etcetera",
    "europe",
    "northamerica",
    "southamerica",
];

#[derive(Debug)]
pub enum ZonalError {
    Parse(ZonalParseError),
    Io(io::Error),
}

impl From<io::Error> for ZonalError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl core::fmt::Display for ZonalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "parse error: {err}"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for ZonalError {}
