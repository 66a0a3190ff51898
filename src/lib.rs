//! `calendar_rs` reads, manipulates, validates and emits calendar and
//! contact data in three interchangeable renditions: the line-folded
//! text form, the XML form and the JSON array form.
//!
//! The crate centres on three engines:
//!
//! * the recurrence expansion engine ([`recur`]), which turns a
//!   recurrence specification into concrete instance timestamps;
//! * the timezone resolution engine ([`vtimezone`] and [`tzdb`]),
//!   which answers offset and name queries against timezone
//!   descriptors; and
//! * the Olson compiler (the companion `zonal_rs` crate), which turns
//!   zoneinfo source files into those descriptors.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod calendar;
pub mod card;
pub mod component;
pub mod datetime;
pub mod duration;
pub mod error;
pub mod escape;
pub mod expanded;
pub mod gregorian;
pub mod locale;
pub mod parameter;
pub mod parser;
pub mod period;
pub mod property;
pub mod recur;
pub mod timezone;
pub mod tzdb;
pub mod validation;
pub mod value;
pub mod vtimezone;
pub mod xml;

mod jcal;
mod xcal;

pub use calendar::{Calendar, TimezoneInclusion};
pub use card::Card;
pub use component::{Component, ComponentKind};
pub use datetime::{DateTime, Weekday};
pub use duration::Duration;
pub use error::{CalendarError, CalendarResult, ErrorKind};
pub use parameter::Parameter;
pub use parser::{ParserContext, ParserPolicy};
pub use period::Period;
pub use property::Property;
pub use recur::{Frequency, Recurrence, RecurrenceSet};
pub use timezone::Timezone;
pub use tzdb::TimezoneDatabase;
pub use value::{Value, ValueType, Variant};
pub use vtimezone::{OffsetRegime, RegimeKind, TimezoneDescriptor};
