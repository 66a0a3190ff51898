//! The process-wide timezone database.
//!
//! Resolution order for a TZID: in-memory cache, then an on-demand
//! `.ics` load from the configured filesystem root. Paths are
//! confined to the root; a TZID whose normalised path escapes it is
//! treated as unresolvable without touching the filesystem.

use std::collections::HashSet;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::calendar::Calendar;
use crate::component::{Component, ComponentKind};
use crate::datetime::DateTime;
use crate::error::{CalendarError, CalendarResult};
use crate::vtimezone::TimezoneDescriptor;

static DATABASE: LazyLock<Mutex<TimezoneDatabase>> =
    LazyLock::new(|| Mutex::new(TimezoneDatabase::new()));

fn database() -> MutexGuard<'static, TimezoneDatabase> {
    DATABASE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// On-demand timezone cache backed by a directory of `.ics` files.
#[derive(Debug, Default)]
pub struct TimezoneDatabase {
    dbpath: Option<PathBuf>,
    descriptors: IndexMap<String, Option<TimezoneDescriptor>>,
    standard: HashSet<String>,
    not_standard: HashSet<String>,
}

impl TimezoneDatabase {
    fn new() -> Self {
        Self::default()
    }

    /// Install a filesystem root for on-demand loading, clearing all
    /// cached state.
    pub fn create_database<P: Into<PathBuf>>(dbpath: P) {
        let mut db = database();
        db.dbpath = Some(dbpath.into());
        db.descriptors.clear();
        db.standard.clear();
        db.not_standard.clear();
    }

    /// Drop every cached descriptor and the filesystem root.
    pub fn clear_database() {
        let mut db = database();
        db.dbpath = None;
        db.descriptors.clear();
        db.standard.clear();
        db.not_standard.clear();
    }

    /// The UTC offset for `tzid` at `dt`, or zero when the zone is
    /// unknown.
    #[must_use]
    pub fn timezone_offset_seconds(tzid: &str, dt: &DateTime, relative_to_utc: bool) -> i64 {
        let mut db = database();
        match db.get(tzid) {
            Some(descriptor) => descriptor
                .offset_seconds(dt, relative_to_utc)
                .unwrap_or_default(),
            None => 0,
        }
    }

    /// The display descriptor for `tzid` at `dt`, or empty when the
    /// zone is unknown.
    #[must_use]
    pub fn timezone_descriptor(tzid: &str, dt: &DateTime) -> String {
        let mut db = database();
        match db.get(tzid) {
            Some(descriptor) => descriptor.descriptor(dt).unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Whether `tzid` resolves through the database root (as opposed
    /// to a merged in-memory component).
    #[must_use]
    pub fn is_standard_timezone(tzid: &str) -> bool {
        let mut db = database();
        if db.standard.contains(tzid) {
            return true;
        }
        if db.not_standard.contains(tzid) {
            return false;
        }
        let _ = db.get(tzid);
        db.standard.contains(tzid)
    }

    #[must_use]
    pub fn has_timezone(tzid: &str) -> bool {
        database().get(tzid).is_some()
    }

    /// A copy of the VTIMEZONE for injection into a calendar.
    #[must_use]
    pub fn timezone_component(tzid: &str) -> Option<Component> {
        database()
            .get(tzid)
            .map(|descriptor| descriptor.component().clone())
    }

    /// Merge VTIMEZONE components from a parsed calendar. Merging is
    /// idempotent: an identifier already present is skipped.
    pub fn merge_timezones<'a, I: IntoIterator<Item = &'a Component>>(timezones: I) {
        let mut db = database();
        for component in timezones {
            if component.kind() != &ComponentKind::Vtimezone {
                continue;
            }
            let Some(tzid) = component.load_value_string("TZID") else {
                continue;
            };
            if db.get(tzid).is_some() {
                continue;
            }
            db.add_in_memory(component);
        }
    }

    fn add_in_memory(&mut self, component: &Component) {
        match TimezoneDescriptor::from_component(component) {
            Ok(descriptor) => {
                log::debug!("caching in-memory timezone {}", descriptor.id());
                self.not_standard.insert(descriptor.id().to_owned());
                self.descriptors
                    .insert(descriptor.id().to_owned(), Some(descriptor));
            }
            Err(err) => {
                log::warn!("ignoring unusable VTIMEZONE: {err}");
            }
        }
    }

    fn get(&mut self, tzid: &str) -> Option<&mut TimezoneDescriptor> {
        if !self.descriptors.contains_key(tzid) {
            let loaded = self.load_from_disk(tzid);
            match loaded {
                Ok(descriptor) => {
                    self.standard.insert(tzid.to_owned());
                    self.descriptors.insert(tzid.to_owned(), Some(descriptor));
                }
                Err(err) => {
                    log::debug!("timezone {tzid} not resolvable: {err}");
                    self.not_standard.insert(tzid.to_owned());
                    self.descriptors.insert(tzid.to_owned(), None);
                }
            }
        }
        self.descriptors.get_mut(tzid).and_then(Option::as_mut)
    }

    fn load_from_disk(&self, tzid: &str) -> CalendarResult<TimezoneDescriptor> {
        let root = self
            .dbpath
            .as_ref()
            .ok_or_else(|| CalendarError::no_timezone().with_message("no database root"))?;
        let path = confine_to_root(root, tzid).ok_or_else(|| {
            CalendarError::no_timezone()
                .with_message("timezone path escapes the database root")
                .with_data(tzid)
        })?;
        if !path.is_file() {
            return Err(CalendarError::no_timezone()
                .with_message("no such timezone file")
                .with_data(tzid));
        }
        let data = std::fs::read_to_string(&path).map_err(|_| {
            CalendarError::no_timezone()
                .with_message("unable to read timezone file")
                .with_data(tzid)
        })?;
        let calendar = Calendar::parse_str_without_merge(&data).map_err(|_| {
            CalendarError::no_timezone()
                .with_message("bad timezone data")
                .with_data(tzid)
        })?;
        let component = calendar
            .timezone_component(tzid)
            .ok_or_else(|| {
                CalendarError::no_timezone()
                    .with_message("file does not define the requested TZID")
                    .with_data(tzid)
            })?
            .clone();
        log::debug!("loaded timezone {tzid} from {}", path.display());
        TimezoneDescriptor::from_component(&component)
    }
}

/// Resolve `<root>/<tzid>.ics`, normalising away `.`/`..` segments.
/// Returns `None` when the normalised path leaves `root`.
fn confine_to_root(root: &Path, tzid: &str) -> Option<PathBuf> {
    let candidate = root.join(format!("{tzid}.ics"));
    let mut normalised = PathBuf::new();
    for part in candidate.components() {
        match part {
            PathComponent::CurDir => {}
            PathComponent::ParentDir => {
                if !normalised.pop() {
                    return None;
                }
            }
            other => normalised.push(other),
        }
    }
    normalised.starts_with(root).then_some(normalised)
}

#[cfg(test)]
pub(crate) fn test_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confinement_rejects_escapes() {
        let root = Path::new("/var/zoneinfo");
        assert!(confine_to_root(root, "America/New_York").is_some());
        assert!(confine_to_root(root, "../etc/passwd").is_none());
        assert!(confine_to_root(root, "a/../../b").is_none());
        // Within-root dot segments are fine.
        assert!(confine_to_root(root, "a/../b").is_some());
    }

    #[test]
    fn escape_yields_no_timezone_without_reading() {
        let db = TimezoneDatabase {
            dbpath: Some(PathBuf::from("/nonexistent-root")),
            ..TimezoneDatabase::default()
        };
        let err = db.load_from_disk("../../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoTimezoneInDatabase);
    }

    #[test]
    fn merge_is_idempotent() {
        let _guard = test_lock();
        let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\n\
                    BEGIN:VTIMEZONE\r\nTZID:Test/Merge\r\n\
                    BEGIN:STANDARD\r\nDTSTART:19700101T000000\r\n\
                    TZOFFSETFROM:+0100\r\nTZOFFSETTO:+0100\r\nEND:STANDARD\r\n\
                    END:VTIMEZONE\r\nEND:VCALENDAR\r\n";
        let calendar = Calendar::parse_str(data).unwrap();
        assert!(TimezoneDatabase::has_timezone("Test/Merge"));
        // A second merge of the same identifier is a no-op.
        TimezoneDatabase::merge_timezones(
            calendar.timezones().into_iter(),
        );
        assert!(!TimezoneDatabase::is_standard_timezone("Test/Merge"));
    }
}
