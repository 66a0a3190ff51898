//! Per-component cardinality checks and value predicates.

use crate::component::{Component, ComponentKind};
use crate::property::Property;
use crate::value::{Value, Variant};

/// A value predicate from the per-name check table.
#[derive(Debug, Clone, Copy)]
pub enum ValueCheck {
    NumericRange(i64, i64),
    PositiveIntegerOrZero,
    AlwaysUtc,
    ExactText(&'static str),
}

impl ValueCheck {
    fn test(self, property: &Property) -> bool {
        match self {
            Self::NumericRange(low, high) => property
                .integer_value()
                .is_some_and(|value| (low..=high).contains(&value)),
            Self::PositiveIntegerOrZero => {
                property.integer_value().is_some_and(|value| value >= 0)
            }
            Self::AlwaysUtc => property
                .datetime_value()
                .is_some_and(|dt| dt.zone().is_utc()),
            Self::ExactText(expected) => property
                .text_value()
                .is_some_and(|text| text.eq_ignore_ascii_case(expected)),
        }
    }
}

/// The per-name value checks for a container dialect.
#[must_use]
pub fn value_check(variant: Variant, name: &str) -> Option<ValueCheck> {
    match variant {
        Variant::ICalendar => match name {
            "PRIORITY" => Some(ValueCheck::NumericRange(0, 9)),
            "PERCENT-COMPLETE" => Some(ValueCheck::NumericRange(0, 100)),
            "REPEAT" | "SEQUENCE" => Some(ValueCheck::PositiveIntegerOrZero),
            "COMPLETED" | "CREATED" | "DTSTAMP" | "LAST-MODIFIED" => Some(ValueCheck::AlwaysUtc),
            "VERSION" => Some(ValueCheck::ExactText("2.0")),
            "CALSCALE" => Some(ValueCheck::ExactText("GREGORIAN")),
            _ => None,
        },
        Variant::VCard => match name {
            "VERSION" => Some(ValueCheck::ExactText("3.0")),
            _ => None,
        },
    }
}

/// Walk the tree depth-first, producing repaired and outstanding
/// diagnostics. With `do_fix`, trivially repairable problems mutate
/// the tree.
pub fn validate(
    component: &mut Component,
    variant: Variant,
    do_fix: bool,
) -> (Vec<String>, Vec<String>) {
    let mut fixed = Vec::new();
    let mut unfixed = Vec::new();
    validate_into(component, variant, do_fix, &mut fixed, &mut unfixed);
    (fixed, unfixed)
}

fn validate_into(
    component: &mut Component,
    variant: Variant,
    do_fix: bool,
    fixed: &mut Vec<String>,
    unfixed: &mut Vec<String>,
) {
    let kind = component.kind().clone();
    let type_name = kind.name().to_owned();

    for name in kind.cardinality_1() {
        if component.count_property(name) != 1 {
            unfixed.push(format!(
                "[{type_name}] Missing or too many required property: {name}"
            ));
        }
    }
    for name in kind.cardinality_1_fix_empty() {
        let count = component.count_property(name);
        if count > 1 {
            unfixed.push(format!("[{type_name}] Too many required property: {name}"));
        } else if count == 0 {
            let problem = format!("[{type_name}] Missing required property: {name}");
            if do_fix {
                component.add_property(Property::new_text(*name, ""));
                fixed.push(problem);
            } else {
                unfixed.push(problem);
            }
        }
    }
    for name in kind.cardinality_0_1() {
        if component.count_property(name) > 1 {
            unfixed.push(format!("[{type_name}] Too many properties present: {name}"));
        }
    }
    for name in kind.cardinality_1_more() {
        if component.count_property(name) == 0 {
            unfixed.push(format!("[{type_name}] Missing required property: {name}"));
        }
    }

    if kind.status_fix() {
        check_status(component, &type_name, do_fix, fixed, unfixed);
    }

    if kind == ComponentKind::Vevent
        && component.has_property("DTEND")
        && component.has_property("DURATION")
    {
        let problem =
            format!("[{type_name}] Properties must not both be present: DTEND, DURATION");
        if do_fix {
            component.remove_properties("DTEND");
            fixed.push(problem);
        } else {
            unfixed.push(problem);
        }
    }

    if kind.is_recurring() {
        check_until_precision(component, &type_name, do_fix, fixed, unfixed);
    }

    if kind == ComponentKind::Vtimezone {
        let has_regime = component.children().iter().any(|child| {
            matches!(
                child.kind(),
                ComponentKind::Standard | ComponentKind::Daylight
            )
        });
        if !has_regime {
            unfixed.push(format!(
                "[{type_name}] At least one component must be present: STANDARD or DAYLIGHT"
            ));
        }
    }

    for properties in component.properties().values() {
        for property in properties {
            let name = property.upper_name();
            if let Some(check) = value_check(variant, &name) {
                if !check.test(property) {
                    unfixed.push(format!("[{type_name}] Property value incorrect: {name}"));
                }
            }
        }
    }

    for child in component.children_mut() {
        validate_into(child, variant, do_fix, fixed, unfixed);
    }
}

/// Duplicate STATUS repairs to a single CANCELLED when one is present.
fn check_status(
    component: &mut Component,
    type_name: &str,
    do_fix: bool,
    fixed: &mut Vec<String>,
    unfixed: &mut Vec<String>,
) {
    if component.count_property("STATUS") <= 1 {
        return;
    }
    let problem = format!("[{type_name}] Too many properties: STATUS");
    if !do_fix {
        unfixed.push(problem);
        return;
    }
    let has_cancelled = component.properties_of("STATUS").iter().any(|property| {
        property
            .text_value()
            .is_some_and(|text| text.eq_ignore_ascii_case("CANCELLED"))
    });
    if has_cancelled {
        component.remove_properties("STATUS");
        component.add_property(Property::new_text("STATUS", "CANCELLED"));
        fixed.push(problem);
    } else {
        unfixed.push(problem);
    }
}

/// A date-only UNTIL against a date-time DTSTART is repaired by
/// coercing the UNTIL to the start's precision, in UTC.
fn check_until_precision(
    component: &mut Component,
    type_name: &str,
    do_fix: bool,
    fixed: &mut Vec<String>,
    unfixed: &mut Vec<String>,
) {
    let Some(start) = component.load_value_datetime("DTSTART").cloned() else {
        return;
    };
    let start_utc = start.duplicate_as_utc();
    let Some(rules) = component.properties_of_mut("RRULE") else {
        return;
    };
    for property in rules.iter_mut() {
        let Some(rule) = property.recurrence_value() else {
            continue;
        };
        let Some(until) = rule.until() else { continue };
        if until.is_date_only() == start.is_date_only() {
            continue;
        }
        let problem = format!("[{type_name}] Value types must match: DTSTART, UNTIL");
        if !do_fix {
            unfixed.push(problem);
            continue;
        }
        let mut rule = rule.clone();
        let mut until = rule.until().cloned().expect("until checked above");
        until.set_date_only(start.is_date_only());
        if !start.is_date_only() {
            until.set_hhmmss(start_utc.hours(), start_utc.minutes(), start_utc.seconds());
            until.set_timezone_utc(true);
        }
        rule.set_until(Some(until));
        property.set_value(Value::Recur(rule));
        fixed.push(problem);
    }
}
