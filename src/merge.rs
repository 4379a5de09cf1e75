//! Reconciles an extracted [`ReportDelta`] into an existing [`Report`].
//!
//! List fields with an identity key (company.name, tools.item, service.task,
//! issues.description, roles.name) deduplicate by normalized edit-distance
//! similarity: an incoming item that is similar enough to an existing one
//! replaces it in place instead of appending, so "water leek" followed by
//! "water leak" ends up as one corrected entry at the same position.

use log::debug;

use crate::report::{Report, ReportDelta};

/// Similarity above which an incoming list item replaces an existing one.
pub const MERGE_THRESHOLD: f64 = 0.6;

/// Case-insensitive normalized Levenshtein similarity in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Merges `delta` into `report` in place.
///
/// Scalars: a non-empty value overwrites, an explicit `""` clears, absent
/// leaves the field untouched. Keyed lists: fuzzy replace-or-append as
/// described above. Plain string lists (people, activities): exact-match
/// dedupe, and the literal "supervisor" is never added as a person. An
/// incoming empty list clears the field unconditionally.
pub fn merge(report: &mut Report, delta: &ReportDelta) {
    merge_scalar(&mut report.site_name, &delta.site_name);
    merge_scalar(&mut report.segment, &delta.segment);
    merge_scalar(&mut report.category, &delta.category);
    merge_scalar(&mut report.time, &delta.time);
    merge_scalar(&mut report.weather, &delta.weather);
    merge_scalar(&mut report.impression, &delta.impression);
    merge_scalar(&mut report.comments, &delta.comments);
    merge_scalar(&mut report.date, &delta.date);

    if let Some(incoming) = &delta.company {
        merge_keyed(&mut report.company, incoming, |entry| &entry.name);
    }
    if let Some(incoming) = &delta.roles {
        merge_keyed(&mut report.roles, incoming, |entry| &entry.name);
    }
    if let Some(incoming) = &delta.tools {
        merge_keyed(&mut report.tools, incoming, |entry| &entry.item);
    }
    if let Some(incoming) = &delta.service {
        merge_keyed(&mut report.service, incoming, |entry| &entry.task);
    }
    if let Some(incoming) = &delta.issues {
        merge_keyed(&mut report.issues, incoming, |entry| &entry.description);
    }

    if let Some(incoming) = &delta.people {
        if incoming.is_empty() {
            report.people.clear();
        } else {
            for name in incoming {
                if name.eq_ignore_ascii_case("supervisor") {
                    continue;
                }
                if !report.people.contains(name) {
                    report.people.push(name.clone());
                }
            }
        }
    }
    if let Some(incoming) = &delta.activities {
        if incoming.is_empty() {
            report.activities.clear();
        } else {
            for activity in incoming {
                if !report.activities.contains(activity) {
                    report.activities.push(activity.clone());
                }
            }
        }
    }
}

fn merge_scalar(current: &mut String, incoming: &Option<String>) {
    if let Some(value) = incoming {
        *current = value.clone();
    }
}

/// Replace-in-place above [`MERGE_THRESHOLD`], otherwise append. An empty
/// incoming slice clears the list (the "field: none" signal).
fn merge_keyed<T: Clone>(existing: &mut Vec<T>, incoming: &[T], key: impl Fn(&T) -> &str) {
    if incoming.is_empty() {
        existing.clear();
        return;
    }
    for item in incoming {
        let incoming_key = key(item);
        let position = existing
            .iter()
            .position(|candidate| similarity(key(candidate), incoming_key) > MERGE_THRESHOLD);
        match position {
            Some(index) => {
                debug!(
                    "fuzzy merge: replacing {:?} with {:?} at index {}",
                    key(&existing[index]),
                    incoming_key,
                    index
                );
                existing[index] = item.clone();
            }
            None => existing.push(item.clone()),
        }
    }
}
