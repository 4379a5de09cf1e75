//! Removes or rewrites report entries matched fuzzily against a user-given
//! value. Delete and correct use a stricter similarity cutoff than merge-time
//! dedupe: touching existing data on a loose match is worse than asking the
//! user to repeat themselves.

use log::debug;

use crate::merge::similarity;
use crate::report::{Report, ReportField};

/// Similarity above which delete/correct treats an entry as the target.
pub const REVISE_THRESHOLD: f64 = 0.7;

fn matches(existing: &str, target: &str) -> bool {
    similarity(existing, target) > REVISE_THRESHOLD
}

/// Deletes entries from `field`. With a value, removes fuzzy matches; without
/// one, clears the whole field. Scalars with a value are only cleared when
/// the current content actually resembles it.
///
/// Role deletions prune people that lose their last role binding; people who
/// never had a binding are kept (they were added independently of any role).
pub fn delete_entry(report: &mut Report, field: ReportField, value: Option<&str>) {
    debug!("delete {} value={:?}", field.canonical_name(), value);
    match field {
        ReportField::Company => retain_unmatched(&mut report.company, value, |e| &e.name),
        ReportField::Tools => retain_unmatched(&mut report.tools, value, |e| &e.item),
        ReportField::Service => retain_unmatched(&mut report.service, value, |e| &e.task),
        ReportField::Issues => retain_unmatched(&mut report.issues, value, |e| &e.description),
        ReportField::Activities => retain_unmatched(&mut report.activities, value, |e| e),
        ReportField::Roles => {
            let bound_before: Vec<String> =
                report.roles.iter().map(|r| r.name.clone()).collect();
            retain_unmatched(&mut report.roles, value, |e| &e.name);
            prune_unbound_people(report, &bound_before);
        }
        ReportField::People => {
            match value {
                Some(target) => {
                    report.people.retain(|name| !matches(name, target));
                    report.roles.retain(|role| !matches(&role.name, target));
                }
                None => report.people.clear(),
            };
        }
        scalar => {
            let current = scalar_value(report, scalar);
            let should_clear = match value {
                Some(target) => matches(&current, target),
                None => true,
            };
            if should_clear {
                report.clear_field(scalar);
            }
        }
    }
}

/// Rewrites entries of `field` whose identity value resembles `old`, setting
/// it to `new` and preserving co-located attributes. Scalars are rewritten
/// unconditionally.
pub fn correct_entry(report: &mut Report, field: ReportField, old: &str, new: &str) {
    debug!(
        "correct {} {:?} -> {:?}",
        field.canonical_name(),
        old,
        new
    );
    match field {
        ReportField::Company => {
            rewrite(&mut report.company, old, new, |e| &mut e.name);
        }
        ReportField::Tools => {
            rewrite(&mut report.tools, old, new, |e| &mut e.item);
        }
        ReportField::Service => {
            rewrite(&mut report.service, old, new, |e| &mut e.task);
        }
        ReportField::Issues => {
            rewrite(&mut report.issues, old, new, |e| &mut e.description);
        }
        ReportField::Activities => {
            rewrite(&mut report.activities, old, new, |e| e);
        }
        ReportField::People => {
            rewrite(&mut report.people, old, new, |e| e);
        }
        ReportField::Roles => {
            let changed = rewrite(&mut report.roles, old, new, |e| &mut e.name);
            if changed && !report.people.iter().any(|name| name == new) {
                report.people.push(new.to_string());
            }
        }
        scalar => {
            set_scalar(report, scalar, new);
        }
    }
}

fn retain_unmatched<T>(entries: &mut Vec<T>, value: Option<&str>, key: impl Fn(&T) -> &str) {
    match value {
        Some(target) => entries.retain(|entry| !matches(key(entry), target)),
        None => entries.clear(),
    }
}

/// Removes people who were bound to a role before a role deletion and retain
/// no binding afterwards.
fn prune_unbound_people(report: &mut Report, bound_before: &[String]) {
    report.people.retain(|person| {
        let was_bound = bound_before.iter().any(|name| name == person);
        let still_bound = report.roles.iter().any(|role| &role.name == person);
        !was_bound || still_bound
    });
}

fn rewrite<T>(entries: &mut [T], old: &str, new: &str, key: impl Fn(&mut T) -> &mut String) -> bool {
    let mut changed = false;
    for entry in entries.iter_mut() {
        let identity = key(entry);
        if matches(identity, old) {
            *identity = new.to_string();
            changed = true;
        }
    }
    changed
}

fn scalar_value(report: &Report, field: ReportField) -> String {
    match field {
        ReportField::SiteName => report.site_name.clone(),
        ReportField::Segment => report.segment.clone(),
        ReportField::Category => report.category.clone(),
        ReportField::Time => report.time.clone(),
        ReportField::Weather => report.weather.clone(),
        ReportField::Impression => report.impression.clone(),
        ReportField::Comments => report.comments.clone(),
        ReportField::Date => report.date.clone(),
        _ => String::new(),
    }
}

fn set_scalar(report: &mut Report, field: ReportField, value: &str) {
    let slot = match field {
        ReportField::SiteName => &mut report.site_name,
        ReportField::Segment => &mut report.segment,
        ReportField::Category => &mut report.category,
        ReportField::Time => &mut report.time,
        ReportField::Weather => &mut report.weather,
        ReportField::Impression => &mut report.impression,
        ReportField::Comments => &mut report.comments,
        ReportField::Date => &mut report.date,
        _ => return,
    };
    *slot = value.to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{RoleEntry, ToolEntry};

    fn report_with_tools(items: &[&str]) -> Report {
        let mut report = Report::default();
        for item in items {
            report.tools.push(ToolEntry {
                item: item.to_string(),
            });
        }
        report
    }

    #[test]
    fn test_delete_without_value_clears_field() {
        let mut report = report_with_tools(&["Crane", "Drill"]);
        delete_entry(&mut report, ReportField::Tools, None);
        assert!(report.tools.is_empty());
    }

    #[test]
    fn test_delete_with_value_uses_threshold() {
        let mut report = report_with_tools(&["Crane"]);
        delete_entry(&mut report, ReportField::Tools, Some("Bulldozer"));
        assert_eq!(report.tools.len(), 1, "dissimilar value must not delete");

        delete_entry(&mut report, ReportField::Tools, Some("Cran"));
        assert!(report.tools.is_empty(), "near match must delete");
    }

    #[test]
    fn test_scalar_delete_gated_by_similarity() {
        let mut report = Report::default();
        report.site_name = "Downtown".into();

        delete_entry(&mut report, ReportField::SiteName, Some("Airport"));
        assert_eq!(report.site_name, "Downtown");

        delete_entry(&mut report, ReportField::SiteName, Some("Downtwn"));
        assert_eq!(report.site_name, "");

        report.weather = "cloudy".into();
        delete_entry(&mut report, ReportField::Weather, None);
        assert_eq!(report.weather, "");
    }

    #[test]
    fn test_role_delete_prunes_newly_unbound_people() {
        let mut report = Report::default();
        report.people = vec!["Anna".into(), "Bob".into(), "Carl".into()];
        report.roles = vec![
            RoleEntry {
                name: "Anna".into(),
                role: "Engineer".into(),
            },
            RoleEntry {
                name: "Bob".into(),
                role: "Foreman".into(),
            },
        ];

        delete_entry(&mut report, ReportField::Roles, Some("Anna"));

        assert_eq!(report.roles.len(), 1);
        // Anna lost her only binding; Bob keeps his; Carl never had one.
        assert_eq!(report.people, vec!["Bob".to_string(), "Carl".to_string()]);
    }

    #[test]
    fn test_people_delete_removes_person_and_roles() {
        let mut report = Report::default();
        report.people = vec!["Anna".into(), "Bob".into()];
        report.roles = vec![RoleEntry {
            name: "Anna".into(),
            role: "Engineer".into(),
        }];

        delete_entry(&mut report, ReportField::People, Some("Ana"));

        assert_eq!(report.people, vec!["Bob".to_string()]);
        assert!(report.roles.is_empty());
    }

    #[test]
    fn test_correct_rewrites_in_place_preserving_attributes() {
        let mut report = Report::default();
        report.roles = vec![RoleEntry {
            name: "Anan".into(),
            role: "Engineer".into(),
        }];
        report.people = vec!["Anan".into()];

        correct_entry(&mut report, ReportField::Roles, "Anan", "Anna");

        assert_eq!(report.roles[0].name, "Anna");
        assert_eq!(report.roles[0].role, "Engineer");
        assert!(report.people.contains(&"Anna".to_string()));
    }

    #[test]
    fn test_correct_scalar_unconditional() {
        let mut report = Report::default();
        report.site_name = "Downtown".into();
        correct_entry(&mut report, ReportField::SiteName, "anything", "Uptown");
        assert_eq!(report.site_name, "Uptown");
    }

    #[test]
    fn test_correct_ignores_dissimilar_entries() {
        let mut report = report_with_tools(&["Crane", "Drill"]);
        correct_entry(&mut report, ReportField::Tools, "Cran", "Tower Crane");
        assert_eq!(report.tools[0].item, "Tower Crane");
        assert_eq!(report.tools[1].item, "Drill");
    }
}
