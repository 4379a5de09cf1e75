//! Last-resort extraction for fragments no local rule matched: ask the
//! structured-extraction capability for a JSON delta, clean whatever comes
//! back, and fall back to keyword heuristics when the capability returns
//! nothing usable. This path never fails the message; at worst the fragment
//! lands in `comments`.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::capabilities::{RetryPolicy, StructuredExtractor};
use crate::normalize::{clean_activity, clean_value, title_case};
use crate::report::{IssueEntry, ReportDelta};

/// Fixed instruction describing the report fields and the command grammar.
/// The JSON schema of [`ReportDelta`] is passed alongside it.
pub const EXTRACTION_INSTRUCTIONS: &str = "\
You extract structured construction-site report data from one short chat \
message fragment. Return ONLY a JSON object matching the provided schema; \
omit every field the fragment says nothing about. Field semantics:\n\
- site_name: the construction site or project (often after 'at', 'in', 'on')\n\
- segment, category: which part of the site / kind of work\n\
- time, weather, impression, comments, date: free-text scalars\n\
- company: contractors present, as objects with a 'name'\n\
- people: plain person names; roles: objects binding a 'name' to a 'role'\n\
- tools: objects with 'item'; service: objects with 'task'\n\
- activities: plain strings describing work carried out\n\
- issues: objects with 'description' (required), optional 'caused_by', \
optional 'has_photo'\n\
Users also type commands (add/insert X, delete/remove X, correct X to Y, \
'X: none' to clear, 'new report' to reset); those are handled elsewhere -- \
never encode a command as data. Do not invent values.";

static ISSUE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:issues?|problems?|delays?|faults?|errors?|injur\w*)\b").unwrap());
static ACTIVITY_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:pour\w*|excavat\w*|install\w*|concret\w*|dig\w*|dug|lay\w*|build\w*|built|paint\w*|weld\w*|scaffold\w*|assembl\w*|mason\w*|demolish\w*|drill\w*)")
        .unwrap()
});
static LOCATION_PREPOSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s\b(at|in|on)\b\s").unwrap());

/// Extracts a delta for a fragment the pattern matcher rejected. Returns an
/// empty delta only when the fragment itself is empty.
pub async fn extract_fragment(
    extractor: &dyn StructuredExtractor,
    retry: &RetryPolicy,
    fragment: &str,
) -> ReportDelta {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return ReportDelta::default();
    }

    let schema = match ReportDelta::schema_as_json() {
        Ok(schema) => schema,
        Err(err) => {
            warn!("delta schema generation failed: {}", err);
            return heuristic_delta(fragment, true);
        }
    };
    let prompt = format!("{}\n\nFragment: {}", EXTRACTION_INSTRUCTIONS, fragment);

    let response = retry
        .run("structured extraction", || {
            extractor.extract(&prompt, &schema)
        })
        .await;

    match response {
        Ok(value) => {
            let delta = match serde_json::from_value::<ReportDelta>(value) {
                Ok(delta) => postprocess(delta),
                Err(err) => {
                    warn!("extractor returned malformed delta: {}", err);
                    return heuristic_delta(fragment, true);
                }
            };
            if delta.is_empty() {
                debug!("extractor found nothing; applying heuristics");
                heuristic_delta(fragment, false)
            } else {
                delta
            }
        }
        Err(err) => {
            warn!("structured extraction unavailable: {}", err);
            heuristic_delta(fragment, true)
        }
    }
}

/// Cleans every returned value through the normalizer and synthesizes people
/// entries for roles the model returned without a matching person.
fn postprocess(mut delta: ReportDelta) -> ReportDelta {
    macro_rules! scalar {
        ($member:ident) => {
            if let Some(value) = &delta.$member {
                delta.$member = Some(clean_value(value));
            }
        };
    }
    scalar!(site_name);
    scalar!(segment);
    scalar!(category);
    scalar!(time);
    scalar!(weather);
    scalar!(impression);
    scalar!(comments);
    scalar!(date);

    if let Some(company) = &mut delta.company {
        company.retain_mut(|entry| {
            entry.name = clean_value(&entry.name);
            !entry.name.is_empty()
        });
    }
    if let Some(tools) = &mut delta.tools {
        tools.retain_mut(|entry| {
            entry.item = clean_value(&entry.item);
            !entry.item.is_empty()
        });
    }
    if let Some(service) = &mut delta.service {
        service.retain_mut(|entry| {
            entry.task = clean_value(&entry.task);
            !entry.task.is_empty()
        });
    }
    if let Some(activities) = &mut delta.activities {
        activities.retain_mut(|activity| {
            *activity = clean_activity(activity);
            !activity.is_empty()
        });
    }
    if let Some(issues) = &mut delta.issues {
        issues.retain_mut(|entry| {
            entry.description = clean_value(&entry.description);
            if let Some(caused_by) = &entry.caused_by {
                entry.caused_by = Some(clean_value(caused_by)).filter(|c| !c.is_empty());
            }
            !entry.description.is_empty()
        });
    }
    if let Some(people) = &mut delta.people {
        people.retain_mut(|name| {
            *name = title_case(&clean_value(name));
            !name.is_empty() && !name.eq_ignore_ascii_case("supervisor")
        });
    }
    if let Some(roles) = &mut delta.roles {
        roles.retain_mut(|entry| {
            entry.name = title_case(&clean_value(&entry.name));
            entry.role = title_case(&clean_value(&entry.role));
            !entry.name.is_empty()
        });
        for role in roles.iter() {
            let people = delta.people.get_or_insert_with(Vec::new);
            if role.name.eq_ignore_ascii_case("supervisor") || role.name == "User" {
                continue;
            }
            if !people.contains(&role.name) {
                people.push(role.name.clone());
            }
        }
    }
    delta
}

/// Keyword heuristics for fragments the capability could not classify.
/// `degraded` marks capability failure, where only the issue heuristic and
/// the comments fallback apply.
fn heuristic_delta(fragment: &str, degraded: bool) -> ReportDelta {
    let mut delta = ReportDelta::default();

    if ISSUE_KEYWORDS.is_match(fragment) {
        delta.issues = Some(vec![IssueEntry::new(clean_value(fragment))]);
        return delta;
    }

    if !degraded && ACTIVITY_KEYWORDS.is_match(fragment) {
        if let Some(m) = LOCATION_PREPOSITION.find(fragment) {
            let activity = clean_activity(&fragment[..m.start()]);
            let remainder = fragment[m.end()..].trim().trim_start_matches("the ");
            let site: Vec<&str> = remainder
                .split_whitespace()
                .filter(|word| word.chars().next().is_some_and(char::is_uppercase))
                .collect();
            if !activity.is_empty() {
                delta.activities = Some(vec![activity]);
            }
            if !site.is_empty() {
                delta.site_name = Some(clean_value(&site.join(" ")));
            }
            if !delta.is_empty() {
                return delta;
            }
        }
    }

    delta.comments = Some(clean_value(fragment));
    delta
}
