//! Command classification and field-pattern matching for a single fragment.
//!
//! Rules are evaluated in a fixed priority order, and that order is a
//! contract: reset -> undo -> status -> export -> delete ->
//! delete-entire-category -> correct -> clear -> field patterns (site_name,
//! segment, category, impression, people, role, supervisor, company,
//! service, tool, activity, issue, weather, time, comments). Reordering
//! silently changes the outcome for ambiguous inputs, so additions go at the
//! end of their tier. A fragment that matches nothing returns `None` and is
//! handed to the fallback extractor by the engine.
//!
//! Matching never touches a report; every rule only produces a [`Directive`]
//! for the merge/revise engines to apply.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{clean_activity, clean_value, title_case};
use crate::report::{
    CompanyEntry, IssueEntry, ReportDelta, ReportField, RoleEntry, ServiceEntry, ToolEntry,
};
use crate::splitter::FIELD_WORDS;

/// The closed set of instructions extraction can produce for one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Reset,
    Undo,
    Status,
    Export,
    Delete {
        field: ReportField,
        value: Option<String>,
    },
    Correct {
        field: ReportField,
        old: String,
        new: String,
    },
    /// A correction with the old value only; the replacement arrives in the
    /// next message (two-step correction).
    CorrectPrompt {
        field: ReportField,
        old: String,
    },
    Clear {
        field: ReportField,
    },
    Update(ReportDelta),
}

macro_rules! field_regex {
    ($pattern:expr) => {
        Lazy::new(|| Regex::new(&$pattern.replace("{F}", FIELD_WORDS)).unwrap())
    };
}

static RESET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:reset(?:\s+report)?|new\s+report|start\s+(?:over|again|a?\s*new\s+report))[\s.!?]*$").unwrap()
});
static UNDO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^undo(?:\s+last(?:\s+(?:change|command))?)?[\s.!?]*$").unwrap()
});
static STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:status|show\s+report|report\s+status|current\s+report)[\s.!?]*$").unwrap()
});
static EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:export(?:\s+(?:pdf|report))?|send\s+pdf|pdf)[\s.!?]*$").unwrap()
});

static DELETE_PREFIX: Lazy<Regex> =
    field_regex!(r"(?i)^(?:delete|remove)\s+({F})\b\s*(.*?)[.!?]*$");
static DELETE_SUFFIX: Lazy<Regex> =
    field_regex!(r"(?i)^({F})\s+(?:delete|remove)\b\s*(.*?)[.!?]*$");
static DELETE_CATEGORY: Lazy<Regex> =
    field_regex!(r"(?i)^delete\s+entire\s+category\s+({F})[\s.!?]*$");
static CORRECT: Lazy<Regex> =
    field_regex!(r"(?i)^(?:correct|adjust|update|spell)(?:\s+spelling)?(?:\s+of)?\s+({F})\s+(.+?)[.!?]*$");
static CORRECT_TO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+to\s+(.+)$").unwrap());
static CLEAR: Lazy<Regex> = field_regex!(r"(?i)^({F})\s*[:,]?\s*none[\s.!?]*$");

static SITE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:add|insert)\s+(?:site(?:\s*name)?|location)\s+(.+)$").unwrap());
static SITE_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:site(?:\s*name)?|location)\s*:\s*(.+)$").unwrap());
static SITE_PREPOSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:we\s+are\s+|currently\s+|working\s+)?(?:at|in|on)\s+(?:the\s+)?(.+)$")
        .unwrap()
});
/// Words whose presence in a site capture marks it as a misparsed command.
static SITE_FALSE_POSITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:add|insert|delete|remove|correct|none|as|role|new|reset)\b").unwrap()
});

static SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?:add|insert)\s+)?segments?\s*:?\s+(.+)$").unwrap());
static CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?:add|insert)\s+)?categor(?:y|ies)\s*:?\s+(.+)$").unwrap());
static IMPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?impressions?\s*(?::|\s+(?:was|is))?\s*(.+)$").unwrap()
});
static PEOPLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:people|persons?|workers?)\s*:?\s+(.+)$").unwrap()
});
static PERSON_AS_ROLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+as\s+(.+)$").unwrap());
static ROLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:new\s+)?roles?\s*:?\s+(.+?)\s+(?:as|is)\s+(.+)$")
        .unwrap()
});
static SUPERVISOR_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:the\s+)?supervisor\s*(?::|\s+(?:is|was))\s*(.+)$").unwrap()
});
static SUPERVISOR_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:the\s+)?supervisor[\s.!?]*$").unwrap());
static COMPANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:compan(?:y|ies)|firms?)\s*:?\s+(.+)$").unwrap()
});
/// A company capture containing command verbs is a misparsed command, not a
/// company named "delete ...".
static COMPANY_FALSE_POSITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:delete|remove|correct|adjust|reset|undo|none)\b").unwrap()
});
static SERVICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?services?\s*(?::|\s+(?:were|was|are|is))?\s+(.+)$")
        .unwrap()
});
static TOOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:tools?|equipment)\s*:?\s+(.+)$").unwrap()
});
static ACTIVITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?activit(?:y|ies)\s*:?\s+(.+)$").unwrap()
});
static ISSUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:issues?|problems?)\s*:?\s+(.+)$").unwrap()
});
static WEATHER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:add|insert)\s+)?(?:the\s+)?weather\s*(?::|\s+(?:was|is))?\s*(.+)$")
        .unwrap()
});
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?:add|insert)\s+)?time\s*:?\s*(.+)$").unwrap());
static COMMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?:add|insert)\s+)?comments?\s*:?\s+(.+)$").unwrap());

/// A captured value runs until the next "<field>:" token inside the same
/// fragment.
static NEXT_FIELD_TOKEN: Lazy<Regex> =
    field_regex!(r"(?i)\b(?:{F})\s*:");

fn is_none_value(value: &str) -> bool {
    value
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .eq_ignore_ascii_case("none")
}

fn cut_at_next_field(value: &str) -> &str {
    match NEXT_FIELD_TOKEN.find(value) {
        Some(m) => value[..m.start()].trim_end(),
        None => value,
    }
}

fn capture(re: &Regex, fragment: &str, group: usize) -> Option<String> {
    re.captures(fragment)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().trim().to_string())
}

/// Splits a list-valued capture like "crane, hammer and drill" into items.
fn split_list_value(value: &str) -> Vec<String> {
    value
        .split(',')
        .flat_map(|part| part.split(" and "))
        .map(clean_value)
        .filter(|item| !item.is_empty())
        .collect()
}

/// True when the whole text is one of the fixed reset phrases.
pub fn is_reset_phrase(text: &str) -> bool {
    RESET.is_match(text.trim())
}

/// Classifies one fragment. `None` means no local rule matched and the
/// fragment should go to the fallback extractor.
pub fn classify_fragment(fragment: &str) -> Option<Directive> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return None;
    }

    if RESET.is_match(fragment) {
        return Some(Directive::Reset);
    }
    if UNDO.is_match(fragment) {
        return Some(Directive::Undo);
    }
    if STATUS.is_match(fragment) {
        return Some(Directive::Status);
    }
    if EXPORT.is_match(fragment) {
        return Some(Directive::Export);
    }

    for re in [&*DELETE_PREFIX, &*DELETE_SUFFIX] {
        if let Some(caps) = re.captures(fragment) {
            if let Some(field) = ReportField::from_user_word(&caps[1]) {
                let value = caps
                    .get(2)
                    .map(|m| m.as_str().trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
                return Some(Directive::Delete { field, value });
            }
        }
    }
    if let Some(caps) = DELETE_CATEGORY.captures(fragment) {
        if let Some(field) = ReportField::from_user_word(&caps[1]) {
            return Some(Directive::Delete { field, value: None });
        }
    }

    if let Some(caps) = CORRECT.captures(fragment) {
        if let Some(field) = ReportField::from_user_word(&caps[1]) {
            let rest = caps[2].trim();
            return Some(match CORRECT_TO.captures(rest) {
                Some(parts) => Directive::Correct {
                    field,
                    old: parts[1].trim().to_string(),
                    new: parts[2].trim().to_string(),
                },
                None => Directive::CorrectPrompt {
                    field,
                    old: rest.to_string(),
                },
            });
        }
    }

    if let Some(caps) = CLEAR.captures(fragment) {
        if let Some(field) = ReportField::from_user_word(&caps[1]) {
            return Some(Directive::Clear { field });
        }
    }

    match_field_patterns(fragment).map(Directive::Update)
}

/// Positional field patterns, evaluated in the documented order.
fn match_field_patterns(fragment: &str) -> Option<ReportDelta> {
    let mut delta = ReportDelta::default();

    for re in [&*SITE_COMMAND, &*SITE_COLON, &*SITE_PREPOSITION] {
        if let Some(value) = capture(re, fragment, 1) {
            let value = clean_value(cut_at_next_field(&value));
            if SITE_FALSE_POSITIVE.is_match(&value) {
                break;
            }
            if !value.is_empty() {
                delta.site_name = Some(value);
                return Some(delta);
            }
        }
    }

    if let Some(value) = capture(&SEGMENT, fragment, 1) {
        delta.segment = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }
    if let Some(value) = capture(&CATEGORY, fragment, 1) {
        delta.category = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }
    if let Some(value) = capture(&IMPRESSION, fragment, 1) {
        delta.impression = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }

    if let Some(value) = capture(&PEOPLE, fragment, 1) {
        let mut people = Vec::new();
        let mut roles = Vec::new();
        for item in split_list_value(cut_at_next_field(&value)) {
            let (name, role) = match PERSON_AS_ROLE.captures(&item) {
                Some(parts) => (
                    title_case(parts[1].trim()),
                    Some(title_case(parts[2].trim())),
                ),
                None => (title_case(&item), None),
            };
            // "supervisor" is a role keyword, never a person name.
            if name.eq_ignore_ascii_case("supervisor") {
                continue;
            }
            if let Some(role) = role {
                roles.push(RoleEntry {
                    name: name.clone(),
                    role,
                });
            }
            people.push(name);
        }
        if !people.is_empty() {
            delta.people = Some(people);
            if !roles.is_empty() {
                delta.roles = Some(roles);
            }
            return Some(delta);
        }
    }

    if let Some(caps) = ROLE.captures(fragment) {
        let name = title_case(&clean_value(caps[1].trim()));
        let role = title_case(&clean_value(cut_at_next_field(caps[2].trim())));
        if !name.is_empty() && !role.is_empty() {
            delta.roles = Some(vec![RoleEntry {
                name: name.clone(),
                role,
            }]);
            delta.people = Some(vec![name]);
            return Some(delta);
        }
    }

    if let Some(value) = capture(&SUPERVISOR_NAMED, fragment, 1) {
        let name = title_case(&clean_value(cut_at_next_field(&value)));
        if !name.is_empty() {
            delta.roles = Some(vec![RoleEntry {
                name: name.clone(),
                role: "Supervisor".to_string(),
            }]);
            delta.people = Some(vec![name]);
            return Some(delta);
        }
    }
    if SUPERVISOR_BARE.is_match(fragment) {
        delta.roles = Some(vec![RoleEntry {
            name: "User".to_string(),
            role: "Supervisor".to_string(),
        }]);
        return Some(delta);
    }

    if let Some(value) = capture(&COMPANY, fragment, 1) {
        let value = cut_at_next_field(&value).to_string();
        if !COMPANY_FALSE_POSITIVE.is_match(&value) {
            let names = split_list_value(&value);
            if !names.is_empty() {
                delta.company = Some(
                    names
                        .into_iter()
                        .map(|name| CompanyEntry { name })
                        .collect(),
                );
                return Some(delta);
            }
        }
    }

    // For the free-text list fields a literal "none" value clears instead of
    // appending; an empty incoming list is the merge engine's clear signal.
    if let Some(value) = capture(&SERVICE, fragment, 1) {
        delta.service = Some(if is_none_value(&value) {
            Vec::new()
        } else {
            split_list_value(cut_at_next_field(&value))
                .into_iter()
                .map(|task| ServiceEntry { task })
                .collect()
        });
        return Some(delta);
    }
    if let Some(value) = capture(&TOOL, fragment, 1) {
        delta.tools = Some(if is_none_value(&value) {
            Vec::new()
        } else {
            split_list_value(cut_at_next_field(&value))
                .into_iter()
                .map(|item| ToolEntry { item })
                .collect()
        });
        return Some(delta);
    }
    if let Some(value) = capture(&ACTIVITY, fragment, 1) {
        delta.activities = Some(if is_none_value(&value) {
            Vec::new()
        } else {
            split_list_value(cut_at_next_field(&value))
                .into_iter()
                .map(|item| clean_activity(&item))
                .collect()
        });
        return Some(delta);
    }
    if let Some(value) = capture(&ISSUE, fragment, 1) {
        if is_none_value(&value) {
            delta.issues = Some(Vec::new());
            return Some(delta);
        }
        let description = clean_value(cut_at_next_field(&value));
        if !description.is_empty() {
            delta.issues = Some(vec![IssueEntry::new(description)]);
            return Some(delta);
        }
    }

    if let Some(value) = capture(&WEATHER, fragment, 1) {
        delta.weather = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }
    if let Some(value) = capture(&TIME, fragment, 1) {
        delta.time = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }
    if let Some(value) = capture(&COMMENTS, fragment, 1) {
        delta.comments = Some(clean_value(cut_at_next_field(&value)));
        return Some(delta);
    }

    None
}
