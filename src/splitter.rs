//! Splits a raw inbound message into independently-matchable command
//! fragments.
//!
//! A comma only splits when the text after it starts a new command
//! ("add <field> ...", "<field>: ...", or a bare "issue ..." report);
//! commas inside values ("tools: crane, hammer" stays one fragment) are
//! preserved. Sentence-ending periods followed by a capital letter also
//! split.

use once_cell::sync::Lazy;
use regex::Regex;

/// Every word the matcher recognizes as a field token, as one alternation.
pub(crate) const FIELD_WORDS: &str = "site name|sitename|site|location|segments?|categor(?:y|ies)|time|weather|impressions?|comments?|date|compan(?:y|ies)|firms?|people|persons?|workers?|roles?|architect|engineer|supervisor|foreman|tools?|equipment|services?|activit(?:y|ies)|issues?|problems?";

static COMMA_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i),\s*((?:add|insert)\s+(?:{f})\b|(?:{f})\s*:|(?:issues?|problems?)\s+\S)",
        f = FIELD_WORDS
    ))
    .unwrap()
});

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+([A-ZÀ-Þ])").unwrap());

pub fn split_message(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    for sentence in split_at(text, &SENTENCE_SPLIT) {
        for fragment in split_at(&sentence, &COMMA_SPLIT) {
            let fragment = fragment.trim().trim_matches(',').trim();
            if !fragment.is_empty() {
                fragments.push(fragment.to_string());
            }
        }
    }
    fragments
}

/// Splits `text` so that each new piece begins at the start of capture
/// group 1 of `re` (the recognized command head); the separator itself is
/// dropped from the preceding piece.
fn split_at(text: &str, re: &Regex) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("match always has group 0");
        let head = caps.get(1).expect("split regex always captures group 1");
        pieces.push(text[start..whole.start()].to_string());
        start = head.start();
    }
    pieces.push(text[start..].to_string());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_before_add_field() {
        let fragments =
            split_message("add site Downtown Project, add people Anna as engineer, issue water leakage");
        assert_eq!(
            fragments,
            vec![
                "add site Downtown Project",
                "add people Anna as engineer",
                "issue water leakage"
            ]
        );
    }

    #[test]
    fn test_splits_before_colon_field() {
        let fragments = split_message("weather: cloudy, tools: crane");
        assert_eq!(fragments, vec!["weather: cloudy", "tools: crane"]);
    }

    #[test]
    fn test_commas_inside_values_survive() {
        let fragments = split_message("tools: crane, hammer and drill");
        assert_eq!(fragments, vec!["tools: crane, hammer and drill"]);
    }

    #[test]
    fn test_sentence_split_on_capital() {
        let fragments = split_message("weather was cloudy. Impression good");
        assert_eq!(fragments, vec!["weather was cloudy", "Impression good"]);
    }

    #[test]
    fn test_period_before_lowercase_does_not_split() {
        let fragments = split_message("comments: approx. three hours lost");
        assert_eq!(fragments, vec!["comments: approx. three hours lost"]);
    }

    #[test]
    fn test_single_fragment_passthrough() {
        assert_eq!(split_message("new report"), vec!["new report"]);
        assert!(split_message("   ").is_empty());
    }
}
