//! Lexical normalization applied to captured field values before they are
//! merged into a report.

use log::trace;

/// Command verbs that sometimes leak into a captured value when users type
/// things like "add from Monday". Longest prefixes are tried first so that
/// "correct spelling" wins over "correct".
const NOISE_PREFIXES: &[&str] = &[
    "correct spelling",
    "insert",
    "delete",
    "remove",
    "spell",
    "add",
    "from",
];

/// Strips trailing sentence punctuation and leading command-verb noise from a
/// captured value. Best effort: never fails, always returns a cleaned string.
pub fn clean_value(text: &str) -> String {
    let mut value = text.trim().trim_end_matches(['.', '!', '?']).trim();

    loop {
        let lower = value.to_lowercase();
        let mut stripped = false;
        for prefix in NOISE_PREFIXES {
            if lower == *prefix {
                value = "";
                stripped = true;
                break;
            }
            if let Some(rest) = lower.strip_prefix(prefix) {
                if rest.starts_with(' ') {
                    value = value[prefix.len()..].trim_start();
                    stripped = true;
                    break;
                }
            }
        }
        if !stripped {
            break;
        }
    }

    let cleaned = value.trim().to_string();
    if cleaned != text {
        trace!("normalized value {:?} -> {:?}", text, cleaned);
    }
    cleaned
}

/// Activity values get one extra fixed typo correction on top of
/// [`clean_value`]: the word "tone" is a frequent transcription of "stone".
pub fn clean_activity(text: &str) -> String {
    let cleaned = clean_value(text);
    cleaned
        .split_whitespace()
        .map(|word| {
            if word.eq_ignore_ascii_case("tone") {
                "stone"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercases the first letter of every word; used for person names and role
/// titles so that "anna" and "Anna" merge to the same entry.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_punctuation() {
        assert_eq!(clean_value("Downtown Project."), "Downtown Project");
        assert_eq!(clean_value("cloudy!?"), "cloudy");
    }

    #[test]
    fn test_strips_command_prefixes() {
        assert_eq!(clean_value("add Downtown"), "Downtown");
        assert_eq!(clean_value("insert from Monday"), "Monday");
        assert_eq!(clean_value("correct spelling Anna"), "Anna");
    }

    #[test]
    fn test_prefix_requires_word_boundary() {
        // "additional" starts with "add" but is not a command verb.
        assert_eq!(clean_value("additional works"), "additional works");
    }

    #[test]
    fn test_activity_synonym() {
        assert_eq!(clean_activity("laying tone slabs"), "laying stone slabs");
        assert_eq!(clean_activity("tone masonry."), "stone masonry");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("anna smith"), "Anna Smith");
        assert_eq!(title_case("ENGINEER"), "ENGINEER");
    }
}
