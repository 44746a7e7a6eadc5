//! Query and document tokenization shared by the keyword index and the hashing embedder.

use std::collections::HashSet;

/// Words carrying no retrieval signal.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "when", "at", "by", "from", "for",
    "with", "in", "on", "to", "is", "am", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "so", "up", "down", "out", "off", "over", "under", "again",
    "further", "once", "here", "there", "all", "any", "both", "each", "few", "more", "most",
    "other", "some", "such", "no", "nor", "not", "only", "own", "same", "than", "too", "very",
    "can", "will", "just", "should", "now",
];

/// Structural synonyms bridging query intent and document wording.
const EXPANSIONS: &[(&str, &[&str])] = &[
    (
        "work",
        &["experience", "employment", "history", "role", "position", "career"],
    ),
    (
        "job",
        &["experience", "employment", "role", "position", "career"],
    ),
    ("experience", &["work", "employment", "history"]),
    (
        "education",
        &["university", "college", "degree", "school", "academic"],
    ),
    ("school", &["education", "university", "college"]),
    ("contact", &["email", "phone", "address", "mobile"]),
    ("project", &["portfolio", "case study", "demonstration"]),
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lower-case, strip ASCII punctuation, drop stopwords and single-char tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| !is_stop_word(t) && t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Query tokens plus their synonyms, deduplicated in first-seen order.
pub fn expand_query(query: &str) -> Vec<String> {
    let tokens = tokenize(query);
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    let mut push = |term: &str| {
        if seen.insert(term.to_string()) {
            terms.push(term.to_string());
        }
    };
    for token in &tokens {
        push(token);
    }
    for token in &tokens {
        if let Some((_, synonyms)) = EXPANSIONS.iter().find(|(word, _)| *word == token.as_str()) {
            for synonym in *synonyms {
                push(synonym);
            }
        }
    }

    // Multi-word synonyms ("case study") go through the tokenizer again
    terms.iter().flat_map(|t| tokenize(t)).collect::<Vec<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_stop_words() {
        assert_eq!(
            tokenize("Mars is the fourth planet. Jupiter, a giant!"),
            vec!["mars", "fourth", "planet", "jupiter", "giant"]
        );
    }

    #[test]
    fn test_tokenize_drops_single_chars() {
        assert_eq!(tokenize("x y zz"), vec!["zz"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_punctuation_is_removed_not_split() {
        assert_eq!(tokenize("e-mail o'brien"), vec!["email", "obrien"]);
    }

    #[test]
    fn test_expand_query_adds_synonyms() {
        let terms = expand_query("work history");
        assert_eq!(terms[0], "work");
        assert_eq!(terms[1], "history");
        assert!(terms.contains(&"employment".to_string()));
        assert!(terms.contains(&"career".to_string()));
        // "history" appears once even though "work" expands to it
        assert_eq!(terms.iter().filter(|t| *t == "history").count(), 1);
    }

    #[test]
    fn test_expand_query_splits_multi_word_synonyms() {
        let terms = expand_query("project");
        assert!(terms.contains(&"case".to_string()));
        assert!(terms.contains(&"study".to_string()));
    }

    #[test]
    fn test_expand_query_without_synonyms() {
        assert_eq!(expand_query("planet"), vec!["planet"]);
    }
}
