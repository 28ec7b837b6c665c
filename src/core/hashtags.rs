use std::collections::HashSet;

const MAX_HASHTAGS: usize = 5;

const COMMON_WORDS: [&str; 17] = [
    "the", "and", "a", "an", "of", "in", "on", "for", "with", "to", "is", "are", "was", "were",
    "it", "this", "that",
];

/// Keyword hashtags for a caption: lowercased, punctuation stripped, short and
/// common words dropped, first five unique words in caption order. Only ASCII
/// word characters survive the punctuation strip.
pub fn generate_hashtags(caption: &str) -> Vec<String> {
    let cleaned: String = caption
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !COMMON_WORDS.contains(word))
        .filter(|word| seen.insert(word.to_string()))
        .take(MAX_HASHTAGS)
        .map(|word| format!("#{}", word))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::generate_hashtags;

    #[test]
    fn test_hashtags_from_caption() {
        assert_eq!(
            generate_hashtags("A cat on a windowsill."),
            vec!["#cat", "#windowsill"]
        );
    }

    #[test]
    fn test_hashtags_are_unique_and_capped() {
        let tags = generate_hashtags(
            "Sunset sunset over the quiet harbor, boats drifting, gulls calling, waves rolling",
        );
        assert_eq!(
            tags,
            vec!["#sunset", "#over", "#quiet", "#harbor", "#boats"]
        );
    }

    #[test]
    fn test_hashtags_skip_stop_words_and_empty() {
        assert!(generate_hashtags("").is_empty());
        assert_eq!(generate_hashtags("it is the one in an ox"), vec!["#one"]);
        assert_eq!(generate_hashtags("This was that, and these were!"), vec!["#these"]);
    }

    #[test]
    fn test_non_ascii_letters_are_stripped() {
        assert_eq!(generate_hashtags("Café au lait, naïve"), vec!["#caf", "#lait", "#nave"]);
    }
}
