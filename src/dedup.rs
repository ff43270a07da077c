//! Fuzzy title deduplication for generated book lists.

use serde::{Deserialize, Serialize};

use crate::models::GeneratedBook;

/// Slack applied when comparing a similarity against the threshold, so a
/// ratio that is mathematically equal to it counts as a match.
const EPSILON: f64 = 1e-9;

const LEADING_ARTICLES: [&str; 3] = ["the ", "a ", "an "];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Titles at or above this similarity are the same book.
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace, drop a leading article.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    for article in LEADING_ARTICLES {
        if let Some(rest) = collapsed.strip_prefix(article) {
            return rest.to_string();
        }
    }
    collapsed
}

/// Edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Levenshtein ratio `1 - distance / max_len` of two already-normalized titles.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

pub struct Deduplicator {
    threshold: f64,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
        }
    }

    pub fn is_duplicate(&self, a: &str, b: &str) -> bool {
        similarity(&normalize_title(a), &normalize_title(b)) + EPSILON >= self.threshold
    }

    /// Keep the first-encountered candidate of every group of similar
    /// titles. Returns the kept books and how many were dropped.
    pub fn dedup(&self, books: Vec<GeneratedBook>) -> (Vec<GeneratedBook>, usize) {
        let mut kept: Vec<(String, GeneratedBook)> = Vec::with_capacity(books.len());
        let mut removed = 0;

        for book in books {
            let normalized = normalize_title(&book.title);
            let duplicate = kept
                .iter()
                .any(|(seen, _)| similarity(seen, &normalized) + EPSILON >= self.threshold);
            if duplicate {
                removed += 1;
            } else {
                kept.push((normalized, book));
            }
        }

        (kept.into_iter().map(|(_, book)| book).collect(), removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, source: &str) -> GeneratedBook {
        GeneratedBook {
            title: title.to_string(),
            author: None,
            publication_year: None,
            isbn: None,
            significance: None,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The  Left Hand of Darkness!"), "left hand of darkness");
        assert_eq!(normalize_title("A Wrinkle in Time"), "wrinkle in time");
        assert_eq!(normalize_title("Theory of Everything"), "theory of everything");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_threshold_boundary() {
        let dedup = Deduplicator::new(&DedupConfig::default());

        // Distance 4 over 10 chars: exactly 0.6.
        assert!((similarity("abcdefghij", "abcdefwxyz") - 0.6).abs() < 1e-12);
        assert!(dedup.is_duplicate("abcdefghij", "abcdefwxyz"));

        // Distance 41 over 100 chars: 0.59.
        let a = "a".repeat(100);
        let b = format!("{}{}", "a".repeat(59), "b".repeat(41));
        assert!(!dedup.is_duplicate(&a, &b));
    }

    #[test]
    fn test_dedup_keeps_first_encountered() {
        let dedup = Deduplicator::new(&DedupConfig::default());
        let (kept, removed) = dedup.dedup(vec![
            book("The Handmaid's Tale", "gemini"),
            book("Neuromancer", "gemini"),
            book("Handmaids Tale", "xai"),
        ]);

        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source, "gemini");
        assert_eq!(kept[0].title, "The Handmaid's Tale");
    }

    #[test]
    fn test_threshold_is_configurable() {
        let strict = Deduplicator::new(&DedupConfig {
            similarity_threshold: 0.95,
        });
        assert!(!strict.is_duplicate("abcdefghij", "abcdefwxyz"));
    }
}
