//! Parsing of generative provider output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::GeneratedBook;
use crate::providers::ProviderError;

/// Strip a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

// A fenced block somewhere inside surrounding prose.
static EMBEDDED_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*\n(.*?)```").expect("fence pattern should compile")
});

/// The first fenced block inside `text`, for replies that wrap the JSON
/// in explanation.
fn embedded_block(text: &str) -> Option<&str> {
    EMBEDDED_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BookList {
    Bare(Vec<RawBook>),
    Wrapped { books: Vec<RawBook> },
}

#[derive(Debug, Deserialize)]
struct RawBook {
    title: Option<String>,
    #[serde(default, alias = "authors")]
    author: Option<AuthorField>,
    #[serde(default, alias = "year")]
    publication_year: Option<i32>,
    #[serde(default)]
    isbn: Option<String>,
    #[serde(default, alias = "description")]
    significance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorField {
    One(String),
    Many(Vec<String>),
}

impl AuthorField {
    fn primary(self) -> Option<String> {
        match self {
            Self::One(name) => Some(name),
            Self::Many(names) => names.into_iter().next(),
        }
    }
}

/// Parse a generated book list. Accepts a bare JSON array or an object
/// with a `books` array, optionally wrapped in a code fence. Entries
/// without a title are dropped.
pub fn parse_generated_books(text: &str, source: &str) -> Result<Vec<GeneratedBook>, ProviderError> {
    let json = strip_code_fences(text);
    let list: BookList = match serde_json::from_str(json) {
        Ok(list) => list,
        Err(e) => embedded_block(text)
            .and_then(|block| serde_json::from_str(block).ok())
            .ok_or_else(|| {
                ProviderError::Parse(format!("{} returned unparseable book list: {}", source, e))
            })?,
    };

    let raw = match list {
        BookList::Bare(books) => books,
        BookList::Wrapped { books } => books,
    };

    Ok(raw
        .into_iter()
        .filter_map(|book| {
            let title = book.title?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            Some(GeneratedBook {
                title,
                author: book.author.and_then(AuthorField::primary),
                publication_year: book.publication_year,
                isbn: book.isbn.filter(|s| !s.trim().is_empty()),
                significance: book.significance,
                source: source.to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  [3]  "), "[3]");
    }

    #[test]
    fn test_parse_bare_array_in_fence() {
        let text = "```json\n[{\"title\": \"Dune\", \"author\": \"Frank Herbert\", \"publication_year\": 1965}]\n```";
        let books = parse_generated_books(text, "gemini").unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[0].author.as_deref(), Some("Frank Herbert"));
        assert_eq!(books[0].source, "gemini");
    }

    #[test]
    fn test_parse_wrapped_object_with_author_list() {
        let text = r#"{"books": [
            {"title": "Good Omens", "authors": ["Terry Pratchett", "Neil Gaiman"], "year": 1990},
            {"title": "  ", "author": "Nobody"}
        ]}"#;
        let books = parse_generated_books(text, "xai").unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].author.as_deref(), Some("Terry Pratchett"));
        assert_eq!(books[0].publication_year, Some(1990));
    }

    #[test]
    fn test_parse_fence_inside_prose() {
        let text = "Here are the notable books:\n\n```json\n[{\"title\": \"Beloved\"}]\n```\nEnjoy!";
        let books = parse_generated_books(text, "gemini").unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Beloved");
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_generated_books("Sorry, I can't help with that.", "xai").is_err());
    }
}
