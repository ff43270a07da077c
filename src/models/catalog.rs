//! Catalog rows written by the backfill pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookMetadata, GeneratedBook, ResolutionResult, UnitKey};

/// A resolved book stored in the catalog, keyed by ISBN-13.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogBook {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    /// Catalog name -> identifier (e.g. "wikidata" -> "Q190192").
    pub external_ids: BTreeMap<String, String>,
    /// Provider that resolved the ISBN.
    pub resolved_by: String,
    /// Backfill unit that discovered the book, if any.
    pub discovered_in: Option<UnitKey>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogBook {
    pub fn new(isbn: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            authors: Vec::new(),
            publisher: None,
            published_date: None,
            description: None,
            cover_url: None,
            external_ids: BTreeMap::new(),
            resolved_by: String::new(),
            discovered_in: None,
            updated_at: Utc::now(),
        }
    }

    /// Upsert semantics: values from `newer` replace ours, but a missing
    /// value never erases a known one.
    pub fn merge_from(&mut self, newer: &CatalogBook) {
        if !newer.title.is_empty() {
            self.title = newer.title.clone();
        }
        if !newer.authors.is_empty() {
            self.authors = newer.authors.clone();
        }
        self.publisher = newer.publisher.clone().or(self.publisher.take());
        self.published_date = newer.published_date.clone().or(self.published_date.take());
        self.description = newer.description.clone().or(self.description.take());
        self.cover_url = newer.cover_url.clone().or(self.cover_url.take());
        self.external_ids
            .extend(newer.external_ids.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !newer.resolved_by.is_empty() {
            self.resolved_by = newer.resolved_by.clone();
        }
        self.discovered_in = self.discovered_in.or(newer.discovered_in);
        self.updated_at = newer.updated_at;
    }

    /// Build a row from a generated candidate and its resolution.
    pub fn from_resolution(
        generated: &GeneratedBook,
        resolution: &ResolutionResult,
        discovered_in: Option<UnitKey>,
    ) -> Self {
        let authors = if resolution.authors.is_empty() {
            generated.author.iter().cloned().collect()
        } else {
            resolution.authors.clone()
        };

        Self {
            isbn: resolution.isbn.clone(),
            title: resolution.title.clone(),
            authors,
            publisher: None,
            published_date: generated.publication_year.map(|y| y.to_string()),
            description: generated.significance.clone(),
            cover_url: None,
            external_ids: BTreeMap::new(),
            resolved_by: resolution.source.clone(),
            discovered_in,
            updated_at: Utc::now(),
        }
    }

    /// Fill gaps from enriched metadata. Merged dates and descriptions
    /// replace the generated ones.
    pub fn apply_metadata(&mut self, metadata: &BookMetadata) {
        if self.authors.is_empty() {
            self.authors = metadata.authors.clone();
        }
        if self.publisher.is_none() {
            self.publisher = metadata.publisher.clone();
        }
        if metadata.published_date.is_some() {
            self.published_date = metadata.published_date.clone();
        }
        if metadata.description.is_some() {
            self.description = metadata.description.clone();
        }
        if self.cover_url.is_none() {
            self.cover_url = metadata.cover_url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_author_used_when_resolution_has_none() {
        let generated = GeneratedBook {
            title: "Dune".to_string(),
            author: Some("Frank Herbert".to_string()),
            publication_year: Some(1965),
            isbn: None,
            significance: None,
            source: "gemini".to_string(),
        };
        let resolution = ResolutionResult {
            isbn: "9780441013593".to_string(),
            title: "Dune".to_string(),
            authors: vec![],
            confidence: 65,
            source: "open_library".to_string(),
        };

        let book = CatalogBook::from_resolution(&generated, &resolution, UnitKey::new(1965, 8));
        assert_eq!(book.authors, vec!["Frank Herbert"]);
        assert_eq!(book.published_date.as_deref(), Some("1965"));
        assert_eq!(book.resolved_by, "open_library");

        let mut metadata = BookMetadata::new("9780441013593", "isbndb", 90);
        metadata.publisher = Some("Chilton".to_string());
        metadata.authors = vec!["Someone Else".to_string()];
        let mut enriched = book.clone();
        enriched.apply_metadata(&metadata);
        assert_eq!(enriched.publisher.as_deref(), Some("Chilton"));
        assert_eq!(enriched.authors, vec!["Frank Herbert"]);
    }
}
