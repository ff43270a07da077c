//! Book-level value objects produced by providers and orchestrators.
//!
//! Every value records the provider that produced it (`source`) and, where
//! merging depends on it, a 0-100 `confidence` score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::isbn;

/// Sanity check applied by cascading orchestrators before accepting a value.
pub trait Validate {
    fn is_valid(&self) -> bool;
}

/// Input for resolving a title/author pair to an ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionQuery {
    pub title: String,
    pub author: Option<String>,
}

impl ResolutionQuery {
    pub fn new(title: impl Into<String>, author: Option<String>) -> Self {
        Self {
            title: title.into(),
            author,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub confidence: u8,
    pub source: String,
}

impl Validate for ResolutionResult {
    fn is_valid(&self) -> bool {
        isbn::is_valid(&self.isbn)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub isbn: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub subjects: Vec<String>,
    pub cover_url: Option<String>,
    pub confidence: u8,
    pub source: String,
}

impl BookMetadata {
    pub fn new(isbn: impl Into<String>, source: impl Into<String>, confidence: u8) -> Self {
        Self {
            isbn: isbn.into(),
            source: source.into(),
            confidence,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_empty()
            && self.publisher.is_none()
            && self.description.is_none()
            && self.subjects.is_empty()
    }
}

impl Validate for BookMetadata {
    fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

/// Metadata merged from several providers with per-field provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedMetadata {
    pub metadata: BookMetadata,
    /// Field name -> providers that contributed the final value.
    pub provenance: BTreeMap<String, Vec<String>>,
    /// Providers whose results took part in the merge, highest confidence first.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverResult {
    pub url: String,
    pub size: Option<String>,
    pub confidence: u8,
    pub source: String,
}

impl Validate for CoverResult {
    fn is_valid(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingsResult {
    pub average: f32,
    pub count: u32,
    pub confidence: u8,
    pub source: String,
}

impl Validate for RatingsResult {
    fn is_valid(&self) -> bool {
        self.count > 0 && (0.0..=5.0).contains(&self.average)
    }
}

/// Identification inputs for public-domain detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDomainQuery {
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publication_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicDomainResult {
    pub is_public_domain: bool,
    pub reason: String,
    pub download_url: Option<String>,
    pub confidence: u8,
    pub source: String,
}

impl Validate for PublicDomainResult {
    fn is_valid(&self) -> bool {
        !self.reason.is_empty()
    }
}

/// Identifiers for one book in external catalogs, keyed by catalog name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub ids: BTreeMap<String, String>,
    pub confidence: u8,
    pub source: String,
}

impl ExternalIds {
    pub fn new(source: impl Into<String>, confidence: u8) -> Self {
        Self {
            ids: BTreeMap::new(),
            confidence,
            source: source.into(),
        }
    }

    pub fn insert(&mut self, catalog: &str, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.ids.insert(catalog.to_string(), id);
        }
    }
}

/// External identifiers merged across providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedExternalIds {
    pub ids: BTreeMap<String, String>,
    /// Catalog name -> provider that supplied the kept identifier.
    pub provenance: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditionVariant {
    pub isbn: String,
    pub title: Option<String>,
    pub format: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorBiography {
    pub name: String,
    pub biography: String,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub confidence: u8,
    pub source: String,
}

impl Validate for AuthorBiography {
    fn is_valid(&self) -> bool {
        !self.biography.trim().is_empty()
    }
}

/// Parameters for AI book-list generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub year: i32,
    pub month: u32,
    pub count: usize,
}

/// A candidate book proposed by a generative provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBook {
    pub title: String,
    pub author: Option<String>,
    pub publication_year: Option<i32>,
    pub isbn: Option<String>,
    pub significance: Option<String>,
    pub source: String,
}

/// Merged, deduplicated output of concurrent generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub books: Vec<GeneratedBook>,
    /// Provider -> number of candidates it returned before deduplication.
    pub per_provider: BTreeMap<String, usize>,
    pub failed_providers: Vec<String>,
    pub duplicates_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_requires_checksum_valid_isbn() {
        let mut result = ResolutionResult {
            isbn: "9780306406157".to_string(),
            title: "Example".to_string(),
            authors: vec![],
            confidence: 80,
            source: "test".to_string(),
        };
        assert!(result.is_valid());
        result.isbn = "9780306406158".to_string();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_ratings_validation() {
        let ratings = RatingsResult {
            average: 4.2,
            count: 0,
            confidence: 60,
            source: "test".to_string(),
        };
        assert!(!ratings.is_valid());
    }

    #[test]
    fn test_external_ids_skip_empty() {
        let mut ids = ExternalIds::new("test", 50);
        ids.insert("goodreads", "");
        ids.insert("wikidata", "Q42");
        assert_eq!(ids.ids.len(), 1);
    }
}
