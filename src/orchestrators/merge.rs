//! Confidence-ranked merging of parallel provider results.
//!
//! Inputs are ranked by result confidence, highest first; equal confidence
//! keeps provider priority order. Scalar fields take the first ranked
//! value. List fields are unioned case-insensitively, keeping the casing
//! seen first.

use std::collections::{BTreeMap, HashSet};

use crate::models::{BookMetadata, EditionVariant, ExternalIds, MergedExternalIds, MergedMetadata};
use crate::utils::isbn;

/// Union `incoming` into `target`, skipping case-insensitive duplicates.
/// Returns true if anything was added.
pub fn union_case_insensitive(
    target: &mut Vec<String>,
    seen: &mut HashSet<String>,
    incoming: &[String],
) -> bool {
    let mut added = false;
    for item in incoming {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            target.push(trimmed.to_string());
            added = true;
        }
    }
    added
}

struct FieldMerge<'a> {
    provenance: &'a mut BTreeMap<String, Vec<String>>,
}

impl FieldMerge<'_> {
    /// Keep `current` if set, else take `incoming`. A source that agrees
    /// with the kept value is recorded as a contributor too.
    fn scalar<V: Clone>(
        &mut self,
        field: &str,
        current: &mut Option<V>,
        incoming: &Option<V>,
        source: &str,
        same: impl Fn(&V, &V) -> bool,
    ) {
        let Some(value) = incoming else {
            return;
        };
        if let Some(kept) = current.as_ref() {
            if same(kept, value) {
                self.record(field, source);
            }
            return;
        }
        *current = Some(value.clone());
        self.record(field, source);
    }

    fn record(&mut self, field: &str, source: &str) {
        let sources = self.provenance.entry(field.to_string()).or_default();
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
}

fn same_text(a: &String, b: &String) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn rank<T>(mut items: Vec<T>, confidence: impl Fn(&T) -> u8) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(confidence(item)));
    items
}

/// Merge metadata records for one ISBN. Returns `None` for no input.
pub fn merge_metadata(isbn: &str, results: Vec<BookMetadata>) -> Option<MergedMetadata> {
    let ranked = rank(results, |m| m.confidence);
    let top = ranked.first()?;

    let mut merged = BookMetadata::new(isbn, top.source.clone(), top.confidence);
    let mut provenance = BTreeMap::new();
    let mut sources = Vec::with_capacity(ranked.len());
    let mut seen_authors = HashSet::new();
    let mut seen_subjects = HashSet::new();

    for result in &ranked {
        let source = result.source.as_str();
        sources.push(result.source.clone());
        let mut fields = FieldMerge {
            provenance: &mut provenance,
        };

        fields.scalar("title", &mut merged.title, &result.title, source, same_text);
        fields.scalar("subtitle", &mut merged.subtitle, &result.subtitle, source, same_text);
        fields.scalar("publisher", &mut merged.publisher, &result.publisher, source, same_text);
        fields.scalar(
            "published_date",
            &mut merged.published_date,
            &result.published_date,
            source,
            same_text,
        );
        fields.scalar(
            "page_count",
            &mut merged.page_count,
            &result.page_count,
            source,
            |a, b| a == b,
        );
        fields.scalar(
            "description",
            &mut merged.description,
            &result.description,
            source,
            same_text,
        );
        fields.scalar("language", &mut merged.language, &result.language, source, same_text);
        fields.scalar("cover_url", &mut merged.cover_url, &result.cover_url, source, |a, b| a == b);

        if union_case_insensitive(&mut merged.authors, &mut seen_authors, &result.authors) {
            fields.record("authors", source);
        }
        if union_case_insensitive(&mut merged.subjects, &mut seen_subjects, &result.subjects) {
            fields.record("subjects", source);
        }
    }

    Some(MergedMetadata {
        metadata: merged,
        provenance,
        sources,
    })
}

/// Merge external identifier sets. For each catalog the highest-confidence
/// source's identifier is kept.
pub fn merge_external_ids(results: Vec<ExternalIds>) -> Option<MergedExternalIds> {
    let ranked = rank(results, |ids| ids.confidence);
    let mut merged = MergedExternalIds {
        ids: BTreeMap::new(),
        provenance: BTreeMap::new(),
    };

    for result in ranked {
        for (catalog, id) in result.ids {
            if !merged.ids.contains_key(&catalog) {
                merged.provenance.insert(catalog.clone(), result.source.clone());
                merged.ids.insert(catalog, id);
            }
        }
    }

    (!merged.ids.is_empty()).then_some(merged)
}

/// Union edition lists by ISBN-13. The first record for an ISBN is kept;
/// later records only fill its missing fields.
pub fn merge_editions(lists: Vec<Vec<EditionVariant>>) -> Vec<EditionVariant> {
    let mut merged: Vec<EditionVariant> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for edition in lists.into_iter().flatten() {
        let key = isbn::to_isbn13(&edition.isbn).unwrap_or_else(|| edition.isbn.clone());
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut merged[i];
                kept.title = kept.title.take().or(edition.title);
                kept.format = kept.format.take().or(edition.format);
                kept.publisher = kept.publisher.take().or(edition.publisher);
                kept.published_date = kept.published_date.take().or(edition.published_date);
            }
            None => {
                index.insert(key.clone(), merged.len());
                merged.push(EditionVariant {
                    isbn: key,
                    ..edition
                });
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(source: &str, confidence: u8) -> BookMetadata {
        BookMetadata::new("9780441013593", source, confidence)
    }

    #[test]
    fn test_higher_confidence_wins_scalar_fields() {
        let mut low = metadata("open_library", 65);
        low.title = Some("Dune (Ace)".to_string());
        low.page_count = Some(412);
        let mut high = metadata("isbndb", 90);
        high.title = Some("Dune".to_string());

        // Low-confidence result listed first must not win.
        let merged = merge_metadata("9780441013593", vec![low, high]).unwrap();
        assert_eq!(merged.metadata.title.as_deref(), Some("Dune"));
        assert_eq!(merged.metadata.page_count, Some(412));
        assert_eq!(merged.provenance["title"], vec!["isbndb"]);
        assert_eq!(merged.provenance["page_count"], vec!["open_library"]);
        assert_eq!(merged.sources, vec!["isbndb", "open_library"]);
    }

    #[test]
    fn test_subject_union_keeps_first_casing() {
        let mut a = metadata("google_books", 75);
        a.subjects = vec!["Science Fiction".to_string(), "Classics".to_string()];
        let mut b = metadata("open_library", 65);
        b.subjects = vec!["science fiction".to_string(), "Ecology".to_string()];

        let merged = merge_metadata("9780441013593", vec![b, a]).unwrap();
        assert_eq!(
            merged.metadata.subjects,
            vec!["Science Fiction", "Classics", "Ecology"]
        );
        assert_eq!(merged.provenance["subjects"], vec!["google_books", "open_library"]);
    }

    #[test]
    fn test_agreeing_sources_share_provenance() {
        let mut a = metadata("isbndb", 90);
        a.publisher = Some("Ace".to_string());
        let mut b = metadata("google_books", 75);
        b.publisher = Some("ace".to_string());

        let merged = merge_metadata("9780441013593", vec![a, b]).unwrap();
        assert_eq!(merged.provenance["publisher"], vec!["isbndb", "google_books"]);
    }

    #[test]
    fn test_merge_external_ids() {
        let mut wiki = ExternalIds::new("wikidata", 70);
        wiki.insert("wikidata", "Q190192");
        wiki.insert("goodreads", "111");
        let mut ol = ExternalIds::new("open_library", 65);
        ol.insert("goodreads", "222");
        ol.insert("open_library", "OL1M");

        let merged = merge_external_ids(vec![ol, wiki]).unwrap();
        assert_eq!(merged.ids["goodreads"], "111");
        assert_eq!(merged.provenance["goodreads"], "wikidata");
        assert_eq!(merged.provenance["open_library"], "open_library");
        assert!(merge_external_ids(vec![]).is_none());
    }

    #[test]
    fn test_merge_editions_by_isbn() {
        let edition = |isbn: &str, format: Option<&str>, source: &str| EditionVariant {
            isbn: isbn.to_string(),
            title: None,
            format: format.map(str::to_string),
            publisher: None,
            published_date: None,
            source: source.to_string(),
        };
        let merged = merge_editions(vec![
            vec![edition("0306406152", None, "isbndb")],
            vec![
                edition("9780306406157", Some("Hardcover"), "open_library"),
                edition("9780441013593", Some("Paperback"), "open_library"),
            ],
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].isbn, "9780306406157");
        assert_eq!(merged[0].format.as_deref(), Some("Hardcover"));
        assert_eq!(merged[0].source, "isbndb");
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_metadata("9780441013593", vec![]).is_none());
    }
}
