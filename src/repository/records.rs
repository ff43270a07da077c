//! Diesel row types and conversions to domain models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{backfill_log, books};
use super::StoreError;
use crate::models::{BackfillUnit, CatalogBook, FailureNote, UnitKey, UnitStats, UnitStatus};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = backfill_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BackfillRecord {
    pub year: i32,
    pub month: i32,
    pub status: String,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub books_generated: Option<i32>,
    pub isbns_resolved: Option<i32>,
    pub provider_calls: Option<String>,
    pub resolution_rate: Option<f64>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = backfill_log)]
pub struct NewBackfillRecord {
    pub year: i32,
    pub month: i32,
    pub status: &'static str,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl NewBackfillRecord {
    pub fn pending(key: UnitKey, now: DateTime<Utc>) -> Self {
        Self {
            year: key.year,
            month: key.month as i32,
            status: UnitStatus::Pending.as_str(),
            retry_count: 0,
            created_at: now,
        }
    }
}

pub fn unit_key(year: i32, month: i32) -> Result<UnitKey, StoreError> {
    u32::try_from(month)
        .ok()
        .and_then(|m| UnitKey::new(year, m))
        .ok_or_else(|| StoreError::InvalidRecord(format!("bad unit key {}-{}", year, month)))
}

fn parse_status(s: &str) -> Result<UnitStatus, StoreError> {
    UnitStatus::from_str(s).ok_or_else(|| StoreError::InvalidRecord(format!("unknown status {s}")))
}

impl TryFrom<BackfillRecord> for BackfillUnit {
    type Error = StoreError;

    fn try_from(record: BackfillRecord) -> Result<Self, Self::Error> {
        let key = unit_key(record.year, record.month)?;
        let status = parse_status(&record.status)?;

        let stats = match (record.books_generated, record.isbns_resolved) {
            (Some(generated), Some(resolved)) => {
                let provider_calls: BTreeMap<String, u32> = match &record.provider_calls {
                    Some(json) => serde_json::from_str(json)?,
                    None => BTreeMap::new(),
                };
                Some(UnitStats {
                    books_generated: generated.max(0) as u32,
                    isbns_resolved: resolved.max(0) as u32,
                    provider_calls,
                })
            }
            _ => None,
        };

        Ok(BackfillUnit {
            key,
            status,
            retry_count: record.retry_count.max(0) as u32,
            error_message: record.error_message,
            started_at: record.started_at,
            completed_at: record.completed_at,
            last_retry_at: record.last_retry_at,
            stats,
            resolution_rate: record.resolution_rate,
        })
    }
}

impl TryFrom<BackfillRecord> for FailureNote {
    type Error = StoreError;

    fn try_from(record: BackfillRecord) -> Result<Self, Self::Error> {
        Ok(FailureNote {
            key: unit_key(record.year, record.month)?,
            status: parse_status(&record.status)?,
            retry_count: record.retry_count.max(0) as u32,
            error_message: record.error_message,
            last_retry_at: record.last_retry_at,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub authors: String,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub external_ids: String,
    pub resolved_by: String,
    pub discovered_year: Option<i32>,
    pub discovered_month: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&CatalogBook> for BookRecord {
    type Error = StoreError;

    fn try_from(book: &CatalogBook) -> Result<Self, Self::Error> {
        Ok(BookRecord {
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            authors: serde_json::to_string(&book.authors)?,
            publisher: book.publisher.clone(),
            published_date: book.published_date.clone(),
            description: book.description.clone(),
            cover_url: book.cover_url.clone(),
            external_ids: serde_json::to_string(&book.external_ids)?,
            resolved_by: book.resolved_by.clone(),
            discovered_year: book.discovered_in.map(|k| k.year),
            discovered_month: book.discovered_in.map(|k| k.month as i32),
            updated_at: book.updated_at,
        })
    }
}

impl TryFrom<BookRecord> for CatalogBook {
    type Error = StoreError;

    fn try_from(record: BookRecord) -> Result<Self, Self::Error> {
        let discovered_in = match (record.discovered_year, record.discovered_month) {
            (Some(year), Some(month)) => Some(unit_key(year, month)?),
            _ => None,
        };
        Ok(CatalogBook {
            isbn: record.isbn,
            title: record.title,
            authors: serde_json::from_str(&record.authors)?,
            publisher: record.publisher,
            published_date: record.published_date,
            description: record.description,
            cover_url: record.cover_url,
            external_ids: serde_json::from_str(&record.external_ids)?,
            resolved_by: record.resolved_by,
            discovered_in,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_stats() {
        let record = BackfillRecord {
            year: 1999,
            month: 4,
            status: "retry".to_string(),
            retry_count: 2,
            error_message: Some("timeout".to_string()),
            started_at: None,
            completed_at: None,
            last_retry_at: None,
            books_generated: None,
            isbns_resolved: None,
            provider_calls: None,
            resolution_rate: None,
        };
        let unit = BackfillUnit::try_from(record).unwrap();
        assert_eq!(unit.key, UnitKey::new(1999, 4).unwrap());
        assert_eq!(unit.status, UnitStatus::Retry);
        assert!(unit.stats.is_none());
    }

    #[test]
    fn test_rejects_unknown_status() {
        let record = BackfillRecord {
            year: 1999,
            month: 4,
            status: "bogus".to_string(),
            retry_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            last_retry_at: None,
            books_generated: None,
            isbns_resolved: None,
            provider_calls: None,
            resolution_rate: None,
        };
        assert!(matches!(
            BackfillUnit::try_from(record),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_book_record_conversion() {
        let mut book = CatalogBook::new("9780441013593", "Dune");
        book.authors = vec!["Frank Herbert".to_string()];
        book.external_ids.insert("wikidata".to_string(), "Q190192".to_string());
        book.discovered_in = UnitKey::new(1965, 8);

        let record = BookRecord::try_from(&book).unwrap();
        assert_eq!(record.discovered_month, Some(8));
        let back = CatalogBook::try_from(record).unwrap();
        assert_eq!(back, book);
    }
}
