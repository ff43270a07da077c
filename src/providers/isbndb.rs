//! ISBNdb API provider (paid, metered).
//!
//! Every outbound call reserves one unit of the daily quota first. A refused
//! reservation surfaces as [`ProviderError::QuotaExhausted`] without
//! touching the network.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{
    CoverSource, EditionSource, IsbnResolver, MetadataSource, Provider, ProviderError,
    ProviderResult, ServiceContext,
};
use crate::http_client::{Auth, HttpClient};
use crate::models::{
    BookMetadata, CoverResult, EditionVariant, ProviderKind, ResolutionQuery, ResolutionResult,
};
use crate::utils::isbn;

const API_BASE: &str = "https://api2.isbndb.com";
const CREDENTIAL: &str = "ISBNDB_API_KEY";
const NAME: &str = "isbndb";
const CONFIDENCE: u8 = 90;

pub struct IsbndbProvider {
    http: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BookEnvelope {
    book: IsbndbBook,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    books: Vec<IsbndbBook>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IsbndbBook {
    title: Option<String>,
    title_long: Option<String>,
    isbn: Option<String>,
    isbn13: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    date_published: Option<String>,
    pages: Option<u32>,
    synopsis: Option<String>,
    overview: Option<String>,
    language: Option<String>,
    subjects: Vec<String>,
    image: Option<String>,
    binding: Option<String>,
    other_isbns: Vec<OtherIsbn>,
}

#[derive(Debug, Deserialize)]
struct OtherIsbn {
    isbn: String,
    binding: Option<String>,
}

impl IsbndbBook {
    fn best_isbn(&self) -> Option<String> {
        self.isbn13
            .as_deref()
            .or(self.isbn.as_deref())
            .and_then(isbn::to_isbn13)
    }
}

impl IsbndbProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_base_url(http, API_BASE)
    }

    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Reserve quota and perform one authenticated GET.
    async fn get<T: DeserializeOwned>(&self, path: &str, ctx: &ServiceContext) -> ProviderResult<T> {
        let key = ctx
            .credential(CREDENTIAL)
            .ok_or(ProviderError::MissingCredential(CREDENTIAL))?;

        if let Some(quota) = ctx.quota() {
            if !quota.reserve_quota(1).await {
                return Err(ProviderError::QuotaExhausted(
                    "isbndb daily budget is spent".to_string(),
                ));
            }
        }

        ctx.record_call(NAME);
        let url = format!("{}{}", self.base_url, path);
        self.http.get_json(&url, Auth::Header("Authorization", key)).await
    }

    async fn book(&self, raw_isbn: &str, ctx: &ServiceContext) -> ProviderResult<IsbndbBook> {
        let Some(isbn) = isbn::normalize(raw_isbn) else {
            return Ok(None);
        };
        let envelope: Option<BookEnvelope> = self.get(&format!("/book/{}", isbn), ctx).await?;
        Ok(envelope.map(|e| e.book))
    }
}

#[async_trait]
impl Provider for IsbndbProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Paid
    }

    fn confidence(&self) -> u8 {
        CONFIDENCE
    }

    async fn is_available(&self, ctx: &ServiceContext) -> bool {
        if !ctx.credentials().is_set(CREDENTIAL) {
            return false;
        }
        match ctx.quota() {
            Some(quota) => quota.check_quota(1, false).await.allowed,
            None => true,
        }
    }

    fn as_isbn_resolver(&self) -> Option<&dyn IsbnResolver> {
        Some(self)
    }

    fn as_metadata_source(&self) -> Option<&dyn MetadataSource> {
        Some(self)
    }

    fn as_cover_source(&self) -> Option<&dyn CoverSource> {
        Some(self)
    }

    fn as_edition_source(&self) -> Option<&dyn EditionSource> {
        Some(self)
    }
}

#[async_trait]
impl IsbnResolver for IsbndbProvider {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult> {
        let path = format!(
            "/books/{}?page=1&pageSize=20&column=title",
            urlencoding::encode(&query.title)
        );
        let Some(found) = self.get::<SearchEnvelope>(&path, ctx).await? else {
            return Ok(None);
        };

        let wanted_author = query.author.as_deref().map(str::to_lowercase);
        let matched = found.books.into_iter().find(|book| {
            book.best_isbn().is_some()
                && wanted_author.as_deref().is_none_or(|author| {
                    book.authors
                        .iter()
                        .any(|a| a.to_lowercase().contains(author))
                })
        });

        Ok(matched.and_then(|book| {
            let isbn = book.best_isbn()?;
            debug!("isbndb resolved '{}' to {}", query.title, isbn);
            Some(ResolutionResult {
                isbn,
                title: book.title.unwrap_or_else(|| query.title.clone()),
                authors: book.authors,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl MetadataSource for IsbndbProvider {
    async fn fetch_metadata(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<BookMetadata> {
        let Some(book) = self.book(isbn, ctx).await? else {
            return Ok(None);
        };

        let mut metadata = BookMetadata::new(isbn, NAME, CONFIDENCE);
        metadata.title = book.title.or(book.title_long);
        metadata.authors = book.authors;
        metadata.publisher = book.publisher;
        metadata.published_date = book.date_published;
        metadata.page_count = book.pages.filter(|p| *p > 0);
        metadata.description = book.synopsis.or(book.overview);
        metadata.language = book.language;
        metadata.subjects = book.subjects;
        metadata.cover_url = book.image;
        Ok(Some(metadata))
    }
}

#[async_trait]
impl CoverSource for IsbndbProvider {
    async fn fetch_cover(&self, isbn: &str, ctx: &ServiceContext) -> ProviderResult<CoverResult> {
        let book = self.book(isbn, ctx).await?;
        Ok(book.and_then(|b| b.image).map(|url| CoverResult {
            url,
            size: None,
            confidence: CONFIDENCE,
            source: NAME.to_string(),
        }))
    }
}

#[async_trait]
impl EditionSource for IsbndbProvider {
    async fn fetch_editions(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<EditionVariant>> {
        let Some(book) = self.book(isbn, ctx).await? else {
            return Ok(None);
        };

        let editions: Vec<EditionVariant> = book
            .other_isbns
            .into_iter()
            .filter_map(|other| {
                Some(EditionVariant {
                    isbn: isbn::to_isbn13(&other.isbn)?,
                    title: book.title.clone(),
                    format: other.binding,
                    publisher: None,
                    published_date: None,
                    source: NAME.to_string(),
                })
            })
            .collect();

        Ok((!editions.is_empty()).then_some(editions))
    }
}
