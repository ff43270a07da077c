//! Open Library provider.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    AuthorBioSource, CoverSource, ExternalIdSource, IsbnResolver, MetadataSource, Provider,
    ProviderResult, RatingsSource, ServiceContext,
};
use crate::http_client::{Auth, HttpClient};
use crate::models::{
    AuthorBiography, BookMetadata, CoverResult, ExternalIds, ProviderKind, RatingsResult,
    ResolutionQuery, ResolutionResult,
};
use crate::utils::isbn;

const API_BASE: &str = "https://openlibrary.org";
const NAME: &str = "open_library";
const CONFIDENCE: u8 = 65;

pub struct OpenLibraryProvider {
    http: HttpClient,
    base_url: String,
}

/// Entry of the `/api/books?jscmd=data` response.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BookData {
    key: Option<String>,
    title: Option<String>,
    subtitle: Option<String>,
    authors: Vec<Named>,
    publishers: Vec<Named>,
    publish_date: Option<String>,
    number_of_pages: Option<u32>,
    subjects: Vec<Named>,
    cover: Option<Covers>,
    identifiers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Covers {
    small: Option<String>,
    medium: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Edition {
    #[serde(default)]
    works: Vec<KeyRef>,
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct RatingsResponse {
    summary: RatingsSummary,
}

#[derive(Debug, Deserialize)]
struct RatingsSummary {
    average: Option<f32>,
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct AuthorSearchResponse {
    #[serde(default)]
    docs: Vec<AuthorDoc>,
}

#[derive(Debug, Deserialize)]
struct AuthorDoc {
    key: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorRecord {
    bio: Option<TextValue>,
    birth_date: Option<String>,
    death_date: Option<String>,
}

/// Open Library stores free text either as a string or as a typed object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    fn into_string(self) -> String {
        match self {
            Self::Plain(s) | Self::Typed { value: s } => s,
        }
    }
}

impl OpenLibraryProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_base_url(http, API_BASE)
    }

    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<T> {
        ctx.record_call(NAME);
        let url = format!("{}{}", self.base_url, path);
        self.http.get_json_cached(&url, Auth::None).await
    }

    async fn book_data(&self, raw_isbn: &str, ctx: &ServiceContext) -> ProviderResult<BookData> {
        let Some(isbn) = isbn::normalize(raw_isbn) else {
            return Ok(None);
        };
        let bibkey = format!("ISBN:{}", isbn);
        let path = format!("/api/books?bibkeys={}&format=json&jscmd=data", bibkey);
        let response: Option<HashMap<String, BookData>> = self.get(&path, ctx).await?;
        Ok(response.and_then(|mut entries| entries.remove(&bibkey)))
    }
}

#[async_trait]
impl Provider for OpenLibraryProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Free
    }

    fn confidence(&self) -> u8 {
        CONFIDENCE
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

    fn as_ratings_source(&self) -> Option<&dyn RatingsSource> {
        Some(self)
    }

    fn as_external_id_source(&self) -> Option<&dyn ExternalIdSource> {
        Some(self)
    }

    fn as_author_bio_source(&self) -> Option<&dyn AuthorBioSource> {
        Some(self)
    }
}

#[async_trait]
impl IsbnResolver for OpenLibraryProvider {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult> {
        let mut path = format!(
            "/search.json?title={}&limit=5&fields=title,author_name,isbn",
            urlencoding::encode(&query.title)
        );
        if let Some(author) = &query.author {
            path.push_str(&format!("&author={}", urlencoding::encode(author)));
        }

        let Some(response) = self.get::<SearchResponse>(&path, ctx).await? else {
            return Ok(None);
        };

        Ok(response.docs.into_iter().find_map(|doc| {
            // Prefer a 13-digit ISBN; editions often list both forms.
            let isbn = doc
                .isbn
                .iter()
                .filter(|i| i.len() == 13)
                .chain(doc.isbn.iter())
                .find_map(|i| isbn::to_isbn13(i))?;
            Some(ResolutionResult {
                isbn,
                title: doc.title,
                authors: doc.author_name,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl MetadataSource for OpenLibraryProvider {
    async fn fetch_metadata(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<BookMetadata> {
        let Some(data) = self.book_data(isbn, ctx).await? else {
            return Ok(None);
        };

        let mut metadata = BookMetadata::new(isbn, NAME, CONFIDENCE);
        metadata.title = data.title;
        metadata.subtitle = data.subtitle;
        metadata.authors = data.authors.into_iter().map(|a| a.name).collect();
        metadata.publisher = data.publishers.into_iter().next().map(|p| p.name);
        metadata.published_date = data.publish_date;
        metadata.page_count = data.number_of_pages;
        metadata.subjects = data.subjects.into_iter().map(|s| s.name).collect();
        metadata.cover_url = data.cover.and_then(|c| c.large.or(c.medium).or(c.small));
        Ok(Some(metadata))
    }
}

#[async_trait]
impl CoverSource for OpenLibraryProvider {
    async fn fetch_cover(&self, isbn: &str, ctx: &ServiceContext) -> ProviderResult<CoverResult> {
        let data = self.book_data(isbn, ctx).await?;
        Ok(data.and_then(|d| d.cover).and_then(|c| {
            let (url, size) = c
                .large
                .map(|u| (u, "large"))
                .or(c.medium.map(|u| (u, "medium")))
                .or(c.small.map(|u| (u, "small")))?;
            Some(CoverResult {
                url,
                size: Some(size.to_string()),
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl RatingsSource for OpenLibraryProvider {
    async fn fetch_ratings(
        &self,
        raw_isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<RatingsResult> {
        let Some(isbn) = isbn::normalize(raw_isbn) else {
            return Ok(None);
        };
        let Some(edition) = self.get::<Edition>(&format!("/isbn/{}.json", isbn), ctx).await? else {
            return Ok(None);
        };
        let Some(work) = edition.works.into_iter().next() else {
            return Ok(None);
        };

        let ratings: Option<RatingsResponse> = self
            .get(&format!("{}/ratings.json", work.key), ctx)
            .await?;
        Ok(ratings.and_then(|r| {
            Some(RatingsResult {
                average: r.summary.average?,
                count: r.summary.count,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl ExternalIdSource for OpenLibraryProvider {
    async fn fetch_external_ids(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<ExternalIds> {
        let Some(data) = self.book_data(isbn, ctx).await? else {
            return Ok(None);
        };

        let mut ids = ExternalIds::new(NAME, CONFIDENCE);
        if let Some(key) = data.key.as_deref().and_then(|k| k.rsplit('/').next()) {
            ids.insert("open_library", key);
        }
        for (catalog, values) in data.identifiers {
            if let Some(first) = values.into_iter().next() {
                let catalog = match catalog.as_str() {
                    "isbn_10" => "isbn10",
                    "isbn_13" => "isbn13",
                    "openlibrary" => continue,
                    other => other,
                };
                ids.insert(catalog, first);
            }
        }
        Ok((!ids.ids.is_empty()).then_some(ids))
    }
}

#[async_trait]
impl AuthorBioSource for OpenLibraryProvider {
    async fn fetch_author_bio(
        &self,
        name: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<AuthorBiography> {
        let path = format!("/search/authors.json?q={}&limit=1", urlencoding::encode(name));
        let Some(search) = self.get::<AuthorSearchResponse>(&path, ctx).await? else {
            return Ok(None);
        };
        let Some(doc) = search.docs.into_iter().next() else {
            return Ok(None);
        };

        let record: Option<AuthorRecord> =
            self.get(&format!("/authors/{}.json", doc.key), ctx).await?;
        Ok(record.and_then(|r| {
            Some(AuthorBiography {
                name: doc.name,
                biography: r.bio?.into_string(),
                birth_date: r.birth_date,
                death_date: r.death_date,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_data_parsing() {
        let body = r#"{"ISBN:9780441013593": {
            "key": "/books/OL24374150M",
            "title": "Dune",
            "authors": [{"url": "https://openlibrary.org/authors/OL79034A", "name": "Frank Herbert"}],
            "publishers": [{"name": "Ace"}],
            "subjects": [{"name": "Science Fiction", "url": "x"}],
            "cover": {"large": "https://covers.openlibrary.org/b/id/1-L.jpg"},
            "identifiers": {"goodreads": ["234225"], "openlibrary": ["OL24374150M"]}
        }}"#;
        let mut parsed: HashMap<String, BookData> = serde_json::from_str(body).unwrap();
        let data = parsed.remove("ISBN:9780441013593").unwrap();
        assert_eq!(data.authors[0].name, "Frank Herbert");
        assert_eq!(data.identifiers["goodreads"], vec!["234225"]);
    }

    #[test]
    fn test_bio_text_forms() {
        let plain: AuthorRecord = serde_json::from_str(r#"{"bio": "Wrote Dune."}"#).unwrap();
        let typed: AuthorRecord =
            serde_json::from_str(r#"{"bio": {"type": "/type/text", "value": "Wrote Dune."}}"#)
                .unwrap();
        assert_eq!(plain.bio.unwrap().into_string(), "Wrote Dune.");
        assert_eq!(typed.bio.unwrap().into_string(), "Wrote Dune.");
    }
}
