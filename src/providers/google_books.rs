//! Google Books volumes API provider.
//!
//! Works without credentials; `GOOGLE_BOOKS_API_KEY` raises the rate limit.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    CoverSource, ExternalIdSource, IsbnResolver, MetadataSource, Provider, ProviderResult,
    RatingsSource, ServiceContext,
};
use crate::http_client::{Auth, HttpClient};
use crate::models::{
    BookMetadata, CoverResult, ExternalIds, ProviderKind, RatingsResult, ResolutionQuery,
    ResolutionResult,
};
use crate::utils::isbn;

const API_BASE: &str = "https://www.googleapis.com/books/v1";
const CREDENTIAL: &str = "GOOGLE_BOOKS_API_KEY";
const NAME: &str = "google_books";
const CONFIDENCE: u8 = 75;

pub struct GoogleBooksProvider {
    http: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    id: String,
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    industry_identifiers: Vec<IndustryIdentifier>,
    page_count: Option<u32>,
    categories: Vec<String>,
    average_rating: Option<f32>,
    ratings_count: Option<u32>,
    image_links: Option<ImageLinks>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl ImageLinks {
    fn best(self) -> Option<(String, &'static str)> {
        self.extra_large
            .map(|u| (u, "extra_large"))
            .or(self.large.map(|u| (u, "large")))
            .or(self.medium.map(|u| (u, "medium")))
            .or(self.thumbnail.map(|u| (u, "thumbnail")))
            .or(self.small_thumbnail.map(|u| (u, "small_thumbnail")))
            // Google serves http links; the https variant is identical.
            .map(|(u, size)| (u.replacen("http://", "https://", 1), size))
    }
}

impl VolumeInfo {
    fn isbn13(&self) -> Option<String> {
        let by_kind = |kind: &str| {
            self.industry_identifiers
                .iter()
                .find(|id| id.kind == kind)
                .and_then(|id| isbn::to_isbn13(&id.identifier))
        };
        by_kind("ISBN_13").or_else(|| by_kind("ISBN_10"))
    }
}

impl GoogleBooksProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_base_url(http, API_BASE)
    }

    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn search(&self, q: &str, ctx: &ServiceContext) -> ProviderResult<Vec<Volume>> {
        let url = format!(
            "{}/volumes?q={}&maxResults=5&printType=books",
            self.base_url,
            urlencoding::encode(q)
        );
        let auth = match ctx.credential(CREDENTIAL) {
            Some(key) => Auth::Query("key", key),
            None => Auth::None,
        };

        ctx.record_call(NAME);
        let response: Option<VolumesResponse> = self.http.get_json_cached(&url, auth).await?;
        Ok(response.map(|r| r.items).filter(|items| !items.is_empty()))
    }

    async fn volume_by_isbn(&self, raw_isbn: &str, ctx: &ServiceContext) -> ProviderResult<Volume> {
        let Some(isbn) = isbn::normalize(raw_isbn) else {
            return Ok(None);
        };
        let volumes = self.search(&format!("isbn:{}", isbn), ctx).await?;
        Ok(volumes.and_then(|v| v.into_iter().next()))
    }
}

#[async_trait]
impl Provider for GoogleBooksProvider {
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
}

#[async_trait]
impl IsbnResolver for GoogleBooksProvider {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult> {
        let mut q = format!("intitle:{}", query.title);
        if let Some(author) = &query.author {
            q.push_str(&format!("+inauthor:{}", author));
        }

        let Some(volumes) = self.search(&q, ctx).await? else {
            return Ok(None);
        };

        Ok(volumes.into_iter().find_map(|v| {
            let isbn = v.volume_info.isbn13()?;
            Some(ResolutionResult {
                isbn,
                title: v.volume_info.title.unwrap_or_else(|| query.title.clone()),
                authors: v.volume_info.authors,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl MetadataSource for GoogleBooksProvider {
    async fn fetch_metadata(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<BookMetadata> {
        let Some(volume) = self.volume_by_isbn(isbn, ctx).await? else {
            return Ok(None);
        };
        let info = volume.volume_info;

        let mut metadata = BookMetadata::new(isbn, NAME, CONFIDENCE);
        metadata.title = info.title;
        metadata.subtitle = info.subtitle;
        metadata.authors = info.authors;
        metadata.publisher = info.publisher;
        metadata.published_date = info.published_date;
        metadata.page_count = info.page_count.filter(|p| *p > 0);
        metadata.description = info.description;
        metadata.language = info.language;
        metadata.subjects = info.categories;
        metadata.cover_url = info.image_links.and_then(ImageLinks::best).map(|(u, _)| u);
        Ok(Some(metadata))
    }
}

#[async_trait]
impl CoverSource for GoogleBooksProvider {
    async fn fetch_cover(&self, isbn: &str, ctx: &ServiceContext) -> ProviderResult<CoverResult> {
        let volume = self.volume_by_isbn(isbn, ctx).await?;
        Ok(volume
            .and_then(|v| v.volume_info.image_links)
            .and_then(ImageLinks::best)
            .map(|(url, size)| CoverResult {
                url,
                size: Some(size.to_string()),
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            }))
    }
}

#[async_trait]
impl RatingsSource for GoogleBooksProvider {
    async fn fetch_ratings(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<RatingsResult> {
        let volume = self.volume_by_isbn(isbn, ctx).await?;
        Ok(volume.and_then(|v| {
            let info = v.volume_info;
            Some(RatingsResult {
                average: info.average_rating?,
                count: info.ratings_count?,
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            })
        }))
    }
}

#[async_trait]
impl ExternalIdSource for GoogleBooksProvider {
    async fn fetch_external_ids(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<ExternalIds> {
        let Some(volume) = self.volume_by_isbn(isbn, ctx).await? else {
            return Ok(None);
        };

        let mut ids = ExternalIds::new(NAME, CONFIDENCE);
        ids.insert("google_books", volume.id);
        for identifier in volume.volume_info.industry_identifiers {
            match identifier.kind.as_str() {
                "ISBN_10" => ids.insert("isbn10", identifier.identifier),
                "ISBN_13" => ids.insert("isbn13", identifier.identifier),
                _ => {}
            }
        }
        Ok(Some(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_parsing() {
        let body = r#"{
            "totalItems": 1,
            "items": [{
                "id": "B1hSG45JCX4C",
                "volumeInfo": {
                    "title": "Dune",
                    "authors": ["Frank Herbert"],
                    "industryIdentifiers": [
                        {"type": "ISBN_10", "identifier": "0441013597"},
                        {"type": "ISBN_13", "identifier": "9780441013593"}
                    ],
                    "averageRating": 4.5,
                    "ratingsCount": 120,
                    "imageLinks": {"thumbnail": "http://books.google.com/t.jpg"}
                }
            }]
        }"#;
        let response: VolumesResponse = serde_json::from_str(body).unwrap();
        let volume = response.items.into_iter().next().unwrap();
        assert_eq!(volume.volume_info.isbn13().as_deref(), Some("9780441013593"));

        let (url, size) = volume.volume_info.image_links.unwrap().best().unwrap();
        assert_eq!(url, "https://books.google.com/t.jpg");
        assert_eq!(size, "thumbnail");
    }

    #[test]
    fn test_isbn10_fallback_is_converted() {
        let info = VolumeInfo {
            industry_identifiers: vec![IndustryIdentifier {
                kind: "ISBN_10".to_string(),
                identifier: "0306406152".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(info.isbn13().as_deref(), Some("9780306406157"));
    }
}
