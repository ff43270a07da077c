//! Internet Archive provider: public-domain detection and scanned covers.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::Deserialize;

use super::{CoverSource, Provider, ProviderResult, PublicDomainDetector, ServiceContext};
use crate::http_client::{Auth, HttpClient};
use crate::models::{CoverResult, ProviderKind, PublicDomainQuery, PublicDomainResult};
use crate::utils::{isbn, public_domain_by_year};

const API_BASE: &str = "https://archive.org";
const NAME: &str = "archive_org";
const CONFIDENCE: u8 = 55;

pub struct ArchiveOrgProvider {
    http: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<ArchiveDoc>,
}

#[derive(Debug, Deserialize)]
struct ArchiveDoc {
    identifier: String,
    #[serde(default)]
    licenseurl: Option<String>,
    /// Either a number or a string, depending on the item.
    #[serde(default)]
    year: Option<serde_json::Value>,
}

impl ArchiveDoc {
    fn year(&self) -> Option<i32> {
        match self.year.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            serde_json::Value::String(s) => s.trim().get(..4)?.parse().ok(),
            _ => None,
        }
    }

    fn is_licensed_public_domain(&self) -> bool {
        self.licenseurl
            .as_deref()
            .is_some_and(|url| url.contains("publicdomain"))
    }
}

impl ArchiveOrgProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_base_url(http, API_BASE)
    }

    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn search(&self, q: &str, ctx: &ServiceContext) -> ProviderResult<Vec<ArchiveDoc>> {
        let url = format!(
            "{}/advancedsearch.php?q={}&fl[]=identifier&fl[]=licenseurl&fl[]=year&rows=5&output=json",
            self.base_url,
            urlencoding::encode(q)
        );
        ctx.record_call(NAME);
        let envelope: Option<SearchEnvelope> = self.http.get_json_cached(&url, Auth::None).await?;
        Ok(envelope
            .map(|e| e.response.docs)
            .filter(|docs| !docs.is_empty()))
    }

    fn query_for(query: &PublicDomainQuery) -> String {
        if let Some(isbn) = query.isbn.as_deref().and_then(isbn::normalize) {
            return format!("isbn:{}", isbn);
        }
        let mut q = format!("title:(\"{}\") AND mediatype:texts", query.title.replace('"', ""));
        if let Some(author) = &query.author {
            q.push_str(&format!(" AND creator:(\"{}\")", author.replace('"', "")));
        }
        q
    }

    fn judge(doc: &ArchiveDoc, query: &PublicDomainQuery, current_year: i32) -> Option<PublicDomainResult> {
        let download_url = format!("https://archive.org/details/{}", doc.identifier);

        if doc.is_licensed_public_domain() {
            return Some(PublicDomainResult {
                is_public_domain: true,
                reason: "archive.org item carries a public domain license".to_string(),
                download_url: Some(download_url),
                confidence: CONFIDENCE,
                source: NAME.to_string(),
            });
        }

        let year = query.publication_year.or_else(|| doc.year())?;
        let is_public_domain = public_domain_by_year(year, current_year);
        Some(PublicDomainResult {
            is_public_domain,
            reason: if is_public_domain {
                format!("published in {}, copyright term has expired", year)
            } else {
                format!("published in {}, still under copyright", year)
            },
            download_url: is_public_domain.then_some(download_url),
            confidence: CONFIDENCE,
            source: NAME.to_string(),
        })
    }
}

#[async_trait]
impl Provider for ArchiveOrgProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Free
    }

    fn confidence(&self) -> u8 {
        CONFIDENCE
    }

    fn as_cover_source(&self) -> Option<&dyn CoverSource> {
        Some(self)
    }

    fn as_public_domain_detector(&self) -> Option<&dyn PublicDomainDetector> {
        Some(self)
    }
}

#[async_trait]
impl PublicDomainDetector for ArchiveOrgProvider {
    async fn detect_public_domain(
        &self,
        query: &PublicDomainQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<PublicDomainResult> {
        let Some(docs) = self.search(&Self::query_for(query), ctx).await? else {
            return Ok(None);
        };
        let current_year = Utc::now().year();
        Ok(docs
            .iter()
            .find_map(|doc| Self::judge(doc, query, current_year)))
    }
}

#[async_trait]
impl CoverSource for ArchiveOrgProvider {
    async fn fetch_cover(&self, raw_isbn: &str, ctx: &ServiceContext) -> ProviderResult<CoverResult> {
        let Some(isbn) = isbn::normalize(raw_isbn) else {
            return Ok(None);
        };
        let docs = self.search(&format!("isbn:{}", isbn), ctx).await?;
        Ok(docs.and_then(|d| d.into_iter().next()).map(|doc| CoverResult {
            url: format!("{}/services/img/{}", self.base_url, doc.identifier),
            size: None,
            confidence: CONFIDENCE,
            source: NAME.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(year: serde_json::Value, license: Option<&str>) -> ArchiveDoc {
        ArchiveDoc {
            identifier: "greatgatsby00fitz".to_string(),
            licenseurl: license.map(str::to_string),
            year: Some(year),
        }
    }

    fn query() -> PublicDomainQuery {
        PublicDomainQuery {
            isbn: None,
            title: "The Great Gatsby".to_string(),
            author: Some("F. Scott Fitzgerald".to_string()),
            publication_year: None,
        }
    }

    #[test]
    fn test_year_forms() {
        assert_eq!(doc(serde_json::json!(1925), None).year(), Some(1925));
        assert_eq!(doc(serde_json::json!("1925-04-10"), None).year(), Some(1925));
    }

    #[test]
    fn test_judge_by_year() {
        let old = ArchiveOrgProvider::judge(&doc(serde_json::json!(1925), None), &query(), 2026)
            .unwrap();
        assert!(old.is_public_domain);
        assert!(old.download_url.unwrap().ends_with("greatgatsby00fitz"));

        let recent = ArchiveOrgProvider::judge(&doc(serde_json::json!(1990), None), &query(), 2026)
            .unwrap();
        assert!(!recent.is_public_domain);
        assert!(recent.download_url.is_none());
    }

    #[test]
    fn test_license_wins_over_year() {
        let licensed = doc(
            serde_json::json!(2001),
            Some("http://creativecommons.org/publicdomain/mark/1.0/"),
        );
        assert!(ArchiveOrgProvider::judge(&licensed, &query(), 2026)
            .unwrap()
            .is_public_domain);
    }

    #[test]
    fn test_query_prefers_isbn() {
        let mut q = query();
        assert!(ArchiveOrgProvider::query_for(&q).starts_with("title:(\"The Great Gatsby\")"));
        q.isbn = Some("978-0-306-40615-7".to_string());
        assert_eq!(ArchiveOrgProvider::query_for(&q), "isbn:9780306406157");
    }
}
