//! Wikidata provider (SPARQL endpoint plus the entity search API).
//!
//! Item lookup by ISBN first consults the catalog for a QID recorded by an
//! earlier enrichment; a SPARQL scan over ISBN claims is the fallback.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{
    AuthorBioSource, ExternalIdSource, Provider, ProviderResult, PublicDomainDetector,
    ServiceContext,
};
use crate::http_client::{Auth, HttpClient};
use crate::models::{
    AuthorBiography, ExternalIds, ProviderKind, PublicDomainQuery, PublicDomainResult,
};
use crate::utils::{isbn, public_domain_by_year};

const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";
const API_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";
const NAME: &str = "wikidata";
const CONFIDENCE: u8 = 70;

/// Wikidata properties mapped to external id catalog names.
const ID_PROPERTIES: [(&str, &str); 4] = [
    ("olid", "P648"),
    ("goodreads", "P2969"),
    ("oclc", "P243"),
    ("lccn", "P1144"),
];

const AUTHOR_HINTS: [&str; 5] = ["writer", "author", "novelist", "poet", "journalist"];

pub struct WikidataProvider {
    http: HttpClient,
    sparql_endpoint: String,
    api_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct EntitySearch {
    #[serde(default)]
    search: Vec<EntityHit>,
}

#[derive(Debug, Deserialize)]
struct EntityHit {
    id: String,
    label: Option<String>,
    description: Option<String>,
}

/// Work item found for an ISBN.
#[derive(Debug)]
struct WorkItem {
    qid: String,
    ids: Vec<(&'static str, String)>,
    publication_year: Option<i32>,
}

impl WorkItem {
    fn from_binding(row: &HashMap<String, SparqlValue>) -> Option<Self> {
        let qid = row.get("item")?.value.rsplit('/').next()?.to_string();
        let ids = ID_PROPERTIES
            .iter()
            .filter_map(|(catalog, _)| Some((*catalog, row.get(*catalog)?.value.clone())))
            .collect();
        let publication_year = row
            .get("date")
            .and_then(|d| d.value.trim_start_matches('+').get(..4)?.parse().ok());
        Some(Self {
            qid,
            ids,
            publication_year,
        })
    }
}

fn item_query(item_clause: &str) -> String {
    let optionals: String = ID_PROPERTIES
        .iter()
        .map(|(var, prop)| format!("  OPTIONAL {{ ?item wdt:{} ?{} }}\n", prop, var))
        .collect();
    format!(
        "SELECT ?item ?{} ?date WHERE {{\n  {}\n{}  OPTIONAL {{ ?item wdt:P577 ?date }}\n}} LIMIT 1",
        ID_PROPERTIES
            .iter()
            .map(|(var, _)| *var)
            .collect::<Vec<_>>()
            .join(" ?"),
        item_clause,
        optionals
    )
}

fn date_part(value: &str) -> String {
    value.trim_start_matches('+').chars().take(10).collect()
}

impl WikidataProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_endpoints(http, SPARQL_ENDPOINT, API_ENDPOINT)
    }

    pub fn with_endpoints(
        http: HttpClient,
        sparql_endpoint: impl Into<String>,
        api_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            http,
            sparql_endpoint: sparql_endpoint.into(),
            api_endpoint: api_endpoint.into(),
        }
    }

    async fn sparql(
        &self,
        query: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<HashMap<String, SparqlValue>>> {
        let url = format!(
            "{}?format=json&query={}",
            self.sparql_endpoint,
            urlencoding::encode(query)
        );
        ctx.record_call(NAME);
        let response: Option<SparqlResponse> = self.http.get_json_cached(&url, Auth::None).await?;
        Ok(response
            .map(|r| r.results.bindings)
            .filter(|rows| !rows.is_empty()))
    }

    /// QID already recorded in the catalog for this ISBN.
    async fn known_qid(&self, isbn: &str, ctx: &ServiceContext) -> Option<String> {
        let catalog = ctx.catalog()?;
        match catalog.find_by_isbn(isbn).await {
            Ok(book) => book.and_then(|b| b.external_ids.get(NAME).cloned()),
            Err(e) => {
                debug!("Catalog lookup for {} failed, using SPARQL: {}", isbn, e);
                None
            }
        }
    }

    async fn work_item(&self, raw_isbn: &str, ctx: &ServiceContext) -> ProviderResult<WorkItem> {
        let Some(isbn13) = isbn::to_isbn13(raw_isbn) else {
            return Ok(None);
        };

        let clause = match self.known_qid(&isbn13, ctx).await {
            Some(qid) => format!("BIND(wd:{} AS ?item)", qid),
            None => format!(
                "?item wdt:P212 ?isbn . FILTER(REPLACE(?isbn, \"-\", \"\") = \"{}\")",
                isbn13
            ),
        };

        let rows = self.sparql(&item_query(&clause), ctx).await?;
        Ok(rows.and_then(|rows| rows.first().and_then(WorkItem::from_binding)))
    }
}

#[async_trait]
impl Provider for WikidataProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Free
    }

    fn confidence(&self) -> u8 {
        CONFIDENCE
    }

    fn as_external_id_source(&self) -> Option<&dyn ExternalIdSource> {
        Some(self)
    }

    fn as_author_bio_source(&self) -> Option<&dyn AuthorBioSource> {
        Some(self)
    }

    fn as_public_domain_detector(&self) -> Option<&dyn PublicDomainDetector> {
        Some(self)
    }
}

#[async_trait]
impl ExternalIdSource for WikidataProvider {
    async fn fetch_external_ids(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<ExternalIds> {
        let Some(item) = self.work_item(isbn, ctx).await? else {
            return Ok(None);
        };

        let mut ids = ExternalIds::new(NAME, CONFIDENCE);
        ids.insert(NAME, item.qid);
        for (catalog, id) in item.ids {
            ids.insert(catalog, id);
        }
        Ok(Some(ids))
    }
}

#[async_trait]
impl PublicDomainDetector for WikidataProvider {
    async fn detect_public_domain(
        &self,
        query: &PublicDomainQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<PublicDomainResult> {
        let Some(isbn) = query.isbn.as_deref() else {
            return Ok(None);
        };
        let Some(item) = self.work_item(isbn, ctx).await? else {
            return Ok(None);
        };
        let Some(year) = item.publication_year.or(query.publication_year) else {
            return Ok(None);
        };

        let is_public_domain = public_domain_by_year(year, Utc::now().year());
        Ok(Some(PublicDomainResult {
            is_public_domain,
            reason: format!("wikidata {} lists publication in {}", item.qid, year),
            download_url: None,
            confidence: CONFIDENCE,
            source: NAME.to_string(),
        }))
    }
}

#[async_trait]
impl AuthorBioSource for WikidataProvider {
    async fn fetch_author_bio(
        &self,
        name: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<AuthorBiography> {
        let url = format!(
            "{}?action=wbsearchentities&search={}&language=en&type=item&format=json&limit=5",
            self.api_endpoint,
            urlencoding::encode(name)
        );
        ctx.record_call(NAME);
        let Some(search) = self
            .http
            .get_json_cached::<EntitySearch>(&url, Auth::None)
            .await?
        else {
            return Ok(None);
        };

        let hit = search
            .search
            .iter()
            .position(|h| {
                h.description.as_deref().is_some_and(|d| {
                    let d = d.to_lowercase();
                    AUTHOR_HINTS.iter().any(|hint| d.contains(hint))
                })
            })
            .or_else(|| search.search.iter().position(|h| h.description.is_some()));
        let Some(hit) = hit.and_then(|i| search.search.into_iter().nth(i)) else {
            return Ok(None);
        };
        let Some(description) = hit.description else {
            return Ok(None);
        };

        let query = format!(
            "SELECT ?birth ?death WHERE {{ OPTIONAL {{ wd:{id} wdt:P569 ?birth }} OPTIONAL {{ wd:{id} wdt:P570 ?death }} }} LIMIT 1",
            id = hit.id
        );
        let dates = self.sparql(&query, ctx).await?.and_then(|rows| rows.into_iter().next());
        let date = |var: &str| dates.as_ref()?.get(var).map(|v| date_part(&v.value));

        Ok(Some(AuthorBiography {
            name: hit.label.unwrap_or_else(|| name.to_string()),
            biography: description,
            birth_date: date("birth"),
            death_date: date("death"),
            confidence: CONFIDENCE,
            source: NAME.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_query_shape() {
        let q = item_query("BIND(wd:Q190192 AS ?item)");
        assert!(q.starts_with("SELECT ?item ?olid ?goodreads ?oclc ?lccn ?date WHERE {"));
        assert!(q.contains("OPTIONAL { ?item wdt:P648 ?olid }"));
        assert!(q.contains("BIND(wd:Q190192 AS ?item)"));
    }

    #[test]
    fn test_work_item_from_binding() {
        let body = r#"{"results": {"bindings": [{
            "item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q190192"},
            "goodreads": {"type": "literal", "value": "234225"},
            "date": {"type": "literal", "value": "1965-08-01T00:00:00Z"}
        }]}}"#;
        let response: SparqlResponse = serde_json::from_str(body).unwrap();
        let item = WorkItem::from_binding(&response.results.bindings[0]).unwrap();
        assert_eq!(item.qid, "Q190192");
        assert_eq!(item.ids, vec![("goodreads", "234225".to_string())]);
        assert_eq!(item.publication_year, Some(1965));
    }

    #[test]
    fn test_date_part() {
        assert_eq!(date_part("+1920-01-02T00:00:00Z"), "1920-01-02");
    }
}
