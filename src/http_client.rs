//! Shared HTTP client for provider adapters.
//!
//! One client is built per process and cloned into every provider so the
//! underlying connection pool is reused. Free-provider GETs can be served
//! from a response cache kept in the key-value store.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::providers::ProviderError;
use crate::quota::KvStore;

/// Default user agent for outbound requests.
pub const USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"), " (book metadata)");

/// How a request authenticates with the remote API.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    Bearer(&'a str),
    /// API key sent in a named header.
    Header(&'static str, &'a str),
    /// API key sent as a query parameter.
    Query(&'static str, &'a str),
}

impl Auth<'_> {
    fn apply(self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Header(name, value) => request.header(name, value),
            Auth::Query(name, value) => request.query(&[(name, value)]),
        }
    }
}

/// Response cache backed by the key-value store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(url: &str) -> String {
        format!("cache:http:{}", url)
    }

    async fn get(&self, url: &str) -> Option<String> {
        match self.store.get(&Self::key(url)).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!("Response cache read failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn put(&self, url: &str, body: &str) {
        if let Err(e) = self.store.put(&Self::key(url), body, Some(self.ttl)).await {
            debug!("Response cache write failed for {}: {}", url, e);
        }
    }
}

/// HTTP client wrapper returning `ProviderError` for every failure mode.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cache: Option<ResponseCache>,
}

impl HttpClient {
    /// Build a client. The per-request deadline is enforced by the
    /// orchestrators; `timeout` here is the hard transport ceiling.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// GET and decode JSON. A 404 is `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Auth<'_>,
    ) -> Result<Option<T>, ProviderError> {
        let body = match self.get_text(url, auth).await? {
            Some(body) => body,
            None => return Ok(None),
        };
        decode(url, &body).map(Some)
    }

    /// GET JSON through the response cache. Only use for unauthenticated
    /// or query-key requests whose URL fully identifies the response.
    pub async fn get_json_cached<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Auth<'_>,
    ) -> Result<Option<T>, ProviderError> {
        let Some(cache) = &self.cache else {
            return self.get_json(url, auth).await;
        };

        if let Some(body) = cache.get(url).await {
            debug!("Response cache hit: {}", url);
            return decode(url, &body).map(Some);
        }

        let body = match self.get_text(url, auth).await? {
            Some(body) => body,
            None => return Ok(None),
        };
        let value = decode(url, &body)?;
        cache.put(url, &body).await;
        Ok(Some(value))
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &B,
    ) -> Result<T, ProviderError> {
        let request = auth.apply(self.client.post(url).json(body));
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        let text = response.text().await.map_err(transport_error)?;
        decode(url, &text)
    }

    async fn get_text(&self, url: &str, auth: Auth<'_>) -> Result<Option<String>, ProviderError> {
        debug!("GET {}", url);
        let request = auth.apply(self.client.get(url));
        let response = request.send().await.map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.text().await.map(Some).map_err(transport_error)
            }
            status => Err(ProviderError::Status(status.as_u16())),
        }
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Http(e.to_string())
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(format!("{}: {}", url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::InMemoryKvStore;

    #[tokio::test]
    async fn test_cached_response_skips_network() {
        let store = Arc::new(InMemoryKvStore::new());
        let url = "http://127.0.0.1:9/never-contacted";
        store
            .put(&ResponseCache::key(url), r#"{"title":"Dune"}"#, None)
            .await
            .unwrap();

        let client = HttpClient::new(USER_AGENT, Duration::from_secs(1))
            .unwrap()
            .with_cache(ResponseCache::new(store, Duration::from_secs(60)));

        let value: Option<serde_json::Value> =
            client.get_json_cached(url, Auth::None).await.unwrap();
        assert_eq!(value.unwrap()["title"], "Dune");
    }

    #[test]
    fn test_decode_reports_url() {
        let err = decode::<serde_json::Value>("https://x.test/a", "not json").unwrap_err();
        assert!(err.to_string().contains("https://x.test/a"));
    }
}
