//! Per-call execution context shared by orchestrators and providers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Span;

use crate::quota::QuotaManager;
use crate::repository::CatalogStore;

/// Environment variables holding provider credentials.
pub const CREDENTIAL_VARS: [&str; 4] = [
    "ISBNDB_API_KEY",
    "GOOGLE_BOOKS_API_KEY",
    "GEMINI_API_KEY",
    "XAI_API_KEY",
];

/// Provider credentials, keyed by environment variable name.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    /// Read every known credential from the environment. Empty values are
    /// treated as unset.
    pub fn from_env() -> Self {
        let mut creds = Self::default();
        for var in CREDENTIAL_VARS {
            if let Ok(value) = std::env::var(var) {
                creds = creds.with(var, value);
            }
        }
        creds
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(name.into(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Credentials").field("set", &names).finish()
    }
}

/// Execution context for one request or backfill job.
///
/// Built once and passed by reference into every orchestrator and provider
/// call. The only mutable state is the per-provider call tally, which is a
/// logging side effect read back for job statistics.
pub struct ServiceContext {
    credentials: Arc<Credentials>,
    quota: Option<Arc<QuotaManager>>,
    catalog: Option<Arc<dyn CatalogStore>>,
    timeout: Duration,
    generation_timeout: Duration,
    span: Span,
    calls: Mutex<BTreeMap<String, u32>>,
}

impl ServiceContext {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self {
            credentials,
            quota: None,
            catalog: None,
            timeout: Self::DEFAULT_TIMEOUT,
            generation_timeout: Self::DEFAULT_GENERATION_TIMEOUT,
            span: Span::current(),
            calls: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_quota(mut self, quota: Arc<QuotaManager>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name)
    }

    pub fn quota(&self) -> Option<&QuotaManager> {
        self.quota.as_deref()
    }

    pub fn catalog(&self) -> Option<&dyn CatalogStore> {
        self.catalog.as_deref()
    }

    /// Deadline for a single resolution, cover, or metadata call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deadline for a single generative call.
    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Count an outbound call to `provider`.
    pub fn record_call(&self, provider: &str) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        *calls.entry(provider.to_string()).or_insert(0) += 1;
    }

    /// Calls made through this context so far, per provider.
    pub fn call_tally(&self) -> BTreeMap<String, u32> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credentials_are_unset() {
        let creds = Credentials::default()
            .with("ISBNDB_API_KEY", "  ")
            .with("XAI_API_KEY", "secret");
        assert!(!creds.is_set("ISBNDB_API_KEY"));
        assert_eq!(creds.get("XAI_API_KEY"), Some("secret"));
    }

    #[test]
    fn test_debug_does_not_print_secrets() {
        let creds = Credentials::default().with("XAI_API_KEY", "secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("XAI_API_KEY"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_call_tally() {
        let ctx = ServiceContext::new(Arc::new(Credentials::default()));
        ctx.record_call("open_library");
        ctx.record_call("open_library");
        ctx.record_call("isbndb");

        let tally = ctx.call_tally();
        assert_eq!(tally.get("open_library"), Some(&2));
        assert_eq!(tally.get("isbndb"), Some(&1));
    }
}
