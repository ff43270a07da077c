//! Provider ordering and the cascading-fallback strategy.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::models::{Capability, Lookup, ProviderKind, Validate};
use crate::providers::{Provider, ProviderResult, ServiceContext};
use crate::utils::format_millis;

/// How providers for a capability are ordered before a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityPolicy {
    /// Highest confidence first; paid sources lead.
    ConfidenceFirst,
    /// Free providers first, then paid, then generative.
    FreeFirst,
}

/// Explicit per-capability provider order, keyed by capability name.
///
/// Named providers run first in the given order; unnamed providers follow
/// in the capability's default policy order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityConfig {
    pub overrides: BTreeMap<String, Vec<String>>,
}

impl PriorityConfig {
    pub fn with_override(mut self, capability: Capability, order: &[&str]) -> Self {
        self.overrides.insert(
            capability.as_str().to_string(),
            order.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn for_capability(&self, capability: Capability) -> Option<&[String]> {
        self.overrides.get(capability.as_str()).map(Vec::as_slice)
    }
}

fn kind_rank(kind: ProviderKind, policy: PriorityPolicy) -> u8 {
    match (policy, kind) {
        (PriorityPolicy::ConfidenceFirst, _) => 0,
        (PriorityPolicy::FreeFirst, ProviderKind::Free) => 0,
        (PriorityPolicy::FreeFirst, ProviderKind::Paid) => 1,
        (PriorityPolicy::FreeFirst, ProviderKind::Ai) => 2,
    }
}

/// Order providers by policy, then move explicitly named ones to the front.
/// The sort is stable, so ties keep registration order.
pub fn order_providers(
    mut providers: Vec<Arc<dyn Provider>>,
    policy: PriorityPolicy,
    explicit: Option<&[String]>,
) -> Vec<Arc<dyn Provider>> {
    providers.sort_by_key(|p| (kind_rank(p.kind(), policy), std::cmp::Reverse(p.confidence())));

    if let Some(order) = explicit {
        let position = |p: &Arc<dyn Provider>| {
            order
                .iter()
                .position(|name| name == p.name())
                .unwrap_or(order.len())
        };
        providers.sort_by_key(position);
    }
    providers
}

/// Try providers in order until one returns a valid value.
///
/// Each call is bounded by `timeout`. Errors, timeouts, empty and invalid
/// results all move on to the next provider; the strategy itself never
/// fails.
pub async fn cascade<T, F, Fut>(
    capability: Capability,
    providers: Vec<Arc<dyn Provider>>,
    ctx: &ServiceContext,
    timeout: Duration,
    call: F,
) -> Lookup<T>
where
    T: Validate,
    F: Fn(Arc<dyn Provider>) -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    if providers.is_empty() {
        debug!("No available providers for {}", capability);
        return Lookup::NotFound;
    }

    for provider in providers {
        let name = provider.name().to_string();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, call(Arc::clone(&provider)))
            .instrument(ctx.span().clone())
            .await;
        let elapsed = format_millis(started.elapsed().as_millis());

        match outcome {
            Ok(Ok(Some(value))) if value.is_valid() => {
                info!("{} satisfied by {} in {}", capability, name, elapsed);
                return Lookup::Found(value);
            }
            Ok(Ok(Some(_))) => debug!("{}: {} returned an invalid result", capability, name),
            Ok(Ok(None)) => debug!("{}: {} found nothing ({})", capability, name, elapsed),
            Ok(Err(e)) => warn!("{}: provider {} failed: {}", capability, name, e),
            Err(_) => warn!(
                "{}: provider {} timed out after {}",
                capability,
                name,
                format_millis(timeout.as_millis())
            ),
        }
    }

    warn!("{}: all providers exhausted without a result", capability);
    Lookup::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        kind: ProviderKind,
        confidence: u8,
    }

    #[async_trait]
    impl Provider for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn confidence(&self) -> u8 {
            self.confidence
        }
    }

    fn providers() -> Vec<Arc<dyn Provider>> {
        vec![
            Arc::new(Named {
                name: "open_library",
                kind: ProviderKind::Free,
                confidence: 65,
            }),
            Arc::new(Named {
                name: "isbndb",
                kind: ProviderKind::Paid,
                confidence: 90,
            }),
            Arc::new(Named {
                name: "google_books",
                kind: ProviderKind::Free,
                confidence: 75,
            }),
        ]
    }

    fn names(providers: &[Arc<dyn Provider>]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_confidence_first() {
        let ordered = order_providers(providers(), PriorityPolicy::ConfidenceFirst, None);
        assert_eq!(names(&ordered), vec!["isbndb", "google_books", "open_library"]);
    }

    #[test]
    fn test_free_first() {
        let ordered = order_providers(providers(), PriorityPolicy::FreeFirst, None);
        assert_eq!(names(&ordered), vec!["google_books", "open_library", "isbndb"]);
    }

    #[test]
    fn test_explicit_order_leads() {
        let explicit = vec!["open_library".to_string()];
        let ordered = order_providers(
            providers(),
            PriorityPolicy::ConfidenceFirst,
            Some(&explicit),
        );
        assert_eq!(names(&ordered), vec!["open_library", "isbndb", "google_books"]);
    }

    #[test]
    fn test_priority_config_lookup() {
        let config = PriorityConfig::default().with_override(Capability::Ratings, &["a", "b"]);
        assert_eq!(
            config.for_capability(Capability::Ratings),
            Some(&["a".to_string(), "b".to_string()][..])
        );
        assert!(config.for_capability(Capability::CoverImage).is_none());
    }
}
