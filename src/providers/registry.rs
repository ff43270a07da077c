//! Capability-indexed provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{Provider, ServiceContext};
use crate::models::Capability;

/// Registry of providers, indexed by declared capability.
///
/// Registration is idempotent per provider name. Lookup order follows
/// registration order; orchestrators apply their own priority policy.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    by_capability: HashMap<Capability, Vec<usize>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Returns false if the name is already taken.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> bool {
        if self.get(provider.name()).is_some() {
            debug!("Provider {} already registered", provider.name());
            return false;
        }
        debug!(
            "Registered provider {} ({}) with {:?}",
            provider.name(),
            provider.kind().as_str(),
            provider.capabilities()
        );
        self.providers.push(provider);
        self.rebuild_index();
        true
    }

    fn rebuild_index(&mut self) {
        self.by_capability.clear();
        for (idx, provider) in self.providers.iter().enumerate() {
            for capability in provider.capabilities() {
                self.by_capability.entry(capability).or_default().push(idx);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers declaring `capability`, regardless of availability.
    pub fn registered_for(&self, capability: Capability) -> Vec<Arc<dyn Provider>> {
        self.by_capability
            .get(&capability)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| Arc::clone(&self.providers[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Providers declaring `capability` whose availability predicate holds
    /// right now.
    pub async fn providers_for(
        &self,
        capability: Capability,
        ctx: &ServiceContext,
    ) -> Vec<Arc<dyn Provider>> {
        let mut available = Vec::new();
        for provider in self.registered_for(capability) {
            if provider.is_available(ctx).await {
                available.push(provider);
            } else {
                debug!(
                    "Provider {} unavailable for {}",
                    provider.name(),
                    capability
                );
            }
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoverResult, ProviderKind};
    use crate::providers::{CoverSource, Credentials, ProviderResult};
    use async_trait::async_trait;

    struct StubCover {
        name: &'static str,
        available: bool,
    }

    #[async_trait]
    impl Provider for StubCover {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Free
        }
        fn confidence(&self) -> u8 {
            50
        }
        async fn is_available(&self, _ctx: &ServiceContext) -> bool {
            self.available
        }
        fn as_cover_source(&self) -> Option<&dyn CoverSource> {
            Some(self)
        }
    }

    #[async_trait]
    impl CoverSource for StubCover {
        async fn fetch_cover(&self, _isbn: &str, _ctx: &ServiceContext) -> ProviderResult<CoverResult> {
            Ok(None)
        }
    }

    fn stub(name: &'static str, available: bool) -> Arc<dyn Provider> {
        Arc::new(StubCover { name, available })
    }

    #[test]
    fn test_register_is_idempotent_per_name() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register(stub("a", true)));
        assert!(!registry.register(stub("a", false)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.registered_for(Capability::CoverImage).len(), 1);
    }

    #[test]
    fn test_index_only_lists_declared_capabilities() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("a", true));
        assert!(registry.registered_for(Capability::Ratings).is_empty());
        assert_eq!(
            registry.all()[0].capabilities(),
            vec![Capability::CoverImage]
        );
    }

    #[tokio::test]
    async fn test_providers_for_filters_unavailable() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("a", false));
        registry.register(stub("b", true));
        let ctx = ServiceContext::new(Arc::new(Credentials::default()));

        let names: Vec<String> = registry
            .providers_for(Capability::CoverImage, &ctx)
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["b"]);
    }
}
