//! Concurrent fan-out to every available provider.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn, Instrument};

use crate::models::Capability;
use crate::providers::{Provider, ProviderResult, ServiceContext};
use crate::utils::format_millis;

/// Results of a fan-out, in provider order.
pub struct Gathered<T> {
    pub hits: Vec<(Arc<dyn Provider>, T)>,
    /// Providers that errored or timed out.
    pub failed: Vec<String>,
}

impl<T> Gathered<T> {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Call every provider concurrently, each bounded by `timeout`.
///
/// A slow provider never delays its siblings past the shared deadline;
/// its eventual result is dropped with the timed-out future.
pub async fn gather<T, F, Fut>(
    capability: Capability,
    providers: Vec<Arc<dyn Provider>>,
    ctx: &ServiceContext,
    timeout: Duration,
    call: F,
) -> Gathered<T>
where
    F: Fn(Arc<dyn Provider>) -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let calls = providers.into_iter().map(|provider| {
        let fut = call(Arc::clone(&provider));
        async move {
            let outcome = tokio::time::timeout(timeout, fut).await;
            (provider, outcome)
        }
    });
    let outcomes = join_all(calls).instrument(ctx.span().clone()).await;

    let mut gathered = Gathered {
        hits: Vec::new(),
        failed: Vec::new(),
    };
    for (provider, outcome) in outcomes {
        match outcome {
            Ok(Ok(Some(value))) => gathered.hits.push((provider, value)),
            Ok(Ok(None)) => debug!("{}: {} found nothing", capability, provider.name()),
            Ok(Err(e)) => {
                warn!("{}: provider {} failed: {}", capability, provider.name(), e);
                gathered.failed.push(provider.name().to_string());
            }
            Err(_) => {
                warn!(
                    "{}: provider {} timed out after {}",
                    capability,
                    provider.name(),
                    format_millis(timeout.as_millis())
                );
                gathered.failed.push(provider.name().to_string());
            }
        }
    }

    debug!(
        "{}: {} provider(s) returned results, {} failed",
        capability,
        gathered.hits.len(),
        gathered.failed.len()
    );
    gathered
}
