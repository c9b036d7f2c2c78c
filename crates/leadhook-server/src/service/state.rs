use std::sync::Arc;

use leadhook_webhook::store::{MemoryStore, WebhookStore};
use leadhook_webhook::{
    DeliveryConfig, DeliveryExecutor, Dispatcher, EndpointRegistry, RetryConfig, RetryWorker,
    WebhookEmitter,
};

use crate::service::{PgWebhookStore, Result, ServiceConfig};

/// Tracing target for service state construction.
const TRACING_TARGET: &str = "leadhook_server::service::state";

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection). Every
/// component shares the same store and HTTP client.
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    pub store: Arc<dyn WebhookStore>,
    pub registry: EndpointRegistry,
    pub dispatcher: Dispatcher,
    pub emitter: WebhookEmitter,
}

impl ServiceState {
    /// Builds the webhook components on top of `store`.
    pub fn new(store: Arc<dyn WebhookStore>, delivery: &DeliveryConfig) -> Result<Self> {
        let executor = DeliveryExecutor::new(delivery.clone())?;
        let registry = EndpointRegistry::new(store.clone(), executor.guard().clone());
        let dispatcher = Dispatcher::new(store.clone(), executor);
        let emitter = WebhookEmitter::new(dispatcher.clone());

        Ok(Self {
            store,
            registry,
            dispatcher,
            emitter,
        })
    }

    /// Builds state backed by an in-process [`MemoryStore`].
    pub fn in_memory(delivery: &DeliveryConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), delivery)
    }

    /// Connects to Postgres, applies migrations and builds the state.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let client = config.connect_postgres().await?;
        let store = Arc::new(PgWebhookStore::new(client));

        tracing::debug!(target: TRACING_TARGET, "Service state initialized");
        Self::new(store, &config.delivery)
    }

    /// Returns a retry worker sharing this state's dispatcher.
    pub fn retry_worker(&self, config: RetryConfig) -> Result<RetryWorker> {
        config.validate()?;
        Ok(RetryWorker::new(self.dispatcher.clone(), config))
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(registry: EndpointRegistry);
impl_di!(dispatcher: Dispatcher);
impl_di!(emitter: WebhookEmitter);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_state_builds() {
        let state = ServiceState::in_memory(&DeliveryConfig::default()).unwrap();
        assert!(state.retry_worker(RetryConfig::default()).is_ok());
    }

    #[test]
    fn invalid_delivery_config_fails() {
        let config = DeliveryConfig::default().with_max_response_body_bytes(0);
        assert!(ServiceState::in_memory(&config).is_err());
    }
}
