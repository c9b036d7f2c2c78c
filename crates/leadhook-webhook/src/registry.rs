//! Endpoint registration and validation.

use std::str::FromStr;
use std::sync::Arc;

use uuid::Uuid;

use crate::safety::UrlGuard;
use crate::store::{
    DeliveryAttempt, Endpoint, EndpointUpdate, NewEndpoint, Page, Pagination, WebhookStore,
};
use crate::{Error, Result, TRACING_TARGET_REGISTRY, WebhookEvent};

/// Maximum endpoint name length in characters.
pub const MAX_NAME_LENGTH: usize = 255;
/// Maximum endpoint URL length in bytes.
pub const MAX_URL_LENGTH: usize = 2048;

/// Unvalidated input for a new endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInput {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<String>,
    /// Defaults to enabled.
    pub enabled: Option<bool>,
}

/// Unvalidated partial update of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointChanges {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    /// `Some(None)` removes the secret.
    pub secret: Option<Option<String>>,
    pub enabled: Option<bool>,
}

/// Validates and persists webhook endpoints.
#[derive(Clone)]
pub struct EndpointRegistry {
    store: Arc<dyn WebhookStore>,
    guard: UrlGuard,
}

impl EndpointRegistry {
    pub fn new(store: Arc<dyn WebhookStore>, guard: UrlGuard) -> Self {
        Self { store, guard }
    }

    /// Registers a new endpoint.
    pub async fn create(&self, input: EndpointInput) -> Result<Endpoint> {
        let endpoint = NewEndpoint {
            name: validate_name(&input.name)?,
            url: self.validate_url(&input.url)?,
            events: parse_events(&input.events)?,
            secret: normalize_secret(input.secret),
            enabled: input.enabled.unwrap_or(true),
        };

        let endpoint = self.store.create_endpoint(endpoint).await?;

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            endpoint_id = %endpoint.id,
            events = endpoint.events.len(),
            signed = endpoint.has_secret(),
            "Webhook endpoint registered"
        );

        Ok(endpoint)
    }

    /// Applies a partial update.
    ///
    /// Setting `enabled` to true also resets the failure count.
    pub async fn update(&self, endpoint_id: Uuid, changes: EndpointChanges) -> Result<Endpoint> {
        let update = EndpointUpdate {
            name: changes.name.as_deref().map(validate_name).transpose()?,
            url: changes
                .url
                .as_deref()
                .map(|url| self.validate_url(url))
                .transpose()?,
            events: changes.events.as_deref().map(parse_events).transpose()?,
            secret: changes.secret.map(normalize_secret),
            enabled: changes.enabled,
        };

        if update.is_empty() {
            return self.get(endpoint_id).await;
        }

        let re_enabled = update.enabled == Some(true);
        let endpoint = self
            .store
            .update_endpoint(endpoint_id, update)
            .await?
            .ok_or_else(not_found)?;

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            endpoint_id = %endpoint.id,
            enabled = endpoint.enabled,
            re_enabled,
            "Webhook endpoint updated"
        );

        Ok(endpoint)
    }

    pub async fn list(&self, pagination: Pagination) -> Result<Page<Endpoint>> {
        self.store.list_endpoints(pagination).await
    }

    pub async fn get(&self, endpoint_id: Uuid) -> Result<Endpoint> {
        self.store
            .find_endpoint(endpoint_id)
            .await?
            .ok_or_else(not_found)
    }

    /// Deletes an endpoint along with its history and pending retries.
    pub async fn delete(&self, endpoint_id: Uuid) -> Result<()> {
        if !self.store.delete_endpoint(endpoint_id).await? {
            return Err(not_found());
        }

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            endpoint_id = %endpoint_id,
            "Webhook endpoint deleted"
        );
        Ok(())
    }

    /// Lists delivery attempts for an endpoint, newest first.
    pub async fn list_attempts(
        &self,
        endpoint_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<DeliveryAttempt>> {
        self.get(endpoint_id).await?;
        self.store.list_attempts(endpoint_id, pagination).await
    }

    fn validate_url(&self, url: &str) -> Result<String> {
        let url = url.trim();
        if url.len() > MAX_URL_LENGTH {
            return Err(Error::invalid_input(format!(
                "url must be at most {MAX_URL_LENGTH} bytes"
            )));
        }

        let verdict = self.guard.check(url);
        if !verdict.valid {
            return Err(Error::unsafe_url(verdict.reason().to_owned()).with_context("url"));
        }
        Ok(url.to_owned())
    }
}

fn not_found() -> Error {
    Error::not_found("webhook endpoint not found")
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("name must not be empty").with_context("name"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::invalid_input(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        ))
        .with_context("name"));
    }
    Ok(name.to_owned())
}

/// Parses event names, rejecting unknown names and the test event.
///
/// Duplicates are collapsed while keeping the first occurrence's order.
fn parse_events(names: &[String]) -> Result<Vec<WebhookEvent>> {
    if names.is_empty() {
        return Err(Error::invalid_input("at least one event is required").with_context("events"));
    }

    let mut events = Vec::with_capacity(names.len());
    for name in names {
        let event = WebhookEvent::from_str(name.trim()).map_err(|_| {
            Error::invalid_input(format!("unknown event '{name}'")).with_context("events")
        })?;
        if !event.is_subscribable() {
            return Err(Error::invalid_input(format!(
                "event '{event}' cannot be subscribed to"
            ))
            .with_context("events"));
        }
        if !events.contains(&event) {
            events.push(event);
        }
    }

    Ok(events)
}

fn normalize_secret(secret: Option<String>) -> Option<String> {
    secret.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::safety::UrlPolicy;
    use crate::store::{EndpointStore, MemoryStore};

    fn registry() -> (MemoryStore, EndpointRegistry) {
        let store = MemoryStore::new();
        let registry = EndpointRegistry::new(Arc::new(store.clone()), UrlGuard::new(UrlPolicy::strict()));
        (store, registry)
    }

    fn input() -> EndpointInput {
        EndpointInput {
            name: "Zapier".into(),
            url: "https://hooks.zapier.com/hooks/catch/1/abc".into(),
            events: vec!["lead.created".into(), "lead.status_changed".into()],
            secret: Some("s1".into()),
            enabled: None,
        }
    }

    #[tokio::test]
    async fn create_valid_endpoint() {
        let (_, registry) = registry();
        let endpoint = registry.create(input()).await.unwrap();

        assert!(endpoint.enabled);
        assert_eq!(endpoint.failure_count, 0);
        assert_eq!(
            endpoint.events,
            vec![WebhookEvent::LeadCreated, WebhookEvent::LeadStatusChanged]
        );
        assert_eq!(registry.get(endpoint.id).await.unwrap(), endpoint);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_persisting() {
        let (store, registry) = registry();

        let cases = [
            EndpointInput { name: "  ".into(), ..input() },
            EndpointInput { events: vec![], ..input() },
            EndpointInput { events: vec!["lead.exploded".into()], ..input() },
            EndpointInput { events: vec!["webhook.test".into()], ..input() },
        ];
        for case in cases {
            let err = registry.create(case).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidInput);
        }

        let cases = [
            EndpointInput { url: "http://hooks.example.com/".into(), ..input() },
            EndpointInput { url: "https://192.168.0.10/".into(), ..input() },
            EndpointInput { url: "nope".into(), ..input() },
        ];
        for case in cases {
            let err = registry.create(case).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::UnsafeUrl);
        }

        let page = store.list_endpoints(Pagination::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn update_revalidates_and_re_enables() {
        let (store, registry) = registry();
        let endpoint = registry.create(input()).await.unwrap();
        store
            .record_failure(endpoint.id, Some(500), jiff::Timestamp::now(), 1)
            .await
            .unwrap();

        let err = registry
            .update(
                endpoint.id,
                EndpointChanges {
                    url: Some("https://localhost/".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsafeUrl);

        let updated = registry
            .update(
                endpoint.id,
                EndpointChanges {
                    enabled: Some(true),
                    secret: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.enabled);
        assert_eq!(updated.failure_count, 0);
        assert!(!updated.has_secret());
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_found() {
        let (_, registry) = registry();
        let id = Uuid::now_v7();

        assert_eq!(registry.get(id).await.unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(registry.delete(id).await.unwrap_err().kind, ErrorKind::NotFound);
        let changes = EndpointChanges {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        assert_eq!(
            registry.update(id, changes).await.unwrap_err().kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            registry
                .list_attempts(id, Pagination::default())
                .await
                .unwrap_err()
                .kind,
            ErrorKind::NotFound
        );
    }

    #[test]
    fn duplicate_events_collapse() {
        let names = vec!["lead.created".to_owned(), "lead.created".to_owned()];
        assert_eq!(parse_events(&names).unwrap(), vec![WebhookEvent::LeadCreated]);
    }
}
