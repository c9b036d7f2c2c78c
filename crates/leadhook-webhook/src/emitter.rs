//! Fire-and-forget event producers.

use tokio::task::JoinHandle;

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::payload::{self, Activity, Contact, FieldChanges, Lead};
use crate::{EventPayload, TRACING_TARGET_EMITTER};

/// Handle to a spawned dispatch. Dropping it does not cancel the dispatch.
pub type EmitHandle = JoinHandle<Vec<DispatchReport>>;

/// Typed entry point for domain code that raises webhook events.
///
/// Each `trigger_*` formats the payload once and spawns the dispatch.
/// Delivery failures are logged, never returned.
#[derive(Clone)]
pub struct WebhookEmitter {
    dispatcher: Dispatcher,
}

impl WebhookEmitter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Spawns the dispatch of an already formatted payload.
    pub fn emit(&self, payload: EventPayload) -> EmitHandle {
        let dispatcher = self.dispatcher.clone();

        tracing::debug!(
            target: TRACING_TARGET_EMITTER,
            event = %payload.event,
            payload_id = %payload.id,
            "Emitting webhook event"
        );

        tokio::spawn(async move { dispatcher.dispatch(&payload).await })
    }

    pub fn trigger_lead_created(&self, lead: &Lead) -> EmitHandle {
        self.emit(payload::lead_created(lead))
    }

    pub fn trigger_lead_updated(&self, lead: &Lead, changes: &FieldChanges) -> EmitHandle {
        self.emit(payload::lead_updated(lead, changes))
    }

    pub fn trigger_lead_status_changed(&self, lead: &Lead, previous_status: &str) -> EmitHandle {
        self.emit(payload::lead_status_changed(lead, previous_status))
    }

    pub fn trigger_lead_deleted(&self, lead: &Lead) -> EmitHandle {
        self.emit(payload::lead_deleted(lead))
    }

    pub fn trigger_lead_activity_added(&self, lead: &Lead, activity: &Activity) -> EmitHandle {
        self.emit(payload::lead_activity_added(lead, activity))
    }

    pub fn trigger_contact_created(&self, contact: &Contact) -> EmitHandle {
        self.emit(payload::contact_created(contact))
    }

    pub fn trigger_contact_updated(&self, contact: &Contact, changes: &FieldChanges) -> EmitHandle {
        self.emit(payload::contact_updated(contact, changes))
    }

    pub fn trigger_contact_deleted(&self, contact: &Contact) -> EmitHandle {
        self.emit(payload::contact_deleted(contact))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DeliveryConfig;
    use crate::delivery::DeliveryExecutor;
    use crate::store::{EndpointStore, MemoryStore, NewEndpoint};
    use crate::test_support::MockReceiver;
    use crate::WebhookEvent;

    #[tokio::test]
    async fn trigger_spawns_dispatch() {
        let receiver = MockReceiver::start(200).await;
        let store = MemoryStore::new();
        store
            .create_endpoint(NewEndpoint {
                name: "Status board".into(),
                url: receiver.url.clone(),
                events: vec![WebhookEvent::LeadStatusChanged],
                secret: None,
                enabled: true,
            })
            .await
            .unwrap();

        let executor =
            DeliveryExecutor::new(DeliveryConfig::default().with_insecure_targets(true)).unwrap();
        let emitter = WebhookEmitter::new(Dispatcher::new(Arc::new(store), executor));

        let mut lead = payload::tests::ada();
        lead.status = "won".into();
        let reports = emitter
            .trigger_lead_status_changed(&lead, "qualified")
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].success);

        let received = receiver.received().await;
        let sent: EventPayload = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent.data["previousStatus"], "qualified");
        assert_eq!(sent.data["newStatus"], "won");

        // Nobody subscribed; the handle still resolves.
        let reports = emitter.trigger_lead_deleted(&lead).await.unwrap();
        assert!(reports.is_empty());
    }
}
