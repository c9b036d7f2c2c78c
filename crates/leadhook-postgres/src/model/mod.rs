//! Diesel models for the webhook tables.
//!
//! Each table has a queryable row type, an insertable `New*` struct and,
//! where rows are mutable, an `Update*` changeset.

mod webhook_delivery;
mod webhook_endpoint;
mod webhook_pending_delivery;

pub use webhook_delivery::{NewWebhookDelivery, WebhookDelivery};
pub use webhook_endpoint::{
    NewWebhookEndpoint, UpdateWebhookEndpoint, WebhookEndpoint, WebhookFailureState,
};
pub use webhook_pending_delivery::{NewWebhookPendingDelivery, WebhookPendingDelivery};
