//! Local webhook receivers and fixtures for tests.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::WebhookEvent;
use crate::safety::DnsResolver;
use crate::store::Endpoint;

/// A request captured by [`MockReceiver`].
#[derive(Debug, Clone)]
pub struct Received {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct Behaviour {
    status: u16,
    body: String,
    delay: Duration,
}

#[derive(Debug, Clone)]
struct ReceiverState {
    behaviour: Arc<Mutex<Behaviour>>,
    received: Arc<Mutex<Vec<Received>>>,
}

/// An axum server on `127.0.0.1:0` that records every webhook it receives.
#[derive(Debug, Clone)]
pub struct MockReceiver {
    pub url: String,
    state: ReceiverState,
}

async fn receive(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.received.lock().await.push(Received {
        headers,
        body: body.to_vec(),
    });

    let (status, body, delay) = {
        let behaviour = state.behaviour.lock().await;
        (behaviour.status, behaviour.body.clone(), behaviour.delay)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, body)
}

impl MockReceiver {
    /// Starts a receiver answering every request with `status`.
    pub async fn start(status: u16) -> Self {
        let state = ReceiverState {
            behaviour: Arc::new(Mutex::new(Behaviour {
                status,
                body: "mock response".to_owned(),
                delay: Duration::ZERO,
            })),
            received: Arc::default(),
        };

        let app = Router::new()
            .route("/hook", post(receive))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/hook"),
            state,
        }
    }

    pub async fn set_status(&self, status: u16) {
        self.state.behaviour.lock().await.status = status;
    }

    pub async fn set_body(&self, body: String) {
        self.state.behaviour.lock().await.body = body;
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.state.behaviour.lock().await.delay = delay;
    }

    pub async fn received(&self) -> Vec<Received> {
        self.state.received.lock().await.clone()
    }
}

/// An enabled endpoint pointing at `url`, not persisted anywhere.
pub fn endpoint_at(url: &str, events: &[WebhookEvent]) -> Endpoint {
    let now = Timestamp::now();
    Endpoint {
        id: Uuid::now_v7(),
        name: "Test endpoint".into(),
        url: url.into(),
        events: events.to_vec(),
        secret: None,
        enabled: true,
        failure_count: 0,
        last_triggered_at: None,
        last_status_code: None,
        created_at: now,
        updated_at: now,
    }
}

/// Resolver whose lookups never finish.
pub struct HangingResolver;

#[async_trait::async_trait]
impl DnsResolver for HangingResolver {
    async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        std::future::pending().await
    }
}
