//! Lease management and delivery handling for a callback URL.

use crate::signature::{self, SIGNATURE_HEADER};
use crate::WebsubError;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Receiver of subscription deliveries.
///
/// One handler is attached per subscription; it runs on the task servicing
/// the inbound HTTP delivery and must not block it indefinitely.
#[async_trait::async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Called once per delivery that passes signature validation.
    async fn on_delivery(&self, subscription: &Subscription, content_type: &str, body: &[u8]);
}

/// One lease held by a [`Subscriber`].
#[derive(Debug)]
pub struct Subscription {
    /// Callback path segment identifying this lease.
    pub id: String,
    /// Topic the lease covers.
    pub topic: String,
    /// Full callback URL registered with the hub.
    pub callback: String,
    /// Shared secret the hub signs deliveries with.
    pub secret: String,
}

struct SubscriberEntry {
    subscription: Arc<Subscription>,
    handler: Arc<dyn DeliveryHandler>,
}

/// Manages subscription leases against one hub and dispatches deliveries
/// arriving on its callback base URL.
pub struct Subscriber {
    weak: Weak<Subscriber>,
    base_url: String,
    hub_url: String,
    client: reqwest::Client,
    entries: RwLock<HashMap<String, SubscriberEntry>>,
}

impl Subscriber {
    /// Creates a subscriber whose callbacks live under `base_url` and
    /// whose leases are held at `hub_url`.
    #[must_use]
    pub fn new(base_url: &str, hub_url: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            hub_url: hub_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Callback base URL of this subscriber.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Subscribes to a topic.
    ///
    /// The hub verifies intent against this subscriber's router before
    /// answering, so the callback routes must already be served when this
    /// is called. On success the returned lease is active.
    ///
    /// # Errors
    ///
    /// Returns [`WebsubError::Http`] when the hub cannot be reached and
    /// [`WebsubError::SubscriptionDenied`] when it answers non-2xx.
    pub async fn subscribe(
        &self,
        topic: &str,
        secret: String,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Arc<Subscription>, WebsubError> {
        let id = random_id();
        let callback = format!("{}/{id}", self.base_url);

        let subscription = Arc::new(Subscription {
            id: id.clone(),
            topic: topic.to_string(),
            callback: callback.clone(),
            secret: secret.clone(),
        });

        // Registered before the request so the verification GET finds it.
        self.entries.write().insert(
            id.clone(),
            SubscriberEntry {
                subscription: Arc::clone(&subscription),
                handler,
            },
        );

        let response = self
            .client
            .post(&self.hub_url)
            .form(&[
                ("hub.mode", "subscribe"),
                ("hub.topic", topic),
                ("hub.callback", &callback),
                ("hub.secret", &secret),
            ])
            .send()
            .await;

        let status = match response {
            Ok(response) => response.status(),
            Err(error) => {
                self.entries.write().remove(&id);
                return Err(error.into());
            }
        };

        if !status.is_success() {
            self.entries.write().remove(&id);
            return Err(WebsubError::SubscriptionDenied {
                topic: topic.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(subscription)
    }

    /// Releases a lease.
    ///
    /// # Errors
    ///
    /// Returns [`WebsubError::UnknownSubscription`] when the lease is not
    /// held here, [`WebsubError::Http`] when the hub cannot be reached,
    /// and [`WebsubError::SubscriptionDenied`] when it answers non-2xx.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), WebsubError> {
        if !self.entries.read().contains_key(&subscription.id) {
            return Err(WebsubError::UnknownSubscription {
                id: subscription.id.clone(),
            });
        }

        let response = self
            .client
            .post(&self.hub_url)
            .form(&[
                ("hub.mode", "unsubscribe"),
                ("hub.topic", &subscription.topic),
                ("hub.callback", &subscription.callback),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebsubError::SubscriptionDenied {
                topic: subscription.topic.clone(),
                status: status.as_u16(),
            });
        }

        self.entries.write().remove(&subscription.id);
        Ok(())
    }

    /// The HTTP surface answering hub verifications (GET) and deliveries
    /// (POST) on `/{id}`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{id}", get(handle_verification).post(handle_delivery))
            .with_state(self.weak.upgrade().expect("subscriber is alive while borrowed"))
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Deserialize)]
struct VerificationParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.topic")]
    topic: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

async fn handle_verification(
    State(subscriber): State<Arc<Subscriber>>,
    Path(id): Path<String>,
    Query(params): Query<VerificationParams>,
) -> impl IntoResponse {
    let entries = subscriber.entries.read();
    match entries.get(&id) {
        Some(entry) if entry.subscription.topic == params.topic => {
            debug!(id, topic = params.topic, mode = params.mode, "verification confirmed");
            (StatusCode::OK, params.challenge)
        }
        _ => {
            debug!(id, topic = params.topic, "verification for unknown lease");
            (StatusCode::NOT_FOUND, String::new())
        }
    }
}

async fn handle_delivery(
    State(subscriber): State<Arc<Subscriber>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Copy the entry out; the handler must run without the map locked.
    let entry = {
        let entries = subscriber.entries.read();
        entries.get(&id).map(|entry| {
            (
                Arc::clone(&entry.subscription),
                Arc::clone(&entry.handler),
            )
        })
    };

    let Some((subscription, handler)) = entry else {
        return StatusCode::NOT_FOUND;
    };

    if !subscription.secret.is_empty() {
        let signature_header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !signature::verify(&subscription.secret, &body, signature_header) {
            debug!(id, topic = subscription.topic, "dropping delivery with bad signature");
            return StatusCode::OK;
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    handler
        .on_delivery(&subscription, &content_type, &body)
        .await;

    StatusCode::OK
}
