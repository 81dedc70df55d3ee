//! The hub: subscription bookkeeping, verification, and content
//! distribution.

use crate::signature::{self, SIGNATURE_HEADER};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Default lease length granted to subscribers.
const DEFAULT_LEASE_SECONDS: u64 = 86_400;

/// Observer of every publish that passes through a hub.
///
/// Observers are awaited *before* distribution, in registration order, so
/// by the time subscribers see a publication every matching observer has
/// already run.
#[async_trait::async_trait]
pub trait PublishObserver: Send + Sync {
    /// Called once per matching publish.
    async fn on_publish(&self, topic: &str, content_type: &str, body: &[u8]);
}

/// One active lease held by a remote subscriber.
#[derive(Clone)]
struct HubSubscription {
    callback: String,
    secret: Option<String>,
    expires_at: Instant,
}

/// A queued publication awaiting distribution on a topic.
struct Delivery {
    content_type: String,
    body: Vec<u8>,
}

/// A WebSub-style relay.
///
/// Accepts subscription requests (verifying intent synchronously),
/// accepts publishes on any topic with the body carried verbatim as
/// content, and distributes each publication to all current subscribers
/// of its topic in FIFO order per topic.
pub struct Hub {
    weak: Weak<Hub>,
    hub_url: String,
    lease_seconds: u64,
    client: reqwest::Client,
    subscriptions: RwLock<HashMap<String, Vec<HubSubscription>>>,
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
    sniffers: RwLock<Vec<(String, Arc<dyn PublishObserver>)>>,
    seen_topics: RwLock<BTreeSet<String>>,
}

impl Hub {
    /// Creates a hub that identifies itself as `hub_url`.
    #[must_use]
    pub fn new(hub_url: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            hub_url: hub_url.trim_end_matches('/').to_string(),
            lease_seconds: DEFAULT_LEASE_SECONDS,
            client: reqwest::Client::new(),
            subscriptions: RwLock::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            sniffers: RwLock::new(Vec::new()),
            seen_topics: RwLock::new(BTreeSet::new()),
        })
    }

    fn shared(&self) -> Arc<Self> {
        self.weak.upgrade().expect("hub is alive while borrowed")
    }

    /// The URL this hub identifies itself as.
    #[must_use]
    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    /// Attaches an observer to a topic.
    ///
    /// An empty topic matches every publish. Multiple observers may watch
    /// the same topic; they run in registration order.
    pub fn add_sniffer(&self, topic: impl Into<String>, observer: Arc<dyn PublishObserver>) {
        self.sniffers.write().push((topic.into(), observer));
    }

    /// Number of active (unexpired) subscriptions on a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let now = Instant::now();
        self.subscriptions
            .read()
            .get(topic)
            .map(|subs| subs.iter().filter(|s| s.expires_at > now).count())
            .unwrap_or(0)
    }

    /// The HTTP surface of the hub.
    ///
    /// - `POST /`: subscription requests (form-encoded)
    /// - `POST /publish`: publishes (`hub.mode`/`hub.topic` in the query,
    ///   body as content)
    /// - `GET /topics`: topics this hub has seen
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_subscription))
            .route("/publish", post(handle_publish))
            .route("/topics", get(handle_topics))
            .with_state(self.shared())
    }

    /// Feeds a publication through the hub: sniffers first, then the
    /// topic's distribution queue.
    pub async fn notify(&self, topic: &str, content_type: &str, body: Vec<u8>) {
        self.seen_topics.write().insert(topic.to_string());

        // Snapshot matching observers; never hold the lock across a call.
        let observers: Vec<Arc<dyn PublishObserver>> = {
            self.sniffers
                .read()
                .iter()
                .filter(|(watched, _)| watched.is_empty() || watched == topic)
                .map(|(_, observer)| Arc::clone(observer))
                .collect()
        };
        for observer in observers {
            observer.on_publish(topic, content_type, &body).await;
        }

        let sender = {
            let mut queues = self.queues.lock();
            queues
                .entry(topic.to_string())
                .or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tokio::spawn(distribution_worker(
                        self.weak.clone(),
                        topic.to_string(),
                        rx,
                    ));
                    tx
                })
                .clone()
        };

        let delivery = Delivery {
            content_type: content_type.to_string(),
            body,
        };
        if sender.send(delivery).is_err() {
            error!(topic, "distribution worker is gone, dropping publication");
        }
    }

    /// Sends the verification-of-intent GET and checks the echoed
    /// challenge.
    async fn verify_intent(&self, mode: &str, topic: &str, callback: &str, lease: u64) -> bool {
        let challenge = random_token();

        let response = self
            .client
            .get(callback)
            .query(&[
                ("hub.mode", mode),
                ("hub.topic", topic),
                ("hub.challenge", &challenge),
                ("hub.lease_seconds", &lease.to_string()),
            ])
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                response.text().await.map(|echo| echo == challenge).unwrap_or(false)
            }
            Ok(response) => {
                debug!(callback, status = %response.status(), "verification refused");
                false
            }
            Err(error) => {
                debug!(callback, %error, "verification request failed");
                false
            }
        }
    }

    async fn deliver(
        &self,
        topic: &str,
        subscription: &HubSubscription,
        delivery: &Delivery,
    ) -> Result<(), reqwest::Error> {
        let link = format!(
            "<{}>; rel=\"hub\", <{}>; rel=\"self\"",
            self.hub_url, topic
        );

        let mut request = self
            .client
            .post(&subscription.callback)
            .header(header::CONTENT_TYPE, &delivery.content_type)
            .header(header::LINK, link)
            .body(delivery.body.clone());

        if let Some(secret) = &subscription.secret {
            request = request.header(SIGNATURE_HEADER, signature::sign(secret, &delivery.body));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            debug!(
                topic,
                callback = subscription.callback,
                status = %response.status(),
                "subscriber refused delivery"
            );
        }
        Ok(())
    }
}

/// Consumes one topic's queue, delivering each publication to the topic's
/// current subscribers in order.
async fn distribution_worker(
    hub: Weak<Hub>,
    topic: String,
    mut queue: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = queue.recv().await {
        let Some(hub) = hub.upgrade() else { break };

        let subscribers: Vec<HubSubscription> = {
            let mut subscriptions = hub.subscriptions.write();
            match subscriptions.get_mut(&topic) {
                Some(list) => {
                    let now = Instant::now();
                    list.retain(|s| s.expires_at > now);
                    list.clone()
                }
                None => Vec::new(),
            }
        };

        for subscriber in subscribers {
            if let Err(error) = hub.deliver(&topic, &subscriber, &delivery).await {
                error!(topic, callback = subscriber.callback, %error, "content delivery failed");
            }
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Deserialize)]
struct SubscriptionForm {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.topic")]
    topic: String,
    #[serde(rename = "hub.callback")]
    callback: String,
    #[serde(rename = "hub.secret")]
    secret: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    lease_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct PublishParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.topic")]
    topic: String,
}

async fn handle_subscription(
    State(hub): State<Arc<Hub>>,
    Form(form): Form<SubscriptionForm>,
) -> impl IntoResponse {
    match form.mode.as_str() {
        "subscribe" => {
            let lease = form.lease_seconds.unwrap_or(hub.lease_seconds);
            if !hub
                .verify_intent("subscribe", &form.topic, &form.callback, lease)
                .await
            {
                return (StatusCode::FORBIDDEN, "verification failed");
            }

            hub.seen_topics.write().insert(form.topic.clone());

            let mut subscriptions = hub.subscriptions.write();
            let list = subscriptions.entry(form.topic).or_default();
            // Re-subscribing with the same callback renews the lease.
            list.retain(|s| s.callback != form.callback);
            list.push(HubSubscription {
                callback: form.callback,
                secret: form.secret.filter(|s| !s.is_empty()),
                expires_at: Instant::now() + Duration::from_secs(lease),
            });

            (StatusCode::ACCEPTED, "")
        }
        "unsubscribe" => {
            let lease = form.lease_seconds.unwrap_or(hub.lease_seconds);
            if !hub
                .verify_intent("unsubscribe", &form.topic, &form.callback, lease)
                .await
            {
                return (StatusCode::FORBIDDEN, "verification failed");
            }

            let mut subscriptions = hub.subscriptions.write();
            if let Some(list) = subscriptions.get_mut(&form.topic) {
                list.retain(|s| s.callback != form.callback);
            }

            (StatusCode::ACCEPTED, "")
        }
        other => {
            warn!(mode = other, "unrecognized hub.mode");
            (StatusCode::BAD_REQUEST, "unrecognized hub.mode")
        }
    }
}

async fn handle_publish(
    State(hub): State<Arc<Hub>>,
    Query(params): Query<PublishParams>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if params.mode != "publish" {
        return (StatusCode::BAD_REQUEST, "expected hub.mode=publish");
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    hub.notify(&params.topic, &content_type, body.to_vec()).await;

    (StatusCode::OK, "")
}

async fn handle_topics(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let topics: Vec<String> = hub.seen_topics.read().iter().cloned().collect();
    Json(topics)
}
