//! The node: registries, subscription multiplexing, and inbound dispatch.

use crate::hook::{erase_hook_fn, ErasedHookFn, EventHook, HookBroadcaster, HookFn};
use crate::proxies::{ActorProxy, EmitterProxy};
use crate::{Actor, Emitter, NodeError};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::RwLock;
use rand::RngCore;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};
use weft_event::{
    compose_event_url, encode_message, parse_event_url, EventType, Payload, PayloadCodec,
    PAYLOAD_CONTENT_TYPE,
};
use weft_websub::{DeliveryHandler, Publisher, Subscriber, Subscription};

/// Length of the random secret generated per subscription.
const SUBSCRIPTION_SECRET_LEN: usize = 100;

/// One endpoint of the event fabric.
///
/// Owns actors and emitters under its base URL, carries hooks on entities
/// anywhere, multiplexes one HTTP callback across all of its hub leases,
/// and dispatches every inbound delivery to the right handler.
///
/// All registries take their own read/write lock; no lock is ever held
/// across a callback invocation or a publish.
pub struct Node {
    weak: Weak<Node>,
    base_url: String,
    publisher: Publisher,
    subscriber: Arc<Subscriber>,
    actors: RwLock<HashMap<String, Arc<ActorProxy>>>,
    emitters: RwLock<HashMap<String, Arc<EmitterProxy>>>,
    hooks: RwLock<HashMap<String, HashMap<EventType, Arc<EventHook>>>>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    subscribed: AtomicBool,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl Node {
    /// Creates a node at `base_url` speaking to the hub at `hub_url`.
    ///
    /// The node publishes from `{base_url}/` and receives subscription
    /// callbacks under `{base_url}/_s/`; serve [`Node::router`] at the
    /// base URL before subscribing.
    #[must_use]
    pub fn new(base_url: &str, hub_url: &str) -> Arc<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let publisher = Publisher::new(&format!("{base_url}/"), hub_url);
        let subscriber = Subscriber::new(&format!("{base_url}/_s"), hub_url);

        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            base_url,
            publisher,
            subscriber,
            actors: RwLock::new(HashMap::new()),
            emitters: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(Vec::new()),
            subscribed: AtomicBool::new(false),
        })
    }

    fn shared(&self) -> Arc<Self> {
        self.weak.upgrade().expect("node is alive while borrowed")
    }

    /// Base URL of this node. Entity URLs of owned entities live under it.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The node's HTTP surface: `/_s/` routes to the subscriber (prefix
    /// stripped), everything else to the publisher's topic advertisement.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/_s", self.subscriber.router())
            .merge(self.publisher.router())
    }

    /// Topics of every lease this node currently holds.
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .iter()
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Adds an actor owned by this node.
    ///
    /// The actor is reachable at `{base_url}/{name}`. When the node is
    /// already subscribed, the lease on its `request` topic is created
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::ActorExists`] on duplicate registration,
    /// or with a subscription error when the immediate lease cannot be
    /// created.
    pub async fn add_actor<A: Actor>(&self, actor: A) -> Result<(), NodeError> {
        let entity_url = format!("{}/{}", self.base_url, actor.name());

        if self.actors.read().contains_key(&entity_url) {
            return Err(NodeError::ActorExists { entity_url });
        }

        if self.subscribed.load(Ordering::SeqCst) {
            self.subscribe_topic(&compose_event_url(&entity_url, EventType::Request))
                .await?;
        }

        self.actors
            .write()
            .insert(entity_url, Arc::new(ActorProxy::new(actor)));
        Ok(())
    }

    /// Adds an emitter owned by this node and starts forwarding its
    /// stream as `data` events on `{base_url}/{name}/data`.
    ///
    /// The forwarder runs until the stream closes; publish failures are
    /// logged and do not terminate it.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::EmitterExists`] on duplicate registration.
    pub fn add_emitter<E: Emitter>(&self, emitter: E) -> Result<(), NodeError> {
        let entity_url = format!("{}/{}", self.base_url, emitter.name());

        if self.emitters.read().contains_key(&entity_url) {
            return Err(NodeError::EmitterExists { entity_url });
        }

        self.emitters
            .write()
            .insert(entity_url.clone(), Arc::new(EmitterProxy::new::<E::Msg>()));

        let data_url = compose_event_url(&entity_url, EventType::Data);
        let mut stream = emitter.into_stream();
        let node = self.shared();
        tokio::spawn(async move {
            while let Some(value) = stream.recv().await {
                if let Err(err) = node.broadcast(&data_url, &value).await {
                    error!(emitter_url = data_url, error = %err, "could not broadcast data event");
                }
            }
            debug!(emitter_url = data_url, "emitter stream closed");
        });

        Ok(())
    }

    /// Registers a hook on an external actor.
    ///
    /// Either callback may be omitted; a codec is registered regardless
    /// so the returned broadcaster can encode `request` events for the
    /// entity. When the node is already subscribed, a lease is created
    /// for each event type a callback was supplied for.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::HookExists`] when a callback is already
    /// registered for one of the requested slots.
    pub async fn add_actor_hook<T: Payload>(
        &self,
        entity_url: &str,
        on_requested: Option<HookFn<T>>,
        on_executed: Option<HookFn<T>>,
    ) -> Result<HookBroadcaster<T>, NodeError> {
        let codec: Arc<dyn PayloadCodec> = Arc::new(weft_event::JsonCodec::<T>::new());
        let slots = vec![
            (EventType::Request, on_requested.map(erase_hook_fn)),
            (EventType::Executed, on_executed.map(erase_hook_fn)),
        ];
        let entity_url = self.install_hooks(entity_url, codec, slots).await?;

        Ok(HookBroadcaster::new(
            self.shared(),
            compose_event_url(&entity_url, EventType::Request),
        ))
    }

    /// Registers a hook on an external emitter.
    ///
    /// The callback may be omitted; a codec is registered regardless so
    /// the returned broadcaster can encode `data` events for the entity.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::HookExists`] when a data callback is
    /// already registered for the entity.
    pub async fn add_emitter_hook<T: Payload>(
        &self,
        entity_url: &str,
        on_data: Option<HookFn<T>>,
    ) -> Result<HookBroadcaster<T>, NodeError> {
        let codec: Arc<dyn PayloadCodec> = Arc::new(weft_event::JsonCodec::<T>::new());
        let slots = vec![(EventType::Data, on_data.map(erase_hook_fn))];
        let entity_url = self.install_hooks(entity_url, codec, slots).await?;

        Ok(HookBroadcaster::new(
            self.shared(),
            compose_event_url(&entity_url, EventType::Data),
        ))
    }

    /// Encodes `data` with the registered codec for the event and
    /// publishes it.
    ///
    /// # Errors
    ///
    /// Fails when the URL is invalid, no codec resolves, the dynamic
    /// type does not match the registration, or the hub refuses.
    pub async fn broadcast<T: Payload>(&self, event_url: &str, data: &T) -> Result<(), NodeError> {
        self.broadcast_erased(event_url, data).await
    }

    /// Publishes without consulting the registries: the value is encoded
    /// generically, skipping the dynamic type check.
    ///
    /// # Errors
    ///
    /// Fails when the URL is invalid or the hub refuses.
    pub async fn broadcast_any(
        &self,
        event_url: &str,
        data: &serde_json::Value,
    ) -> Result<(), NodeError> {
        let (_, event_type) = parse_event_url(event_url)?;
        let body = encode_message(data, event_type, &self.base_url)?;
        self.publisher
            .publish(event_url, PAYLOAD_CONTENT_TYPE, body)
            .await?;
        Ok(())
    }

    /// Creates the leases this node needs to function: one per owned
    /// actor (`request`) and one per hook callback.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::AlreadySubscribed`] on double subscribe;
    /// a lease failure aborts the walk and propagates.
    pub async fn subscribe_all(&self) -> Result<(), NodeError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadySubscribed);
        }

        // Copy the topics out; leases are created without any lock held.
        let mut topics: Vec<String> = self
            .actors
            .read()
            .keys()
            .map(|entity| compose_event_url(entity, EventType::Request))
            .collect();
        {
            let hooks = self.hooks.read();
            for (entity, slots) in hooks.iter() {
                for (event_type, hook) in slots {
                    if hook.callback.is_some() {
                        topics.push(compose_event_url(entity, *event_type));
                    }
                }
            }
        }

        for topic in topics {
            self.subscribe_topic(&topic).await?;
        }
        Ok(())
    }

    /// Releases every lease. Registrations stay in place.
    ///
    /// # Errors
    ///
    /// Fails with [`NodeError::NotSubscribed`] on double unsubscribe; an
    /// unsubscribe failure aborts the walk and propagates, leaving the
    /// remaining leases recorded.
    pub async fn unsubscribe_all(&self) -> Result<(), NodeError> {
        if !self.subscribed.swap(false, Ordering::SeqCst) {
            return Err(NodeError::NotSubscribed);
        }

        let snapshot: Vec<Arc<Subscription>> = self.subscriptions.read().clone();
        for subscription in snapshot {
            self.subscriber.unsubscribe(&subscription).await?;
            self.subscriptions
                .write()
                .retain(|s| !Arc::ptr_eq(s, &subscription));
        }
        Ok(())
    }

    /// Subscribes to one topic with a fresh random secret, recording the
    /// lease only on success.
    async fn subscribe_topic(&self, topic: &str) -> Result<(), NodeError> {
        let mut secret = [0u8; SUBSCRIPTION_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);

        let subscription = self
            .subscriber
            .subscribe(
                topic,
                URL_SAFE_NO_PAD.encode(secret),
                self.shared() as Arc<dyn DeliveryHandler>,
            )
            .await?;

        self.subscriptions.write().push(subscription);
        Ok(())
    }

    /// Installs hook slots for an entity, merging with existing ones.
    ///
    /// A slot that already carries a callback rejects a second callback;
    /// a codec-only slot is upgraded in place. Returns the normalized
    /// entity URL.
    async fn install_hooks(
        &self,
        entity_url: &str,
        codec: Arc<dyn PayloadCodec>,
        slots: Vec<(EventType, Option<ErasedHookFn>)>,
    ) -> Result<String, NodeError> {
        let entity_url = entity_url.trim_end_matches('/').to_string();

        {
            let hooks = self.hooks.read();
            if let Some(existing) = hooks.get(&entity_url) {
                for (event_type, callback) in &slots {
                    let taken = existing
                        .get(event_type)
                        .is_some_and(|slot| slot.callback.is_some());
                    if callback.is_some() && taken {
                        return Err(NodeError::HookExists {
                            entity_url,
                            event_type: *event_type,
                        });
                    }
                }
            }
        }

        let mut newly_hooked = Vec::new();
        {
            let mut hooks = self.hooks.write();
            let entity_slots = hooks.entry(entity_url.clone()).or_default();
            for (event_type, callback) in slots {
                match (entity_slots.contains_key(&event_type), callback) {
                    // Existing slot, nothing new to observe: leave it be.
                    (true, None) => {}
                    (_, Some(callback)) => {
                        entity_slots.insert(
                            event_type,
                            Arc::new(EventHook {
                                codec: Arc::clone(&codec),
                                callback: Some(callback),
                            }),
                        );
                        newly_hooked.push(event_type);
                    }
                    (false, None) => {
                        entity_slots.insert(
                            event_type,
                            Arc::new(EventHook {
                                codec: Arc::clone(&codec),
                                callback: None,
                            }),
                        );
                    }
                }
            }
        }

        if self.subscribed.load(Ordering::SeqCst) {
            for event_type in newly_hooked {
                self.subscribe_topic(&compose_event_url(&entity_url, event_type))
                    .await?;
            }
        }

        Ok(entity_url)
    }

    /// Resolves the codec for an event in priority order: owned actor,
    /// owned emitter, then hook.
    fn resolve_codec(
        &self,
        entity_url: &str,
        event_type: EventType,
    ) -> Result<Arc<dyn PayloadCodec>, NodeError> {
        match event_type {
            EventType::Request | EventType::Executed => {
                if let Some(actor) = self.actors.read().get(entity_url) {
                    return Ok(Arc::clone(&actor.codec));
                }
            }
            EventType::Data => {
                if let Some(emitter) = self.emitters.read().get(entity_url) {
                    return Ok(Arc::clone(&emitter.codec));
                }
            }
        }

        if let Some(hook) = self
            .hooks
            .read()
            .get(entity_url)
            .and_then(|slots| slots.get(&event_type))
        {
            return Ok(Arc::clone(&hook.codec));
        }

        Err(NodeError::EncoderNotFound {
            event_url: compose_event_url(entity_url, event_type),
        })
    }

    /// Encode-and-publish shared by the typed broadcast path and the
    /// actor `executed` re-publish, which only holds erased data.
    async fn broadcast_erased(
        &self,
        event_url: &str,
        data: &(dyn Any + Send + Sync),
    ) -> Result<(), NodeError> {
        let (entity_url, event_type) = parse_event_url(event_url)?;
        let codec = self.resolve_codec(&entity_url, event_type)?;
        let body = codec.encode(data, event_type, &self.base_url)?;
        self.publisher
            .publish(event_url, PAYLOAD_CONTENT_TYPE, body)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeliveryHandler for Node {
    /// Receives every delivery from every lease this node holds.
    async fn on_delivery(&self, subscription: &Subscription, content_type: &str, body: &[u8]) {
        if content_type != PAYLOAD_CONTENT_TYPE {
            debug!(content_type, "incorrect payload content type received from subscription");
            return;
        }

        let (entity_url, event_type) = match parse_event_url(&subscription.topic) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(topic = subscription.topic, error = %err, "invalid event url as subscribed topic");
                return;
            }
        };

        let codec = match self.resolve_codec(&entity_url, event_type) {
            Ok(codec) => codec,
            Err(err) => {
                error!(topic = subscription.topic, error = %err, "could not get codec for subscribed topic");
                return;
            }
        };

        let message = match codec.decode(body) {
            Ok(message) => message,
            Err(err) => {
                error!(topic = subscription.topic, error = %err, "could not decode subscription content");
                return;
            }
        };

        // Hooks take priority over actor execution on the same node.
        let hook = {
            self.hooks
                .read()
                .get(&entity_url)
                .and_then(|slots| slots.get(&event_type))
                .cloned()
        };
        if let Some(hook) = hook {
            if let Some(callback) = &hook.callback {
                callback(&message);
                return;
            }
        }

        match event_type {
            EventType::Request => {
                let actor = { self.actors.read().get(&entity_url).cloned() };
                let Some(actor) = actor else {
                    error!(topic = subscription.topic, "request for an actor this node does not own");
                    return;
                };

                if (actor.should_act)(&message) && (actor.act)(&message) {
                    let event_url = compose_event_url(&entity_url, EventType::Executed);
                    if let Err(err) = self.broadcast_erased(&event_url, message.data.as_ref()).await
                    {
                        error!(event_url, error = %err, "could not broadcast execution");
                    }
                }
            }
            EventType::Executed | EventType::Data => {
                debug!(
                    event_type = %event_type,
                    topic = subscription.topic,
                    "unexpected event type without a hook"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelEmitter, FuncActor};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sound {
        sound: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        xd: i64,
    }

    fn test_node() -> Arc<Node> {
        // No server is bound: these tests only exercise registry logic,
        // which never talks to the hub while unsubscribed.
        Node::new("http://localhost:4044/", "http://localhost:8080")
    }

    fn sound_actor(name: &str) -> FuncActor<Sound> {
        FuncActor::new(name, |_| true, |_| true)
    }

    #[test]
    fn base_url_is_normalized() {
        let node = test_node();
        assert_eq!(node.base_url(), "http://localhost:4044");
    }

    #[tokio::test]
    async fn duplicate_actor_is_rejected() {
        let node = test_node();
        node.add_actor(sound_actor("test")).await.expect("first add");

        let err = node.add_actor(sound_actor("test")).await.unwrap_err();
        assert!(matches!(err, NodeError::ActorExists { .. }));
    }

    #[tokio::test]
    async fn duplicate_emitter_is_rejected() {
        let node = test_node();
        let (_tx, emitter) = ChannelEmitter::<Reading>::channel("test");
        node.add_emitter(emitter).expect("first add");

        let (_tx2, again) = ChannelEmitter::<Reading>::channel("test");
        let err = node.add_emitter(again).unwrap_err();
        assert!(matches!(err, NodeError::EmitterExists { .. }));
    }

    #[tokio::test]
    async fn actor_and_emitter_may_share_a_name() {
        let node = test_node();
        node.add_actor(sound_actor("test")).await.expect("actor");
        let (_tx, emitter) = ChannelEmitter::<Reading>::channel("test");
        node.add_emitter(emitter).expect("emitter");
    }

    #[tokio::test]
    async fn duplicate_hook_callback_is_rejected() {
        let node = test_node();
        let entity = "http://elsewhere/test";

        node.add_emitter_hook::<Reading>(entity, Some(Box::new(|_msg| {})))
            .await
            .expect("first hook");

        let err = node
            .add_emitter_hook::<Reading>(entity, Some(Box::new(|_msg| {})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::HookExists {
                event_type: EventType::Data,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn codec_only_hook_can_be_upgraded_with_a_callback() {
        let node = test_node();
        let entity = "http://elsewhere/test";

        node.add_emitter_hook::<Reading>(entity, None)
            .await
            .expect("codec-only hook");
        node.add_emitter_hook::<Reading>(entity, Some(Box::new(|_msg| {})))
            .await
            .expect("upgrading a codec-only slot should succeed");
    }

    #[tokio::test]
    async fn actor_and_emitter_hooks_coexist_on_one_entity() {
        let node = test_node();
        let entity = "http://elsewhere/test";

        node.add_actor_hook::<Sound>(entity, None, None)
            .await
            .expect("actor hook");
        node.add_emitter_hook::<Reading>(entity, Some(Box::new(|_msg| {})))
            .await
            .expect("emitter hook on same entity");
    }

    // ── Codec resolution priority ────────────────────────────

    #[tokio::test]
    async fn owned_actor_codec_wins_over_hook() {
        let node = test_node();
        node.add_actor(sound_actor("test")).await.expect("actor");
        let entity = format!("{}/test", node.base_url());
        // A hook on the same entity with a different payload type.
        node.add_actor_hook::<Reading>(&entity, None, None)
            .await
            .expect("hook");

        let codec = node
            .resolve_codec(&entity, EventType::Request)
            .expect("codec should resolve");
        assert!(codec.type_name().contains("Sound"));
    }

    #[tokio::test]
    async fn hook_codec_used_for_external_entity() {
        let node = test_node();
        let entity = "http://elsewhere/test";
        node.add_emitter_hook::<Reading>(entity, None)
            .await
            .expect("hook");

        let codec = node
            .resolve_codec(entity, EventType::Data)
            .expect("codec should resolve");
        assert!(codec.type_name().contains("Reading"));
    }

    #[tokio::test]
    async fn unknown_entity_has_no_codec() {
        let node = test_node();
        let err = node
            .resolve_codec("http://elsewhere/ghost", EventType::Request)
            .unwrap_err();
        assert!(matches!(err, NodeError::EncoderNotFound { .. }));
    }

    // ── Subscription flag ────────────────────────────────────

    #[tokio::test]
    async fn double_subscribe_fails() {
        let node = test_node();
        node.subscribe_all().await.expect("first subscribe");

        let err = node.subscribe_all().await.unwrap_err();
        assert!(matches!(err, NodeError::AlreadySubscribed));
    }

    #[tokio::test]
    async fn double_unsubscribe_fails() {
        let node = test_node();
        node.subscribe_all().await.expect("subscribe");
        node.unsubscribe_all().await.expect("first unsubscribe");

        let err = node.unsubscribe_all().await.unwrap_err();
        assert!(matches!(err, NodeError::NotSubscribed));

        // The pair can start over.
        node.subscribe_all().await.expect("re-subscribe");
    }

    #[tokio::test]
    async fn unsubscribe_before_subscribe_fails() {
        let node = test_node();
        let err = node.unsubscribe_all().await.unwrap_err();
        assert!(matches!(err, NodeError::NotSubscribed));
    }
}
