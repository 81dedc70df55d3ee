//! Cross-node scenarios over a real hub on loopback HTTP.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_node::{ChannelEmitter, EventPayload, EventType, FuncActor, HookFn, Node};
use weft_websub::Hub;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActorMsg {
    sound: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EmitterMsg {
    xd: i64,
}

/// Starts a hub on an OS-assigned port.
async fn start_hub() -> (Arc<Hub>, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hub listener");
    let addr = listener.local_addr().expect("hub local addr");
    let url = format!("http://{addr}");

    let hub = Hub::new(&url);
    let router = hub.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve hub");
    });

    (hub, url)
}

/// Starts a node served at its own base URL, wired to the given hub.
async fn start_node(hub_url: &str) -> Arc<Node> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind node listener");
    let addr = listener.local_addr().expect("node local addr");

    let node = Node::new(&format!("http://{addr}"), hub_url);
    let router = node.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve node");
    });

    node
}

/// Polls until `cond` holds, panicking after a few seconds.
async fn wait_for(cond: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records hook invocations along with the payloads they carried.
struct Recorded<T> {
    calls: AtomicUsize,
    payloads: Mutex<Vec<EventPayload<T>>>,
}

impl<T> Recorded<T> {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, msg: EventPayload<T>) {
        self.payloads.lock().push(msg);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A broadcaster on one node triggers an actor on another; a third node
/// observes the request and the execution through hooks.
#[tokio::test]
async fn request_executes_and_hooks_observe() {
    let (_hub, hub_url) = start_hub().await;

    // Node A owns actor "test" and emitter "test".
    let node_a = start_node(&hub_url).await;
    node_a.subscribe_all().await.expect("node a subscribes");
    node_a
        .add_actor(FuncActor::new(
            "test",
            |_msg: &EventPayload<ActorMsg>| true,
            |_msg: &EventPayload<ActorMsg>| true,
        ))
        .await
        .expect("add actor to node a");
    let (_data_tx, emitter) = ChannelEmitter::<EmitterMsg>::channel("test");
    node_a.add_emitter(emitter).expect("add emitter to node a");

    let actor_entity = format!("{}/test", node_a.base_url());

    // Node C hooks A's actor for request and executed.
    let node_c = start_node(&hub_url).await;
    node_c.subscribe_all().await.expect("node c subscribes");

    let requested = Arc::new(Recorded::<ActorMsg>::new());
    let executed = Arc::new(Recorded::<ActorMsg>::new());
    let on_requested: HookFn<ActorMsg> = {
        let recorded = Arc::clone(&requested);
        Box::new(move |msg| recorded.record(msg))
    };
    let on_executed: HookFn<ActorMsg> = {
        let recorded = Arc::clone(&executed);
        Box::new(move |msg| recorded.record(msg))
    };
    node_c
        .add_actor_hook::<ActorMsg>(&actor_entity, Some(on_requested), Some(on_executed))
        .await
        .expect("add hooks to node c");

    // Node B only broadcasts; no callbacks of its own.
    let node_b = start_node(&hub_url).await;
    node_b.subscribe_all().await.expect("node b subscribes");
    let broadcast_request = node_b
        .add_actor_hook::<ActorMsg>(&actor_entity, None, None)
        .await
        .expect("codec-only hook on node b");

    broadcast_request
        .broadcast(&ActorMsg { sound: "xd".into() })
        .await
        .expect("broadcast request from node b");

    wait_for(|| requested.count() == 1, "request hook on node c").await;
    wait_for(|| executed.count() == 1, "executed hook on node c").await;

    let request = requested.payloads.lock()[0].clone();
    assert_eq!(request.data, ActorMsg { sound: "xd".into() });
    assert_eq!(request.event_type, EventType::Request);
    assert_eq!(request.sender, node_b.base_url());

    let execution = executed.payloads.lock()[0].clone();
    assert_eq!(execution.data, ActorMsg { sound: "xd".into() });
    assert_eq!(execution.event_type, EventType::Executed);
    // Re-encoded by the acting node, so the sender is node A.
    assert_eq!(execution.sender, node_a.base_url());
}

/// An emitter value becomes exactly one `data` publish with the node as
/// sender.
#[tokio::test]
async fn emitter_value_becomes_one_data_event() {
    let (_hub, hub_url) = start_hub().await;

    let node_a = start_node(&hub_url).await;
    let (data_tx, emitter) = ChannelEmitter::<EmitterMsg>::channel("test");
    node_a.add_emitter(emitter).expect("add emitter");

    let emitter_entity = format!("{}/test", node_a.base_url());

    let observer = start_node(&hub_url).await;
    let seen = Arc::new(Recorded::<EmitterMsg>::new());
    let on_data: HookFn<EmitterMsg> = {
        let recorded = Arc::clone(&seen);
        Box::new(move |msg| recorded.record(msg))
    };
    observer
        .add_emitter_hook::<EmitterMsg>(&emitter_entity, Some(on_data))
        .await
        .expect("add data hook");
    observer.subscribe_all().await.expect("observer subscribes");

    data_tx.send(EmitterMsg { xd: 7 }).expect("feed emitter");

    wait_for(|| seen.count() == 1, "data hook").await;
    // Nothing further may arrive for a single emitted value.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.count(), 1);

    let event = seen.payloads.lock()[0].clone();
    assert_eq!(event.data, EmitterMsg { xd: 7 });
    assert_eq!(event.event_type, EventType::Data);
    assert_eq!(event.sender, node_a.base_url());
}

/// Adding an actor to an already-subscribed node creates the lease
/// before the call returns; duplicates are rejected.
#[tokio::test]
async fn subscribe_then_add_actor_subscribes_immediately() {
    let (hub, hub_url) = start_hub().await;

    let node = start_node(&hub_url).await;
    node.subscribe_all().await.expect("subscribe with nothing registered");
    assert!(node.subscribed_topics().is_empty());

    node.add_actor(FuncActor::new(
        "k",
        |_msg: &EventPayload<ActorMsg>| true,
        |_msg: &EventPayload<ActorMsg>| true,
    ))
    .await
    .expect("add actor after subscribing");

    let expected_topic = format!("{}/k/request", node.base_url());
    assert_eq!(node.subscribed_topics(), vec![expected_topic.clone()]);
    assert_eq!(hub.subscriber_count(&expected_topic), 1);

    let err = node
        .add_actor(FuncActor::new(
            "k",
            |_msg: &EventPayload<ActorMsg>| true,
            |_msg: &EventPayload<ActorMsg>| true,
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
    // The failed registration must not have added a second lease.
    assert_eq!(node.subscribed_topics().len(), 1);
}

/// `unsubscribe_all` clears every recorded lease.
#[tokio::test]
async fn unsubscribe_all_clears_leases() {
    let (hub, hub_url) = start_hub().await;

    let node = start_node(&hub_url).await;
    node.subscribe_all().await.expect("subscribe");
    node.add_actor(FuncActor::new(
        "a",
        |_msg: &EventPayload<ActorMsg>| true,
        |_msg: &EventPayload<ActorMsg>| true,
    ))
    .await
    .expect("add actor a");
    node.add_actor(FuncActor::new(
        "b",
        |_msg: &EventPayload<ActorMsg>| true,
        |_msg: &EventPayload<ActorMsg>| true,
    ))
    .await
    .expect("add actor b");
    assert_eq!(node.subscribed_topics().len(), 2);

    node.unsubscribe_all().await.expect("unsubscribe");
    assert!(node.subscribed_topics().is_empty());
    assert_eq!(hub.subscriber_count(&format!("{}/a/request", node.base_url())), 0);
    assert_eq!(hub.subscriber_count(&format!("{}/b/request", node.base_url())), 0);
}

/// A hook on an entity the node itself owns takes priority: the actor is
/// not invoked.
#[tokio::test]
async fn hook_takes_priority_over_owned_actor() {
    let (_hub, hub_url) = start_hub().await;

    let node = start_node(&hub_url).await;
    let actor_calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&actor_calls);
    node.add_actor(FuncActor::new(
        "test",
        move |_msg: &EventPayload<ActorMsg>| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        },
        |_msg: &EventPayload<ActorMsg>| true,
    ))
    .await
    .expect("add actor");

    let entity = format!("{}/test", node.base_url());
    let hooked = Arc::new(Recorded::<ActorMsg>::new());
    let on_requested: HookFn<ActorMsg> = {
        let recorded = Arc::clone(&hooked);
        Box::new(move |msg| recorded.record(msg))
    };
    node.add_actor_hook::<ActorMsg>(&entity, Some(on_requested), None)
        .await
        .expect("hook own actor");

    node.subscribe_all().await.expect("subscribe");

    let trigger = start_node(&hub_url).await;
    let broadcast_request = trigger
        .add_actor_hook::<ActorMsg>(&entity, None, None)
        .await
        .expect("codec-only hook on trigger node");
    broadcast_request
        .broadcast(&ActorMsg { sound: "xd".into() })
        .await
        .expect("broadcast request");

    wait_for(|| hooked.count() >= 1, "request hook").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        actor_calls.load(Ordering::SeqCst),
        0,
        "the owned actor must not run when a hook covers the slot"
    );
}
