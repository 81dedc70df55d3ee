//! Rule-engine behavior over a live manager on loopback HTTP.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_event::{encode_message, EventType, PAYLOAD_CONTENT_TYPE};
use weft_manager::{Config, Manager};
use weft_websub::{PublishObserver, Publisher};

/// Records every sniffed publish as (topic, decoded envelope).
#[derive(Default)]
struct Capture {
    records: Mutex<Vec<(String, Value)>>,
}

impl Capture {
    fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.records
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl PublishObserver for Capture {
    async fn on_publish(&self, topic: &str, _content_type: &str, body: &[u8]) {
        if let Ok(envelope) = serde_json::from_slice::<Value>(body) {
            self.records.lock().push((topic.to_string(), envelope));
        }
    }
}

/// Builds a manager from the YAML template (with `{base}` substituted
/// for the bound address), serves it, and attaches a catch-all capture.
async fn start_manager(yaml_template: &str) -> (Arc<Manager>, Arc<Capture>, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind manager listener");
    let addr = listener.local_addr().expect("manager local addr");
    let base = format!("http://{addr}");

    let yaml = yaml_template.replace("{base}", &base);
    let config: Config = serde_yaml::from_str(&yaml).expect("test config should parse");
    let manager = Manager::new(config).expect("test config should validate");

    let capture = Arc::new(Capture::default());
    manager
        .hub()
        .add_sniffer("", Arc::clone(&capture) as Arc<dyn PublishObserver>);

    let router = manager.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve manager");
    });

    (manager, capture, base)
}

/// Publishes a payload envelope on a topic through the manager's hub.
async fn publish_data(base: &str, topic: &str, data: Value) {
    let body = encode_message(&data, EventType::Data, "http://test-source")
        .expect("encode envelope");
    Publisher::new("http://test-source", base)
        .publish(topic, PAYLOAD_CONTENT_TYPE, body)
        .await
        .expect("publish through manager hub");
}

/// Polls until `cond` holds, panicking after a few seconds.
async fn wait_for(cond: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A matching publish passes the variable condition and the action
/// publishes the doubled payload on its target topic.
#[tokio::test]
async fn condition_gates_and_data_query_computes() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
jq-timeout-ms: 1000
vars:
  v: "on"
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        if:
          var: $v
          is: "on"
        event: http://y/e2/request
        data-jq: .payload * 2
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data", json!({"payload": 21})).await;

    wait_for(
        || !capture.on_topic("http://y/e2/request").is_empty(),
        "action publish",
    )
    .await;

    let outputs = capture.on_topic("http://y/e2/request");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["data"], json!(42));
    assert_eq!(outputs[0]["eventType"], "request");
    // The rule engine publishes through the manager's node.
    assert_eq!(outputs[0]["sender"], json!(format!("{base}/p")));
}

/// A failing condition suppresses the action entirely.
#[tokio::test]
async fn failing_condition_suppresses_action() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
vars:
  v: "off"
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        if:
          var: $v
          is: "on"
        event: http://y/e2/request
        data-jq: .payload * 2
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data", json!({"payload": 21})).await;

    // Let the trigger run; nothing may appear on the target.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(capture.on_topic("http://y/e2/request").is_empty());
}

/// Trigger-level variable mutations are visible to the conditions of the
/// same firing.
#[tokio::test]
async fn trigger_modifiers_run_before_conditions() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
vars:
  gate: "off"
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
        modify-vars:
          gate:
            set: "on"
    actions:
      a:
        if:
          var: $gate
          is: "on"
        event: http://y/gated/request
        data-jq: .
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data", json!({"n": 1})).await;

    wait_for(
        || !capture.on_topic("http://y/gated/request").is_empty(),
        "gated action on its first firing",
    )
    .await;
}

/// Action-level mutations run before the action's queries, so the
/// queries see the mutated state.
#[tokio::test]
async fn action_modifiers_apply_before_queries() {
    let (manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
vars:
  counter: "0"
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        event: http://y/count/request
        data-jq: $counter
        modify-vars:
          counter:
            set: "1"
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data", json!({})).await;

    wait_for(
        || !capture.on_topic("http://y/count/request").is_empty(),
        "counting action",
    )
    .await;

    let outputs = capture.on_topic("http://y/count/request");
    assert_eq!(outputs[0]["data"], json!("1"), "query must see the new value");
    assert_eq!(manager.var("r", "counter").unwrap(), "1");
}

/// A dynamic event query names the target topic at runtime.
#[tokio::test]
async fn dynamic_event_targets_computed_topic() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        dynamic-event: '"http://y/" + .kind + "/request"'
        data-jq: .kind
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data", json!({"kind": "dyn"})).await;

    wait_for(
        || !capture.on_topic("http://y/dyn/request").is_empty(),
        "dynamically targeted publish",
    )
    .await;

    let outputs = capture.on_topic("http://y/dyn/request");
    assert_eq!(outputs[0]["data"], json!("dyn"));
}

/// A query that diverges is cut off by the timeout, and the manager
/// keeps serving subsequent events.
#[tokio::test]
async fn query_timeout_does_not_wedge_the_manager() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
jq-timeout-ms: 150
rules:
  slow:
    triggers:
      t:
        event: http://x/slow/data
    actions:
      a:
        event: http://y/slow/request
        data-jq: last(repeat(0))
  fast:
    triggers:
      t:
        event: http://x/fast/data
    actions:
      a:
        event: http://y/fast/request
        data-jq: .n
"#,
    )
    .await;

    publish_data(&base, "http://x/slow/data", json!({"n": 1})).await;
    publish_data(&base, "http://x/fast/data", json!({"n": 2})).await;

    wait_for(
        || !capture.on_topic("http://y/fast/request").is_empty(),
        "fast action after the slow one timed out",
    )
    .await;

    assert!(
        capture.on_topic("http://y/slow/request").is_empty(),
        "the timed-out action must not publish"
    );
    let outputs = capture.on_topic("http://y/fast/request");
    assert_eq!(outputs[0]["data"], json!(2));
}

/// Foreign content types are invisible to the rule engine.
#[tokio::test]
async fn foreign_content_type_is_ignored() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        event: http://y/e2/request
        data-jq: .
"#,
    )
    .await;

    let body = encode_message(&json!({"n": 1}), EventType::Data, "http://test-source")
        .expect("encode envelope");
    Publisher::new("http://test-source", &base)
        .publish("http://x/e/data", "application/json", body)
        .await
        .expect("publish with foreign content type");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(capture.on_topic("http://y/e2/request").is_empty());
}

/// Trailing slashes on the sniffed topic are tolerated.
#[tokio::test]
async fn trailing_slash_topic_still_triggers() {
    let (_manager, capture, base) = start_manager(
        r#"
baseURL: {base}
port: 0
rules:
  r:
    triggers:
      t:
        event: http://x/e/data
    actions:
      a:
        event: http://y/e2/request
        data-jq: .n
"#,
    )
    .await;

    publish_data(&base, "http://x/e/data/", json!({"n": 5})).await;

    wait_for(
        || !capture.on_topic("http://y/e2/request").is_empty(),
        "trigger on slash-suffixed topic",
    )
    .await;

    let outputs = capture.on_topic("http://y/e2/request");
    assert_eq!(outputs[0]["data"], json!(5));
}
