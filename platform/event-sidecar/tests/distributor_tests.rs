mod common;

use std::time::Duration;

use event_bus::{BusMessage, EventBus};
use event_sidecar::{SidecarError, STRUCTURED_CONTENT_TYPE};
use futures::StreamExt;
use serde_json::Value;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{distributor, event_json, TOPIC};

fn message(body: String) -> BusMessage {
    BusMessage::new(TOPIC.to_string(), body.into_bytes())
}

#[tokio::test]
async fn test_forwards_envelope_to_recipient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header("content-type", STRUCTURED_CONTENT_TYPE))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let connector = common::connector();
    let d = distributor(&connector, &format!("{}/events", server.uri()));

    let stream = futures::stream::iter(vec![message(event_json("e1", TOPIC, "ctx-1"))]).boxed();
    let result = d.consume(stream).await;
    assert!(matches!(result, Err(SidecarError::SubscriptionClosed(_))));

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["id"], "e1");
    assert_eq!(body["type"], TOPIC);
    assert_eq!(body["extensions"]["shkeptncontext"], "ctx-1");
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_failed_delivery_is_not_retried_and_loop_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "id": "e1" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "id": "e2" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let connector = common::connector();
    let d = distributor(&connector, &server.uri());

    let stream = futures::stream::iter(vec![
        message(event_json("e1", TOPIC, "ctx-1")),
        message(event_json("e2", TOPIC, "ctx-2")),
    ])
    .boxed();
    let _ = d.consume(stream).await;

    let ids: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["e1", "e2"]);
}

#[tokio::test]
async fn test_invalid_payload_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let connector = common::connector();
    let d = distributor(&connector, &server.uri());

    let stream = futures::stream::iter(vec![
        BusMessage::new(TOPIC.to_string(), b"not json".to_vec()),
        BusMessage::new(TOPIC.to_string(), br#"{"id":"","type":"t"}"#.to_vec()),
        message(event_json("e3", TOPIC, "ctx-3")),
    ])
    .boxed();
    let _ = d.consume(stream).await;
}

#[tokio::test]
async fn test_run_delivers_messages_from_bus_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let connector = common::connector();
    let d = distributor(&connector, &server.uri());
    let runner = tokio::spawn(async move { d.run().await });

    // wait until the distributor holds its subscription
    assert!(common::eventually(|| connector.connect_count() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in ["a", "b", "c"] {
        connector
            .bus()
            .publish(TOPIC, event_json(id, TOPIC, "ctx").into_bytes())
            .await
            .unwrap();
    }
    // other topics are not forwarded
    connector
        .bus()
        .publish("sh.keptn.events.other", event_json("x", "sh.keptn.events.other", "ctx").into_bytes())
        .await
        .unwrap();

    let mut delivered = Vec::new();
    for _ in 0..100 {
        delivered = server.received_requests().await.unwrap();
        if delivered.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    runner.abort();

    let ids: Vec<String> = delivered
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_run_fails_when_bus_unavailable() {
    let connector = common::connector();
    connector.set_fail_connect(true);
    let d = distributor(&connector, "http://127.0.0.1:1");

    assert!(matches!(d.run().await, Err(SidecarError::Bus(_))));
}
