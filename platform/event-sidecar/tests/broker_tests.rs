mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use event_bus::Envelope;
use event_sidecar::{router, Broker};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::{event_json, SAMPLE_EVENT, TOPIC};

fn app(broker: Broker) -> Router {
    router(Arc::new(broker), "/")
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/cloudevents+json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_valid_event_is_accepted_and_published_on_type() {
    let connector = common::connector();
    let app = app(Broker::new(common::cache(&connector)));

    let res = app.oneshot(post(SAMPLE_EVENT)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    assert!(common::eventually(|| connector.bus().published().len() == 1).await);
    let published = connector.bus().published();
    assert_eq!(published[0].subject, TOPIC);

    let envelope = published[0].envelope().unwrap();
    assert_eq!(envelope.id(), "e1");
    assert_eq!(envelope.correlation_id(), Some("ctx-123"));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let connector = common::connector();
    let app = app(Broker::new(common::cache(&connector)));

    let res = app.clone().oneshot(post("{not json")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());

    let res = app
        .oneshot(post(r#"{"id":"e1","source":"s"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    tokio::task::yield_now().await;
    assert!(connector.bus().published().is_empty());
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_publish_failure_still_accepted() {
    let connector = common::connector();
    connector.bus().set_fail_publish(true);
    let app = app(Broker::new(common::cache(&connector)));

    let res = app.oneshot(post(SAMPLE_EVENT)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    assert!(common::eventually(|| connector.connect_count() == 1).await);
    assert!(connector.bus().published().is_empty());
}

#[tokio::test]
async fn test_unreachable_bus_still_accepted() {
    let connector = common::connector();
    connector.set_fail_connect(true);
    let app = app(Broker::new(common::cache(&connector)));

    let res = app.oneshot(post(SAMPLE_EVENT)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_opens_one_connection_per_topic() {
    let connector = common::connector();
    let broker = Arc::new(Broker::new(common::cache(&connector)));

    let mut handles = Vec::new();
    for i in 0..20 {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            let event_type = if i % 2 == 0 { "sh.keptn.a" } else { "sh.keptn.b" };
            let envelope = Envelope::new(format!("e{}", i), event_type, "test").unwrap();
            broker.publish(&envelope).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(connector.connect_count(), 2);
    assert_eq!(broker.connections().len(), 2);
    assert_eq!(connector.bus().published().len(), 20);
}

#[tokio::test]
async fn test_custom_path() {
    let connector = common::connector();
    let app = router(Arc::new(Broker::new(common::cache(&connector))), "/events");

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .body(Body::from(event_json("e9", "sh.keptn.x", "ctx")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert!(common::eventually(|| connector.bus().published().len() == 1).await);
}

#[tokio::test]
async fn test_trace_id_is_echoed_on_ingress() {
    let connector = common::connector();
    let app = app(Broker::new(common::cache(&connector))).layer(axum::middleware::from_fn(
        event_sidecar::middleware::tracing::trace_id_middleware,
    ));

    let mut request = post(SAMPLE_EVENT);
    request
        .headers_mut()
        .insert("x-trace-id", "trace-42".parse().unwrap());

    let res = app.oneshot(request).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["x-trace-id"], "trace-42");
    assert!(common::eventually(|| connector.bus().published().len() == 1).await);
}

#[tokio::test]
async fn test_top_level_attributes_reach_the_bus() {
    let connector = common::connector();
    let app = app(Broker::new(common::cache(&connector)));

    let body = r#"{"id":"e1","type":"sh.keptn.x","shkeptncontext":"top","time":"2024-01-01T10:00:00.000+02:00"}"#;
    let res = app.oneshot(post(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    assert!(common::eventually(|| connector.bus().published().len() == 1).await);
    let published: Value = serde_json::from_slice(&connector.bus().published()[0].payload).unwrap();
    let sent: Value = serde_json::from_str(body).unwrap();
    assert_eq!(published, sent);
}
