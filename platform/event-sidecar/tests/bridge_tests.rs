mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, http::StatusCode};
use event_sidecar::{router, Broker};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{distributor, SAMPLE_EVENT};

#[tokio::test]
async fn test_event_crosses_broker_bus_and_distributor_unchanged() {
    let recipient = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&recipient)
        .await;

    // both sides share one in-memory bus
    let connector = common::connector();
    let d = distributor(&connector, &recipient.uri());
    let stream = d.subscribe().await.unwrap();
    let runner = tokio::spawn(async move { d.consume(stream).await });

    let app = router(Arc::new(Broker::new(common::cache(&connector))), "/");
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from(SAMPLE_EVENT))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let mut received = Vec::new();
    for _ in 0..100 {
        received = recipient.received_requests().await.unwrap();
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    runner.abort();

    assert_eq!(received.len(), 1);
    assert_eq!(std::str::from_utf8(&received[0].body).unwrap(), SAMPLE_EVENT);
    assert!(SAMPLE_EVENT.contains("ctx-123"));
}
