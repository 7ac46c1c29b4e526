//! Integration coverage for spec.md §8's capture-visibility invariant:
//! a `request_received` save must be observable by a `load` later in the
//! same request, and `response_sent` captures must be skipped when only
//! `request_received` captures are requested.

use doppel_core::capture::run_captures;
use doppel_core::config::{CaptureConfig, CapturePhase, CaptureSource};
use doppel_core::exchange::{MultiMap, RequestView};
use doppel_core::store::{InMemoryStoreFactory, StoreFactory};
use serde_json::json;

fn request_with_body(body: &str) -> RequestView {
    RequestView {
        method: "POST".to_string(),
        path: "/items".to_string(),
        query: MultiMap::new(),
        headers: MultiMap::new(),
        body: body.as_bytes().to_vec(),
        path_params: Default::default(),
    }
}

#[tokio::test]
async fn request_received_save_is_visible_within_the_same_request() {
    let factory = InMemoryStoreFactory::new();
    let request = request_with_body(r#"{"name":"widget"}"#);

    let captures = vec![CaptureConfig {
        name: "last".to_string(),
        source: CaptureSource::JsonPath { expr: "$.name".to_string() },
        key: None,
        store: Some(CaptureSource::Constant { value: json!("items") }),
        enabled: true,
        phase: CapturePhase::RequestReceived,
    }];

    run_captures(&captures, CapturePhase::RequestReceived, &request, &factory).await;

    let store = factory.open_or_create("items").await.unwrap();
    assert_eq!(store.load("last").await.unwrap(), Some(json!("widget")));
}

#[tokio::test]
async fn response_sent_captures_do_not_run_when_filtering_request_received() {
    let factory = InMemoryStoreFactory::new();
    let request = request_with_body(r#"{"name":"widget"}"#);

    let captures = vec![CaptureConfig {
        name: "last".to_string(),
        source: CaptureSource::JsonPath { expr: "$.name".to_string() },
        key: None,
        store: Some(CaptureSource::Constant { value: json!("items") }),
        enabled: true,
        phase: CapturePhase::ResponseSent,
    }];

    run_captures(&captures, CapturePhase::RequestReceived, &request, &factory).await;

    let store = factory.open_or_create("items").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn later_request_observes_an_earlier_response_sent_save() {
    let factory = InMemoryStoreFactory::new();
    let first_request = request_with_body(r#"{"name":"widget"}"#);

    let captures = vec![CaptureConfig {
        name: "last".to_string(),
        source: CaptureSource::JsonPath { expr: "$.name".to_string() },
        key: None,
        store: Some(CaptureSource::Constant { value: json!("items") }),
        enabled: true,
        phase: CapturePhase::ResponseSent,
    }];

    run_captures(&captures, CapturePhase::ResponseSent, &first_request, &factory).await;

    // A later, unrelated request reading the same store sees the saved value.
    let store = factory.open_or_create("items").await.unwrap();
    assert_eq!(store.load("last").await.unwrap(), Some(json!("widget")));
}

#[tokio::test]
async fn duplicate_store_and_key_across_captures_is_last_write_wins() {
    let factory = InMemoryStoreFactory::new();
    let request = request_with_body(r#"{"name":"widget"}"#);

    let captures = vec![
        CaptureConfig {
            name: "first".to_string(),
            source: CaptureSource::Constant { value: json!("one") },
            key: Some(CaptureSource::Constant { value: json!("slot") }),
            store: Some(CaptureSource::Constant { value: json!("dup") }),
            enabled: true,
            phase: CapturePhase::RequestReceived,
        },
        CaptureConfig {
            name: "second".to_string(),
            source: CaptureSource::Constant { value: json!("two") },
            key: Some(CaptureSource::Constant { value: json!("slot") }),
            store: Some(CaptureSource::Constant { value: json!("dup") }),
            enabled: true,
            phase: CapturePhase::RequestReceived,
        },
    ];

    run_captures(&captures, CapturePhase::RequestReceived, &request, &factory).await;

    let store = factory.open_or_create("dup").await.unwrap();
    assert_eq!(store.load("slot").await.unwrap(), Some(json!("two")));
}
