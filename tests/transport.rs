//! End-to-end tests of endpoints over the reqwest transport.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use request_registry::{RequestError, RequestRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

mod common;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_get_joins_base_url_and_caches() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |request| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let id: u32 = request.path.trim_start_matches("/users/").parse().unwrap_or(0);
            (200, json!({ "id": id, "name": format!("user-{}", id) }).to_string())
        }
    })
    .await;

    let registry = RequestRegistry::new(common::config_for(addr)).unwrap();
    let users = registry.get::<u32, User, _>(|id: &u32| format!("users/{}", id)).build();

    let user: User = users.call(3).await.unwrap();
    assert_eq!(user, User { id: 3, name: "user-3".into() });
    assert_eq!(users.call(3).await.unwrap(), user);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    users.call(4).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_post_sends_headers_and_body() {
    let seen = Arc::new(Mutex::new(None));
    let recorder = seen.clone();
    let addr = common::start_programmable_backend(move |request| {
        *recorder.lock().unwrap() = Some(request.clone());
        async move { (201, request.body) }
    })
    .await;

    let registry = RequestRegistry::new(common::config_for(addr)).unwrap();
    let create = registry
        .post::<(), User, User, _>(|_: &()| "/users".to_string())
        .header("X-Client", "tests")
        .header_with("X-Tenant", |_: &()| "acme".to_string())
        .build();

    let created: User = create.call((), User { id: 9, name: "ada".into() }).await.unwrap();
    assert_eq!(created.name, "ada");

    let request = seen.lock().unwrap().clone().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/users");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("x-client"), Some("tests"));
    assert_eq!(request.header("x-tenant"), Some("acme"));
    assert_eq!(serde_json::from_str::<Value>(&request.body).unwrap(), json!({"id": 9, "name": "ada"}));
}

#[tokio::test]
async fn test_not_found_is_unhandled_with_details() {
    let addr = common::start_mock_backend(404, r#"{"message":"no such user"}"#).await;
    let registry = RequestRegistry::new(common::config_for(addr)).unwrap();
    let users = registry.get::<u32, User, _>(|id: &u32| format!("users/{}", id)).build();

    let err = users.call(1).await.unwrap_err();
    let RequestError::Unhandled(details) = &err else {
        panic!("expected unhandled error, got {:?}", err);
    };
    assert_eq!(details.status, 404);
    assert_eq!(details.status_text, "Not Found");
    assert_eq!(details.content["message"], "no such user");
    assert!(details.url.ends_with("/users/1"));
}

#[tokio::test]
async fn test_non_json_error_body_is_wrapped() {
    let addr = common::start_mock_backend(500, "database on fire").await;
    let registry = RequestRegistry::new(common::config_for(addr)).unwrap();
    let status = registry.get::<(), Value, _>(|_: &()| "status".to_string()).build();

    let err = status.call(()).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.details().unwrap().content, json!({"message": "database on fire"}));
}

#[tokio::test]
async fn test_relative_url_without_base_fails_to_derive() {
    let mut config = common::config_for("127.0.0.1:1".parse().unwrap());
    config.transport.base_url = None;
    let registry = RequestRegistry::new(config).unwrap();
    let users = registry.get::<u32, User, _>(|id: &u32| format!("users/{}", id)).build();

    assert!(matches!(users.call(1).await, Err(RequestError::Derivation(_))));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = RequestRegistry::new(common::config_for(addr)).unwrap();
    let users = registry.get::<u32, User, _>(|id: &u32| format!("users/{}", id)).build();

    assert!(matches!(users.call(1).await, Err(RequestError::Transport(_))));
}
