//! Exit status of the `request-registry` binary.

use std::path::PathBuf;
use std::process::Output;

use tokio::process::Command;

mod common;

fn write_config() -> PathBuf {
    let path = std::env::temp_dir().join(format!("request-registry-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "[transport]\nsystem_proxy = false\n").unwrap();
    path
}

async fn fetch(url: String) -> Output {
    let config = write_config();
    let output = Command::new(env!("CARGO_BIN_EXE_request-registry"))
        .arg("--config")
        .arg(&config)
        .arg("fetch")
        .arg(url)
        .env("RUST_LOG", "off")
        .output()
        .await
        .unwrap();
    let _ = std::fs::remove_file(config);
    output
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_failure_exits_nonzero() {
    let addr = common::start_mock_backend(500, r#"{"message":"boom"}"#).await;

    let output = fetch(format!("http://{}/broken", addr)).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 call(s), 1 request(s) sent"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_success_prints_body() {
    let addr = common::start_mock_backend(200, r#"{"ok":true}"#).await;

    let output = fetch(format!("http://{}/fine", addr)).await;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("\"ok\": true"));
}
