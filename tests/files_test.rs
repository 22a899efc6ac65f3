//! Stored output listing, download and cleanup integration tests.

mod common;

use std::time::{Duration, SystemTime};

use common::{file_count, TestHarness};

fn write_output(harness: &TestHarness, name: &str, bytes: &[u8], age: Duration) {
    let path = harness.output_dir().join(name);
    std::fs::write(&path, bytes).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_files_when_empty() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/files")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 0);
    assert_eq!(json["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn list_files_shows_mp4_outputs() {
    let (harness, addr) = TestHarness::with_server().await;
    write_output(&harness, "combined_a.mp4", b"aaaa", Duration::from_secs(60));
    write_output(&harness, "notes.txt", b"ignored", Duration::ZERO);

    let resp = reqwest::get(format!("http://{addr}/api/files")).await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["count"], 1);

    let entry = &json["files"][0];
    assert_eq!(entry["filename"], "combined_a.mp4");
    assert_eq!(entry["size"], 4);
    assert_eq!(entry["download_url"], "/api/download/combined_a.mp4");
    assert!(entry["created"].is_string());
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_returns_file_with_headers() {
    let (harness, addr) = TestHarness::with_server().await;
    write_output(&harness, "combined_b.mp4", b"stored video", Duration::ZERO);

    let resp = reqwest::get(format!("http://{addr}/api/download/combined_b.mp4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/mp4");
    assert_eq!(resp.headers()["content-length"], "12");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"combined_b.mp4\""
    );
    assert_eq!(&resp.bytes().await.unwrap()[..], b"stored video");
}

#[tokio::test]
async fn download_missing_file_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/download/nope.mp4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn download_rejects_path_traversal() {
    let (harness, addr) = TestHarness::with_server().await;
    std::fs::write(harness.root().join("secret.mp4"), b"secret").unwrap();

    let resp = reqwest::get(format!("http://{addr}/api/download/..%2Fsecret.mp4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_deletes_only_expired_outputs() {
    let (harness, addr) = TestHarness::with_server().await;
    write_output(&harness, "combined_old.mp4", b"old", Duration::from_secs(25 * 3600));
    write_output(&harness, "combined_new.mp4", b"new", Duration::from_secs(3600));

    let resp = reqwest::Client::new()
        .delete(format!("http://{addr}/api/cleanup"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["deleted_count"], 1);
    assert_eq!(json["message"], "Cleaned up 1 old files");

    assert_eq!(file_count(harness.output_dir()), 1);
    assert!(harness.output_dir().join("combined_new.mp4").exists());
}
