//! Batch archive API integration tests.
//!
//! Run with: `cargo test -p cofile-api --test archives_test`

mod helpers;

use helpers::{api_path, setup_test_app, upload_file, TestApp};
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::time::Duration;
use uuid::Uuid;

async fn wait_for_terminal(app: &TestApp, user: Uuid, task_id: &str) -> Value {
    for _ in 0..100 {
        let task: Value = app
            .client()
            .get(&api_path(&format!("/archives/{}", task_id)))
            .add_header("Authorization", app.bearer(user))
            .await
            .json();
        if task["status"] == "completed" || task["status"] == "failed" {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("archive task {} did not finish", task_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_archive_round_trip() {
    let app = setup_test_app().await;
    let user = Uuid::new_v4();
    let first = upload_file(&app, user, "report.txt", b"first report", 64).await;
    let second = upload_file(&app, user, "report.txt", b"second report", 64).await;

    let response = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({
            "file_ids": [first["id"], second["id"], Uuid::new_v4()],
            "archive_name": "bundle",
        }))
        .await;
    assert_eq!(response.status_code(), 202);
    let created: Value = response.json();
    assert_eq!(created["accepted_count"], 2);
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let task = wait_for_terminal(&app, user, &task_id).await;
    assert_eq!(task["status"], "completed", "task: {}", task);
    assert_eq!(task["name"], "bundle.zip");
    assert_eq!(
        task["retrieval_reference"],
        format!("http://localhost:3000/api/v1/archives/{}/download", task_id)
    );

    let download = app
        .client()
        .get(&api_path(&format!("/archives/{}/download", task_id)))
        .add_header("Authorization", app.bearer(user))
        .await;
    assert_eq!(download.status_code(), 200);
    assert_eq!(download.header("content-type"), "application/zip");

    let mut zip = zip::ZipArchive::new(Cursor::new(download.as_bytes().to_vec())).unwrap();
    assert_eq!(zip.len(), 2);
    let mut contents = Vec::new();
    for name in ["report.txt", "report (1).txt"] {
        let mut text = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut text).unwrap();
        contents.push(text);
    }
    assert_eq!(contents, vec!["first report", "second report"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_archive_of_unreadable_files_is_forbidden() {
    let app = setup_test_app().await;
    let owner = Uuid::new_v4();
    let private = upload_file(&app, owner, "mine.txt", b"private bytes", 64).await;

    let response = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(Uuid::new_v4()))
        .json(&json!({ "file_ids": [private["id"]] }))
        .await;
    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["code"], "NO_ACCESSIBLE_CONTENT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_archive_requests_are_validated() {
    let app = setup_test_app().await;
    let user = Uuid::new_v4();

    let empty = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({ "file_ids": [] }))
        .await;
    assert_eq!(empty.status_code(), 400);

    let ids: Vec<Uuid> = (0..11).map(|_| Uuid::new_v4()).collect();
    let too_many = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({ "file_ids": ids }))
        .await;
    assert_eq!(too_many.status_code(), 400);

    let bad_ids = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({ "file_ids": ["not-a-uuid"] }))
        .await;
    assert_eq!(bad_ids.status_code(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tasks_are_private_to_the_requester() {
    let app = setup_test_app().await;
    let user = Uuid::new_v4();
    let file = upload_file(&app, user, "a.txt", b"aaa", 64).await;

    let created: Value = app
        .client()
        .post(&api_path("/archives"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({ "file_ids": [file["id"]] }))
        .await
        .json();
    let task_id = created["task_id"].as_str().unwrap().to_string();
    wait_for_terminal(&app, user, &task_id).await;

    let stranger = Uuid::new_v4();
    for path in [
        format!("/archives/{}", task_id),
        format!("/archives/{}/download", task_id),
    ] {
        let response = app
            .client()
            .get(&api_path(&path))
            .add_header("Authorization", app.bearer(stranger))
            .await;
        assert_eq!(response.status_code(), 404);
    }

    let list: Value = app
        .client()
        .get(&api_path("/archives?page=1&page_size=10"))
        .add_header("Authorization", app.bearer(user))
        .await
        .json();
    assert_eq!(list["total"], 1);
    assert_eq!(list["tasks"][0]["task_id"], task_id);
    assert_eq!(list["tasks"][0]["name"], "archive.zip");

    let other_list: Value = app
        .client()
        .get(&api_path("/archives"))
        .add_header("Authorization", app.bearer(stranger))
        .await
        .json();
    assert_eq!(other_list["total"], 0);
}
