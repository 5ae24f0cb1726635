//! HTTP-level tests for the ingestion server

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use control_tower::storage::{JobStore, SqliteJobStore};
use control_tower::{router, AppConfig, AppState, DatasetKind, TabularFormat, UploadJob};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "control-tower-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.ingest.max_upload_size = 10 * 1024 * 1024;
    config.ingest.max_concurrent_jobs = 2;
    config
}

fn test_app(config: AppConfig) -> TestApp {
    let store = SqliteJobStore::in_memory().expect("in-memory store");
    let state = AppState::with_store(config, Arc::new(store)).expect("state");
    TestApp {
        router: router(state.clone()),
        state,
    }
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.router.clone().oneshot(request).await.expect("response");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
    send(app, request).await
}

async fn call(app: &TestApp, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

async fn upload(app: &TestApp, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request");
    send(app, request).await
}

async fn upload_csv(app: &TestApp, csv: &str) -> String {
    let (status, body) = upload(app, &[Part::File("rows.csv", csv.as_bytes())]).await;
    assert_eq!(status, StatusCode::ACCEPTED, "upload failed: {}", body);
    assert_eq!(body["status"], "received");
    body["job_id"].as_str().expect("job_id").to_string()
}

async fn wait_for_terminal(app: &TestApp, job_id: &str) -> Value {
    for _ in 0..400 {
        let (status, job) = get(app, &format!("/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish", job_id);
}

async fn job_total(app: &TestApp) -> usize {
    let (_, body) = get(app, "/jobs").await;
    body["jobs"].as_array().map(Vec::len).unwrap_or(0)
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = test_app(test_config());

    let resp = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, _) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);

    app.state.set_ready(false);
    let (status, _) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_malformed_row_counts() {
    let app = test_app(test_config());
    let job_id = upload_csv(&app, "nome,idade\nAna,30\nBia,31,extra\nCai,32\n").await;

    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["counts"]["total"], 3);
    assert_eq!(job["counts"]["accepted"], 2);
    assert_eq!(job["counts"]["rejected"], 1);
}

#[tokio::test]
async fn test_chunks_of_two() {
    let mut config = test_config();
    config.ingest.chunk_capacity = 2;
    let app = test_app(config);

    let job_id = upload_csv(&app, "n\n1\n2\n3\n4\n5\n").await;
    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["chunks_committed"], 3);

    let mut sizes = Vec::new();
    for index in 0..3 {
        let (status, page) = get(&app, &format!("/jobs/{}/chunks/{}", job_id, index)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["index"], index);
        assert_eq!(page["has_more"], index < 2);
        sizes.push(page["records"].as_array().unwrap().len());
    }
    assert_eq!(sizes, vec![2, 2, 1]);

    let (status, body) = get(&app, &format!("/jobs/{}/chunks/3", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (_, first) = get(&app, &format!("/jobs/{}/chunks/1", job_id)).await;
    let (_, again) = get(&app, &format!("/jobs/{}/chunks/1", job_id)).await;
    assert_eq!(first["records"], again["records"]);

    let (status, list) = get(&app, &format!("/jobs/{}/chunks", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["chunks"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_record_pagination() {
    let mut config = test_config();
    config.ingest.chunk_capacity = 2;
    let app = test_app(config);

    let job_id = upload_csv(&app, "n\n1\n2\n3\n4\n5\n").await;
    wait_for_terminal(&app, &job_id).await;

    let (status, page) = get(&app, &format!("/jobs/{}/records?offset=1&limit=3", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<&str> = page["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["fields"]["n"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["2", "3", "4"]);
    assert_eq!(page["next_offset"], 4);

    let (_, page) = get(&app, &format!("/jobs/{}/records?offset=4", job_id)).await;
    assert_eq!(page["records"].as_array().unwrap().len(), 1);
    assert!(page["next_offset"].is_null());
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let app = test_app(test_config());
    let data = vec![b'a'; 11 * 1024 * 1024];

    let (status, body) = upload(&app, &[Part::File("big.csv", &data)]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["type"], "payload_too_large");
    assert_eq!(job_total(&app).await, 0);
}

#[tokio::test]
async fn test_declared_size_rejected_before_file() {
    let app = test_app(test_config());
    let declared = (11 * 1024 * 1024).to_string();

    let (status, _) = upload(
        &app,
        &[Part::Text("size", &declared), Part::File("a.csv", b"a\n1\n")],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(job_total(&app).await, 0);
}

#[tokio::test]
async fn test_unsupported_format() {
    let app = test_app(test_config());

    let (status, body) = upload(&app, &[Part::File("report.pdf", b"%PDF-1.7")]).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["type"], "unsupported_format");
    assert_eq!(job_total(&app).await, 0);
}

#[tokio::test]
async fn test_bad_requests() {
    let app = test_app(test_config());

    let (status, _) = upload(&app, &[Part::Text("dataset", "generic")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = upload(
        &app,
        &[Part::Text("dataset", "inventory"), Part::File("a.csv", b"a\n1\n")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/jobs?status=paused").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dataset_profile_applied() {
    let app = test_app(test_config());
    let csv = "Motorista,Contato,HUB\nAna,(47) 99999-1234,bnu-sc\n";

    let (status, body) = upload(
        &app,
        &[Part::Text("dataset", "telefones"), Part::File("phones.csv", csv.as_bytes())],
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["dataset"], "telefones");

    let (_, page) = get(&app, &format!("/jobs/{}/chunks/0", job_id)).await;
    assert_eq!(page["records"][0]["fields"]["Contato"], "47999991234");
    assert_eq!(page["records"][0]["fields"]["HUB"], "BNU -SC");
}

#[tokio::test]
async fn test_bases_per_job_and_across_jobs() {
    let app = test_app(test_config());

    let sla = "Número de pedido JMS,Base de entrega\nJMS1,itj-sc\nJMS2,CD BNU 001\nJMS3,ITJ - SC\n";
    let (_, body) = upload(&app, &[Part::Text("dataset", "sla"), Part::File("sla.csv", sla.as_bytes())]).await;
    let sla_job = body["job_id"].as_str().unwrap().to_string();

    let phones = "Motorista,HUB\nAna,JOI-SC\nBia,ITJ-SC\n";
    let (_, body) = upload(
        &app,
        &[Part::Text("dataset", "telefones"), Part::File("phones.csv", phones.as_bytes())],
    )
    .await;
    let phones_job = body["job_id"].as_str().unwrap().to_string();

    let job = wait_for_terminal(&app, &sla_job).await;
    assert_eq!(job["bases"], serde_json::json!(["BNU -SC", "ITJ -SC"]));
    wait_for_terminal(&app, &phones_job).await;

    let (status, body) = get(&app, "/bases").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bases"], serde_json::json!(["BNU -SC", "ITJ -SC", "JOI -SC"]));

    let (_, body) = get(&app, "/bases?dataset=sla").await;
    assert_eq!(body["dataset"], "sla");
    assert_eq!(body["bases"], serde_json::json!(["BNU -SC", "ITJ -SC"]));

    let (status, _) = get(&app, "/bases?dataset=unknown").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_interrupted_job_resumed_on_startup() {
    let store = SqliteJobStore::in_memory().unwrap();
    let job = UploadJob::new("left.csv", DatasetKind::Generic, TabularFormat::Csv, 8, "h");
    store
        .create_job(&job, bytes::Bytes::from_static(b"a\n1\n2\n3\n"))
        .await
        .unwrap();

    let state = AppState::with_store(test_config(), Arc::new(store)).expect("state");
    // A duplicate hand-off while the resume pass may already hold the job
    state.job_queue().enqueue(job.id).await.unwrap();
    let app = TestApp {
        router: router(state.clone()),
        state,
    };

    let done = wait_for_terminal(&app, &job.id.to_string()).await;
    assert_eq!(done["status"], "completed", "job failed: {}", done["error"]);
    assert_eq!(done["counts"]["accepted"], 3);
}

#[tokio::test]
async fn test_unknown_job() {
    let app = test_app(test_config());
    let id = uuid::Uuid::new_v4();

    let (status, body) = get(&app, &format!("/jobs/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _) = get(&app, &format!("/jobs/{}/chunks/0", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_and_delete() {
    let app = test_app(test_config());
    // Let the startup resume pass finish before adding an unqueued job
    tokio::time::sleep(Duration::from_millis(50)).await;

    let job = UploadJob::new("held.csv", DatasetKind::Generic, TabularFormat::Csv, 4, "h");
    app.state
        .store()
        .create_job(&job, bytes::Bytes::from_static(b"a\n1\n"))
        .await
        .unwrap();

    let (status, _) = call(&app, "DELETE", &format!("/jobs/{}", job.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cancelled) = call(&app, "POST", &format!("/jobs/{}/cancel", job.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "failed");
    assert_eq!(cancelled["error"], "cancelled");
    assert!(app.state.store().load_source(job.id).await.unwrap().is_none());

    let (status, _) = call(&app, "POST", &format!("/jobs/{}/cancel", job.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, "DELETE", &format!("/jobs/{}", job.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = get(&app, &format!("/jobs/{}", job.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completed_job_cannot_be_cancelled() {
    let app = test_app(test_config());
    let job_id = upload_csv(&app, "a\n1\n").await;
    wait_for_terminal(&app, &job_id).await;

    let (status, body) = call(&app, "POST", &format!("/jobs/{}/cancel", job_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict");
}

#[tokio::test]
async fn test_job_listing() {
    let app = test_app(test_config());
    let job_id = upload_csv(&app, "a\n1\n").await;
    wait_for_terminal(&app, &job_id).await;

    let (status, body) = get(&app, "/jobs?status=completed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"][0]["id"], job_id.as_str());
    assert_eq!(body["by_status"]["completed"], 1);
    assert_eq!(body["queue"]["worker_slots"], 2);

    let (_, body) = get(&app, "/jobs?status=failed").await;
    assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_info() {
    let app = test_app(test_config());
    let (status, body) = get(&app, "/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "control-tower");
}

#[tokio::test]
async fn test_concurrent_uploads_all_complete() {
    let mut config = test_config();
    config.ingest.chunk_capacity = 3;
    let app = test_app(config);

    let csvs: Vec<String> = (0..5)
        .map(|n| {
            let mut csv = String::from("job,row\n");
            for row in 0..(n * 4 + 1) {
                csv.push_str(&format!("{},{}\n", n, row));
            }
            csv
        })
        .collect();

    let job_ids = futures::future::join_all(csvs.iter().map(|csv| upload_csv(&app, csv))).await;

    for (n, job_id) in job_ids.iter().enumerate() {
        let job = wait_for_terminal(&app, job_id).await;
        let expected = (n * 4 + 1) as u64;
        assert_eq!(job["status"], "completed");
        assert_eq!(job["counts"]["accepted"], expected);
        assert_eq!(job["chunks_committed"], (expected + 2) / 3);
    }
}
