use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use reposcribe::test_utils::ScriptedGenerator;
use reposcribe::web::{create_app, AppState};
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::{Harness, HarnessBuilder};

fn app(harness: &Harness) -> Router {
    create_app(AppState::new(harness.manager.clone()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), location)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn form(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn question(job_id: &str, text: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/api/jobs/{}/chat", job_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "question": text }).to_string()))
        .unwrap()
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

/// Submits the sample repository through the form and waits for the job
async fn submit_and_finish(harness: &Harness, fields: &str) -> String {
    let (status, _, location) = send(app(harness), form(fields)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = location.unwrap();
    let id = location.trim_start_matches("/status/").to_string();
    harness.wait_finished(&id).await;
    id
}

#[tokio::test]
async fn test_health() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).build();
    let (status, body, _) = send(app(&harness), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let health = json(&body);
    assert_eq!(health["service"], "reposcribe");
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_jobs"], 0);
}

#[tokio::test]
async fn test_index_lists_output_types() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).build();
    let (status, body, _) = send(app(&harness), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("action=\"/analyze\""));
    assert!(html.contains("value=\"readme\""));
    assert!(html.contains("value=\"guidance\""));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).build();

    let (status, body, _) = send(app(&harness), get("/api/jobs/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json(&body)["error"].as_str().unwrap().contains("missing"));

    let (status, _, _) = send(app(&harness), get("/status/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_form_without_key_is_rejected() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).build();
    let (status, body, _) = send(
        app(&harness),
        form("repo_url=https%3A%2F%2Fgithub.com%2Facme%2Fsample&output_type=analysis&api_key="),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("API key"));
    assert!(harness.manager.list().is_empty());
}

#[tokio::test]
async fn test_form_with_bad_url_is_rejected() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).api_key("server-key").build();
    let (status, _, _) = send(app(&harness), form("repo_url=not+a+url&output_type=readme")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_status_and_download() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("## Introduction\nSample project."))
        .api_key("server-key")
        .build();
    let id = submit_and_finish(
        &harness,
        "repo_url=https%3A%2F%2Fgithub.com%2Facme%2Fsample&output_type=analysis&api_key=",
    )
    .await;

    let (status, body, _) = send(app(&harness), get(&format!("/api/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    let job = json(&body);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["repo_name"], "sample");
    assert_eq!(job["output_type"], "analysis");
    assert_eq!(job["remaining_questions"], 10);

    let (status, body, _) = send(app(&harness), get(&format!("/status/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains(&format!("/download/{}/md", id)));
    assert!(!html.contains("http-equiv=\"refresh\""));

    let response = app(&harness)
        .oneshot(get(&format!("/download/{}/md", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("sample_analysis.md"));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8(body.to_vec()).unwrap().starts_with("# sample: Analysis Report"));

    let (status, _, _) = send(app(&harness), get(&format!("/download/{}/pdf", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(app(&harness), get(&format!("/download/{}/zip", id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = send(app(&harness), get("/api/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_running_job_cannot_be_downloaded() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("unused")).build();
    harness.insert_running_job("busy-job");

    let (status, _, _) = send(app(&harness), get("/download/busy-job/md")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body, _) = send(app(&harness), get("/status/busy-job")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("http-equiv=\"refresh\""));

    let (status, _, _) = send(app(&harness), question("busy-job", "Ready yet?")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_chat_until_quota_exhausted() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("## Frontend\n- [ ] build the UI"))
        .question_quota(2)
        .build();
    let id = submit_and_finish(
        &harness,
        "repo_url=https%3A%2F%2Fgithub.com%2Facme%2Fsample&output_type=guidance&api_key=form-key",
    )
    .await;
    assert_eq!(harness.factory.keys(), vec!["form-key".to_string()]);

    let (status, body, _) = send(app(&harness), question(&id, "What comes first?")).await;
    assert_eq!(status, StatusCode::OK);
    let answer = json(&body);
    assert_eq!(answer["remaining_questions"], 1);
    assert!(answer["answer"].as_str().is_some());

    let (status, _, _) = send(app(&harness), question(&id, "And then?")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(app(&harness), question(&id, "Anything else?")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(json(&body)["error"].is_string());

    let (_, body, _) = send(app(&harness), get(&format!("/api/jobs/{}", id))).await;
    assert_eq!(json(&body)["remaining_questions"], 0);
}
