//! HTTP surface: the submission form, status pages, downloads and chat

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{ChatRequest, JobManager, JobStatusResponse, SubmitRequest};
use crate::chat::ChatAnswer;
use crate::error::AnalyzerError;
use crate::jobs::{JobRecord, JobStatus};
use crate::report::OutputType;

/// Seconds between reloads of a running job's status page
const REFRESH_SECS: u32 = 5;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }
}

/// Builds the router with every route and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze))
        .route("/status/:job_id", get(status_page))
        .route("/download/:job_id/:filetype", get(download))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:job_id", get(job_json))
        .route("/api/jobs/:job_id/chat", post(chat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps library errors onto HTTP statuses
#[derive(Debug)]
pub struct WebError(pub AnalyzerError);

impl From<AnalyzerError> for WebError {
    fn from(err: AnalyzerError) -> Self {
        Self(err)
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AnalyzerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            AnalyzerError::JobNotReady(_) => StatusCode::CONFLICT,
            AnalyzerError::QuotaExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            AnalyzerError::Validation(_) | AnalyzerError::Config(_) => StatusCode::BAD_REQUEST,
            AnalyzerError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalyzerError::Api(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Form fields of `POST /analyze`
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeForm {
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub output_type: String,
    #[serde(default)]
    pub api_key: String,
    /// Present (usually as "on") when the checkbox is ticked
    #[serde(default)]
    pub generate_pdf: Option<String>,
}

impl From<AnalyzeForm> for SubmitRequest {
    fn from(form: AnalyzeForm) -> Self {
        Self {
            repo_url: form.repo_url,
            output_type: OutputType::from_form_value(&form.output_type),
            api_key: Some(form.api_key).filter(|k| !k.trim().is_empty()),
            generate_pdf: form
                .generate_pdf
                .map_or(false, |v| !matches!(v.as_str(), "" | "0" | "false" | "off")),
        }
    }
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let rows: String = state.manager.list().iter().map(job_row).collect();
    let options: String = OutputType::ALL
        .iter()
        .map(|t| format!("<option value=\"{}\">{}</option>", t.as_str(), t.human_name()))
        .collect();

    Html(page(
        "reposcribe",
        "",
        &format!(
            r#"<h1>reposcribe</h1>
<form method="post" action="/analyze">
<p><label>Repository URL <input name="repo_url" size="60" placeholder="https://github.com/owner/repo" required></label></p>
<p><label>Output <select name="output_type">{options}</select></label></p>
<p><label>Gemini API key <input name="api_key" type="password" size="40" placeholder="uses GEMINI_API_KEY when empty"></label></p>
<p><label><input type="checkbox" name="generate_pdf"> Also export PDF</label></p>
<p><button type="submit">Analyze</button></p>
</form>
<h2>Jobs</h2>
<table>
<tr><th>Repository</th><th>Output</th><th>Status</th><th>Submitted</th></tr>
{rows}</table>"#
        ),
    ))
}

fn job_row(job: &JobRecord) -> String {
    format!(
        "<tr><td><a href=\"/status/{id}\">{name}</a></td><td>{kind}</td><td>{status}</td><td>{ts}</td></tr>\n",
        id = escape_html(&job.id),
        name = escape_html(&job.repo_name),
        kind = job.output_type.human_name(),
        status = job.status,
        ts = job.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

async fn analyze(State(state): State<AppState>, Form(form): Form<AnalyzeForm>) -> Result<Redirect, WebError> {
    let handle = state.manager.submit(form.into())?;
    info!("Submitted job {} from the web form", handle.id);
    Ok(Redirect::to(&format!("/status/{}", handle.id)))
}

async fn status_page(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Html<String>, WebError> {
    let job = state.manager.get(&job_id)?;
    let refresh = if job.status == JobStatus::Running {
        format!("<meta http-equiv=\"refresh\" content=\"{}\">", REFRESH_SECS)
    } else {
        String::new()
    };

    let mut body = format!(
        "<h1>{name}</h1>\n<p>{kind} for <code>{url}</code></p>\n<p>Status: <strong>{status}</strong> ({progress})</p>\n",
        name = escape_html(&job.repo_name),
        kind = job.output_type.human_name(),
        url = escape_html(&job.repo_url),
        status = job.status,
        progress = escape_html(&job.progress),
    );

    if let Some(error) = &job.error {
        body.push_str(&format!("<p class=\"error\">Error: {}</p>\n", escape_html(error)));
    }
    if !job.warnings.is_empty() {
        body.push_str("<h2>Warnings</h2>\n<ul>\n");
        for warning in &job.warnings {
            body.push_str(&format!("<li>{}</li>\n", escape_html(warning)));
        }
        body.push_str("</ul>\n");
    }

    if job.status == JobStatus::Completed {
        body.push_str(&format!("<p><a href=\"/download/{}/md\">Download Markdown</a>", job.id));
        if job.pdf_path.is_some() {
            body.push_str(&format!(" | <a href=\"/download/{}/pdf\">Download PDF</a>", job.id));
        } else if let Some(pdf_error) = &job.pdf_error {
            body.push_str(&format!(" | PDF unavailable: {}", escape_html(pdf_error)));
        }
        body.push_str("</p>\n");
        body.push_str(&chat_widget(&job));
    }

    Ok(Html(page(&job.repo_name, &refresh, &body)))
}

fn chat_widget(job: &JobRecord) -> String {
    format!(
        r#"<h2>Ask about this report</h2>
<p><span id="remaining">{remaining}</span> questions left</p>
<form id="chat"><input id="question" size="60"> <button type="submit">Ask</button></form>
<div id="answers"></div>
<script>
document.getElementById("chat").addEventListener("submit", async (e) => {{
  e.preventDefault();
  const q = document.getElementById("question");
  const res = await fetch("/api/jobs/{id}/chat", {{
    method: "POST", headers: {{"Content-Type": "application/json"}},
    body: JSON.stringify({{question: q.value}})
  }});
  const data = await res.json();
  const item = document.createElement("pre");
  item.textContent = data.answer || data.error;
  document.getElementById("answers").prepend(item);
  if (data.remaining_questions !== undefined) document.getElementById("remaining").textContent = data.remaining_questions;
  q.value = "";
}});
</script>
"#,
        remaining = job.remaining_questions(),
        id = escape_html(&job.id),
    )
}

async fn download(
    State(state): State<AppState>,
    Path((job_id, filetype)): Path<(String, String)>,
) -> Result<Response, WebError> {
    let job = state.manager.get(&job_id)?;
    if job.status != JobStatus::Completed {
        return Err(AnalyzerError::JobNotReady(format!("job {} is {}", job_id, job.status)).into());
    }

    let (path, content_type) = match filetype.as_str() {
        "md" => (job.report_path.clone(), "text/markdown; charset=utf-8"),
        "pdf" => (job.pdf_path.clone(), "application/pdf"),
        other => {
            return Err(AnalyzerError::Validation(format!("Unknown file type '{}', expected md or pdf", other)).into())
        }
    };
    let path = path.ok_or_else(|| AnalyzerError::JobNotFound(format!("no {} file for job {}", filetype, job_id)))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AnalyzerError::JobNotFound(format!("{} is no longer available", path.display())))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("report.{}", filetype));
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename.replace('"', ""))),
    ];
    Ok((headers, bytes).into_response())
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatusResponse>> {
    Json(state.manager.list().into_iter().map(JobStatusResponse::from).collect())
}

async fn job_json(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, WebError> {
    Ok(Json(state.manager.get(&job_id)?.into()))
}

async fn chat(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, WebError> {
    Ok(Json(state.manager.ask(&job_id, &request.question).await?))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.health())
}

fn page(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n{}\n<style>body {{ font-family: Arial, sans-serif; max-width: 900px; margin: 0 auto; padding: 20px; }} .error {{ color: #b00; }} th, td {{ padding: 4px 8px; text-align: left; }}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        head_extra,
        body
    )
}

/// Escapes text for use in HTML bodies and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
