use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chat::{ChatAnswer, ChatSession};
use crate::config::{resolve_api_key, Config};
use crate::error::{AnalyzerError, Result};
use crate::jobs::{JobHandle, JobRecord, JobStatus, JobStore, WorkerPool};
use crate::pipeline::{AnalysisRequest, Progress, ReportPipeline};
use crate::report::OutputType;
use crate::repository::{repo_name_from_url, validate_repo_url};

/// A job submission, as received from the form or the JSON API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub repo_url: String,
    #[serde(default)]
    pub output_type: OutputType,
    /// Falls back to the configured key when absent
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub generate_pdf: bool,
}

/// Body of `POST /api/jobs/:id/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// Job record as exposed over JSON
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: JobRecord,
    pub remaining_questions: u32,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        let remaining_questions = job.remaining_questions();
        Self { job, remaining_questions }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub service: String,
    pub version: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since start-up
    pub uptime: u64,
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

/// Owns the job registry and the worker pool behind the web interface
pub struct JobManager {
    store: Arc<JobStore>,
    pool: WorkerPool,
    pipeline: Arc<ReportPipeline>,
    start_time: DateTime<Utc>,
}

impl JobManager {
    /// Manager backed by the Gemini API and `git`
    pub fn new(config: Config) -> Self {
        Self::with_pipeline(ReportPipeline::gemini(config))
    }

    /// Manager running jobs through `pipeline`; must be called inside a Tokio runtime
    pub fn with_pipeline(pipeline: ReportPipeline) -> Self {
        let server = &pipeline.config().server;
        let store = Arc::new(JobStore::new(Duration::from_secs(server.retention_secs)));
        let pool = WorkerPool::new(server.workers, server.queue_capacity);
        Self {
            store,
            pool,
            pipeline: Arc::new(pipeline),
            start_time: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        self.pipeline.config()
    }

    /// Get output directory
    pub fn output_dir(&self) -> &Path {
        &self.config().output_dir
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validates the request, records the job as running and queues it
    ///
    /// The returned handle resolves to the final status; dropping it is fine.
    pub fn submit(&self, request: SubmitRequest) -> Result<JobHandle<JobStatus>> {
        let repo_url = request.repo_url.trim().to_string();
        validate_repo_url(&repo_url)?;
        let api_key = resolve_api_key(request.api_key.as_deref(), self.config()).ok_or_else(|| {
            AnalyzerError::Validation("A Gemini API key is required (form field or GEMINI_API_KEY)".into())
        })?;
        let generator = self.pipeline.generator_for(&api_key)?;

        let id = Uuid::new_v4().to_string();
        let repo_name = repo_name_from_url(&repo_url);
        let record = JobRecord::new(
            id.clone(),
            repo_url.clone(),
            repo_name.clone(),
            request.output_type,
            request.generate_pdf,
            self.config().server.question_quota,
        );
        self.store.insert(record);

        let analysis = AnalysisRequest {
            repo_url,
            output_type: request.output_type,
            generate_pdf: request.generate_pdf,
        };
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let job_id = id.clone();

        let job = async move {
            let run = {
                let store = Arc::clone(&store);
                let job_id = job_id.clone();
                let generator = generator.clone();
                tokio::spawn(async move {
                    let on_progress = |p: Progress| {
                        store.update(&job_id, |job| job.progress = p.to_string());
                    };
                    pipeline.analyze_repository(&analysis, generator, &on_progress).await
                })
            };
            let failure = match run.await {
                Ok(Ok(outcome)) => {
                    let chat = ChatSession::new(repo_name, outcome.report.markdown_text.clone(), generator);
                    store.update(&job_id, |job| job.complete(outcome, chat));
                    info!("Job {} completed", job_id);
                    return JobStatus::Completed;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("Job crashed: {}", e),
            };
            error!("Job {} failed: {}", job_id, failure);
            store.update(&job_id, |job| job.fail(failure));
            JobStatus::Failed
        };

        match self.pool.submit(id.clone(), job) {
            Ok(handle) => {
                info!("Queued job {} for {}", id, request.repo_url.trim());
                Ok(handle)
            }
            Err(e) => {
                self.store.update(&id, |job| job.fail(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<JobRecord> {
        self.store
            .get(id)
            .ok_or_else(|| AnalyzerError::JobNotFound(id.to_string()))
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<JobRecord> {
        self.store.list()
    }

    /// Answers a follow-up question about a completed job's report
    pub async fn ask(&self, id: &str, question: &str) -> Result<ChatAnswer> {
        let job = self.get(id)?;
        let chat = match (&job.status, &job.chat) {
            (JobStatus::Completed, Some(chat)) => Arc::clone(chat),
            _ => {
                return Err(AnalyzerError::JobNotReady(format!(
                    "job {} is {}, questions need a completed report",
                    id, job.status
                )))
            }
        };
        chat.ask(&job.quota, question).await
    }

    /// Get service health information
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            service: "reposcribe".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            uptime: (Utc::now() - self.start_time).num_seconds().max(0) as u64,
            active_jobs: self.store.count(JobStatus::Running),
            completed_jobs: self.store.count(JobStatus::Completed),
            failed_jobs: self.store.count(JobStatus::Failed),
        }
    }

    /// Periodically evicts finished jobs past their retention
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let every = Duration::from_secs(self.config().server.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired();
                if evicted > 0 {
                    info!("Evicted {} finished jobs", evicted);
                }
            }
        })
    }
}
