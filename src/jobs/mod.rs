//! Background analysis jobs: their records, the registry and the worker pool

mod pool;
mod store;

pub use pool::{JobHandle, WorkerPool};
pub use store::JobStore;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatSession, QuestionQuota};
use crate::pipeline::AnalysisOutcome;
use crate::report::OutputType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Everything known about one submitted job
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub repo_url: String,
    pub repo_name: String,
    pub output_type: OutputType,
    pub status: JobStatus,
    /// Human-readable description of the current stage
    pub progress: String,
    pub error: Option<String>,
    pub report_path: Option<PathBuf>,
    pub pdf_path: Option<PathBuf>,
    pub pdf_requested: bool,
    pub pdf_error: Option<String>,
    pub warnings: Vec<String>,
    /// Submission time
    pub timestamp: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub quota: Arc<QuestionQuota>,
    #[serde(skip)]
    pub chat: Option<Arc<ChatSession>>,
}

impl JobRecord {
    /// A freshly submitted job, already marked running
    pub fn new(id: String, repo_url: String, repo_name: String, output_type: OutputType, pdf_requested: bool, question_quota: u32) -> Self {
        Self {
            id,
            repo_url,
            repo_name,
            output_type,
            status: JobStatus::Running,
            progress: "Queued".to_string(),
            error: None,
            report_path: None,
            pdf_path: None,
            pdf_requested,
            pdf_error: None,
            warnings: Vec::new(),
            timestamp: Utc::now(),
            finished_at: None,
            quota: Arc::new(QuestionQuota::new(question_quota)),
            chat: None,
        }
    }

    pub fn complete(&mut self, outcome: AnalysisOutcome, chat: ChatSession) {
        self.status = JobStatus::Completed;
        self.progress = "Completed".to_string();
        self.report_path = Some(outcome.report_path);
        self.pdf_path = outcome.pdf_path;
        self.pdf_error = outcome.pdf_error;
        self.warnings = outcome.report.warnings;
        self.finished_at = Some(Utc::now());
        self.chat = Some(Arc::new(chat));
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.progress = "Failed".to_string();
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    pub fn remaining_questions(&self) -> u32 {
        self.quota.remaining()
    }
}
