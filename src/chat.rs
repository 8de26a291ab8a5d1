use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AnalyzerError, Result};
use crate::gemini::TextGenerator;
use crate::prompts;

/// Number of follow-up questions a job still accepts
#[derive(Debug)]
pub struct QuestionQuota {
    limit: u32,
    remaining: AtomicU32,
}

impl QuestionQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit, remaining: AtomicU32::new(limit) }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Takes one question from the quota; never goes below zero
    ///
    /// Returns the count left after this question, or `None` when exhausted.
    pub fn try_consume(&self) -> Option<u32> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub remaining_questions: u32,
}

/// Question and answer bound to a finished report
pub struct ChatSession {
    repo_name: String,
    report: String,
    generator: Arc<dyn TextGenerator>,
    history: Mutex<Vec<(String, String)>>,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("repo_name", &self.repo_name)
            .field("report_chars", &self.report.len())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(repo_name: impl Into<String>, report: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            repo_name: repo_name.into(),
            report: report.into(),
            generator,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Answers `question` from the report context
    ///
    /// Empty questions and an exhausted quota are rejected before any remote
    /// call. Otherwise the quota is charged first, so a failed call still
    /// counts as a question.
    pub async fn ask(&self, quota: &QuestionQuota, question: &str) -> Result<ChatAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnalyzerError::Validation("Question must not be empty".into()));
        }
        let remaining_questions = quota.try_consume().ok_or_else(|| {
            AnalyzerError::QuotaExhausted(format!("all {} questions for this report have been used", quota.limit()))
        })?;

        let history = self.history.lock().await.clone();
        let prompt = prompts::chat_prompt(&self.repo_name, &self.report, &history, question);
        debug!("Chat question for {} ({} left)", self.repo_name, remaining_questions);
        let answer = self.generator.generate(&prompt).await?;

        self.history.lock().await.push((question.to_string(), answer.clone()));
        Ok(ChatAnswer { answer, remaining_questions })
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}
