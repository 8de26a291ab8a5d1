use std::collections::VecDeque;
use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregator::split_sections;
use crate::chunker::Chunk;
use crate::error::{ApiError, Result};
use crate::gemini::TextGenerator;
use crate::prompts::{self, ChunkContext};
use crate::report::OutputType;
use crate::utils::{with_retry, RetryPolicy};

/// Longest excerpt kept per summary bullet
const BULLET_CHARS: usize = 160;

/// Called with `(completed, total)` after every chunk
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// What a single chunk call produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkOutcome {
    Success { text: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub chunk_index: usize,
    pub outcome: ChunkOutcome,
}

impl AnalysisResult {
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ChunkOutcome::Success { text } => Some(text),
            ChunkOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Failed { .. })
    }
}

/// Bounded notes about the chunks analyzed so far
#[derive(Debug, Clone)]
pub struct RollingSummary {
    budget: usize,
    bullets: VecDeque<String>,
}

impl RollingSummary {
    pub fn new(budget: usize) -> Self {
        Self { budget, bullets: VecDeque::new() }
    }

    /// Adds one bullet per section of `response`, then trims to the budget
    pub fn absorb(&mut self, response: &str) {
        for section in split_sections(response) {
            let Some(line) = first_meaningful_line(&section.body) else {
                continue;
            };
            let bullet = match &section.title {
                Some(title) => format!("- {}: {}", title.trim(), line),
                None => format!("- {}", line),
            };
            self.bullets.push_back(bullet);
        }
        while self.char_count() > self.budget {
            if self.bullets.pop_front().is_none() {
                break;
            }
        }
    }

    fn char_count(&self) -> usize {
        self.bullets.iter().map(|b| b.chars().count() + 1).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    pub fn render(&self) -> String {
        self.bullets.iter().map(|b| format!("{}\n", b)).collect()
    }
}

fn first_meaningful_line(body: &str) -> Option<String> {
    let mut in_fence = false;
    let line = body.lines().map(str::trim).find(|l| {
        if l.starts_with("```") || l.starts_with("~~~") {
            in_fence = !in_fence;
            return false;
        }
        !in_fence && l.chars().any(char::is_alphanumeric)
    })?;
    let line = line.trim_start_matches(['-', '*', '>', '#']).trim();
    let mut excerpt: String = line.chars().take(BULLET_CHARS).collect();
    if line.chars().count() > BULLET_CHARS {
        excerpt.push_str("...");
    }
    Some(excerpt)
}

/// Sends chunks to the model one after another
pub struct SequentialAnalyzer {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    summary_budget: usize,
    repo_name: String,
}

impl SequentialAnalyzer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        summary_budget: usize,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            retry,
            summary_budget,
            repo_name: repo_name.into(),
        }
    }

    /// Analyzes every chunk in order
    ///
    /// A chunk whose call keeps failing gets a failure marker and the run goes
    /// on. Authentication and malformed-request errors abort the run.
    pub async fn analyze(
        &self,
        chunks: &[Chunk],
        output_type: OutputType,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<AnalysisResult>> {
        let total = chunks.len();
        let mut summary = RollingSummary::new(self.summary_budget);
        let mut results = Vec::with_capacity(total);

        for chunk in chunks {
            info!("Analyzing chunk {}/{} of {}", chunk.index + 1, total, self.repo_name);
            let rendered = summary.render();
            let prompt = prompts::chunk_prompt(
                output_type,
                &ChunkContext {
                    repo_name: &self.repo_name,
                    part: chunk.index + 1,
                    total,
                    chunk_text: &chunk.text,
                    rolling_summary: &rendered,
                },
            );

            let outcome = match with_retry(&self.retry, ApiError::is_transient, || {
                self.generator.generate(&prompt)
            })
            .await
            {
                Ok(text) => {
                    summary.absorb(&text);
                    ChunkOutcome::Success { text }
                }
                Err(e) if e.is_fatal() => {
                    error!("Aborting analysis of {} at chunk {}: {}", self.repo_name, chunk.index + 1, e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Chunk {}/{} could not be analyzed: {}", chunk.index + 1, total, e);
                    ChunkOutcome::Failed { reason: e.to_string() }
                }
            };

            results.push(AnalysisResult { chunk_index: chunk.index, outcome });
            if let Some(report_progress) = progress {
                report_progress(results.len(), total);
            }
        }

        Ok(results)
    }
}
