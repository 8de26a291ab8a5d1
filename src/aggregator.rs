//! Recombines per-chunk responses into one report
//!
//! Analysis and guidance responses are merged section by section, so a
//! heading the model repeats in every chunk appears once in the report.
//! README drafts go through one more model call that writes the final file.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};

use crate::analyzer::{AnalysisResult, ChunkOutcome};
use crate::error::{ApiError, Result};
use crate::gemini::TextGenerator;
use crate::prompts;
use crate::report::{OutputType, Report};
use crate::utils::{with_retry, RetryPolicy};

/// Title of every guidance document
pub const GUIDANCE_HEADING: &str = "## ✅ Next Steps to Complete and Deploy the Project";

/// Heading of the trailing section that lists the parts the model could not cover
pub const COVERAGE_HEADING: &str = "## Analysis Coverage";

/// Canonical analysis sections, in report order, with the headings that map onto them
const ANALYSIS_ORDER: &[(&str, &[&str])] = &[
    ("introduction", &["introduction", "overview", "project overview"]),
    ("idea", &["idea", "problem statement", "problem statement idea", "purpose", "goal"]),
    ("features", &["features", "key features"]),
    ("implementation", &["implementation", "how it works", "architecture", "implementation overview"]),
    ("tech stack", &["tech stack", "tech stack used", "technology stack", "technologies"]),
    ("conclusion", &["conclusion", "summary"]),
];

/// A `##`-level block of Markdown; `title` is `None` for text before the first heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: Option<String>,
    pub body: String,
}

/// Splits Markdown on `##` headings, ignoring headings inside code fences
pub fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section { title: None, body: String::new() };
    let mut in_fence = false;

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(title) = trimmed.strip_prefix("## ") {
                let finished = std::mem::replace(
                    &mut current,
                    Section { title: Some(title.trim().to_string()), body: String::new() },
                );
                if finished.title.is_some() || !finished.body.trim().is_empty() {
                    sections.push(finished);
                }
                continue;
            }
        }
        current.body.push_str(line);
        current.body.push('\n');
    }

    if current.title.is_some() || !current.body.trim().is_empty() {
        sections.push(current);
    }
    sections
}

/// Comparison key of a heading
///
/// Case, numbering, emphasis, emoji and surrounding punctuation are ignored,
/// so "1. **Introduction**" and "📘 introduction:" compare equal.
pub fn normalize_heading(title: &str) -> String {
    let core = title
        .trim_start_matches(|c: char| !c.is_alphabetic())
        .trim_end_matches(|c: char| !c.is_alphanumeric());
    core.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn canonical_rank(key: &str) -> Option<usize> {
    ANALYSIS_ORDER
        .iter()
        .position(|(_, aliases)| aliases.contains(&key))
}

#[derive(Debug)]
struct MergedSection {
    title: Option<String>,
    bodies: Vec<String>,
}

/// Merges sections with equal normalized headings, keeping first-seen order
fn merge_sections<'a>(responses: impl Iterator<Item = &'a str>, output_type: OutputType) -> Vec<(String, MergedSection)> {
    let mut merged: Vec<(String, MergedSection)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for response in responses {
        for section in split_sections(response) {
            let mut key = section.title.as_deref().map(normalize_heading).unwrap_or_default();
            if output_type == OutputType::Analysis {
                if let Some(rank) = canonical_rank(&key) {
                    key = ANALYSIS_ORDER[rank].0.to_string();
                }
            }
            // The guidance heading is ours; its body joins the untitled preamble.
            let title = if output_type == OutputType::Guidance && key == normalize_heading(GUIDANCE_HEADING) {
                key.clear();
                None
            } else {
                section.title
            };

            let body = strip_top_level_headings(&section.body);
            let position = match index.get(&key) {
                Some(&i) => i,
                None => {
                    index.insert(key.clone(), merged.len());
                    merged.push((key, MergedSection { title: title.clone(), bodies: Vec::new() }));
                    merged.len() - 1
                }
            };
            let slot = &mut merged[position].1;
            if body.trim().is_empty() {
                continue;
            }
            if slot.bodies.is_empty() {
                slot.title = title.or(slot.title.take());
            }
            slot.bodies.push(body.trim().to_string());
        }
    }
    merged
}

/// Drops `# ` title lines outside code fences
fn strip_top_level_headings(body: &str) -> String {
    let mut in_fence = false;
    body.lines()
        .filter(|l| {
            let trimmed = l.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                return true;
            }
            in_fence || !trimmed.starts_with("# ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the final report from the chunk results
pub struct Aggregator {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    repo_name: String,
}

impl Aggregator {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy, repo_name: impl Into<String>) -> Self {
        Self {
            generator,
            retry,
            repo_name: repo_name.into(),
        }
    }

    pub async fn aggregate(&self, results: &[AnalysisResult], output_type: OutputType) -> Result<Report> {
        let (coverage, mut warnings) = coverage_notes(results);
        let successes: Vec<&str> = results.iter().filter_map(AnalysisResult::text).collect();

        let body = match output_type {
            OutputType::Analysis | OutputType::Guidance => self.merge(&successes, output_type),
            OutputType::Readme => self.synthesize_readme(&successes, &mut warnings).await?,
        };

        let mut markdown = body.trim_end().to_string();
        if let Some(coverage) = coverage {
            markdown.push_str("\n\n");
            markdown.push_str(&coverage);
        }
        markdown.push('\n');

        info!(
            "Aggregated {} of {} parts into the {} of {}",
            successes.len(),
            results.len(),
            output_type.human_name().to_lowercase(),
            self.repo_name
        );
        Ok(Report::new(output_type, markdown, warnings))
    }

    fn merge(&self, responses: &[&str], output_type: OutputType) -> String {
        let mut merged = merge_sections(responses.iter().copied(), output_type);
        if output_type == OutputType::Analysis {
            // Preamble first, canonical sections next, the rest in first-seen order.
            merged.sort_by_key(|(key, _)| match canonical_rank(key) {
                _ if key.is_empty() => 0,
                Some(rank) => 1 + rank,
                None => 1 + ANALYSIS_ORDER.len(),
            });
        }

        let mut out = match output_type {
            OutputType::Guidance => format!("# {}: Development Guidance\n\n{}\n", self.repo_name, GUIDANCE_HEADING),
            _ => format!("# {}: Analysis Report\n", self.repo_name),
        };
        for (_, section) in merged {
            if section.bodies.is_empty() {
                continue;
            }
            out.push('\n');
            if let Some(title) = &section.title {
                out.push_str(&format!("## {}\n\n", title));
            }
            out.push_str(&section.bodies.join("\n\n"));
            out.push('\n');
        }
        out
    }

    async fn synthesize_readme(&self, drafts: &[&str], warnings: &mut Vec<String>) -> Result<String> {
        if drafts.is_empty() {
            return Ok(format!("# {}\n", self.repo_name));
        }

        let prompt = prompts::readme_synthesis_prompt(&self.repo_name, drafts);
        match with_retry(&self.retry, ApiError::is_transient, || self.generator.generate(&prompt)).await {
            Ok(readme) => Ok(readme),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!("README synthesis failed for {}: {}", self.repo_name, e);
                warnings.push(format!("README synthesis failed ({}); the per-part drafts are shown instead", e));
                Ok(format!(
                    "# {}\n\n> **Warning:** README synthesis failed ({}). The drafts written for each part follow.\n\n{}\n",
                    self.repo_name,
                    e,
                    drafts.iter().map(|d| d.trim()).collect::<Vec<_>>().join("\n\n---\n\n")
                ))
            }
        }
    }
}

fn coverage_notes(results: &[AnalysisResult]) -> (Option<String>, Vec<String>) {
    let total = results.len();
    let mut lines = Vec::new();
    let mut warnings = Vec::new();

    for (position, result) in results.iter().enumerate() {
        if let ChunkOutcome::Failed { reason } = &result.outcome {
            let note = format!("part {} of {} could not be analyzed ({}).", position + 1, total, reason);
            lines.push(format!("> **Section unavailable:** {}", note));
            warnings.push(note);
        }
    }

    if lines.is_empty() {
        (None, warnings)
    } else {
        (Some(format!("{}\n\n{}\n", COVERAGE_HEADING, lines.join("\n>\n"))), warnings)
    }
}
