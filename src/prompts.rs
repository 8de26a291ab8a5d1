use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::report::OutputType;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z]+)\}").expect("valid placeholder pattern"));

/// Substitutes `{name}` placeholders in one pass
///
/// Inserted values are never scanned again, so braces in code or in a report
/// come through untouched. Unknown placeholders are left as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

/// Fields shared by every per-chunk prompt
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub repo_name: &'a str,
    /// 1-based position of the chunk
    pub part: usize,
    pub total: usize,
    pub chunk_text: &'a str,
    /// Notes about earlier chunks, empty for the first one
    pub rolling_summary: &'a str,
}

pub const ANALYSIS_CHUNK: &str = r#"You are a technical documentation expert analyzing the GitHub repository "{repo}".
This is part {part} of {total} of the repository's source code.
{summary}
Write Markdown using these `##` sections, covering only what this part of the code shows:

## Introduction
What the project is about.
## Idea
The problem it solves or the goal it pursues.
## Features
Key functionality and capabilities.
## Implementation
How it works internally: logic, components, workflow.
## Tech Stack
Languages, frameworks, libraries.
## Conclusion
Core functionality and value.

Omit a section when this part has nothing to say about it. Do not speculate beyond the code.

CODE:
```
{code}
```
"#;

pub const README_CHUNK: &str = r#"You are a README.md generator and a technical documentation expert for the GitHub repository "{repo}".
This is part {part} of {total} of the repository's source code.

Draft README material for this part of the code: what it does, the features it implements,
how it works, the tech stack it uses, and any setup steps (setup.py, package.json, Dockerfile, Cargo.toml...).
Only include information that is evident from the code. Use Markdown.

CODE:
```
{code}
```
"#;

pub const GUIDANCE_CHUNK: &str = r#"You are a senior software engineer and technical project architect reviewing the GitHub repository "{repo}".
This is part {part} of {total} of the repository's source code.
{summary}
Produce a prioritized Markdown checklist of what is needed to complete this project into a fully functional,
deployable application, based only on this part of the code. Identify missing components, incomplete features,
bugs or unhandled edge cases, and areas for cleanup.
Group tasks under `##` headings such as Frontend, Backend, Database, Authentication, Deployment, Testing.
Do not repeat what is already implemented unless it needs improvement.

CODE:
```
{code}
```
"#;

pub const README_SYNTHESIS: &str = r#"You are a README.md generator and a technical documentation expert. Below are {count} draft notes
written from consecutive parts of the GitHub repository "{repo}". Merge them into one professional README in Markdown with these sections:

# {repo}
## Introduction
## Problem Statement / Idea
## Features
## How It Works (Implementation Overview)
## Tech Stack
## Getting Started
Only when setup steps are evident from the drafts.
## Conclusion

Guidelines:
- Only include information that is evident from the drafts. Do not speculate.
- Remove repetition between drafts.
- Use proper Markdown formatting.

DRAFTS:
{drafts}
"#;

pub const CHAT: &str = r#"You answer questions about the GitHub repository "{repo}" using the report below.
If the report does not contain the answer, say so.

REPORT:
{report}
{history}
QUESTION:
{question}
"#;

/// Builds the per-chunk prompt for the output type
pub fn chunk_prompt(output_type: OutputType, ctx: &ChunkContext<'_>) -> String {
    let template = match output_type {
        OutputType::Analysis => ANALYSIS_CHUNK,
        OutputType::Readme => README_CHUNK,
        OutputType::Guidance => GUIDANCE_CHUNK,
    };
    let summary = if ctx.rolling_summary.trim().is_empty() {
        String::new()
    } else {
        format!("\nEarlier parts covered:\n{}\n", ctx.rolling_summary.trim_end())
    };

    let part = ctx.part.to_string();
    let total = ctx.total.to_string();
    fill(
        template,
        &[
            ("repo", ctx.repo_name),
            ("part", &part),
            ("total", &total),
            ("summary", &summary),
            ("code", ctx.chunk_text),
        ],
    )
}

/// Builds the prompt that merges README drafts into one document
pub fn readme_synthesis_prompt(repo_name: &str, drafts: &[&str]) -> String {
    let joined = drafts
        .iter()
        .enumerate()
        .map(|(i, d)| format!("--- Draft {} ---\n{}", i + 1, d.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let count = drafts.len().to_string();
    fill(README_SYNTHESIS, &[("count", &count), ("repo", repo_name), ("drafts", &joined)])
}

/// Builds a follow-up question prompt grounded in the report
pub fn chat_prompt(repo_name: &str, report: &str, history: &[(String, String)], question: &str) -> String {
    let history = if history.is_empty() {
        String::new()
    } else {
        let turns: String = history
            .iter()
            .map(|(q, a)| format!("Q: {}\nA: {}\n", q, a))
            .collect();
        format!("\nPREVIOUS QUESTIONS:\n{}", turns)
    };

    fill(
        CHAT,
        &[("repo", repo_name), ("report", report), ("history", &history), ("question", question)],
    )
}
