#![doc = include_str!("../README.md")]
#![warn(clippy::all)]

//! reposcribe - AI-written reports for source repositories
//!
//! A repository is cloned, its source files are collected and split into
//! bounded chunks, each chunk is sent to a Gemini model in order, and the
//! answers are merged into one Markdown report: an analysis, a README or a
//! development roadmap.
//!
//! ## Usage
//! ```rust,no_run
//! use reposcribe::{AnalysisRequest, Config, OutputType, ReportPipeline};
//!
//! async fn example() -> reposcribe::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = ReportPipeline::gemini(config);
//!     let generator = pipeline.generator_for("my-api-key")?;
//!     let request = AnalysisRequest {
//!         repo_url: "https://github.com/owner/repo".into(),
//!         output_type: OutputType::Readme,
//!         generate_pdf: false,
//!     };
//!     let outcome = pipeline.analyze_repository(&request, generator, &|p: reposcribe::Progress| println!("{}", p)).await?;
//!     println!("{}", outcome.report_path.display());
//!     Ok(())
//! }
//! ```

/// Report assembly from per-chunk answers
pub mod aggregator;
/// Sequential per-chunk model calls
pub mod analyzer;
/// Job management behind the web interface
pub mod api;
/// Follow-up questions about a finished report
pub mod chat;
/// Splitting the corpus into bounded chunks
pub mod chunker;
/// Source file discovery
pub mod collector;
/// Configuration module for the application
pub mod config;
/// Error handling types and utilities
pub mod error;
/// Gemini client and the text-generation seam
pub mod gemini;
/// Job records, registry and worker pool
pub mod jobs;
/// Logging configuration and utilities
pub mod logging;
/// End-to-end report runs
pub mod pipeline;
/// Prompt templates
pub mod prompts;
/// Rate limiting functionality to respect API limits
pub mod rate_limiter;
/// PDF export
pub mod render;
/// Output types, reports and the Markdown sink
pub mod report;
/// Repository URLs and cloning
pub mod repository;
/// Scripted doubles for tests
pub mod test_utils;
/// Utilities (retry helpers)
pub mod utils;
/// HTTP routes
pub mod web;

// Re-export common types
pub use config::Config;
pub use error::{AnalyzerError, ApiError, Result};
pub use gemini::{GeminiClient, GeminiFactory, GeneratorFactory, TextGenerator};
pub use pipeline::{AnalysisOutcome, AnalysisRequest, Progress, ReportPipeline};
pub use report::{OutputType, Report};
