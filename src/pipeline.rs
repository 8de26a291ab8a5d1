use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::aggregator::Aggregator;
use crate::analyzer::SequentialAnalyzer;
use crate::chunker;
use crate::collector::{self, CollectorConfig};
use crate::config::Config;
use crate::error::{AnalyzerError, Result};
use crate::gemini::{GeminiFactory, GeneratorFactory, TextGenerator};
use crate::render::PdfRenderer;
use crate::report::{OutputType, Report, ReportWriter};
use crate::repository::{repo_name_from_url, GitFetcher, RepositoryFetcher};

/// Stage a run has reached, reported to the caller as it goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Cloning,
    Collecting,
    Analyzing { completed: usize, total: usize },
    Aggregating,
    Writing,
    RenderingPdf,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloning => f.write_str("Cloning repository"),
            Self::Collecting => f.write_str("Collecting source files"),
            Self::Analyzing { completed, total } => write!(f, "Analyzed {} of {} parts", completed, total),
            Self::Aggregating => f.write_str("Assembling report"),
            Self::Writing => f.write_str("Saving report"),
            Self::RenderingPdf => f.write_str("Rendering PDF"),
        }
    }
}

/// Receives every progress update of a run
pub type ProgressSink<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// One report to produce
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub repo_url: String,
    pub output_type: OutputType,
    pub generate_pdf: bool,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub repo_name: String,
    pub report: Report,
    pub report_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
    /// Why the PDF is missing when one was requested
    pub pdf_error: Option<String>,
}

/// Clone, collect, chunk, analyze, aggregate and write
pub struct ReportPipeline {
    config: Arc<Config>,
    factory: Arc<dyn GeneratorFactory>,
    fetcher: Arc<dyn RepositoryFetcher>,
    writer: ReportWriter,
    renderer: PdfRenderer,
}

impl ReportPipeline {
    pub fn new(config: Config, factory: Arc<dyn GeneratorFactory>, fetcher: Arc<dyn RepositoryFetcher>) -> Self {
        let writer = ReportWriter::new(config.output_dir.clone());
        let renderer = PdfRenderer::new(&config.pdf);
        Self {
            config: Arc::new(config),
            factory,
            fetcher,
            writer,
            renderer,
        }
    }

    /// Pipeline backed by the Gemini API and `git`
    pub fn gemini(config: Config) -> Self {
        let factory = Arc::new(GeminiFactory::new(config.gemini.clone()));
        Self::new(config, factory, Arc::new(GitFetcher::new()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generator bound to `api_key`, shared by the run and its follow-up chat
    pub fn generator_for(&self, api_key: &str) -> Result<Arc<dyn TextGenerator>> {
        self.factory.create(api_key)
    }

    /// Builds a report from a local source tree
    pub async fn build_report(
        &self,
        root: &Path,
        repo_name: &str,
        output_type: OutputType,
        generator: Arc<dyn TextGenerator>,
        progress: ProgressSink<'_>,
    ) -> Result<Report> {
        progress(Progress::Collecting);
        let collector_config = CollectorConfig::from(&self.config.limits);
        let root_owned = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collector::collect(&root_owned, &collector_config))
            .await
            .map_err(|e| AnalyzerError::Collection(format!("File collection task failed: {}", e)))??;

        let chunks = chunker::chunk(&files, self.config.limits.max_chunk_chars);
        progress(Progress::Analyzing { completed: 0, total: chunks.len() });

        let retry = self.config.retry_policy();
        let analyzer = SequentialAnalyzer::new(
            generator.clone(),
            retry,
            self.config.limits.rolling_summary_chars,
            repo_name,
        );
        let on_chunk = |completed: usize, total: usize| progress(Progress::Analyzing { completed, total });
        let results = analyzer.analyze(&chunks, output_type, Some(&on_chunk)).await?;

        progress(Progress::Aggregating);
        Aggregator::new(generator, retry, repo_name)
            .aggregate(&results, output_type)
            .await
    }

    /// Full run for a repository URL
    pub async fn analyze_repository(
        &self,
        request: &AnalysisRequest,
        generator: Arc<dyn TextGenerator>,
        progress: ProgressSink<'_>,
    ) -> Result<AnalysisOutcome> {
        let repo_name = repo_name_from_url(&request.repo_url);
        info!("Starting {} of {}", request.output_type.human_name().to_lowercase(), repo_name);

        progress(Progress::Cloning);
        let checkout = self.fetcher.fetch(&request.repo_url).await?;
        let report = self
            .build_report(checkout.root(), &repo_name, request.output_type, generator, progress)
            .await?;
        drop(checkout);

        progress(Progress::Writing);
        let report_path = self.writer.write(&repo_name, &report).await?;

        let (pdf_path, pdf_error) = if request.generate_pdf {
            progress(Progress::RenderingPdf);
            match self.renderer.render(&report_path).await {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    warn!("PDF export failed for {}: {}", repo_name, e);
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        Ok(AnalysisOutcome {
            repo_name,
            report,
            report_path,
            pdf_path,
            pdf_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{write_sample_tree, LocalFetcher, ScriptedFactory, ScriptedGenerator};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn pipeline(source: &Path, output: &Path, generator: Arc<ScriptedGenerator>) -> ReportPipeline {
        let mut config = Config::new(output.to_path_buf());
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        ReportPipeline::new(
            config,
            Arc::new(ScriptedFactory::new(generator)),
            Arc::new(LocalFetcher::new(source)),
        )
    }

    #[tokio::test]
    async fn test_run_writes_report_and_reports_progress() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_sample_tree(source.path()).unwrap();

        let generator = Arc::new(ScriptedGenerator::always("## Features\n- greets the world"));
        let pipeline = pipeline(source.path(), output.path(), generator.clone());
        let request = AnalysisRequest {
            repo_url: "https://github.com/acme/sample.git".into(),
            output_type: OutputType::Analysis,
            generate_pdf: false,
        };

        let seen = Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p);
        let outcome = pipeline
            .analyze_repository(&request, pipeline.generator_for("key").unwrap(), &sink)
            .await
            .unwrap();

        assert_eq!(outcome.repo_name, "sample");
        assert_eq!(outcome.report_path, output.path().join("sample_analysis.md"));
        let written = std::fs::read_to_string(&outcome.report_path).unwrap();
        assert!(written.starts_with("# sample: Analysis Report"));
        assert!(written.contains("greets the world"));
        assert!(outcome.pdf_path.is_none());

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("=== File: src/main.rs ==="));
        assert!(!prompts[0].contains("Not sent to the model"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&Progress::Cloning));
        assert!(seen.contains(&Progress::Analyzing { completed: 1, total: 1 }));
        assert_eq!(seen.last(), Some(&Progress::Writing));
    }

    #[tokio::test]
    async fn test_empty_tree_is_collection_error() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::write(source.path().join("README.md"), "# only docs\n").unwrap();

        let generator = Arc::new(ScriptedGenerator::always("unused"));
        let pipeline = pipeline(source.path(), output.path(), generator.clone());
        let err = pipeline
            .build_report(source.path(), "docs", OutputType::Readme, generator.clone(), &|_: Progress| {})
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyzerError::Collection(_)));
        assert_eq!(generator.call_count(), 0);
    }

    #[test]
    fn test_progress_messages() {
        assert_eq!(Progress::Analyzing { completed: 2, total: 5 }.to_string(), "Analyzed 2 of 5 parts");
        assert_eq!(Progress::Cloning.to_string(), "Cloning repository");
    }
}
