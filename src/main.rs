use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use reposcribe::{
    config::resolve_api_key,
    logging,
    repository::{repo_name_from_url, validate_repo_url},
    AnalysisRequest, AnalyzerError, Config, OutputType, Progress, ReportPipeline, Result,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// GitHub repository URL to analyze
    repo_url: String,

    /// Kind of report to generate
    #[arg(short = 't', long = "type", value_enum, default_value_t = OutputType::Analysis)]
    output_type: OutputType,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gemini API key (defaults to GEMINI_API_KEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Also export the report as PDF (needs wkhtmltopdf)
    #[arg(long)]
    pdf: bool,

    /// Maximum characters per chunk sent to the model
    #[arg(long)]
    max_chunk_chars: Option<usize>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "[ERROR]".bright_red(), e.to_string().bright_red());
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    logging::init(&cli.log_level)?;
    validate_repo_url(&cli.repo_url)?;

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            reposcribe::config::EnvOverrides::from_env().apply(&mut config);
            config
        }
        None => Config::load()?,
    };
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(max_chunk_chars) = cli.max_chunk_chars {
        config.limits.max_chunk_chars = max_chunk_chars;
    }

    let api_key = resolve_api_key(cli.api_key.as_deref(), &config).ok_or_else(|| {
        AnalyzerError::Config("No Gemini API key given: pass --api-key or set GEMINI_API_KEY".into())
    })?;
    config.validate().await?;

    let pipeline = ReportPipeline::gemini(config);
    let generator = pipeline.generator_for(&api_key)?;
    let request = AnalysisRequest {
        repo_url: cli.repo_url.trim().to_string(),
        output_type: cli.output_type,
        generate_pdf: cli.pdf,
    };

    println!(
        "{} {} ({})",
        "Analyzing:".bright_green(),
        repo_name_from_url(&request.repo_url).bright_white(),
        request.output_type.human_name().bright_cyan()
    );

    let pb = create_progress_bar();
    let spinner = pb.clone();
    let sink = move |progress: Progress| spinner.set_message(progress.to_string());
    let result = pipeline.analyze_repository(&request, generator, &sink).await;
    pb.finish_and_clear();
    let outcome = result?;

    println!(
        "{} {}",
        "[SUCCESS]".bright_green(),
        format!("{} generated for {}", outcome.report.output_type.human_name(), outcome.repo_name).bright_white()
    );
    for warning in &outcome.report.warnings {
        println!("{} {}", "[WARNING]".bright_yellow(), warning.yellow());
    }
    println!(
        "{} {}",
        "[SAVED]".bright_blue(),
        outcome.report_path.display().to_string().bright_white()
    );
    if let Some(pdf) = &outcome.pdf_path {
        println!("{} {}", "[SAVED]".bright_blue(), pdf.display().to_string().bright_white());
    } else if let Some(reason) = &outcome.pdf_error {
        println!("{} {}", "[WARNING]".bright_yellow(), format!("PDF not created: {}", reason).yellow());
    }

    Ok(())
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["-", "\\", "|", "/", "-", "\\", "|", "/"]);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
