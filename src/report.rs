use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyzerError, Result};

/// Kind of document produced for a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Structured technical analysis
    #[default]
    Analysis,
    /// Generated README file
    Readme,
    /// Next steps to complete and deploy the project
    Guidance,
}

impl OutputType {
    /// All output types, in menu order
    pub const ALL: [OutputType; 3] = [OutputType::Analysis, OutputType::Readme, OutputType::Guidance];

    /// Wire and CLI name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Readme => "readme",
            Self::Guidance => "guidance",
        }
    }

    /// Name shown to people in status lines and pages
    pub fn human_name(&self) -> &'static str {
        match self {
            Self::Analysis => "Analysis report",
            Self::Readme => "README file",
            Self::Guidance => "Development guidance",
        }
    }

    /// Suffix of the report file name
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Readme => "README",
            Self::Guidance => "guidance",
        }
    }

    /// Lenient parse used by the web form: unknown values mean `analysis`
    pub fn from_form_value(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            "readme" => Ok(Self::Readme),
            "guidance" => Ok(Self::Guidance),
            other => Err(AnalyzerError::Validation(format!(
                "Unknown output type '{}', expected analysis, readme or guidance",
                other
            ))),
        }
    }
}

/// The finished document of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub output_type: OutputType,
    pub markdown_text: String,
    pub created_at: DateTime<Utc>,
    /// One entry per degraded part of the report
    pub warnings: Vec<String>,
}

impl Report {
    pub fn new(output_type: OutputType, markdown_text: String, warnings: Vec<String>) -> Self {
        Self {
            output_type,
            markdown_text,
            created_at: Utc::now(),
            warnings,
        }
    }

    /// Whether some part of the corpus is missing from the report
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Writes reports as Markdown files below an output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<repo>_<suffix>.md`
    pub fn report_path(&self, repo_name: &str, output_type: OutputType) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.md", sanitize_file_stem(repo_name), output_type.file_suffix()))
    }

    /// Writes the Markdown file, creating the output directory when needed
    pub async fn write(&self, repo_name: &str, report: &Report) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.report_path(repo_name, report.output_type);
        tokio::fs::write(&path, report.markdown_text.as_bytes()).await?;
        info!("{} saved to {}", report.output_type.human_name(), path.display());
        Ok(path)
    }
}

/// Keeps file names portable; anything outside `[A-Za-z0-9._-]` becomes `_`
fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "repository".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("analysis", OutputType::Analysis ; "analysis")]
    #[test_case("README", OutputType::Readme ; "readme uppercase")]
    #[test_case(" guidance ", OutputType::Guidance ; "guidance padded")]
    fn test_parse_output_type(input: &str, expected: OutputType) {
        assert_eq!(input.parse::<OutputType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_output_type() {
        assert!(matches!("summary".parse::<OutputType>(), Err(AnalyzerError::Validation(_))));
        assert_eq!(OutputType::from_form_value("summary"), OutputType::Analysis);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&OutputType::Readme).unwrap();
        assert_eq!(json, "\"readme\"");
    }

    #[test]
    fn test_report_path_uses_suffix() {
        let writer = ReportWriter::new("/tmp/reports");
        assert_eq!(
            writer.report_path("my-repo", OutputType::Readme),
            PathBuf::from("/tmp/reports/my-repo_README.md")
        );
        assert_eq!(
            writer.report_path("../evil", OutputType::Analysis),
            PathBuf::from("/tmp/reports/.._evil_analysis.md")
        );
    }

    #[tokio::test]
    async fn test_write_creates_directory() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = ReportWriter::new(dir.path().join("nested/reports"));
        let report = Report::new(OutputType::Guidance, "## Next\n".to_string(), Vec::new());

        let path = writer.write("demo", &report).await?;
        assert_eq!(path.file_name().unwrap(), "demo_guidance.md");
        assert_eq!(std::fs::read_to_string(path)?, "## Next\n");
        assert!(!report.is_partial());
        Ok(())
    }
}
