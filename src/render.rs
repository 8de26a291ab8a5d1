use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use pulldown_cmark::{html, Options, Parser};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::PdfSettings;
use crate::error::{AnalyzerError, Result};

const STYLESHEET: &str = r#"
body { font-family: Arial, sans-serif; line-height: 1.6; max-width: 900px; margin: 0 auto; padding: 20px; }
h1, h2, h3 { color: #333; }
code { background-color: #f4f4f4; padding: 2px 5px; border-radius: 3px; font-family: monospace; }
pre { background-color: #f4f4f4; padding: 15px; border-radius: 5px; overflow-x: auto; }
pre code { background-color: transparent; padding: 0; }
blockquote { border-left: 4px solid #ddd; padding-left: 15px; color: #666; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 8px; }
th { background-color: #f4f4f4; }
tr:nth-child(even) { background-color: #f9f9f9; }
"#;

/// Converts Markdown to an HTML fragment
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Wraps Markdown in a complete, styled HTML document
pub fn styled_document(title: &str, markdown: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        title,
        STYLESHEET,
        markdown_to_html(markdown)
    )
}

/// Renders Markdown reports to PDF through `wkhtmltopdf`
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer {
    program: Option<PathBuf>,
}

impl PdfRenderer {
    pub fn new(settings: &PdfSettings) -> Self {
        Self { program: settings.wkhtmltopdf_path.clone() }
    }

    /// The configured executable, or `wkhtmltopdf` found on `PATH`
    pub fn locate(&self) -> Result<PathBuf> {
        match &self.program {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(AnalyzerError::Render(format!(
                "wkhtmltopdf not found at {}",
                path.display()
            ))),
            None => which::which("wkhtmltopdf")
                .map_err(|e| AnalyzerError::Render(format!("wkhtmltopdf not found on PATH: {}", e))),
        }
    }

    /// Writes `<report>.pdf` next to the Markdown file and returns its path
    pub async fn render(&self, markdown_path: &Path) -> Result<PathBuf> {
        let program = self.locate()?;
        let markdown = tokio::fs::read_to_string(markdown_path).await?;
        let title = markdown_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Repository Analysis".to_string());
        let document = styled_document(&title, &markdown);
        let pdf_path = markdown_path.with_extension("pdf");

        debug!("Running {} for {}", program.display(), pdf_path.display());
        let mut child = Command::new(&program)
            .args(["--quiet", "--encoding", "utf-8", "-"])
            .arg(&pdf_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AnalyzerError::Render(format!("Failed to start {}: {}", program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(document.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(AnalyzerError::Render(format!(
                "wkhtmltopdf exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("PDF report saved to {}", pdf_path.display());
        Ok(pdf_path)
    }
}
