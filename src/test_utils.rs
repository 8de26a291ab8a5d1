//! Test doubles for the remote API and the clone step
//!
//! Public so the integration tests under `tests/` can drive the pipeline,
//! the job manager and the web routes without network access.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AnalyzerError, ApiError, Result};
use crate::gemini::{GeneratorFactory, TextGenerator};
use crate::repository::{FetchedRepository, RepositoryFetcher};

/// Reply given once the script has run out
pub const DEFAULT_REPLY: &str = "## Introduction\nScripted reply.";

/// A generator that replays a fixed list of results and records every prompt
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<String, ApiError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fallback: String,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<std::result::Result<String, ApiError>>) -> Self {
        Self::with_fallback(script, DEFAULT_REPLY)
    }

    pub fn with_fallback(script: Vec<std::result::Result<String, ApiError>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fallback: fallback.to_string(),
        }
    }

    /// Always answers with `reply`
    pub fn always(reply: &str) -> Self {
        Self::with_fallback(Vec::new(), reply)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Hands out the same generator for every key and remembers the keys
#[derive(Debug)]
pub struct ScriptedFactory {
    generator: Arc<ScriptedGenerator>,
    keys: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    pub fn new(generator: Arc<ScriptedGenerator>) -> Self {
        Self { generator, keys: Mutex::new(Vec::new()) }
    }

    pub fn generator(&self) -> &Arc<ScriptedGenerator> {
        &self.generator
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

impl GeneratorFactory for ScriptedFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn TextGenerator>> {
        if api_key.trim().is_empty() {
            return Err(AnalyzerError::Config("Gemini API key is empty".into()));
        }
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(api_key.to_string());
        }
        Ok(self.generator.clone())
    }
}

/// Serves one local directory for every repository URL
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl RepositoryFetcher for LocalFetcher {
    async fn fetch(&self, _repo_url: &str) -> Result<FetchedRepository> {
        if !self.root.is_dir() {
            return Err(AnalyzerError::Clone(format!("No such directory: {}", self.root.display())));
        }
        Ok(FetchedRepository::existing(&self.root))
    }
}

/// Writes a small multi-language source tree under `root`
pub fn write_sample_tree(root: &std::path::Path) -> std::io::Result<()> {
    let files: &[(&str, &str)] = &[
        ("README.md", "# Sample\n\nNot sent to the model.\n"),
        ("Cargo.toml", "[package]\nname = \"sample\"\nversion = \"0.1.0\"\n"),
        ("src/main.rs", "fn main() {\n    println!(\"hello\");\n}\n"),
        ("src/lib.rs", "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"),
        ("web/app.py", "from flask import Flask\napp = Flask(__name__)\n"),
    ];
    for (path, content) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}
