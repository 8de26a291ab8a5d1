use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::config::Limits;
use crate::error::{AnalyzerError, Result};

/// Version-control metadata directories, always skipped
const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg", ".bzr"];

/// Extensions of files that are never source text
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "svg", "ico", "tif", "tiff", "webp",
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx",
    "zip", "tar", "gz", "tgz", "bz2", "xz", "rar", "7z", "jar", "war",
    "exe", "dll", "so", "dylib", "a", "o", "obj", "class", "pyc", "pyo", "wasm",
    "mp3", "mp4", "avi", "mov", "wav", "flac", "ogg", "webm",
    "db", "sqlite", "sqlite3",
    "ttf", "otf", "woff", "woff2", "eot",
    "bin", "dat", "pickle", "pkl", "npy", "npz", "parquet",
];

/// Extensions of prose documentation
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "txt", "adoc"];

/// File stems that mark documentation whatever the extension
const DOC_STEMS: &[&str] = &[
    "readme", "license", "licence", "copying", "contributing",
    "changelog", "authors", "notice",
];

const LICENSE_PREFIXES: &[&str] = &["license", "licence", "copying"];

/// Bytes inspected by the binary heuristic
const SNIFF_LEN: usize = 8 * 1024;

/// One eligible source file, read fully into memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the collection root, `/`-separated
    pub relative_path: String,
    /// Decoded file text
    pub content: String,
    /// Size on disk
    pub size_bytes: u64,
}

/// Knobs of the corpus walk
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Files larger than this are skipped
    pub max_file_bytes: u64,
    /// Directory names skipped in addition to VCS metadata
    pub ignored_dirs: Vec<String>,
}

impl From<&Limits> for CollectorConfig {
    fn from(limits: &Limits) -> Self {
        Self {
            max_file_bytes: limits.max_file_bytes,
            ignored_dirs: limits.ignored_dirs.clone(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::from(&Limits::default())
    }
}

enum Verdict {
    Keep(SourceFile),
    Skip(&'static str),
}

/// Collects the eligible source files under `root` in a reproducible order
///
/// Entries are visited in file-name order inside every directory. Unreadable
/// files are skipped; only a missing root or an empty result is an error.
pub fn collect(root: &Path, config: &CollectorConfig) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(AnalyzerError::Collection(format!(
            "Source directory does not exist: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e, config));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_else(|| "unknown path".into());
                warn!("Skipping unreadable entry {}: {}", path, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match inspect_file(root, entry.path(), config) {
            Ok(Verdict::Keep(file)) => files.push(file),
            Ok(Verdict::Skip(reason)) => debug!("Skipping {} file: {}", reason, entry.path().display()),
            Err(e) => warn!("Skipping unreadable file {}: {}", entry.path().display(), e),
        }
    }

    if files.is_empty() {
        return Err(AnalyzerError::Collection(format!(
            "No eligible source files found in {}",
            root.display()
        )));
    }

    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    info!("Collected {} source files ({} bytes) from {}", files.len(), total, root.display());
    Ok(files)
}

fn is_ignored_dir(entry: &DirEntry, config: &CollectorConfig) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    VCS_DIRS.contains(&name.as_ref()) || config.ignored_dirs.iter().any(|d| *d == name)
}

fn inspect_file(root: &Path, path: &Path, config: &CollectorConfig) -> std::io::Result<Verdict> {
    if is_binary_extension(path) {
        return Ok(Verdict::Skip("binary"));
    }
    if is_documentation_file(path) {
        info!("Skipping documentation file: {}", path.display());
        return Ok(Verdict::Skip("documentation"));
    }

    let size_bytes = fs::metadata(path)?.len();
    if size_bytes > config.max_file_bytes {
        warn!(
            "File too large ({:.2} MB), skipping: {}",
            size_bytes as f64 / 1024.0 / 1024.0,
            path.display()
        );
        return Ok(Verdict::Skip("oversized"));
    }

    let bytes = fs::read(path)?;
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if content_inspector::inspect(sample).is_binary() {
        return Ok(Verdict::Skip("binary"));
    }

    Ok(Verdict::Keep(SourceFile {
        relative_path: relative_path(root, path),
        content: decode(bytes),
        size_bytes,
    }))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Whether the extension marks a non-text file
pub fn is_binary_extension(path: &Path) -> bool {
    extension_of(path).map_or(false, |ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the file is prose documentation rather than code
pub fn is_documentation_file(path: &Path) -> bool {
    if extension_of(path).map_or(false, |ext| DOC_EXTENSIONS.contains(&ext.as_str())) {
        return true;
    }
    let is_doc_stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .map_or(false, |stem| DOC_STEMS.contains(&stem.as_str()));
    is_doc_stem || is_license_name(path)
}

/// `LICENSE-MIT`, `COPYING.LESSER`, `LICENCE_APACHE` and the like
fn is_license_name(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    LICENSE_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix).map_or(false, |rest| match rest.chars().next() {
            None | Some('-') | Some('.') => true,
            // `license_check.rs` is code
            Some('_') => path.extension().is_none(),
            _ => false,
        })
    })
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    rel.to_string_lossy().replace('\\', "/")
}

/// UTF-8 first, Latin-1 otherwise; every byte maps to a char so this never fails
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[test]
    fn test_collects_in_lexical_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/b.rs", b"fn b() {}\n");
        write(dir.path(), "src/a.rs", b"fn a() {}\n");
        write(dir.path(), "Cargo.toml", b"[package]\n");
        write(dir.path(), "build.py", b"print('x')\n");

        let files = collect(dir.path(), &CollectorConfig::default()).unwrap();
        assert_eq!(paths(&files), vec!["Cargo.toml", "build.py", "src/a.rs", "src/b.rs"]);
        assert_eq!(files[2].content, "fn a() {}\n");
        assert_eq!(files[2].size_bytes, 10);
    }

    #[test]
    fn test_excludes_vcs_docs_binaries_and_ignored_dirs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".git/config", b"[core]\n");
        write(dir.path(), "README.md", b"# Title\n");
        write(dir.path(), "LICENSE", b"MIT\n");
        write(dir.path(), "LICENSE-APACHE", b"Apache License\n");
        write(dir.path(), "notes.txt", b"todo\n");
        write(dir.path(), "logo.png", b"not really a png");
        write(dir.path(), "blob.data", b"abc\0\0\0def");
        write(dir.path(), "node_modules/dep/index.js", b"module.exports = 1;\n");
        write(dir.path(), "main.go", b"package main\n");

        let files = collect(dir.path(), &CollectorConfig::default()).unwrap();
        assert_eq!(paths(&files), vec!["main.go"]);
    }

    #[test]
    fn test_skips_files_above_size_ceiling() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "big.js", &vec![b'x'; 2048]);
        write(dir.path(), "small.js", b"let a = 1;\n");

        let config = CollectorConfig { max_file_bytes: 1024, ..CollectorConfig::default() };
        let files = collect(dir.path(), &config).unwrap();
        assert_eq!(paths(&files), vec!["small.js"]);
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "legacy.c", b"/* caf\xe9 */\n");

        let files = collect(dir.path(), &CollectorConfig::default()).unwrap();
        assert_eq!(files[0].content, "/* caf\u{e9} */\n");
    }

    #[test]
    fn test_missing_root_is_collection_error() {
        let dir = TempDir::new().unwrap();
        let result = collect(&dir.path().join("absent"), &CollectorConfig::default());
        assert!(matches!(result, Err(AnalyzerError::Collection(_))));
    }

    #[test]
    fn test_only_documentation_is_collection_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", b"# Docs only\n");
        write(dir.path(), "docs/guide.rst", b"Guide\n=====\n");

        let result = collect(dir.path(), &CollectorConfig::default());
        assert!(matches!(result, Err(AnalyzerError::Collection(_))));
    }

    #[test]
    fn test_documentation_detection() {
        assert!(is_documentation_file(Path::new("docs/CHANGELOG")));
        assert!(is_documentation_file(Path::new("readme.rst")));
        assert!(is_documentation_file(Path::new("LICENSE-MIT.txt")));
        assert!(is_documentation_file(Path::new("LICENSE-MIT")));
        assert!(is_documentation_file(Path::new("LICENSE-APACHE")));
        assert!(is_documentation_file(Path::new("licence_bsd")));
        assert!(is_documentation_file(Path::new("COPYING.LESSER")));
        assert!(!is_documentation_file(Path::new("src/license_check.rs")));
        assert!(!is_documentation_file(Path::new("src/licenses.rs")));
        assert!(!is_documentation_file(Path::new("main.py")));
    }
}
