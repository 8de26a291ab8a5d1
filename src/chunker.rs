use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::collector::SourceFile;

/// A bounded slice of the corpus, sent to the model in one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the corpus
    pub index: usize,
    pub text: String,
    /// Rough token estimate, four characters per token
    pub approx_token_count: usize,
}

impl Chunk {
    fn new(index: usize, text: String) -> Self {
        let chars = text.chars().count();
        Self {
            index,
            text,
            approx_token_count: (chars + 3) / 4,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Header line that introduces a file inside the corpus
pub fn file_header(relative_path: &str) -> String {
    format!("=== File: {} ===\n", relative_path)
}

/// Concatenates the files, in order, each introduced by its header line
pub fn build_corpus(files: &[SourceFile]) -> String {
    let capacity = files
        .iter()
        .map(|f| f.content.len() + f.relative_path.len() + 16)
        .sum();
    let mut corpus = String::with_capacity(capacity);
    for file in files {
        corpus.push_str(&file_header(&file.relative_path));
        corpus.push_str(&file.content);
        if !file.content.ends_with('\n') {
            corpus.push('\n');
        }
    }
    corpus
}

/// Splits the files into chunks of at most `max_chunk_chars` characters
pub fn chunk(files: &[SourceFile], max_chunk_chars: usize) -> Vec<Chunk> {
    let chunks = chunk_text(&build_corpus(files), max_chunk_chars);
    info!(
        "Split {} files into {} chunks (max {} chars each)",
        files.len(),
        chunks.len(),
        max_chunk_chars
    );
    chunks
}

/// Splits `text` on line boundaries, greedily filling each chunk
///
/// A single line longer than the limit becomes a chunk of its own and is
/// never cut. Concatenating the chunk texts gives back `text` exactly.
pub fn chunk_text(text: &str, max_chunk_chars: usize) -> Vec<Chunk> {
    let limit = max_chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if current_chars > 0 && current_chars + line_chars > limit {
            chunks.push(Chunk::new(chunks.len(), std::mem::take(&mut current)));
            current_chars = 0;
        }

        if line_chars > limit {
            debug!(
                "Line of {} chars exceeds the chunk limit of {}, keeping it whole in chunk {}",
                line_chars,
                limit,
                chunks.len()
            );
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.is_empty() {
        chunks.push(Chunk::new(chunks.len(), current));
    }
    chunks
}
