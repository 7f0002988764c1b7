use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Rough token estimate: ~1.3 tokens per whitespace-separated word
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * 1.3) as usize
}

/// Immutable unit of source text. Entities and relationships point back to
/// chunks by `chunk_id`; they never own them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub offset: (usize, usize), // [start, end) byte positions in the document
}

impl Chunk {
    pub fn new(
        doc_id: String,
        text: String,
        source: String,
        offset: (usize, usize),
    ) -> Self {
        let chunk_id = content_id(&text);

        Self {
            doc_id,
            chunk_id,
            text,
            source,
            offset,
        }
    }

    /// Wrap a caller-supplied text as a single chunk, unmodified.
    pub fn from_text(text: &str) -> Self {
        let id = content_id(text);
        Self {
            doc_id: id.clone(),
            chunk_id: id,
            text: text.to_string(),
            source: "inline".to_string(),
            offset: (0, text.len()),
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Stable id derived from content only, so re-ingesting the same text maps
/// onto the same chunk node.
pub fn content_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16]) // first 16 bytes (32 hex chars)
}
