pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::{content_id, estimate_tokens, Chunk};
pub use chunker::{Chunker, ChunkerConfig};
pub use reader::FileReader;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Chunk caller-supplied texts, one document per text.
pub fn chunk_texts(texts: &[String], config: ChunkerConfig) -> Vec<Chunk> {
    let chunker = Chunker::new(config);
    texts
        .iter()
        .flat_map(|text| chunker.chunk_text(&content_id(text), text, "inline"))
        .collect()
}

/// Read and chunk a single file
pub async fn ingest_file(file_path: &Path, config: ChunkerConfig) -> Result<Vec<Chunk>> {
    let content = FileReader::read_file(file_path).await?;
    let path_str = file_path.to_string_lossy().to_string();
    let doc_id = generate_doc_id(&path_str);

    let chunker = Chunker::new(config);
    Ok(chunker.chunk_text(&doc_id, &content, &path_str))
}

/// Read and chunk every supported file below a directory
pub async fn ingest_directory(dir_path: &Path, config: ChunkerConfig) -> Result<Vec<Chunk>> {
    let files = FileReader::read_directory(dir_path).await?;
    let chunker = Chunker::new(config);

    let mut all_chunks = Vec::new();
    for (path, content) in files {
        let doc_id = generate_doc_id(&path);
        all_chunks.extend(chunker.chunk_text(&doc_id, &content, &path));
    }

    Ok(all_chunks)
}
