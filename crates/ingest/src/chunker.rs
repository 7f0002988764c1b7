use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::{estimate_tokens, Chunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub target_tokens_max: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens_max: 900,
            overlap_tokens: 100,
        }
    }
}

/// Byte span of a paragraph, heading section start or sentence.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
    heading: bool,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document into chunks whose text is an exact slice of the input.
    ///
    /// Documents under the token budget come back as a single chunk holding
    /// the whole text. Longer ones are packed paragraph by paragraph, always
    /// breaking before a markdown heading, with trailing paragraphs repeated
    /// at the start of the next chunk as overlap.
    pub fn chunk_text(&self, doc_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if estimate_tokens(text) <= self.config.target_tokens_max {
            return vec![Chunk::new(
                doc_id.to_string(),
                text.to_string(),
                source.to_string(),
                (0, text.len()),
            )];
        }

        let mut units = Vec::new();
        for block in split_blocks(text) {
            if estimate_tokens(&text[block.start..block.end]) > self.config.target_tokens_max {
                units.extend(split_sentences(text, block));
            } else {
                units.push(block);
            }
        }

        let mut chunks = Vec::new();
        let mut current: Vec<Block> = Vec::new();
        let mut current_tokens = 0;

        for block in units {
            let block_tokens = estimate_tokens(&text[block.start..block.end]);
            let overflow = current_tokens + block_tokens > self.config.target_tokens_max;

            if !current.is_empty() && (block.heading || overflow) {
                chunks.push(self.make_chunk(doc_id, text, source, &current));
                current = if block.heading {
                    Vec::new()
                } else {
                    self.overlap_tail(text, &current)
                };
                current_tokens = current
                    .iter()
                    .map(|b| estimate_tokens(&text[b.start..b.end]))
                    .sum();
            }

            current.push(block);
            current_tokens += block_tokens;
        }

        if !current.is_empty() {
            chunks.push(self.make_chunk(doc_id, text, source, &current));
        }

        chunks
    }

    fn make_chunk(&self, doc_id: &str, text: &str, source: &str, blocks: &[Block]) -> Chunk {
        let start = blocks[0].start;
        let end = blocks[blocks.len() - 1].end;
        let body = text[start..end].trim_end();

        Chunk::new(
            doc_id.to_string(),
            body.to_string(),
            source.to_string(),
            (start, start + body.len()),
        )
    }

    /// Trailing blocks to repeat in the next chunk. Never the whole chunk,
    /// otherwise packing would not advance.
    fn overlap_tail(&self, text: &str, blocks: &[Block]) -> Vec<Block> {
        let mut tail = Vec::new();
        let mut tokens = 0;

        for block in blocks.iter().rev() {
            if tail.len() + 1 >= blocks.len() {
                break;
            }
            let block_tokens = estimate_tokens(&text[block.start..block.end]);
            if tokens + block_tokens > self.config.overlap_tokens {
                break;
            }
            tokens += block_tokens;
            tail.push(*block);
        }

        tail.reverse();
        tail
    }
}

/// Paragraph spans separated by blank lines; a markdown heading line always
/// opens a new block.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut open: Option<Block> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();

        if line.trim().is_empty() {
            if let Some(block) = open.take() {
                blocks.push(Block { end: line_start, ..block });
            }
            continue;
        }

        let heading = line.trim_start().starts_with('#');
        if heading {
            if let Some(block) = open.take() {
                blocks.push(Block { end: line_start, ..block });
            }
        }

        if open.is_none() {
            open = Some(Block {
                start: line_start,
                end: line_start,
                heading,
            });
        }
    }

    if let Some(block) = open {
        blocks.push(Block { end: pos, ..block });
    }

    blocks
}

fn split_sentences(text: &str, block: Block) -> Vec<Block> {
    text[block.start..block.end]
        .split_sentence_bound_indices()
        .filter(|(_, sentence)| !sentence.trim().is_empty())
        .enumerate()
        .map(|(i, (offset, sentence))| Block {
            start: block.start + offset,
            end: block.start + offset + sentence.len(),
            heading: block.heading && i == 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, words: usize) -> String {
        vec![word; words].join(" ")
    }

    #[test]
    fn test_short_text_is_one_exact_chunk() {
        let chunker = Chunker::new(ChunkerConfig::default());
        let text = "This is a test paragraph.\n\nThis is another paragraph.";
        let chunks = chunker.chunk_text("test-doc", text, "test.txt");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_id, "test-doc");
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunker = Chunker::new(ChunkerConfig::default());
        assert!(chunker.chunk_text("doc", "  \n\n ", "x").is_empty());
    }

    #[test]
    fn test_long_text_splits_on_paragraphs_with_overlap() {
        let chunker = Chunker::new(ChunkerConfig {
            target_tokens_max: 30,
            overlap_tokens: 10,
        });
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph("alpha", 15),
            paragraph("beta", 6),
            paragraph("gamma", 15),
        );
        let chunks = chunker.chunk_text("doc", &text, "doc.md");

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(&text[chunk.offset.0..chunk.offset.1], chunk.text);
        }
        // the short beta paragraph is repeated as overlap
        assert!(chunks[0].text.contains("beta"));
        assert!(chunks[1].text.starts_with("beta"));
        assert!(chunks[1].text.contains("gamma"));
    }

    #[test]
    fn test_heading_starts_new_chunk() {
        let chunker = Chunker::new(ChunkerConfig {
            target_tokens_max: 20,
            overlap_tokens: 0,
        });
        let text = format!(
            "# One\n{}\n\n# Two\n{}",
            paragraph("first", 10),
            paragraph("second", 10)
        );
        let chunks = chunker.chunk_text("doc", &text, "doc.md");

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("# One"));
        assert!(chunks[1].text.starts_with("# Two"));
    }
}
