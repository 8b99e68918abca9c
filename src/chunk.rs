//! Recursive character text splitter.
//!
//! Splits record text into [`Chunk`]s of at most `chunk_size` characters,
//! preferring paragraph breaks, then line breaks, then spaces, and finally
//! cutting between arbitrary characters. Adjacent pieces are merged back up
//! to `chunk_size`, carrying up to `chunk_overlap` characters from the end
//! of one chunk into the start of the next.
//!
//! Lengths are measured in `char`s, not bytes.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Record};

/// Separators tried in order; `""` means "between any two characters".
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split one text into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    /// Split every record, tagging each chunk with its record's source.
    pub fn split_records(&self, records: &[Record]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for record in records {
            for (i, text) in self.split_text(&record.text).into_iter().enumerate() {
                chunks.push(Chunk {
                    text,
                    source: record.source.clone(),
                    chunk_index: i as i64,
                });
            }
        }
        tracing::info!(count = chunks.len(), "split documents into chunks");
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text.
        let mut separator = separators[separators.len() - 1];
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits = split_keeping_separator(text, separator);

        let mut final_chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }
        final_chunks
    }

    /// Greedily pack pieces into chunks. Pieces already carry their
    /// separators, so they are joined with nothing in between.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_trimmed(&current) {
                    docs.push(doc);
                }
                // Drop from the front until what is left fits as overlap
                // and leaves room for the incoming piece.
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_trimmed(&current) {
            docs.push(doc);
        }
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

/// Chunk records with the configured size and overlap.
pub fn chunk_records(records: &[Record], config: &ChunkingConfig) -> Vec<Chunk> {
    TextSplitter::from_config(config).split_records(records)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(pieces: &std::collections::VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. Empty pieces are dropped. `""` splits into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, text: &str) -> Record {
        Record {
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = TextSplitter::default().split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(TextSplitter::default().split_text("").is_empty());
        assert!(TextSplitter::default().split_text(" \n\n ").is_empty());
    }

    #[test]
    fn separator_kept_at_start_of_next_piece() {
        assert_eq!(
            split_keeping_separator("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
        assert_eq!(split_keeping_separator("héj", ""), vec!["h", "é", "j"]);
    }

    #[test]
    fn hard_cut_overlap_is_exact() {
        let text: String = (0..2500).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = TextSplitter::new(1000, 200).split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &text[0..1000]);
        assert_eq!(chunks[1], &text[800..1800]);
        assert_eq!(chunks[2], &text[1600..2500]);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 200).collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn chunks_never_exceed_size_for_prose() {
        let text = (0..400)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::new(1000, 200);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 1000, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn word_overlap_is_bounded_and_present() {
        let text = (0..300)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = TextSplitter::new(100, 20).split_text(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word));
            let first_word = pair[1].split(' ').next().unwrap();
            let pos = pair[0].find(first_word).unwrap();
            assert!(pair[0].chars().count() - pos <= 20);
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para_a = "a".repeat(600);
        let para_b = "b".repeat(600);
        let text = format!("{}\n\n{}", para_a, para_b);
        let chunks = TextSplitter::new(1000, 200).split_text(&text);
        assert_eq!(chunks, vec![para_a, para_b]);
    }

    #[test]
    fn multibyte_text_counted_in_chars() {
        let text = "é".repeat(1500);
        let chunks = TextSplitter::new(1000, 200).split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 700);
    }

    #[test]
    fn split_records_preserves_source_and_indices() {
        let records = vec![
            record("one.txt", &"x".repeat(2500)),
            record("two.md", "tiny"),
        ];
        let chunks = chunk_records(&records, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 4);
        for (i, c) in chunks.iter().take(3).enumerate() {
            assert_eq!(c.source, "one.txt");
            assert_eq!(c.chunk_index, i as i64);
        }
        assert_eq!(chunks[3].source, "two.md");
        assert_eq!(chunks[3].chunk_index, 0);
        assert_eq!(chunks[3].text, "tiny");
    }

    #[test]
    fn overlap_clamped_below_size() {
        let splitter = TextSplitter::new(10, 50);
        let chunks = splitter.split_text(&"z".repeat(35));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks.len() >= 4);
    }
}
