//! Overlapping-window text chunker.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `chunk_size` characters
//! where consecutive chunks share exactly `overlap` characters. Each chunk
//! receives a deterministic UUIDv5 derived from its source URL and index,
//! plus a SHA-256 hash of its text for embedding cache lookups.
//!
//! # Algorithm
//!
//! 1. Start a window at `start`; its hard end is `start + chunk_size`.
//! 2. If the hard end is inside the text, look backwards through the second
//!    half of the window for a break point, preferring a paragraph mark
//!    (`\n\n`), then a sentence end (`.`/`!`/`?` + whitespace), then any
//!    whitespace. Fall back to the hard end.
//! 3. Emit `text[start..end]`; the next window starts at `end - overlap`.
//! 4. Stop once a window reaches the end of the text.
//!
//! The break point is never at or before `start + overlap`, so every window
//! advances. Chunk text is not trimmed, which keeps the overlap exact and
//! the concatenation of chunks (minus overlaps) equal to the document.
//!
//! `overlap < chunk_size` is validated when the configuration is loaded.
//!
//! # Example
//!
//! ```rust
//! use oran_nephio_rag::chunk::split_text;
//!
//! let windows = split_text("Alpha beta gamma delta.", 12, 4);
//! assert_eq!(windows[0], "Alpha beta ");
//! assert!(windows[1].starts_with("eta "));
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, ChunkMetadata, Document};

/// Split `document` into overlapping chunks.
///
/// # Guarantees
///
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - Same document and parameters ⇒ same chunk boundaries and ids.
/// - Empty content ⇒ no chunks.
pub fn split(document: &Document, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    split_text(&document.content, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document, i as i64, text))
        .collect()
}

/// Split raw text into overlapping windows (sizes in characters).
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut windows = Vec::new();

    if len == 0 || chunk_size == 0 {
        return windows;
    }

    let mut start = 0usize;
    loop {
        let hard_end = (start + chunk_size).min(len);
        let end = if hard_end < len {
            let min_end = start + (chunk_size / 2).max(overlap + 1);
            find_break(&chars, min_end.min(hard_end), hard_end)
        } else {
            hard_end
        };

        windows.push(chars[start..end].iter().collect());

        if end >= len {
            break;
        }
        start = end - overlap;
    }

    windows
}

/// Best break position in `[min_end, hard_end]`, or `hard_end`.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    let candidates = || (min_end.max(2)..=hard_end).rev();

    // paragraph mark: break right after "\n\n"
    if let Some(i) = candidates().find(|&i| chars[i - 1] == '\n' && chars[i - 2] == '\n') {
        return i;
    }
    // sentence end: break after the punctuation and its whitespace
    if let Some(i) = candidates().find(|&i| {
        i < hard_end
            && matches!(chars[i - 1], '.' | '!' | '?')
            && chars[i].is_whitespace()
    }) {
        return i + 1;
    }
    // any whitespace: break after it
    if let Some(i) = candidates().find(|&i| chars[i - 1].is_whitespace()) {
        return i;
    }
    hard_end
}

/// Deterministic chunk id for `(source_url, chunk_index)`.
pub fn chunk_id(source_url: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}#{}", source_url, index).as_bytes(),
    )
    .to_string()
}

/// SHA-256 of chunk text, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document: &Document, index: i64, text: String) -> Chunk {
    Chunk {
        id: chunk_id(&document.metadata.source_url, index),
        hash: hash_text(&text),
        text,
        metadata: ChunkMetadata {
            document: document.metadata.clone(),
            chunk_index: index,
        },
    }
}
