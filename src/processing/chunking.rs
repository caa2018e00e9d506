//! Character-window chunking with sentence snapping and overlap.
//!
//! Sizes are counted in characters (Unicode scalar values), never bytes, so multi-byte text
//! gets the same budget as ASCII. Offsets on [`Chunk`] are byte offsets that always land on
//! character boundaries, which keeps `&text[chunk.start..chunk.end]` valid.
//!
//! - Short input (`chars <= max_chunk_size`) is returned as a single chunk.
//! - Each window ends at the nearest sentence terminal (`.`, `!`, `?`, newline) within the
//!   last [`SENTENCE_SEARCH_WINDOW`] characters, or at the raw boundary when there is none.
//! - The next window starts `overlap` characters before the previous end; the overlap is
//!   clamped so every window starts strictly after the previous one.

use super::types::{Chunk, ChunkingError};
use std::iter;

/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// How far back from a window boundary to look for a sentence terminal.
pub const SENTENCE_SEARCH_WINDOW: usize = 500;

/// Split `text` into ordered, overlapping chunks of at most `max_chunk_size` characters.
///
/// Returns an empty vector for empty or whitespace-only text. The function is pure: the same
/// input always yields the same chunks.
pub fn split(
    text: &str,
    max_chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk<'_>>, ChunkingError> {
    if max_chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every character, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    if total <= max_chunk_size {
        return Ok(vec![Chunk {
            index: 0,
            start: 0,
            end: text.len(),
            text,
        }]);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::with_capacity(total / max_chunk_size + 1);
    let mut start = 0usize;

    loop {
        let mut end = (start + max_chunk_size).min(total);
        if end < total {
            end = snap_to_sentence(&chars, start, end);
        }

        let (byte_start, byte_end) = (offsets[start], offsets[end]);
        chunks.push(Chunk {
            index: chunks.len(),
            start: byte_start,
            end: byte_end,
            text: &text[byte_start..byte_end],
        });

        if end >= total {
            break;
        }
        let step_back = overlap.min(end - start - 1);
        start = end - step_back;
    }

    tracing::debug!(
        chars = total,
        chunks = chunks.len(),
        max_chunk_size,
        overlap,
        "Split document into chunks"
    );
    Ok(chunks)
}

/// Drop whitespace-only chunks and renumber the rest from zero.
///
/// Windows made only of padding carry nothing to summarize; they are removed before the map
/// phase so they never surface as failed sections.
pub fn non_blank(chunks: Vec<Chunk<'_>>) -> Vec<Chunk<'_>> {
    chunks
        .into_iter()
        .filter(|chunk| !chunk.text.trim().is_empty())
        .enumerate()
        .map(|(index, chunk)| Chunk { index, ..chunk })
        .collect()
}

/// Move `end` back to just after the closest sentence terminal, if one is near enough.
fn snap_to_sentence(chars: &[char], start: usize, end: usize) -> usize {
    let floor = end.saturating_sub(SENTENCE_SEARCH_WINDOW).max(start + 1);
    (floor..end)
        .rev()
        .find(|&position| is_sentence_terminal(chars[position]))
        .map_or(end, |position| position + 1)
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}
