//! Overlapping word-window chunking.

/// Default chunk size in words.
pub const DEFAULT_CHUNK_SIZE: usize = 300;

/// Default overlap between consecutive chunks, in words.
pub const DEFAULT_OVERLAP: usize = 50;

/// Split `text` into overlapping chunks of `size` words with `overlap`
/// words shared between consecutive chunks.
///
/// Whitespace-only chunks are dropped. When `overlap >= size` the overlap
/// is clamped so the window always advances.
#[must_use]
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        let chunk = words[start..end].join(" ");
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}
