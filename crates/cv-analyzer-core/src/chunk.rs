//! Overlapping fixed-size text chunker.
//!
//! Splits extracted document text into windows of roughly `size` characters
//! that overlap their predecessor by `overlap` characters, so a phrase cut by
//! one window boundary appears whole in the neighbouring window.
//!
//! # Algorithm
//!
//! 1. Collapse every run of whitespace to a single space and trim the ends.
//! 2. Take a window of at most `size` characters starting at `start`.
//! 3. If the window would end inside a word, shorten it to the last space in
//!    the window. A window with no interior space is hard-split at `size`.
//! 4. Emit the trimmed window. Stop once the window reached the end of text.
//! 5. Start the next window `overlap` characters before the current end. If
//!    that would not move past the current start, begin at the current end.
//!
//! Sizes are measured in `char`s, so multi-byte text is never split inside
//! a code point.
//!
//! # Example
//!
//! ```rust
//! use cv_analyzer_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Senior   Rust\n\nengineer", 400, 100);
//! assert_eq!(chunks, vec!["Senior Rust engineer".to_string()]);
//! ```

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Collapse all whitespace runs to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping windows.
///
/// # Guarantees
///
/// - Returns no chunks for empty/whitespace-only text or `size == 0`.
/// - Text no longer than `size` (after normalization) yields exactly one
///   chunk equal to the normalized text.
/// - Always terminates, including when `overlap >= size`.
/// - The final remainder is always emitted; no trailing text is dropped.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() || size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = window_end(&chars, start, size);

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// End (exclusive) of the window beginning at `start`, pulled back to a word
/// boundary when the hard limit lands inside a word.
fn window_end(chars: &[char], start: usize, size: usize) -> usize {
    let hard_end = (start + size).min(chars.len());
    if hard_end >= chars.len() {
        return hard_end;
    }

    let splits_word = chars[hard_end] != ' ' && chars[hard_end - 1] != ' ';
    if !splits_word {
        return hard_end;
    }

    // Search strictly after `start` so the window is never empty.
    chars[start + 1..hard_end]
        .iter()
        .rposition(|c| *c == ' ')
        .map(|pos| start + 1 + pos)
        .unwrap_or(hard_end)
}
