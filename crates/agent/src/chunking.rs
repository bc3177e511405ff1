//! Splitting long replies into transport-sized chunks.
//!
//! Lengths are measured in characters. Cuts prefer the last boundary token
//! (normally `"\n"`) that keeps the chunk within the limit; the boundary
//! itself starts the next chunk, so concatenating the chunks yields the
//! input exactly. Where no usable boundary exists the text is cut hard at
//! the limit.

/// Discord's message length limit.
pub const DEFAULT_CHUNK_LIMIT: usize = 2000;

/// Preferred cut point.
pub const LINE_BOUNDARY: &str = "\n";

/// Split `text` into chunks of at most `max_len` characters.
///
/// A `max_len` of zero is treated as one.
pub fn split(text: &str, max_len: usize, boundary: &str) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let cut = cut_index(rest, max_len, boundary);
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    chunks
}

/// Byte index at which to cut the front chunk off `text`. Always > 0 for
/// non-empty `text`.
fn cut_index(text: &str, max_len: usize, boundary: &str) -> usize {
    let hard_cut = byte_offset(text, max_len);
    if hard_cut == text.len() {
        return text.len();
    }
    if boundary.is_empty() {
        return hard_cut;
    }

    // Look a little past the limit so a run of boundaries straddling it is
    // seen whole.
    let lookahead = max_len + 2 * boundary.chars().count();
    let mut window = &text[..byte_offset(text, lookahead)];

    loop {
        let Some(pos) = window.rfind(boundary) else {
            return hard_cut;
        };
        window = &window[..pos];

        // Cut before a whole run of boundaries, never inside it.
        while window.ends_with(boundary) {
            window = &window[..window.len() - boundary.len()];
        }

        let cut = window.len();
        if cut == 0 {
            return hard_cut;
        }
        if cut <= hard_cut {
            return cut;
        }
    }
}

/// Byte offset of the `n`th character, or the string length.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(idx, _)| idx)
}
