//! Paragraph-boundary text chunker with word-aligned overlap.
//!
//! Splits extracted document text into bounded chunks for embedding. Chunk
//! length is measured in characters (Unicode scalar values), never bytes,
//! so multi-byte text is never cut mid-character.
//!
//! # Algorithm
//!
//! 1. Normalize line endings and split on newlines into paragraphs,
//!    dropping blank ones.
//! 2. Accumulate paragraphs into a buffer while
//!    `len(buffer) + 1 + len(paragraph) <= max_chars`.
//! 3. On overflow, flush the buffer and seed the next one with an overlap
//!    tail: the last `overlap_chars` characters of the flushed chunk, moved
//!    forward to the next word boundary. Leading tail words are dropped if
//!    the seeded chunk would exceed `max_chars`.
//! 4. A paragraph longer than `max_chars` is packed sentence by sentence;
//!    a sentence longer than `max_chars` is hard-split at character
//!    boundaries with no overlap.
//! 5. Flush whatever remains.
//!
//! # Example
//!
//! ```rust
//! use tender_match_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Scope of work.\n\nEligibility criteria.", 500, 80);
//! assert_eq!(chunks.len(), 1);
//! assert!(chunks[0].starts_with("Scope of work."));
//! ```

use serde_json::Value;

/// Split text into ordered chunks of at most `max_chars` characters.
///
/// # Guarantees
///
/// - Returns an empty vector for blank input or `max_chars == 0`.
/// - No chunk is empty or whitespace-only.
/// - Every chunk is at most `max_chars` characters long.
/// - Pure: the same input always yields the same chunks.
///
/// `overlap_chars >= max_chars` is accepted; it only produces heavily
/// overlapping chunks.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in normalized.split('\n').map(str::trim) {
        if para.is_empty() {
            continue;
        }
        let para_len = char_len(para);

        if para_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut pieces = split_oversized(para, max_chars);
            // The last piece stays open so following paragraphs can join it.
            if let Some(last) = pieces.pop() {
                chunks.extend(pieces);
                current = last;
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(para);
            continue;
        }

        if char_len(&current) + 1 + para_len <= max_chars {
            current.push('\n');
            current.push_str(para);
            continue;
        }

        let room = max_chars.saturating_sub(para_len + 1);
        let tail = fit_tail(overlap_tail(&current, overlap_chars), room).to_string();
        chunks.push(std::mem::take(&mut current));
        if !tail.is_empty() {
            current.push_str(&tail);
            current.push('\n');
        }
        current.push_str(para);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Join document text with the text content of its tables.
///
/// Each table contributes its own `text` field when it has one; otherwise
/// its non-blank string-valued cells are used. Bare strings are taken as
/// is, and any other value contributes nothing. Table text lands on its own
/// lines, so the chunker treats it exactly like prose paragraphs.
pub fn combine_text_and_tables(text: &str, tables: &[Value]) -> String {
    let mut parts: Vec<String> = vec![text.to_string()];
    for table in tables {
        parts.extend(table_text(table));
    }
    parts.join("\n").trim().to_string()
}

fn table_text(table: &Value) -> Vec<String> {
    match table {
        Value::Object(map) => match map.get("text") {
            Some(Value::String(s)) => vec![s.clone()],
            _ => map
                .values()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        },
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `overlap_chars` characters of `chunk`, moved forward so the tail
/// never starts mid-word.
fn overlap_tail(chunk: &str, overlap_chars: usize) -> &str {
    if overlap_chars == 0 {
        return "";
    }
    let total = char_len(chunk);
    if overlap_chars >= total {
        return chunk.trim();
    }

    let start = chunk
        .char_indices()
        .nth(total - overlap_chars)
        .map(|(i, _)| i)
        .unwrap_or(chunk.len());
    let tail = &chunk[start..];

    let at_word_start = chunk[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    if at_word_start {
        return tail.trim();
    }

    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim(),
        None => "",
    }
}

/// Drop leading words from `tail` until it fits in `room` characters.
fn fit_tail(tail: &str, room: usize) -> &str {
    let mut tail = tail;
    while char_len(tail) > room {
        match tail.find(char::is_whitespace) {
            Some(pos) => tail = tail[pos..].trim_start(),
            None => return "",
        }
    }
    tail
}

/// Pack an oversized paragraph into sentence-aligned pieces.
fn split_oversized(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(para) {
        let len = char_len(sentence);
        if len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.extend(hard_split(sentence, max_chars));
        } else if current.is_empty() {
            current.push_str(sentence);
        } else if char_len(&current) + 1 + len <= max_chars {
            current.push(' ');
            current.push_str(sentence);
        } else {
            pieces.push(std::mem::take(&mut current));
            current.push_str(sentence);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Split on `.`, `!` or `?` followed by whitespace. The punctuation stays
/// with its sentence.
fn split_sentences(para: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = para.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    let sentence = para[start..end].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = end;
                }
            }
        }
    }

    let rest = para[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}
