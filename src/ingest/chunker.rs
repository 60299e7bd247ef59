//! Text chunker
//!
//! Splits extracted document text into retrieval-sized segments: recursive
//! descent over paragraph, line, sentence and word boundaries, greedy
//! packing up to `max_size` characters, then a merge pass that folds
//! undersized chunks into a neighbor (forward first, backward if the
//! forward merge would overflow, rebalanced at a word boundary when
//! neither side has room).
//!
//! Invariant: every emitted chunk's length is within
//! `[min_size, max_size]`, except the single chunk of a document shorter
//! than `min_size`, which is kept as-is. In-order concatenation of chunk
//! texts reconstructs the input modulo whitespace normalization; the only
//! exception is a token so long that no word boundary satisfies the
//! length window, which has to be split at a character boundary.

use crate::config::ChunkerConfig;
use crate::types::Chunk;

/// Boundary preference, coarsest first. Word boundaries are the implicit
/// final level.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". "];

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let max = self.config.max_size;
        let min = self.config.min_size;

        if text.trim().is_empty() {
            return Vec::new();
        }

        let segments = split_to_fit(text, max, 0);
        let packed = pack(segments, max);
        let merged = merge_undersized(packed, min, max);

        let mut chunks = Vec::with_capacity(merged.len());
        let mut prev_tail = String::new();
        for (index, text) in merged.into_iter().enumerate() {
            let embed_text = if index > 0 && !prev_tail.is_empty() {
                format!("{prev_tail} {text}")
            } else {
                text.clone()
            };
            prev_tail = tail_by_words(&text, self.config.overlap);
            chunks.push(Chunk {
                index,
                text,
                embed_text,
            });
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursive split: try the coarsest separator that actually divides the
/// text, push pieces that fit, recurse into pieces that don't.
fn split_to_fit(text: &str, max: usize, level: usize) -> Vec<String> {
    if char_len(text) <= max {
        return vec![text.to_string()];
    }

    if level < SEPARATORS.len() {
        let sep = SEPARATORS[level];
        let parts: Vec<&str> = text.split_inclusive(sep).collect();
        if parts.len() <= 1 {
            return split_to_fit(text, max, level + 1);
        }
        let mut out = Vec::new();
        for part in parts {
            if char_len(part) <= max {
                out.push(part.to_string());
            } else {
                out.extend(split_to_fit(part, max, level + 1));
            }
        }
        return out;
    }

    split_words(text, max)
}

/// Word-level packing for text no separator could divide.
fn split_words(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();

    for word in text.split_whitespace() {
        let word_len = char_len(word);
        if word_len > max {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            out.extend(hard_split(word, max));
            continue;
        }

        let needed = if cur.is_empty() {
            word_len
        } else {
            char_len(&cur) + 1 + word_len
        };
        if needed > max {
            out.push(std::mem::take(&mut cur));
            cur = word.to_string();
        } else {
            if !cur.is_empty() {
                cur.push(' ');
            }
            cur.push_str(word);
        }
    }

    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Last resort for a single word longer than `max`.
fn hard_split(word: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Greedy packing of adjacent segments up to `max`. Segments out of
/// `split_inclusive` still carry their separators, so plain concatenation
/// is exact; a single space is inserted only between word-level pieces.
fn pack(segments: Vec<String>, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for seg in segments {
        if seg.trim().is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if joined_len(last, &seg) <= max => {
                join_into(last, &seg);
            }
            _ => out.push(seg),
        }
    }

    out.into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn needs_space(a: &str, b: &str) -> bool {
    !a.ends_with(char::is_whitespace) && !b.starts_with(char::is_whitespace)
}

fn joined_len(a: &str, b: &str) -> usize {
    char_len(a) + char_len(b) + usize::from(needs_space(a, b))
}

fn join_into(a: &mut String, b: &str) {
    if needs_space(a, b) {
        a.push(' ');
    }
    a.push_str(b);
}

fn join(a: &str, b: &str) -> String {
    let mut out = a.to_string();
    join_into(&mut out, b);
    out
}

/// Fold undersized chunks into a neighbor. Forward merge is preferred;
/// backward when forward would overflow; when neither side has room the
/// chunk is rebalanced with its neighbor at the word boundary nearest the
/// combined midpoint, which keeps both halves inside the window as long
/// as `2 * min <= max` (enforced by config validation).
fn merge_undersized(mut chunks: Vec<String>, min: usize, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chunks.len() {
        let cur = std::mem::take(&mut chunks[i]);
        let cur_len = char_len(&cur);

        if cur_len >= min {
            out.push(cur);
            i += 1;
            continue;
        }

        let forward_fits =
            i + 1 < chunks.len() && cur_len + 1 + char_len(&chunks[i + 1]) <= max;
        if forward_fits {
            chunks[i + 1] = join(&cur, &chunks[i + 1]);
            i += 1;
            continue;
        }

        let backward_fits = out
            .last()
            .map(|prev| char_len(prev) + 1 + cur_len <= max)
            .unwrap_or(false);
        if backward_fits {
            let prev = out.pop().expect("checked non-empty");
            out.push(join(&prev, &cur));
            i += 1;
            continue;
        }

        if i + 1 < chunks.len() {
            // Neither neighbor has room: split the combined text evenly
            let next = std::mem::take(&mut chunks[i + 1]);
            let (a, b) = split_balanced(&join(&cur, &next), min, max);
            out.push(a);
            chunks[i + 1] = b;
            i += 1;
            continue;
        }

        if let Some(prev) = out.pop() {
            // Trailing undersized chunk with a full predecessor
            let (a, b) = split_balanced(&join(&prev, &cur), min, max);
            out.push(a);
            out.push(b);
        } else {
            // Whole document shorter than min: keep the remainder as-is
            out.push(cur);
        }
        i += 1;
    }

    out
}

/// Split at the whitespace nearest the midpoint, accepted only when both
/// halves land inside `[min, max]`. A long unbroken token (dotted
/// leaders, table rows in OCR output) can push every word boundary far
/// from the midpoint; then the text is cut at the exact midpoint instead,
/// which keeps the length window at the cost of splitting that token.
fn split_balanced(text: &str, min: usize, max: usize) -> (String, String) {
    let chars: Vec<char> = text.chars().collect();
    let mid = chars.len() / 2;

    let mut best: Option<usize> = None;
    for (i, c) in chars.iter().enumerate() {
        if c.is_whitespace() {
            let better = match best {
                Some(b) => (i as i64 - mid as i64).abs() < (b as i64 - mid as i64).abs(),
                None => true,
            };
            if better {
                best = Some(i);
            }
        }
    }

    if let Some(ws) = best {
        let a: String = chars[..ws].iter().collect::<String>().trim().to_string();
        let b: String = chars[ws..].iter().collect::<String>().trim().to_string();
        let (len_a, len_b) = (char_len(&a), char_len(&b));
        if (min..=max).contains(&len_a) && (min..=max).contains(&len_b) {
            return (a, b);
        }
    }

    // The combined text exceeds max, so midpoint halves stay above min
    // whenever 2 * min <= max holds
    let a: String = chars[..mid].iter().collect();
    let b: String = chars[mid..].iter().collect();
    (a.trim().to_string(), b.trim().to_string())
}

/// Last `overlap` characters of a chunk, snapped forward to a word
/// boundary so the carried context starts on a whole word.
fn tail_by_words(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= overlap {
        return text.trim().to_string();
    }
    let window: String = chars[chars.len() - overlap..].iter().collect();
    match window.find(char::is_whitespace) {
        Some(pos) => window[pos..].trim().to_string(),
        None => window.trim().to_string(),
    }
}
