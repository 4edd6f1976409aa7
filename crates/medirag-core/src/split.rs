//! Recursive, separator-prioritized text splitter.
//!
//! Splits text into windows of at most `chunk_size` characters with
//! `chunk_overlap` characters shared between consecutive windows.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from the priority list (paragraph, line,
//!    sentence, word, character) that occurs in the text.
//! 2. Split on it, keeping the separator attached to the end of each piece.
//! 3. Pieces shorter than `chunk_size` are greedily merged into windows;
//!    when a window is flushed, pieces are dropped from its front until at
//!    most `chunk_overlap` characters remain, and those seed the next window.
//! 4. Pieces that are still too long are split recursively with the
//!    remaining, finer separators.
//!
//! Because separators are kept and merged pieces are adjacent, every window
//! is a contiguous substring of the input (before trimming).
//!
//! Lengths are measured in Unicode scalar values, not bytes.

use std::collections::VecDeque;

use anyhow::{bail, Result};

/// Separators tried in order: paragraph, line, sentence, word, character.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", " ", ""];

/// A recursive character splitter with a fixed size and overlap.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter using [`DEFAULT_SEPARATORS`].
    ///
    /// # Errors
    ///
    /// Fails if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator priority list.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty windows in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        let mut out = Vec::new();
        self.split_recursive(text, &separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut pending: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                self.merge(&pending, out);
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(out, piece);
            } else {
                self.split_recursive(piece, finer, out);
            }
        }
        if !pending.is_empty() {
            self.merge(&pending, out);
        }
    }

    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(out, &join(&window));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(out, &join(&window));
        }
    }
}

/// Split on `separator`, leaving it attached to the end of each piece.
/// An empty separator splits into single characters.
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
        let end = idx + separator.len();
        if end > start {
            pieces.push(&text[start..end]);
        }
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(piece, _)| *piece).collect()
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_params() {
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(100, 150).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_text_single_window() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        let out = splitter.split_text("  Hello, world!  ");
        assert_eq!(out, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let out = splitter.split_text(text);
        assert_eq!(out, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_windows_respect_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = (0..40)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let out = splitter.split_text(&text);
        assert!(out.len() > 1);
        for w in &out {
            assert!(char_len(w) <= 50, "window too long: {:?}", w);
        }
    }

    #[test]
    fn test_windows_are_substrings() {
        let splitter = TextSplitter::new(40, 8).unwrap();
        let text = "Alpha beta gamma. Delta epsilon zeta.\nEta theta iota kappa.\n\nLambda mu nu xi omicron pi rho sigma tau.";
        for w in splitter.split_text(text) {
            assert!(text.contains(&w), "not a substring: {:?}", w);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let splitter = TextSplitter::new(20, 10).unwrap();
        let text = "one two three four five six seven eight nine ten";
        let out = splitter.split_text(text);
        assert!(out.len() > 1);
        for pair in out.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        let out = splitter.split_text("abcdefghij");
        assert_eq!(out, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_multibyte_utf8() {
        let splitter = TextSplitter::new(3, 0).unwrap();
        let out = splitter.split_text("┌──────┐");
        assert_eq!(out.concat(), "┌──────┐");
        for w in &out {
            assert!(char_len(w) <= 3);
        }
    }

    #[test]
    fn test_custom_separators() {
        let splitter = TextSplitter::new(10, 0)
            .unwrap()
            .with_separators(["|", ""]);
        let out = splitter.split_text("aaaa|bbbb|cccc");
        assert_eq!(out, vec!["aaaa|bbbb|", "cccc"]);
    }
}
