//! Text normalization applied to extracted pages before chunking.
//!
//! PDF extraction leaves behind hard line wraps, numeric citation markers,
//! URLs and bullet glyphs. None of them help an embedding model, so the
//! default [`ReferenceCleaner`] strips them and collapses whitespace.

use regex::Regex;

/// A text normalization strategy.
///
/// The ingestion pipeline takes the cleaner as a parameter, so swapping
/// the cleaning policy never requires touching a loader.
pub trait Cleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Removes citation markers (`[12]`), URLs and bullets, then collapses
/// all whitespace runs into single spaces.
pub struct ReferenceCleaner {
    citations: Regex,
    urls: Regex,
    whitespace: Regex,
}

impl ReferenceCleaner {
    pub fn new() -> Self {
        Self {
            citations: Regex::new(r"\[\d+\]").expect("static regex"),
            urls: Regex::new(r"http\S+").expect("static regex"),
            whitespace: Regex::new(r"\s+").expect("static regex"),
        }
    }
}

impl Default for ReferenceCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for ReferenceCleaner {
    fn clean(&self, text: &str) -> String {
        let text = self.citations.replace_all(text, "");
        let text = self.urls.replace_all(&text, "");
        let text = text.replace('•', "");
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace() {
        let cleaner = ReferenceCleaner::new();
        assert_eq!(
            cleaner.clean("  Heart\n\nrate \t is   high  "),
            "Heart rate is high"
        );
    }

    #[test]
    fn test_strips_citations_and_urls() {
        let cleaner = ReferenceCleaner::new();
        let out = cleaner.clean("Aspirin reduces risk [3] see https://example.org/x for more [12].");
        assert_eq!(out, "Aspirin reduces risk see for more .");
    }

    #[test]
    fn test_strips_bullets() {
        let cleaner = ReferenceCleaner::new();
        assert_eq!(cleaner.clean("• first\n• second"), "first second");
    }

    #[test]
    fn test_keeps_non_numeric_brackets() {
        let cleaner = ReferenceCleaner::new();
        assert_eq!(cleaner.clean("dose [mg] per day"), "dose [mg] per day");
    }

    #[test]
    fn test_empty_input() {
        let cleaner = ReferenceCleaner::new();
        assert_eq!(cleaner.clean(" \n\t "), "");
    }
}
