//! Core data models used throughout MediRAG.
//!
//! These types represent the source pages, fragments and conversation
//! turns that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Locator and provenance carried from a source page to every fragment
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Origin identifier (usually the file path the page was read from).
    pub source: String,
    /// 1-based page number within the origin.
    pub page: u32,
    /// Whether the page text went through a [`Cleaner`](crate::clean::Cleaner).
    pub cleaned: bool,
    /// Character count of the cleaned page text.
    pub char_count: usize,
}

impl SourceMetadata {
    /// Human-readable citation, e.g. `data/paper.pdf (p. 3)`.
    pub fn locator(&self) -> String {
        format!("{} (p. {})", self.source, self.page)
    }
}

/// One page (or other unit) of extracted text plus its locator.
///
/// Produced by a loader in the app crate; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: SourceMetadata,
}

impl SourceDocument {
    /// Build an uncleaned document; `char_count` is taken from `content`.
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        let content = content.into();
        let char_count = content.chars().count();
        Self {
            content,
            metadata: SourceMetadata {
                source: source.into(),
                page,
                cleaned: false,
                char_count,
            },
        }
    }

    /// Mark the document as having passed through a cleaner.
    pub fn cleaned(mut self) -> Self {
        self.metadata.cleaned = true;
        self
    }
}

/// Level of a fragment in the parent/child hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Large context window, returned to the generator.
    Parent,
    /// Small window cut from a parent, used for dense search.
    Child,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Parent => "parent",
            FragmentKind::Child => "child",
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic retrieval unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Globally unique UUID (v4), assigned by the chunker.
    pub id: String,
    pub kind: FragmentKind,
    pub content: String,
    /// Set iff `kind` is [`FragmentKind::Child`].
    pub parent_id: Option<String>,
    pub metadata: SourceMetadata,
    /// Only ever set on the in-memory copy returned by a search.
    pub relevance_score: Option<f32>,
}

impl Fragment {
    pub fn is_parent(&self) -> bool {
        self.kind == FragmentKind::Parent
    }

    pub fn is_child(&self) -> bool {
        self.kind == FragmentKind::Child
    }

    pub fn locator(&self) -> String {
        self.metadata.locator()
    }
}

/// A completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A parent fragment with the score the reranker gave it.
///
/// Lives only for the duration of a single search call.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub fragment: Fragment,
    pub score: f32,
}

impl RetrievalCandidate {
    /// Attach the score to the fragment and drop the wrapper.
    pub fn into_fragment(self) -> Fragment {
        let mut fragment = self.fragment;
        fragment.relevance_score = Some(self.score);
        fragment
    }
}
