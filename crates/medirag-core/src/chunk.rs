//! Parent/child chunker.
//!
//! Splits each [`SourceDocument`] into large *parent* windows (the context
//! handed to the generator) and re-splits every parent into small *child*
//! windows (the units that are embedded and searched). Each child carries
//! the id of the parent it was cut from.
//!
//! # Guarantees
//!
//! - Output order: every parent is immediately followed by its children,
//!   parents in document order.
//! - Every child's `parent_id` names a parent earlier in the same output.
//! - Ids are random v4 UUIDs, so repeated runs never reuse an id.
//! - Child content is a substring of its parent's content.
//! - Windows shorter than `min_fragment_chars` are dropped before an id is
//!   assigned.
//!
//! # Example
//!
//! ```rust
//! use medirag_core::chunk::{ChunkingParams, ParentChildChunker};
//! use medirag_core::models::SourceDocument;
//!
//! let chunker = ParentChildChunker::new(ChunkingParams::default()).unwrap();
//! let doc = SourceDocument::new("Aspirin inhibits platelet aggregation.", "notes.txt", 1);
//! let fragments = chunker.split(&doc);
//! assert_eq!(fragments.len(), 2); // one parent, one child
//! assert_eq!(fragments[1].parent_id.as_deref(), Some(fragments[0].id.as_str()));
//! ```

use anyhow::{bail, Result};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Fragment, FragmentKind, SourceDocument};
use crate::split::{char_len, TextSplitter};

/// Window sizes for both levels, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub parent_size: usize,
    pub parent_overlap: usize,
    pub child_size: usize,
    pub child_overlap: usize,
    /// Windows with fewer characters than this are discarded.
    pub min_fragment_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            parent_size: 2000,
            parent_overlap: 200,
            child_size: 400,
            child_overlap: 50,
            min_fragment_chars: 10,
        }
    }
}

/// Counts over a chunker output, used for ingest reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    pub parents: usize,
    pub children: usize,
}

impl ChunkSummary {
    pub fn of(fragments: &[Fragment]) -> Self {
        let parents = fragments.iter().filter(|f| f.is_parent()).count();
        Self {
            parents,
            children: fragments.len() - parents,
        }
    }

    pub fn children_per_parent(&self) -> f64 {
        if self.parents == 0 {
            0.0
        } else {
            self.children as f64 / self.parents as f64
        }
    }
}

/// Two-level splitter producing linked parent and child [`Fragment`]s.
#[derive(Debug, Clone)]
pub struct ParentChildChunker {
    parent: TextSplitter,
    child: TextSplitter,
    min_fragment_chars: usize,
}

impl ParentChildChunker {
    /// # Errors
    ///
    /// Fails if either level has invalid size/overlap, or if the child
    /// window is larger than the parent window.
    pub fn new(params: ChunkingParams) -> Result<Self> {
        if params.child_size > params.parent_size {
            bail!(
                "child window ({}) must not exceed parent window ({})",
                params.child_size,
                params.parent_size
            );
        }
        Ok(Self {
            parent: TextSplitter::new(params.parent_size, params.parent_overlap)?,
            child: TextSplitter::new(params.child_size, params.child_overlap)?,
            min_fragment_chars: params.min_fragment_chars,
        })
    }

    /// Split one document into parents, each followed by its children.
    pub fn split(&self, doc: &SourceDocument) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        for parent_text in self.parent.split_text(&doc.content) {
            if !self.is_usable(&parent_text) {
                continue;
            }
            let parent_id = Uuid::new_v4().to_string();
            let children: Vec<String> = self
                .child
                .split_text(&parent_text)
                .into_iter()
                .filter(|c| self.is_usable(c))
                .collect();

            fragments.push(Fragment {
                id: parent_id.clone(),
                kind: FragmentKind::Parent,
                content: parent_text,
                parent_id: None,
                metadata: doc.metadata.clone(),
                relevance_score: None,
            });

            for child_text in children {
                fragments.push(Fragment {
                    id: Uuid::new_v4().to_string(),
                    kind: FragmentKind::Child,
                    content: child_text,
                    parent_id: Some(parent_id.clone()),
                    metadata: doc.metadata.clone(),
                    relevance_score: None,
                });
            }
        }

        fragments
    }

    /// Split a sequence of documents, preserving their order.
    pub fn split_documents(&self, docs: &[SourceDocument]) -> Vec<Fragment> {
        let fragments: Vec<Fragment> = docs.iter().flat_map(|d| self.split(d)).collect();
        let summary = ChunkSummary::of(&fragments);
        debug!(
            documents = docs.len(),
            parents = summary.parents,
            children = summary.children,
            "split documents"
        );
        fragments
    }

    fn is_usable(&self, text: &str) -> bool {
        char_len(text) >= self.min_fragment_chars.max(1)
    }
}
