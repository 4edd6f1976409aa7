//! Conversational orchestrator.
//!
//! A [`ChatSession`] runs one question/answer turn at a time:
//!
//! | State          | Work                                                   |
//! |----------------|--------------------------------------------------------|
//! | `Rewriting`    | contextualize the question against memory              |
//! | `Retrieving`   | two-stage search with `k` (4 by default)               |
//! | `Synthesizing` | generate an answer from memory + context + question    |
//! | `Idle`         | turn finished, memory updated                          |
//!
//! Two outcomes are answered with a fixed message instead of a generation
//! call: the vector store being unreachable ([`AnswerKind::Degraded`]) and
//! retrieval finding nothing ([`AnswerKind::NoResults`]). Neither is an
//! error. Degraded turns are never written to memory.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::contextualize::QueryContextualizer;
use crate::conversation::{ConversationMemory, DEFAULT_MEMORY_TURNS};
use crate::generate::Generator;
use crate::models::{ConversationTurn, Fragment};
use crate::retrieve::{RetrievalError, Retriever};

pub const DEFAULT_K: usize = 4;

pub const DEGRADED_MESSAGE: &str = "Error: I cannot reach the medical knowledge index right now. \
Please check that the vector store service is running.";

pub const NO_RESULTS_MESSAGE: &str = "I could not find relevant information.";

const QA_PROMPT_HEAD: &str = "You are an expert medical assistant. Use the following pieces of \
retrieved context to answer the question.\n\
If you don't know the answer, say that you don't know. Use three sentences maximum and keep \
the answer concise.\n\nContext:\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Rewriting,
    Retrieving,
    Synthesizing,
}

/// How a turn's answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Answered,
    NoResults,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub text: String,
    /// Parent fragments the answer was grounded on; empty unless `Answered`.
    pub sources: Vec<Fragment>,
    pub standalone_question: String,
    pub kind: AnswerKind,
}

/// Unexpected collaborator failure during a turn. Memory is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question rewrite failed: {0:#}")]
    Rewrite(anyhow::Error),
    #[error(transparent)]
    Retrieval(RetrievalError),
    #[error("answer generation failed: {0:#}")]
    Generation(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub k: usize,
    pub memory_turns: usize,
    /// Whether "no relevant information" turns are remembered.
    pub record_no_results: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            memory_turns: DEFAULT_MEMORY_TURNS,
            record_no_results: false,
        }
    }
}

pub struct ChatSession {
    contextualizer: QueryContextualizer,
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    memory: ConversationMemory,
    settings: ChatSettings,
    state: TurnState,
}

impl ChatSession {
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn Generator>, settings: ChatSettings) -> Self {
        Self {
            contextualizer: QueryContextualizer::new(generator.clone()),
            retriever,
            generator,
            memory: ConversationMemory::new(settings.memory_turns),
            settings,
            state: TurnState::Idle,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// Run one full turn. The session is back to `Idle` when this returns,
    /// whatever the outcome.
    pub async fn ask(&mut self, question: &str) -> Result<ChatAnswer, ChatError> {
        let result = self.run_turn(question).await;
        self.transition(TurnState::Idle);
        result
    }

    async fn run_turn(&mut self, question: &str) -> Result<ChatAnswer, ChatError> {
        let history = self.memory.snapshot();

        self.transition(TurnState::Rewriting);
        let standalone = self
            .contextualizer
            .rewrite(question, &history)
            .await
            .map_err(ChatError::Rewrite)?;

        self.transition(TurnState::Retrieving);
        let sources = match self.retriever.search(&standalone, self.settings.k).await {
            Ok(found) => found,
            Err(RetrievalError::VectorStoreUnavailable(reason)) => {
                warn!(%reason, "retrieval failed, answering in degraded mode");
                return Ok(ChatAnswer {
                    text: DEGRADED_MESSAGE.to_string(),
                    sources: Vec::new(),
                    standalone_question: standalone,
                    kind: AnswerKind::Degraded,
                });
            }
            Err(e) => return Err(ChatError::Retrieval(e)),
        };

        if sources.is_empty() {
            info!(question = %standalone, "no relevant fragments");
            if self.settings.record_no_results {
                self.memory
                    .push(ConversationTurn::new(question, NO_RESULTS_MESSAGE));
            }
            return Ok(ChatAnswer {
                text: NO_RESULTS_MESSAGE.to_string(),
                sources,
                standalone_question: standalone,
                kind: AnswerKind::NoResults,
            });
        }

        self.transition(TurnState::Synthesizing);
        let system = qa_system_prompt(&format_context(&sources));
        let text = self
            .generator
            .generate(&system, &history, &standalone)
            .await
            .map_err(ChatError::Generation)?;

        if let Some(evicted) = self.memory.push(ConversationTurn::new(question, text.clone())) {
            debug!(question = %evicted.question, "evicted oldest turn");
        }

        Ok(ChatAnswer {
            text,
            sources,
            standalone_question: standalone,
            kind: AnswerKind::Answered,
        })
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }
}

/// Render fragments as one context block, each prefixed with its locator.
///
/// Line breaks inside a fragment are flattened to spaces; fragments are
/// separated by a blank line.
pub fn format_context(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|f| {
            format!(
                "[Source: {}]: {}",
                f.locator(),
                f.content.replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn qa_system_prompt(context: &str) -> String {
    format!("{}{}", QA_PROMPT_HEAD, context)
}
