//! # MediRAG Core
//!
//! Shared, I/O-free logic for MediRAG: fragment models, text cleaning,
//! parent/child chunking, the collaborator traits (embedding, vector
//! store, reranker, generator), the indexing gateway, the two-stage
//! retriever and the conversational orchestrator.
//!
//! This crate performs no network or filesystem access. Concrete
//! collaborators (Qdrant, fastembed, Gemini, ...) live in the `medirag`
//! app crate and are injected as trait objects.

pub mod chat;
pub mod chunk;
pub mod clean;
pub mod contextualize;
pub mod conversation;
pub mod embedding;
pub mod generate;
pub mod index;
pub mod models;
pub mod record;
pub mod rerank;
pub mod retrieve;
pub mod split;
pub mod store;
