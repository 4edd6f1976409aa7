//! # MediRAG
//!
//! Conversational retrieval over a corpus of medical documents.
//!
//! Pages are cleaned and split into large *parent* windows and small
//! *child* windows. Children are embedded and searched; their parents are
//! what the language model reads. A follow-up question is first rewritten
//! into a standalone one using the last few turns.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │ Loaders  │──▶│ Clean+Split │──▶│  Qdrant  │
//! │ PDF/Text │   │ Parent/Child│   │ children │
//! └──────────┘   └─────────────┘   │ +parents │
//!                                  └────┬─────┘
//!        question ─▶ rewrite ─▶ search children ─▶ parents ─▶ rerank
//!                                                              │
//!                                              Gemini answer ◀─┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! medirag check                       # credential + vector store probe
//! medirag ingest ./data/raw           # rebuild the collection
//! medirag search "statin side effects"
//! medirag chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`loader`] | PDF and plain-text loaders |
//! | [`ingest`] | Ingestion pipeline |
//! | [`embedding`] | Embedding providers (fastembed, OpenAI, Ollama) |
//! | [`qdrant`] | Qdrant REST vector store |
//! | [`rerank`] | Reranker providers |
//! | [`llm`] | Gemini generator |
//! | [`search`] | Retriever wiring and the `search` command |
//! | [`chat`] | `ask` and the `chat` REPL |
//! | [`check`] | Environment checks |
//!
//! Pure logic (chunking, retrieval, the conversation state machine) lives
//! in the `medirag-core` crate.

pub mod chat;
pub mod check;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod qdrant;
pub mod rerank;
pub mod search;
