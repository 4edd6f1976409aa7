//! End-to-end tests: files on disk → ingestion → retrieval → conversation.
//!
//! External services are replaced by deterministic fakes: a hashed
//! bag-of-words embedder, a scripted generator and the in-memory vector
//! store.

use anyhow::Result;
use async_trait::async_trait;
use medirag::config::Config;
use medirag::ingest::{build_fragments, index_fragments};
use medirag_core::chat::{AnswerKind, ChatSession};
use medirag_core::contextualize::CONTEXTUALIZE_PROMPT;
use medirag_core::embedding::EmbeddingProvider;
use medirag_core::generate::Generator;
use medirag_core::models::{ConversationTurn, FragmentKind};
use medirag_core::rerank::LexicalReranker;
use medirag_core::retrieve::Retriever;
use medirag_core::store::memory::InMemoryVectorStore;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DIMS: usize = 64;

struct BagOfWordsEmbedder;

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 3)
                {
                    let mut h = DefaultHasher::new();
                    word.to_lowercase().hash(&mut h);
                    v[(h.finish() % DIMS as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Replies from a queue; records (system prompt, history length, input).
struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, usize, String)>>,
}

impl ScriptedGenerator {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(
        &self,
        system_instructions: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().push((
            system_instructions.to_string(),
            history.len(),
            user_input.to_string(),
        ));
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "No further answers scripted.".to_string()))
    }
}

fn write_corpus(dir: &Path) {
    let topics = [
        (
            "metformin.txt",
            "Metformin is the first-line medication for type 2 diabetes. Metformin lowers hepatic glucose production and improves insulin sensitivity. ",
        ),
        (
            "metformin_effects.txt",
            "Common side effects of metformin include nausea, diarrhea and abdominal discomfort. Rarely metformin causes lactic acidosis in patients with renal impairment. ",
        ),
        (
            "asthma.md",
            "Asthma is a chronic inflammatory disease of the airways. Inhaled corticosteroids control asthma symptoms and bronchodilators relieve acute wheezing. ",
        ),
        (
            "hypertension.txt",
            "Hypertension increases the risk of stroke and heart failure. Thiazide diuretics and ACE inhibitors are common antihypertensive therapies. ",
        ),
    ];
    for (name, sentence) in topics {
        std::fs::write(dir.join(name), sentence.repeat(12)).unwrap();
    }
    std::fs::write(dir.join("cover.txt"), "Cover page [1]").unwrap();
}

fn test_config() -> Config {
    let mut cfg = Config::minimal();
    cfg.chunking.parent_size = 600;
    cfg.chunking.parent_overlap = 60;
    cfg.chunking.child_size = 150;
    cfg.chunking.child_overlap = 20;
    cfg.embedding.batch_size = 16;
    cfg
}

async fn ingested() -> (Config, Arc<InMemoryVectorStore>, usize) {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let cfg = test_config();

    let (pages, fragments) = build_fragments(&cfg, &[dir.path().to_path_buf()]).unwrap();
    assert_eq!(pages, 4, "cover page must be filtered out");

    let store = Arc::new(InMemoryVectorStore::new());
    let report = index_fragments(store.clone(), Arc::new(BagOfWordsEmbedder), &cfg, &fragments)
        .await
        .unwrap();
    assert_eq!(report.fragments, fragments.len());
    assert_eq!(store.len(&cfg.vector_store.collection), fragments.len());
    (cfg, store, fragments.len())
}

fn retriever(cfg: &Config, store: Arc<InMemoryVectorStore>) -> Arc<Retriever> {
    Arc::new(Retriever::new(
        store,
        Arc::new(BagOfWordsEmbedder),
        Arc::new(LexicalReranker::new()),
        cfg.vector_store.collection.clone(),
    ))
}

#[tokio::test]
async fn ingest_then_search_returns_ranked_parents() {
    let (cfg, store, _) = ingested().await;
    let retriever = retriever(&cfg, store);

    let results = retriever
        .search("metformin side effects nausea diarrhea", cfg.retrieval.k)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 4);
    let ids: HashSet<&str> = results.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids.len(), results.len());
    for f in &results {
        assert_eq!(f.kind, FragmentKind::Parent);
        assert!(f.metadata.cleaned);
    }
    for pair in results.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
    assert!(results[0].metadata.source.ends_with("metformin_effects.txt"));
}

#[tokio::test]
async fn reingest_replaces_collection() {
    let (cfg, store, count) = ingested().await;

    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let (_, fragments) = build_fragments(&cfg, &[dir.path().to_path_buf()]).unwrap();
    index_fragments(store.clone(), Arc::new(BagOfWordsEmbedder), &cfg, &fragments)
        .await
        .unwrap();

    // Fresh ids each run, but the old points are gone.
    assert_eq!(store.len(&cfg.vector_store.collection), count);
}

#[tokio::test]
async fn two_turn_conversation_rewrites_follow_up() {
    let (cfg, store, _) = ingested().await;
    let generator = Arc::new(ScriptedGenerator::new(&[
        "Metformin is first-line therapy for type 2 diabetes.",
        "What are the side effects of metformin?",
        "Nausea and diarrhea are the most common.",
    ]));
    let mut session = ChatSession::new(retriever(&cfg, store), generator.clone(), cfg.chat_settings());

    let first = session.ask("What is metformin used for?").await.unwrap();
    assert_eq!(first.kind, AnswerKind::Answered);
    assert!(!first.sources.is_empty() && first.sources.len() <= 4);

    let second = session.ask("And its side effects?").await.unwrap();
    assert_eq!(second.kind, AnswerKind::Answered);
    assert_eq!(second.standalone_question, "What are the side effects of metformin?");
    assert_eq!(second.text, "Nausea and diarrhea are the most common.");
    assert!(second.sources.iter().all(|f| f.is_parent()));

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    // Turn 1: answer only. Turn 2: rewrite, then answer the rewritten question.
    assert_eq!(calls[1].0, CONTEXTUALIZE_PROMPT);
    assert_eq!(calls[1].2, "And its side effects?");
    assert_eq!(calls[2].2, "What are the side effects of metformin?");
    assert!(calls[2].0.contains("[Source: "));

    assert_eq!(session.memory().len(), 2);
}

#[tokio::test]
async fn memory_holds_last_three_turns() {
    let (cfg, store, _) = ingested().await;
    let mut session = ChatSession::new(
        retriever(&cfg, store),
        Arc::new(ScriptedGenerator::new(&[])),
        cfg.chat_settings(),
    );

    for q in ["asthma", "hypertension", "metformin", "diabetes", "stroke"] {
        session.ask(q).await.unwrap();
    }
    let questions: Vec<String> = session
        .memory()
        .turns()
        .map(|t| t.question.clone())
        .collect();
    assert_eq!(questions, vec!["metformin", "diabetes", "stroke"]);
}
