//! `check` command: verify the environment before ingesting or chatting.
//!
//! Runs each probe independently and prints one line per probe. Returns an
//! error (non-zero exit) if any probe fails.

use anyhow::{bail, Result};

use medirag_core::store::VectorStore;

use crate::config::Config;
use crate::qdrant::QdrantStore;

#[derive(Debug)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

pub fn check_credential(config: &Config) -> CheckOutcome {
    match config.llm_api_key() {
        Ok(_) => CheckOutcome::pass("llm credential", format!("{} is set", config.llm.api_key_env)),
        Err(e) => CheckOutcome::fail("llm credential", e.to_string()),
    }
}

pub async fn check_store(config: &Config, store: &dyn VectorStore) -> CheckOutcome {
    let collection = &config.vector_store.collection;
    match store.collection_exists(collection).await {
        Ok(true) => CheckOutcome::pass("vector store", format!("collection '{}' exists", collection)),
        Ok(false) => CheckOutcome::pass(
            "vector store",
            format!("reachable; collection '{}' not created yet (run ingest)", collection),
        ),
        Err(e) => CheckOutcome::fail("vector store", e.to_string()),
    }
}

pub async fn run_check(config: &Config) -> Result<()> {
    let mut outcomes = vec![check_credential(config)];
    match QdrantStore::new(&config.vector_store) {
        Ok(store) => outcomes.push(check_store(config, &store).await),
        Err(e) => outcomes.push(CheckOutcome::fail("vector store", e.to_string())),
    }

    for o in &outcomes {
        println!("  [{}] {}: {}", if o.ok { "ok" } else { "FAIL" }, o.name, o.detail);
    }

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    if failed > 0 {
        bail!("{} check(s) failed", failed);
    }
    println!("ok");
    Ok(())
}
