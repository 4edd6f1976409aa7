//! Query contextualizer.
//!
//! Turns a follow-up question that leans on earlier turns ("and its side
//! effects?") into a standalone question the retriever can use on its own.
//! The model is told to reformulate only, never to answer.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::generate::Generator;
use crate::models::ConversationTurn;

pub const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

pub struct QueryContextualizer {
    generator: Arc<dyn Generator>,
}

impl QueryContextualizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Rewrite `question` against `history`.
    ///
    /// With no history the question is returned unchanged and the model is
    /// not called. A blank model response also falls back to the question.
    pub async fn rewrite(&self, question: &str, history: &[ConversationTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let rewritten = self
            .generator
            .generate(CONTEXTUALIZE_PROMPT, history, question)
            .await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            debug!("contextualizer returned nothing; keeping original question");
            return Ok(question.to_string());
        }

        debug!(original = question, standalone = rewritten, "rewrote question");
        Ok(rewritten.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        reply: String,
        calls: Mutex<Vec<(String, usize, String)>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
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
            Ok(self.reply.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _: &str, _: &[ConversationTurn], _: &str) -> Result<String> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn history() -> Vec<ConversationTurn> {
        vec![ConversationTurn::new(
            "What is metformin used for?",
            "Metformin is a first-line treatment for type 2 diabetes.",
        )]
    }

    #[tokio::test]
    async fn test_empty_history_skips_model() {
        let gen = Arc::new(ScriptedGenerator::new("should not be used"));
        let ctx = QueryContextualizer::new(gen.clone());
        let out = ctx.rewrite("What are its side effects?", &[]).await.unwrap();
        assert_eq!(out, "What are its side effects?");
        assert!(gen.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrites_with_history() {
        let gen = Arc::new(ScriptedGenerator::new("  What are the side effects of metformin?\n"));
        let ctx = QueryContextualizer::new(gen.clone());
        let out = ctx
            .rewrite("What are its side effects?", &history())
            .await
            .unwrap();
        assert_eq!(out, "What are the side effects of metformin?");

        let calls = gen.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, CONTEXTUALIZE_PROMPT);
        assert_eq!(calls[0].1, 1);
        assert_eq!(calls[0].2, "What are its side effects?");
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back() {
        let ctx = QueryContextualizer::new(Arc::new(ScriptedGenerator::new("   ")));
        let out = ctx.rewrite("Dosage?", &history()).await.unwrap();
        assert_eq!(out, "Dosage?");
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let ctx = QueryContextualizer::new(Arc::new(FailingGenerator));
        assert!(ctx.rewrite("Dosage?", &history()).await.is_err());
    }
}
