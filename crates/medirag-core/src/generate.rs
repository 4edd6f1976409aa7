//! Generative model trait.
//!
//! The contextualizer and the orchestrator both talk to the language model
//! through [`Generator`]; the Gemini client in the app crate implements it.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ConversationTurn;

/// A chat-style text generator.
///
/// `history` is rendered as alternating user/model messages before
/// `user_input`. Implementations are expected to run at temperature 0 so
/// that the same inputs produce the same output.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        system_instructions: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String>;
}
