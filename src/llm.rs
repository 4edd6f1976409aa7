//! Gemini generator.
//!
//! Implements [`Generator`] against the Gemini `generateContent` endpoint:
//!
//! - System instructions travel in the top-level `system_instruction` field.
//! - History becomes alternating `user` / `model` contents, followed by the
//!   current user input.
//! - Auth is the `?key=` query parameter.
//!
//! The key is resolved when the generator is built, so a missing
//! credential fails the command before any question is processed.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use medirag_core::generate::Generator;
use medirag_core::models::ConversationTurn;

use crate::config::Config;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiGenerator {
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.llm_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            api_key,
            base_url: config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_instructions: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String> {
        let body = request_body(system_instructions, history, user_input, self.temperature);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        parse_response(&json)
    }
}

fn request_body(
    system_instructions: &str,
    history: &[ConversationTurn],
    user_input: &str,
    temperature: f32,
) -> Value {
    let mut contents: Vec<Value> = Vec::with_capacity(history.len() * 2 + 1);
    for turn in history {
        contents.push(json!({ "role": "user", "parts": [{ "text": turn.question }] }));
        contents.push(json!({ "role": "model", "parts": [{ "text": turn.answer }] }));
    }
    contents.push(json!({ "role": "user", "parts": [{ "text": user_input }] }));

    json!({
        "system_instruction": { "parts": [{ "text": system_instructions }] },
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    })
}

/// Concatenate the text parts of the first candidate.
fn parse_response(json: &Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates"))?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            anyhow!("Gemini returned no content (finishReason: {})", reason)
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<String>())
}

/// Create the [`Generator`] named by `llm.provider`.
///
/// # Errors
///
/// Fails with [`ConfigError::MissingCredential`](crate::config::ConfigError)
/// if the API key variable is unset.
pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    match config.llm.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
