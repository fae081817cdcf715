use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ContentGenerator};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

/// OpenAI-compatible chat-completions client for the AI gateway.
pub struct GatewayGenerator {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl GatewayGenerator {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ContentGenerator for GatewayGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let req = CompletionRequest {
            model: &self.model,
            messages,
        };
        let res = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "AI gateway error: {} - {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: CompletionResponse = res.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("AI gateway returned no choices"))
    }
}
