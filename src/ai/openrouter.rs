//! OpenRouter chat-completions transport

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationConfig, GenerationTransport};
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::GatewayError;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Sends each prompt as a single user message.
#[derive(Clone)]
pub struct OpenRouterTransport {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenRouterTransport {
    pub fn new(api_url: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, config: &GenerationConfig) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_tokens: config.max_output_tokens,
        }
    }
}

/// Pull the text out of a completion. A null content is an empty answer.
fn first_choice_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| anyhow::anyhow!("No response content from AI"))
}

#[async_trait]
impl GenerationTransport for OpenRouterTransport {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(GatewayError::NotAuthenticated("no AI API key configured".into()).into());
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "mailflow")
            .json(&self.request(prompt, config))
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(GatewayError::NotAuthenticated(body).into());
            }
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        first_choice_text(chat_response)
    }
}
