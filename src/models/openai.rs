use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Credentials, ModelSettings};
use crate::error::GenerationError;

use super::GenerationClient;

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
/// Each prompt is sent as a single user message.
pub struct ChatCompletionsClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    max_tokens: Option<u32>,
    credentials: Credentials,
}

impl ChatCompletionsClient {
    pub fn new(
        settings: &ModelSettings,
        credentials: Credentials,
    ) -> Result<Self, GenerationError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| GenerationError::Http(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: Option<u32>,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature,
        max_tokens,
    }
}

fn parse_chat_response(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("decode body: {e}")))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".to_string()))?;
    choice
        .message
        .content
        .ok_or_else(|| GenerationError::MalformedResponse("choice has no text content".to_string()))
}

impl GenerationClient for ChatCompletionsClient {
    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let body = build_request(&self.model, prompt, temperature, self.max_tokens);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credentials.api_key())
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Http(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    GenerationError::Http(format!("cannot reach {}: {e}", self.endpoint))
                } else {
                    GenerationError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| GenerationError::Http(format!("read response body: {e}")))?;
        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), text));
        }
        parse_chat_response(&text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
