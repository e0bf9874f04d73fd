use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::llm::Generator;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Blocking client for OpenAI-compatible chat-completions APIs.
///
/// Sends the prompt as a single user message. A rate-limited request is
/// retried once after a short pause; every other failure is returned as
/// [`Error::Generation`].
pub struct ChatCompletionsClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

enum Attempt {
    Done(String),
    RateLimited,
}

impl ChatCompletionsClient {
    /// Build a client for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a blank API key or if the HTTP client
    /// cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("language model API key is empty".to_string()));
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.2,
        })
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn send(&self, prompt: &str) -> Result<Attempt> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited);
        }

        let text = response
            .text()
            .map_err(|e| Error::Generation(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            error!(%status, body = %text, "chat completion request failed");
            return Err(Error::Generation(format!("provider returned status {status}")));
        }

        parse_reply(&text).map(Attempt::Done)
    }
}

impl Generator for ChatCompletionsClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting completion");
        match self.send(prompt)? {
            Attempt::Done(text) => Ok(text),
            Attempt::RateLimited => {
                warn!(model = %self.model, "rate limited, retrying in 1s");
                std::thread::sleep(RATE_LIMIT_BACKOFF);
                match self.send(prompt)? {
                    Attempt::Done(text) => Ok(text),
                    Attempt::RateLimited => Err(Error::Generation("provider rate limit exceeded".to_string())),
                }
            }
        }
    }
}

fn parse_reply(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Generation(format!("malformed completion response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Generation("completion response had no content".to_string()))
}
