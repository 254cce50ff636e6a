//! OpenAI-compatible `chat/completions` provider (Groq by default).

use dailypapers_core::{ChatMessage, ChatProvider, ChatRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 408, 429 and 5xx are worth retrying; any other failure status is not.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim().to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Key from the env var named `api_key_env`; a missing key is a config error.
    pub fn from_env(client: reqwest::Client, base_url: &str, api_key_env: &str) -> Result<Self> {
        let key = env(api_key_env)
            .ok_or_else(|| Error::Config(format!("missing API key (set {api_key_env})")))?;
        Ok(Self::new(client, base_url, Some(key)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint_chat_completions(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn complete(&self, req: &ChatRequest) -> Result<String> {
        let body = ChatCompletionsRequest {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            response_format: req.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        // Connection failures and timeouts are transient.
        let resp = rb
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransientProvider(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            let msg = format!("chat.completions HTTP {status}: {detail}");
            return Err(if is_transient_status(status) {
                Error::TransientProvider(msg)
            } else {
                Error::FatalProvider(msg)
            });
        }

        let parsed: ChatCompletionsResponse = resp
            .json()
            .await
            .map_err(|e| Error::FatalProvider(format!("unreadable completion: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::FatalProvider("empty completion".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
