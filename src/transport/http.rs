//! HTTP messages-API transport
//!
//! Speaks the messages wire format: tagged `text` / `tool_use` /
//! `tool_result` content blocks and a `stop_reason`. The API key comes from
//! the process environment only; the core never stores or logs it elsewhere.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::errors::{BrokerError, Result};
use crate::sanitize;
use crate::transport::{ModelResponse, ModelTransport, ToolDescriptor};
use crate::types::{ContentBlock, Conversation};

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Wire protocol version header value
const API_VERSION: &str = "2023-06-01";

/// Reqwest-based messages-API client
pub struct HttpTransport {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport reading the API key from the named environment
    /// variable. Fails if the variable is unset or empty.
    pub fn from_env(api_key_var: &str, base_url: &str, model: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_var)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BrokerError::Config(format!("environment variable {} is not set", api_key_var))
            })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BrokerError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: 4096,
            api_key,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_payload(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        system_prompt: &str,
    ) -> Value {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": conversation.messages(),
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }
        payload
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn call(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        system_prompt: &str,
    ) -> Result<ModelResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let payload = self.build_payload(conversation, tools, system_prompt);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            // Sanitize wire-derived detail here, where it enters the core.
            return Err(BrokerError::Transport(format!(
                "HTTP {}: {}",
                status,
                sanitize::sanitize(&body)
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::MalformedResponse(sanitize::sanitize(&e.to_string())))?;

        wire.into_model_response()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    /// Unrecognized block kinds are skipped, not guessed at
    #[serde(other)]
    Unknown,
}

impl WireResponse {
    fn into_model_response(self) -> Result<ModelResponse> {
        let mut content = Vec::new();
        for block in self.content {
            match block {
                WireBlock::Text { text } => content.push(ContentBlock::text(text)),
                WireBlock::ToolUse { id, name, input } => {
                    if id.is_empty() || name.is_empty() {
                        return Err(BrokerError::MalformedResponse(
                            "tool_use block missing id or name".to_string(),
                        ));
                    }
                    content.push(ContentBlock::tool_request(id, name, input));
                }
                WireBlock::Unknown => {}
            }
        }

        if content.is_empty() {
            return Err(BrokerError::MalformedResponse(
                "response carried no usable content blocks".to_string(),
            ));
        }

        Ok(ModelResponse {
            content,
            stop_reason: self.stop_reason,
        })
    }
}
