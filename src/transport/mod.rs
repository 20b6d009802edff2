//! Model transport interface
//!
//! The orchestrator talks to the model exclusively through `ModelTransport`.
//! The bundled implementation is the HTTP messages client in `http`; tests
//! substitute scripted transports.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::types::{ContentBlock, Conversation, Message};

pub use http::HttpTransport;

/// Tool advertisement handed to the model alongside the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One model response: the content blocks of the next model message
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ModelResponse {
    pub fn has_tool_requests(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_request)
    }

    /// The response as a conversation message, blocks preserved verbatim
    pub fn into_message(self) -> Message {
        Message::model(self.content)
    }
}

/// Transport interface implemented by the model collaborator
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn call(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
        system_prompt: &str,
    ) -> Result<ModelResponse>;
}
