//! Conversation and content-block types
//!
//! Messages are wire-shaped (Anthropic-style tagged content blocks) so the
//! HTTP transport serializes them directly. A `Conversation` is owned by a
//! single orchestration turn and only grows through checked appends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::errors::{BrokerError, Result};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(rename = "assistant")]
    Model,
}

/// One content block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    /// Model-issued instruction to invoke a named tool
    #[serde(rename = "tool_use")]
    ToolRequest {
        id: String,
        name: String,
        #[serde(rename = "input")]
        arguments: Value,
    },

    /// Outcome of executing a ToolRequest, fed back for model interpretation
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(rename = "tool_use_id")]
        request_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_request(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        ContentBlock::ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result(request_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            request_id: request_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn is_tool_request(&self) -> bool {
        matches!(self, ContentBlock::ToolRequest { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }
}

/// One conversation message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn model(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Model,
            content,
        }
    }

    /// Tool requests carried by this message, in document order
    pub fn tool_requests(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolRequest { id, name, arguments } => {
                    Some((id.as_str(), name.as_str(), arguments))
                }
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Ordered message sequence for one orchestration turn
///
/// Append-only; roles must alternate, and a message carrying ToolResult
/// blocks must answer ToolRequest ids from the immediately preceding model
/// message.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation seeded with one user message
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user_text(text)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message, enforcing the conversation invariants.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if let Some(last) = self.messages.last() {
            if last.role == message.role {
                return Err(BrokerError::Internal(format!(
                    "conversation roles must alternate, got consecutive {:?}",
                    message.role
                )));
            }
        }

        if message.role == Role::Model {
            self.check_unique_request_ids(&message)?;
        }

        let has_results = message.content.iter().any(ContentBlock::is_tool_result);
        if has_results {
            self.check_results_answer_previous(&message)?;
        }

        self.messages.push(message);
        Ok(())
    }

    /// Ids must be unique across the whole turn; a duplicate means the model
    /// response cannot be correlated and is treated as malformed.
    fn check_unique_request_ids(&self, message: &Message) -> Result<()> {
        let mut seen: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.tool_requests())
            .map(|(id, _, _)| id)
            .collect();

        for (id, _, _) in message.tool_requests() {
            if !seen.insert(id) {
                return Err(BrokerError::MalformedResponse(format!(
                    "duplicate tool request id '{}'",
                    id
                )));
            }
        }
        Ok(())
    }

    fn check_results_answer_previous(&self, message: &Message) -> Result<()> {
        if message.role != Role::User {
            return Err(BrokerError::Internal(
                "tool results must be carried by a user-role message".to_string(),
            ));
        }

        let previous = self.messages.last().ok_or_else(|| {
            BrokerError::Internal("tool results with no preceding model message".to_string())
        })?;

        let request_ids: HashSet<&str> = previous
            .tool_requests()
            .into_iter()
            .map(|(id, _, _)| id)
            .collect();

        for block in &message.content {
            if let ContentBlock::ToolResult { request_id, .. } = block {
                if !request_ids.contains(request_id.as_str()) {
                    return Err(BrokerError::Internal(format!(
                        "tool result references unknown request id '{}'",
                        request_id
                    )));
                }
            }
        }
        Ok(())
    }
}
