//! Conversation/model orchestrator
//!
//! Owns the turn protocol: send the conversation to the model, execute any
//! tool requests it returns, feed the results back, and repeat until the
//! model answers without requesting tools. The loop is an explicit iteration
//! with a configured bound; a misbehaving model that keeps requesting tools
//! fails the turn with `ToolLoopExceeded` instead of looping forever.
//!
//! Raw tool output is never a terminal result: the text returned to the
//! caller always comes from a model message that contained no tool requests.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::errors::{BrokerError, Result};
use crate::retry::RetryPolicy;
use crate::tools::{ExecutionEngine, ToolInvocation, ToolRegistry};
use crate::transport::{ModelResponse, ModelTransport, ToolDescriptor};
use crate::types::{Conversation, ErrorContext, Message, Role};

/// Phase of one orchestration turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// Turn driver over a transport, a tool engine, and a retry policy
pub struct Orchestrator {
    transport: Arc<dyn ModelTransport>,
    engine: ExecutionEngine,
    registry: Arc<ToolRegistry>,
    retry: RetryPolicy,
    max_tool_iterations: usize,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        registry: Arc<ToolRegistry>,
        engine: ExecutionEngine,
        config: &BrokerConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            engine,
            registry,
            retry: config.retry.policy(),
            max_tool_iterations: config.max_tool_iterations.max(1),
            system_prompt: system_prompt.into(),
        }
    }

    /// Deterministic retry scheduling, for tests
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Drive one turn to completion. The conversation must end with a user
    /// message; on success it holds the full exchange, tool traffic included,
    /// and the returned string is the model's final text.
    pub async fn run_turn(&self, conversation: &mut Conversation) -> Result<String> {
        match conversation.last() {
            Some(message) if message.role == Role::User => {}
            _ => {
                return Err(BrokerError::Config(
                    "conversation must end with a user message".to_string(),
                ))
            }
        }

        let turn_id = Uuid::new_v4();
        let descriptors = self.registry.descriptors();
        let mut iterations = 0usize;

        loop {
            log::trace!("turn {} phase {:?}", turn_id, TurnPhase::AwaitingModel);
            let response = match self.call_model(conversation, &descriptors).await {
                Ok(response) => response,
                Err(error) => return Err(self.fail_turn(turn_id, "model_call", error)),
            };

            let has_requests = response.has_tool_requests();
            let message = response.into_message();
            let invocations = ToolInvocation::from_message(&message);
            conversation.push(message)?;

            if !has_requests {
                log::trace!("turn {} phase {:?}", turn_id, TurnPhase::Done);
                let text = conversation
                    .last()
                    .map(Message::text)
                    .unwrap_or_default();
                log::debug!("turn {} done after {} tool iteration(s)", turn_id, iterations);
                return Ok(text);
            }

            iterations += 1;
            if iterations > self.max_tool_iterations {
                let error = BrokerError::ToolLoopExceeded {
                    max_iterations: self.max_tool_iterations,
                };
                return Err(self.fail_turn(turn_id, "tool_loop", error));
            }

            log::trace!("turn {} phase {:?}", turn_id, TurnPhase::ExecutingTools);
            log::debug!(
                "turn {} iteration {}: executing {} tool request(s)",
                turn_id,
                iterations,
                invocations.len()
            );
            let results = self.engine.execute(invocations).await;
            conversation.push(Message {
                role: Role::User,
                content: results,
            })?;
        }
    }

    async fn call_model(
        &self,
        conversation: &Conversation,
        descriptors: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        self.retry
            .run("model_call", || {
                self.transport
                    .call(conversation, descriptors, &self.system_prompt)
            })
            .await
    }

    /// Record the sanitized failure context, then hand the error to the
    /// caller. The error display text of every escaping variant is already
    /// free of raw secret material.
    fn fail_turn(&self, turn_id: Uuid, operation: &str, error: BrokerError) -> BrokerError {
        let retries = match &error {
            BrokerError::RetryExhausted { attempts, .. } => *attempts,
            _ => 0,
        };
        let context = ErrorContext::new(operation, &error).with_retries(retries);
        log::error!(
            "turn {} failed in {}: {} (retries: {}, at: {})",
            turn_id,
            context.operation,
            context.detail,
            context.retry_count,
            context.timestamp
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullSink;
    use crate::types::ContentBlock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport that pops scripted outcomes in order
    struct ScriptedTransport {
        script: Mutex<Vec<Result<ModelResponse>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(mut script: Vec<Result<ModelResponse>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn call(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolDescriptor],
            _system_prompt: &str,
        ) -> Result<ModelResponse> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(BrokerError::Internal("script exhausted".to_string())))
        }
    }

    fn text_response(text: &str) -> Result<ModelResponse> {
        Ok(ModelResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason: Some("end_turn".to_string()),
        })
    }

    fn tool_response(id: &str, tool: &str, arguments: serde_json::Value) -> Result<ModelResponse> {
        Ok(ModelResponse {
            content: vec![
                ContentBlock::text("using a tool"),
                ContentBlock::tool_request(id, tool, arguments),
            ],
            stop_reason: Some("tool_use".to_string()),
        })
    }

    fn orchestrator_with(
        script: Vec<Result<ModelResponse>>,
        max_tool_iterations: usize,
    ) -> (Orchestrator, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let registry = Arc::new(ToolRegistry::new());
        let engine = ExecutionEngine::new(registry.clone(), Arc::new(NullSink));

        let mut config = BrokerConfig::default();
        config.max_tool_iterations = max_tool_iterations;

        let orchestrator = Orchestrator::new(
            transport.clone(),
            registry,
            engine,
            &config,
            "you are a careful assistant",
        )
        .with_retry_policy(RetryPolicy::new(3, 1, 5).without_jitter());
        (orchestrator, transport)
    }

    #[tokio::test]
    async fn test_plain_answer_completes_in_one_call() {
        let (orchestrator, transport) = orchestrator_with(vec![text_response("hello there")], 4);

        let mut conversation = Conversation::from_user_text("hi");
        let answer = orchestrator.run_turn(&mut conversation).await.unwrap();

        assert_eq!(answer, "hello there");
        assert_eq!(transport.call_count(), 1);
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_still_completes_via_model() {
        let (orchestrator, transport) = orchestrator_with(
            vec![
                tool_response("t1", "no_such_tool", json!({})),
                text_response("that tool does not exist, sorry"),
            ],
            4,
        );

        let mut conversation = Conversation::from_user_text("use the mystery tool");
        let answer = orchestrator.run_turn(&mut conversation).await.unwrap();

        assert_eq!(answer, "that tool does not exist, sorry");
        assert_eq!(transport.call_count(), 2);

        // The error tool result is recorded in the conversation, flagged.
        let tool_message = &conversation.messages()[2];
        match &tool_message.content[0] {
            ContentBlock::ToolResult { is_error, content, .. } => {
                assert!(*is_error);
                assert!(content.contains("tool not found"));
            }
            _ => panic!("expected tool result block"),
        }
    }

    #[tokio::test]
    async fn test_loop_bound_enforced() {
        // Model requests a tool on every call, forever.
        let script: Vec<Result<ModelResponse>> = (0..10)
            .map(|i| tool_response(&format!("t{}", i), "no_such_tool", json!({})))
            .collect();
        let (orchestrator, transport) = orchestrator_with(script, 2);

        let mut conversation = Conversation::from_user_text("loop forever");
        let result = orchestrator.run_turn(&mut conversation).await;

        assert!(matches!(
            result,
            Err(BrokerError::ToolLoopExceeded { max_iterations: 2 })
        ));
        // Two tool iterations were allowed, the third model call tripped the bound.
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_transport_failures_are_retried() {
        let (orchestrator, transport) = orchestrator_with(
            vec![
                Err(BrokerError::Transport("503".to_string())),
                Err(BrokerError::Transport("503 again".to_string())),
                text_response("finally"),
            ],
            4,
        );

        let mut conversation = Conversation::from_user_text("hi");
        let answer = orchestrator.run_turn(&mut conversation).await.unwrap();

        assert_eq!(answer, "finally");
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_the_turn() {
        let script: Vec<Result<ModelResponse>> = (0..5)
            .map(|i| Err(BrokerError::Transport(format!("failure {}", i))))
            .collect();
        let (orchestrator, transport) = orchestrator_with(script, 4);

        let mut conversation = Conversation::from_user_text("hi");
        let result = orchestrator.run_turn(&mut conversation).await;

        assert!(matches!(
            result,
            Err(BrokerError::RetryExhausted { attempts: 3, .. })
        ));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let (orchestrator, transport) = orchestrator_with(
            vec![
                Err(BrokerError::MalformedResponse("unparseable".to_string())),
                text_response("never reached"),
            ],
            4,
        );

        let mut conversation = Conversation::from_user_text("hi");
        let result = orchestrator.run_turn(&mut conversation).await;

        assert!(matches!(result, Err(BrokerError::MalformedResponse(_))));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_turn_requires_trailing_user_message() {
        let (orchestrator, _transport) = orchestrator_with(vec![text_response("hi")], 4);

        let mut conversation = Conversation::new();
        let result = orchestrator.run_turn(&mut conversation).await;
        assert!(matches!(result, Err(BrokerError::Config(_))));
    }
}
