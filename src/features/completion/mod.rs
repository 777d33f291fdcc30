//! # Feature: Completion Backend
//!
//! Thin contract over the chat-completion engine: an ordered list of
//! role-tagged lines in, either text or a distinguished quota-exhausted
//! marker out. Everything else is a hard failure. The production
//! implementation wraps the OpenAI chat API; tests substitute a stub.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};
use openai::chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole};
use std::time::Duration;
use tokio::time::timeout;

/// Completion calls are abandoned after this long and treated as failures.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Outcome of a completion call that reached the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReply {
    Text(String),
    /// The engine reported its quota as exhausted. Callers show a fixed
    /// apology and never retry.
    QuotaExhausted,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<CompletionReply>;
}

/// Production backend over the OpenAI chat-completion API.
pub struct OpenAiBackend {
    model: String,
}

impl OpenAiBackend {
    pub fn new(model: String) -> Self {
        OpenAiBackend { model }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<CompletionReply> {
        let api_messages: Vec<ChatCompletionMessage> = messages
            .into_iter()
            .map(|m| ChatCompletionMessage {
                role: match m.role {
                    ChatRole::System => ChatCompletionMessageRole::System,
                    ChatRole::User => ChatCompletionMessageRole::User,
                },
                content: Some(m.content),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            })
            .collect();

        debug!(
            "Sending {} messages to model {}",
            api_messages.len(),
            self.model
        );

        let future = ChatCompletion::builder(&self.model, api_messages)
            .temperature(0.7_f32)
            .create();
        let completion = match timeout(COMPLETION_TIMEOUT, future).await {
            Err(_) => {
                error!("Completion request timed out after {COMPLETION_TIMEOUT:?}");
                anyhow::bail!("completion request timed out");
            }
            Ok(Err(e)) => {
                let description = e.to_string();
                if description.contains("insufficient_quota") {
                    return Ok(CompletionReply::QuotaExhausted);
                }
                error!("Completion request failed: {description}");
                anyhow::bail!("completion request failed: {description}");
            }
            Ok(Ok(completion)) => completion,
        };

        let text = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(CompletionReply::Text(text))
    }
}

#[cfg(test)]
pub mod stub {
    //! A scripted backend for exercising completion-driven flows.

    use super::*;
    use std::sync::Mutex;

    pub struct StubBackend {
        replies: Mutex<Vec<Result<CompletionReply>>>,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubBackend {
        /// Replies are consumed in order; further calls error out.
        pub fn with_replies(replies: Vec<Result<CompletionReply>>) -> Self {
            StubBackend {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn text(reply: &str) -> Self {
            Self::with_replies(vec![Ok(CompletionReply::Text(reply.to_string()))])
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<CompletionReply> {
            self.calls.lock().unwrap().push(messages);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                anyhow::bail!("stub backend has no reply scripted");
            }
            replies.remove(0)
        }
    }
}
