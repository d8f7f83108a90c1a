//! Chat-model access.

use std::future::Future;

use futures_util::StreamExt;
use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent};
use tracing::debug;

use super::error::LlmError;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A system prompt followed by alternating turns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    pub system: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
        }
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role: Role::User,
            content: content.into(),
        });
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role: Role::Assistant,
            content: content.into(),
        });
        self
    }

    /// Content of the last user turn.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    fn to_chat_request(&self) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::system(self.system.clone()));
        messages.extend(self.messages.iter().map(|m| match m.role {
            Role::User => ChatMessage::user(m.content.clone()),
            Role::Assistant => ChatMessage::assistant(m.content.clone()),
        }));
        ChatRequest::new(messages)
    }
}

/// Produces a single text completion for a conversation.
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn complete(
        &self,
        conversation: &Conversation,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// [`LanguageModel`] backed by any provider `genai` can resolve from the model name.
pub struct GenaiModel {
    client: Client,
    model: String,
    options: ChatOptions,
    stream: bool,
}

impl std::fmt::Debug for GenaiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaiModel")
            .field("model", &self.model)
            .field("stream", &self.stream)
            .finish()
    }
}

impl GenaiModel {
    pub fn new(model: impl Into<String>, temperature: f64, stream: bool) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
            options: ChatOptions::default().with_temperature(temperature),
            stream,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_model.clone(),
            config.llm_temperature,
            config.llm_stream,
        )
    }

    fn request_failed(&self, e: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            model: self.model.clone(),
            reason: e.to_string(),
        }
    }

    async fn complete_atomic(&self, request: ChatRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .exec_chat(&self.model, request, Some(&self.options))
            .await
            .map_err(|e| self.request_failed(e))?;

        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model.clone(),
            })
    }

    async fn complete_streamed(&self, request: ChatRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .exec_chat_stream(&self.model, request, Some(&self.options))
            .await
            .map_err(|e| self.request_failed(e))?;

        let mut stream = response.stream;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            if let ChatStreamEvent::Chunk(chunk) = event.map_err(|e| self.request_failed(e))? {
                text.push_str(&chunk.content);
            }
        }

        if text.is_empty() {
            return Err(LlmError::EmptyResponse {
                model: self.model.clone(),
            });
        }
        Ok(text)
    }
}

impl LanguageModel for GenaiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, conversation: &Conversation) -> Result<String, LlmError> {
        let request = conversation.to_chat_request();
        debug!(
            model = %self.model,
            turns = conversation.messages.len(),
            stream = self.stream,
            "Sending chat request"
        );

        if self.stream {
            self.complete_streamed(request).await
        } else {
            self.complete_atomic(request).await
        }
    }
}
