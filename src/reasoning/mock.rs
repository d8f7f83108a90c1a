use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::LlmError;
use super::llm::{Conversation, LanguageModel};

/// Replays scripted completions and records every conversation it receives.
#[derive(Debug, Default)]
pub struct MockLanguageModel {
    responses: Mutex<VecDeque<String>>,
    received: Mutex<Vec<Conversation>>,
    delay: Duration,
}

impl MockLanguageModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Waits `delay` before every completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.received.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }
}

impl LanguageModel for MockLanguageModel {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, conversation: &Conversation) -> Result<String, LlmError> {
        self.received.lock().push(conversation.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed {
                model: "mock".to_string(),
                reason: "no scripted response left".to_string(),
            })
    }
}
