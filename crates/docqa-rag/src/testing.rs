//! Test doubles shared by the unit tests of this crate

use async_trait::async_trait;
use docqa_core::{DocQaError, LlmClient, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// LLM that echoes a canned answer and records every prompt it receives
#[derive(Default)]
pub struct RecordingLlm {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl RecordingLlm {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Answers only after `delay`
    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(DocQaError::TransientProvider {
                provider: "recording".to_string(),
                message: "model overloaded".to_string(),
            });
        }
        Ok("The documents describe the main topic in detail.".to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
