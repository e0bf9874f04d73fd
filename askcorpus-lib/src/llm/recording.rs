use std::sync::{Arc, Mutex};

use crate::llm::Generator;
use crate::{Error, Result};

/// Generator with a fixed reply that keeps every prompt it was given.
///
/// Clones share the same prompt log, so a test can hand one clone to a
/// responder and inspect the other.
#[derive(Debug, Clone)]
pub struct RecordingGenerator {
    reply: String,
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingGenerator {
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            prompts: Arc::default(),
        }
    }

    /// A generator whose every call fails with [`Error::Generation`].
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    /// Number of `generate` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.prompts.lock().map_or(0, |p| p.len())
    }

    /// Prompts received, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for RecordingGenerator {
    fn default() -> Self {
        Self::new("recorded answer")
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(Error::Generation("recording generator set to fail".to_string()));
        }
        Ok(self.reply.clone())
    }
}
