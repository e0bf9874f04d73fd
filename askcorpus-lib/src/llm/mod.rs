//! Language-model generation
//!
//! The responder only needs one capability from a language model: turn a
//! rendered prompt into text. Anything implementing [`Generator`] can be
//! plugged in.
//!
//! # Providers
//!
//! - [`ChatCompletionsClient`]: OpenAI-compatible `/chat/completions`
//!   endpoint (Groq by default)
//! - [`RecordingGenerator`]: canned replies that records every prompt,
//!   for tests and dry runs

use crate::Result;

/// A text generator driven by a single prompt.
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    /// Provider failures (auth, rate limit, network, malformed reply) are
    /// reported as [`crate::Error::Generation`].
    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

mod chat;
mod recording;

pub use chat::*;
pub use recording::*;
