//! Upstream model providers.

mod openai;

pub use openai::{OpenAiBackend, OpenAiConfig};
