//! External integrations module.
//!
//! Provides clients for:
//! - OpenRouter (OpenAI-compatible chat completions)

pub mod openrouter;

pub use openrouter::OpenRouterClient;
