use async_trait::async_trait;

pub mod categorize;
pub mod draft;
pub mod gemini;

pub use categorize::{classify_batch, EmailSummary};
pub use draft::generate_reply;
pub use gemini::GeminiClient;

/// Single-turn prompt to text completion
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> anyhow::Result<String>;
}
