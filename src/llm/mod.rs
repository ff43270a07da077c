//! Shared pieces of the generative providers: configuration, prompts, and
//! response sanitization.

mod prompts;
mod response;

use serde::{Deserialize, Serialize};

pub use prompts::generation_prompt;
pub use response::{parse_generated_books, strip_code_fences};

/// Configuration for generative book-list providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub gemini_endpoint: String,
    pub gemini_model: String,
    pub xai_endpoint: String,
    pub xai_model: String,
    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,
    pub max_tokens: u32,
    /// Books requested per month of backfill.
    pub books_per_month: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            xai_endpoint: "https://api.x.ai/v1".to_string(),
            xai_model: "grok-2-latest".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            books_per_month: 20,
        }
    }
}

impl LlmConfig {
    /// Apply `FOLIO_GEMINI_MODEL`, `FOLIO_XAI_MODEL` and
    /// `FOLIO_BOOKS_PER_MONTH` overrides.
    pub fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(model) = env("FOLIO_GEMINI_MODEL") {
            self.gemini_model = model;
        }
        if let Some(model) = env("FOLIO_XAI_MODEL") {
            self.xai_model = model;
        }
        if let Some(n) = env("FOLIO_BOOKS_PER_MONTH").and_then(|v| v.parse().ok()) {
            self.books_per_month = n;
        }
    }
}
