//! Google Gemini book-list generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BookGenerator, Provider, ProviderError, ProviderResult, ServiceContext};
use crate::http_client::{Auth, HttpClient};
use crate::llm::{generation_prompt, parse_generated_books, LlmConfig};
use crate::models::{GeneratedBook, GenerationRequest, ProviderKind};

const CREDENTIAL: &str = "GEMINI_API_KEY";
const NAME: &str = "gemini";
const CONFIDENCE: u8 = 40;

pub struct GeminiProvider {
    http: HttpClient,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

impl GeminiProvider {
    pub fn new(http: HttpClient, config: LlmConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ai
    }

    fn confidence(&self) -> u8 {
        CONFIDENCE
    }

    async fn is_available(&self, ctx: &ServiceContext) -> bool {
        ctx.credentials().is_set(CREDENTIAL)
    }

    fn as_book_generator(&self) -> Option<&dyn BookGenerator> {
        Some(self)
    }
}

#[async_trait]
impl BookGenerator for GeminiProvider {
    async fn generate_books(
        &self,
        request: &GenerationRequest,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<GeneratedBook>> {
        let key = ctx
            .credential(CREDENTIAL)
            .ok_or(ProviderError::MissingCredential(CREDENTIAL))?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: generation_prompt(request),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
                response_mime_type: "application/json",
            },
        };
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.gemini_endpoint, self.config.gemini_model
        );

        debug!("Requesting {} books from gemini for {}-{:02}", request.count, request.year, request.month);
        ctx.record_call(NAME);
        let response: GenerateResponse = self
            .http
            .post_json(&url, Auth::Header("x-goog-api-key", key), &body)
            .await?;

        let Some(text) = response.text() else {
            return Ok(None);
        };
        let books = parse_generated_books(&text, NAME)?;
        Ok((!books.is_empty()).then_some(books))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "```json\n[{\"title\": "}, {"text": "\"Dune\"}]\n```"}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        let books = parse_generated_books(&response.text().unwrap(), NAME).unwrap();
        assert_eq!(books[0].title, "Dune");
    }

    #[test]
    fn test_empty_candidates_have_no_text() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(response.text().is_none());
    }
}
