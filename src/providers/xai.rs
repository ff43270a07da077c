//! xAI (Grok) book-list generator using the OpenAI-compatible chat API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BookGenerator, Provider, ProviderError, ProviderResult, ServiceContext};
use crate::http_client::{Auth, HttpClient};
use crate::llm::{generation_prompt, parse_generated_books, LlmConfig};
use crate::models::{GeneratedBook, GenerationRequest, ProviderKind};

const CREDENTIAL: &str = "XAI_API_KEY";
const NAME: &str = "xai";
const CONFIDENCE: u8 = 40;

const SYSTEM_PROMPT: &str =
    "You are a literary historian. Answer with valid JSON only, without commentary.";

pub struct XaiProvider {
    http: HttpClient,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl XaiProvider {
    pub fn new(http: HttpClient, config: LlmConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl Provider for XaiProvider {
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
impl BookGenerator for XaiProvider {
    async fn generate_books(
        &self,
        request: &GenerationRequest,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<GeneratedBook>> {
        let key = ctx
            .credential(CREDENTIAL)
            .ok_or(ProviderError::MissingCredential(CREDENTIAL))?;

        let body = ChatRequest {
            model: &self.config.xai_model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: generation_prompt(request),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let url = format!("{}/chat/completions", self.config.xai_endpoint);

        debug!("Requesting {} books from xai for {}-{:02}", request.count, request.year, request.month);
        ctx.record_call(NAME);
        let response: ChatResponse = self.http.post_json(&url, Auth::Bearer(key), &body).await?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Ok(None);
        };
        let books = parse_generated_books(&choice.message.content, NAME)?;
        Ok((!books.is_empty()).then_some(books))
    }
}
