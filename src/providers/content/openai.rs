//! OpenAI-compatible content generator.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, and other compatible endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::traits::{
    reply_subject, ContentError, ContentGenerator, ContentKind, ContentRequest, ContentResult,
    GeneratedMessage,
};

/// Default base URL for OpenAI API.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You write short, casual emails between coworkers at small startups. \
    Keep it under 60 words, plain text, no signatures, no placeholders. \
    Sound like a real person dashing off a note, not a marketer.";

/// OpenAI API request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiGenerator {
    /// Creates a generator for OpenAI's API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: Some(api_key.into()),
            model: model.into(),
        }
    }

    /// Creates a generator for a custom endpoint.
    pub fn custom(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn build_prompt(request: &ContentRequest) -> String {
        match &request.kind {
            ContentKind::Opener => format!(
                "Write an email from {sender} to their acquaintance {recipient}. \
                 Something light: a question about work, a link they'd enjoy, plans for coffee. \
                 First line must be exactly `Subject: <subject>`, then a blank line, then the body.",
                sender = request.sender_name,
                recipient = request.recipient_name,
            ),
            ContentKind::Reply {
                original_subject,
                original_body,
            } => format!(
                "{recipient} received this email from {sender}:\n\
                 Subject: {subject}\n\n{body}\n\n\
                 Write {recipient}'s reply. Body text only, no subject line.",
                sender = request.sender_name,
                recipient = request.recipient_name,
                subject = original_subject,
                body = original_body,
            ),
        }
    }

    fn parse_response(request: &ContentRequest, text: &str) -> ContentResult<GeneratedMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContentError::InvalidResponse("empty completion".to_string()));
        }

        match &request.kind {
            ContentKind::Opener => {
                let (first_line, rest) = text.split_once('\n').ok_or_else(|| {
                    ContentError::InvalidResponse("missing body after subject".to_string())
                })?;
                let subject = first_line
                    .trim()
                    .strip_prefix("Subject:")
                    .map(str::trim)
                    .ok_or_else(|| {
                        ContentError::InvalidResponse("missing Subject: line".to_string())
                    })?;
                if subject.is_empty() {
                    return Err(ContentError::InvalidResponse("empty subject".to_string()));
                }
                Ok(GeneratedMessage {
                    subject: subject.to_string(),
                    body: rest.trim().to_string(),
                })
            }
            ContentKind::Reply {
                original_subject, ..
            } => Ok(GeneratedMessage {
                subject: reply_subject(original_subject),
                body: text.to_string(),
            }),
        }
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> ContentError {
        let status = response.status().as_u16();

        if let Ok(error) = response.json::<ApiErrorResponse>().await {
            return ContentError::Api {
                status,
                message: error.error.message,
            };
        }

        ContentError::Api {
            status,
            message: format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(&self, request: &ContentRequest) -> ContentResult<GeneratedMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(request),
                },
            ],
            temperature: 0.9,
            max_tokens: 200,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ContentError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ContentError::InvalidResponse("No choices in response".to_string()))?;

        Self::parse_response(request, &text)
    }
}
