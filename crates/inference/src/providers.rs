//! HTTP clients for prescription-suggestion providers.
//!
//! Two wire protocols cover every supported provider: OpenAI-style chat
//! completions and Gemini `generateContent`. Prompt text and answer
//! parsing live in [`retina_core::suggestions`].

use std::time::Duration;

use retina_core::suggestions::{
    self, ApiStyle, ClinicalPayload, PrescriptionSuggestions, Provider, STRICT_JSON_SUFFIX,
};
use serde_json::{json, Value};

/// Provider calls are abandoned after this long.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Errors from the suggestion-provider layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered without usable text.
    #[error("Provider returned no content: {0}")]
    EmptyResponse(String),

    /// The setting cannot be called as stored (e.g. custom without URL).
    #[error("Provider misconfigured: {0}")]
    Config(String),
}

/// A decrypted model setting, ready to call.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub provider: Provider,
    pub base_url: Option<String>,
    pub model_name: String,
    pub api_key: String,
    pub temperature: f64,
    pub max_tokens: i32,
}

impl SuggestionRequest {
    fn resolved_base_url(&self) -> Result<String, ProviderError> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or(self.provider.default_base_url())
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                ProviderError::Config(format!("{} requires a base URL", self.provider.as_str()))
            })
    }
}

/// Shared client for all provider calls.
#[derive(Clone)]
pub struct SuggestionClient {
    client: reqwest::Client,
}

impl Default for SuggestionClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
    }
}

impl SuggestionClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build provider HTTP client");
        Self { client }
    }

    /// Ask the provider for suggestions on `payload` and parse its answer.
    pub async fn generate(
        &self,
        request: &SuggestionRequest,
        payload: &ClinicalPayload,
    ) -> Result<PrescriptionSuggestions, ProviderError> {
        let user = suggestions::user_prompt(payload);
        let content = match request.provider.api_style() {
            ApiStyle::ChatCompletions => self.chat_completion(request, &user).await?,
            ApiStyle::GenerateContent => self.generate_content(request, &user).await?,
        };
        tracing::info!(
            provider = request.provider.as_str(),
            model = %request.model_name,
            chars = content.len(),
            "Suggestions received"
        );
        Ok(suggestions::parse_response(&content))
    }

    async fn chat_completion(
        &self,
        request: &SuggestionRequest,
        user: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", request.resolved_base_url()?);
        let response = self
            .client
            .post(url)
            .bearer_auth(&request.api_key)
            .json(&chat_body(request, user))
            .send()
            .await?;
        let body = Self::parse_response(response).await?;
        chat_content(&body)
    }

    async fn generate_content(
        &self,
        request: &SuggestionRequest,
        user: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            request.resolved_base_url()?,
            request.model_name
        );
        let response = self
            .client
            .post(url)
            .query(&[("key", request.api_key.as_str())])
            .json(&gemini_body(request, user))
            .send()
            .await?;
        let body = Self::parse_response(response).await?;
        gemini_content(&body)
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

fn chat_body(request: &SuggestionRequest, user: &str) -> Value {
    json!({
        "model": request.model_name,
        "messages": [
            { "role": "system", "content": suggestions::system_prompt() },
            { "role": "user", "content": user },
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

fn gemini_body(request: &SuggestionRequest, user: &str) -> Value {
    let text = format!("{}{STRICT_JSON_SUFFIX}\n\n{user}", suggestions::system_prompt());
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        },
    })
}

/// `choices[0].message.content`.
fn chat_content(body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::EmptyResponse("no choices in response".to_string()))
}

/// Concatenated text parts of the first candidate. Safety, recitation and
/// truncation stops are reported as errors.
fn gemini_content(body: &Value) -> Result<String, ProviderError> {
    let candidate = body
        .pointer("/candidates/0")
        .ok_or_else(|| ProviderError::EmptyResponse("no candidates in response".to_string()))?;

    match candidate.get("finishReason").and_then(Value::as_str) {
        Some("SAFETY") => {
            return Err(ProviderError::EmptyResponse(
                "declined due to safety filters".to_string(),
            ))
        }
        Some("RECITATION") => {
            return Err(ProviderError::EmptyResponse(
                "blocked by recitation policy".to_string(),
            ))
        }
        Some("MAX_TOKENS") => {
            return Err(ProviderError::EmptyResponse(
                "truncated at the token limit".to_string(),
            ))
        }
        _ => {}
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse(
            "empty candidate content".to_string(),
        ));
    }
    Ok(text)
}
