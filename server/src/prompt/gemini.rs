use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::{rate_limiters::RateLimiters, server_config::cfg, HttpClient};

const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<i64>,
    #[serde(default)]
    pub candidates_token_count: Option<i64>,
    #[serde(default)]
    pub total_token_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiApiError {
    pub error: GeminiApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GeminiApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GeminiApiErrorDetail {
    fn is_rate_limit(&self) -> bool {
        self.code == 429 || self.status.as_deref() == Some(RESOURCE_EXHAUSTED)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateContentResponseOrError {
    Error(GeminiApiError),
    Response(GenerateContentResponse),
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    api_base: String,
    model_id: String,
    api_key: String,
    rate_limiters: RateLimiters,
}

impl GeminiClient {
    pub fn new(
        http_client: HttpClient,
        api_base: impl Into<String>,
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiters: RateLimiters,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            model_id: model_id.into(),
            api_key: api_key.into(),
            rate_limiters,
        }
    }

    pub fn from_config(http_client: HttpClient, rate_limiters: RateLimiters) -> Self {
        Self::new(
            http_client,
            cfg.model.api_base.clone(),
            cfg.model.id.clone(),
            cfg.secrets.gemini_api_key.clone(),
            rate_limiters,
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model_id
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> anyhow::Result<String> {
        self.rate_limiters.acquire_one().await;

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        let resp = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Model request failed")?;

        let status = resp.status();
        let resp = resp
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("Unreadable model response, status {}", status))?;

        let parsed = serde_json::from_value::<GenerateContentResponseOrError>(resp.clone())
            .context(format!("Could not parse model response: {}", resp))?;

        let parsed = match parsed {
            GenerateContentResponseOrError::Error(GeminiApiError { error }) => {
                if error.is_rate_limit() {
                    self.rate_limiters.trigger_backoff();
                }
                return Err(anyhow!(
                    "Model API error {} {}: {}",
                    error.code,
                    error.status.unwrap_or_default(),
                    error.message
                ));
            }
            GenerateContentResponseOrError::Response(parsed) => parsed,
        };

        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!("Model usage: {:?} tokens", usage.total_token_count);
        }

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(anyhow!("Model returned no text"));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, rate_limiters: RateLimiters) -> GeminiClient {
        GeminiClient::new(
            HttpClient::new(),
            format!("{}/v1beta", server.uri()),
            "gemini-2.5-flash",
            "test-key",
            rate_limiters,
        )
    }

    fn limiters() -> RateLimiters {
        RateLimiters::new(10, 10, 10, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "\"FYI\"}"}], "role": "model"}}],
                "usageMetadata": {"totalTokenCount": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, limiters()).generate("hello", 0.5).await.unwrap();
        assert_eq!(text, "{\"a\":\"FYI\"}");
    }

    #[tokio::test]
    async fn test_rate_limit_error_trips_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let rate_limiters = limiters();
        let result = client(&server, rate_limiters.clone()).generate("hi", 0.3).await;
        assert!(result.is_err());
        assert!(rate_limiters.is_backing_off());
    }

    #[tokio::test]
    async fn test_empty_candidates_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let result = client(&server, limiters()).generate("hi", 0.3).await;
        assert!(result.is_err());
    }
}
