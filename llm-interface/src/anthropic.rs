use crate::RelevanceScorer;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use scraper_core::{AnthropicConfig, CoreError, ErrorExt, LlmError};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";
const MAX_TOKENS: u32 = 8;

const SYSTEM_PROMPT: &str = "You are a scoring function. Given a user query and a content snippet, \
return ONLY a floating point relevance score between 0 and 1.";

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-1](?:\.\d+)?").expect("score pattern is valid"));

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Extracts the first `0`/`1`-led decimal in `text` and clamps it to `[0, 1]`.
pub fn parse_score(text: &str) -> Option<f64> {
    let found = SCORE_PATTERN.find(text)?;
    let value: f64 = found.as_str().parse().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Relevance scorer backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicScorer {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl AnthropicScorer {
    pub fn new(api_key: impl Into<String>) -> Result<Self, CoreError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key,
            http,
            base_url: scraper_core::DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            model: scraper_core::DEFAULT_ANTHROPIC_MODEL.to_string(),
        })
    }

    pub fn from_config(config: &AnthropicConfig) -> Result<Self, CoreError> {
        Ok(Self::new(config.api_key()?)?
            .with_base_url(&config.base_url)
            .with_model(&config.model))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|_| LlmError::InvalidApiKey {
            provider: PROVIDER.to_string(),
        })?;
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn request_score(&self, query: &str, content: &str) -> Result<f64, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![WireMessage {
                role: "user",
                content: format!("Query: {}\nContent: {}\nScore:", query, content),
            }],
        };

        debug!(model = %self.model, "Anthropic scoring request");

        let transport = |e: reqwest::Error| LlmError::Transport {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponseFormat {
                    provider: PROVIDER.to_string(),
                    details: e.to_string(),
                })?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .unwrap_or_default();

        parse_score(&text).ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: format!("no score in completion {:?}", text),
        })
    }
}

#[async_trait]
impl RelevanceScorer for AnthropicScorer {
    async fn score(&self, query: &str, content: &str) -> f64 {
        match self.request_score(query, content).await {
            Ok(score) => score,
            Err(e) => {
                e.log_warn();
                0.0
            }
        }
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
