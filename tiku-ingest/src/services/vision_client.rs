//! Hosted vision model client
//!
//! Calls an OpenAI-compatible chat completions endpoint with the worksheet
//! photo attached as a base64 data URL. Requests are spaced by a rate
//! limiter purely out of politeness toward the hosted API; correctness
//! never depends on the spacing.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::services::extractor::{ExtractError, Extractor, RawCandidate};

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_MODEL: &str = "qwen-vl-plus";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 256;
const USER_AGENT: &str = "tiku-ingest/0.1.0";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum interval between extraction requests
pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Extraction rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// Vision extraction client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    /// Politeness delay between requests, in milliseconds
    pub request_delay_ms: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_delay_ms: 500,
        }
    }
}

/// Vision model API client
pub struct VisionClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    settings: VisionSettings,
    api_key: String,
}

impl VisionClient {
    pub fn new(api_key: String, settings: VisionSettings) -> Result<Self, ExtractError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExtractError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(settings.request_delay_ms),
            settings,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl Extractor for VisionClient {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn extract(&self, image: &[u8], prompt: &str) -> Result<RawCandidate, ExtractError> {
        // Rate limit
        self.rate_limiter.wait().await;

        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );

        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: self.settings.max_output_tokens,
        };

        tracing::debug!(
            model = %self.settings.model,
            image_bytes = image.len(),
            "Querying vision API"
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Network(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            return Err(ExtractError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api(status.as_u16(), error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Parse(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::Parse("response has no choices".to_string()))?;

        // A filtered completion is a refusal, not a transport failure
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Ok(RawCandidate {
                text: None,
                refused: true,
            });
        }

        Ok(RawCandidate {
            text: choice.message.content,
            refused: false,
        })
    }
}
