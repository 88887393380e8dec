//! Google Gemini client used to analyze meals.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use platelog_core::analyzer::{MealAnalyzer, MealRequest};
use platelog_core::error::ServiceError;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATE_METHOD: &str = "generateContent";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inline_data", alias = "inlineData")]
        inline_data: InlineData,
    },
    /// Parts we do not use (thoughts, function calls).
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mime_type", alias = "mimeType")]
    mime_type: String,
    /// Base64-encoded bytes.
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// A model that can be used for meal analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    rt: tokio::runtime::Handle,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Must be called from within a tokio runtime. `timeout` bounds each request.
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "platelog/{} (nutrition tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            rt: tokio::runtime::Handle::try_current()
                .context("Gemini client must be created inside a tokio runtime")?,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(request: &MealRequest) -> GeminiRequest {
        let mut parts = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        if let Some(description) = &request.description {
            parts.push(ContentPart::Text {
                text: format!("Meal: {description}"),
            });
        }
        if let Some(image) = &request.image {
            parts.push(ContentPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.bytes),
                },
            });
        }
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            }),
        }
    }

    fn transport_error(e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout
        } else {
            ServiceError::Transport(e.without_url().to_string())
        }
    }

    pub async fn analyze_async(&self, request: &MealRequest) -> Result<String, ServiceError> {
        let url = format!("{API_BASE_URL}/models/{}:{GENERATE_METHOD}", self.model);
        debug!(model = %self.model, "sending meal to Gemini");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::transport_error)?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(map_api_error(status.as_u16(), &body));
        }

        extract_text(&body)
    }

    /// Models available to this key that support content generation.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(format!("{API_BASE_URL}/models"))
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", "100")]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let response = req.send().await.map_err(Self::transport_error)?;
            let status = response.status();
            let body = response.text().await.map_err(Self::transport_error)?;
            if !status.is_success() {
                return Err(map_api_error(status.as_u16(), &body));
            }

            let page: ModelList = serde_json::from_str(&body).map_err(|e| ServiceError::Api {
                status: status.as_u16(),
                message: format!("unexpected model list: {e}"),
            })?;
            models.extend(generative_models(page.models));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

impl MealAnalyzer for GeminiClient {
    fn analyze(&self, request: &MealRequest) -> Result<String, ServiceError> {
        self.rt.block_on(self.analyze_async(request))
    }
}

fn generative_models(entries: Vec<ModelEntry>) -> impl Iterator<Item = ModelInfo> {
    entries
        .into_iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|g| g == GENERATE_METHOD)
        })
        .map(|m| {
            let name = m.name.strip_prefix("models/").unwrap_or(&m.name).to_string();
            ModelInfo {
                display_name: m.display_name.unwrap_or_else(|| name.clone()),
                name,
            }
        })
}

/// All text parts of the first candidate, concatenated.
fn extract_text(body: &str) -> Result<String, ServiceError> {
    let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
        error!(error = %e, "failed to parse Gemini response");
        ServiceError::Api {
            status: 200,
            message: format!("unparseable response: {e}"),
        }
    })?;

    if let Some(err) = response.error {
        return Err(ServiceError::Api {
            status: 200,
            message: err.message,
        });
    }

    let text: String = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::InlineData { .. } | ContentPart::Other(_) => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::EmptyReply);
    }
    Ok(text)
}

fn map_api_error(status: u16, body: &str) -> ServiceError {
    let message = serde_json::from_str::<GeminiResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.to_string(), |e| e.message);

    match status {
        429 => ServiceError::RateLimited(quota_message(&message)),
        _ => ServiceError::Api { status, message },
    }
}

fn quota_message(message: &str) -> String {
    // e.g. "... Please retry in 6.406453963s."
    if let Some(pos) = message.find("Please retry in ") {
        let after = &message[pos + "Please retry in ".len()..];
        if let Some(end) = after.find('s') {
            if let Ok(seconds) = after[..end].parse::<f64>() {
                #[allow(clippy::cast_sign_loss)]
                let seconds = seconds.ceil() as u64;
                return format!("AI service quota exceeded. Please try again in {seconds} seconds.");
            }
        }
    }
    "AI service quota exceeded. Please wait a moment and try again.".to_string()
}
