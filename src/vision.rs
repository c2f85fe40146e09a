// src/vision.rs

use crate::config::{VisionSection, secret_from_env};
use crate::error::DependencyError;
use crate::models::WasteItem;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Classifies the waste items visible in a photo.
#[async_trait]
pub trait VisionClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Vec<WasteItem>, DependencyError>;
}

/// The prompt that pins the model to our label and route vocabulary.
const CLASSIFY_PROMPT: &str = r#"Classify waste items in the image.
Return ONLY a JSON array. Each entry:
{"label":"plastic_bottle|aluminum_can|glass_jar|clean_cardboard|pizza_box_greasy|food_waste|plastic_bag|trash_other",
 "route":"recycle|compost|landfill",
 "confidence":0.0-1.0,
 "est_weight_kg": float}
Sorting rules:
- greasy pizza box -> landfill
- plastic bag -> landfill (or store drop-off)
- food scraps -> compost
- clean cardboard -> recycle
No markdown fences, no commentary."#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Vision model behind an OpenAI-compatible `/chat/completions` endpoint
/// (Ollama, vLLM, hosted APIs).
pub struct ChatVisionClassifier {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
}

impl ChatVisionClassifier {
    pub fn new(cfg: &VisionSection) -> Self {
        info!(url = %cfg.base_url, model = %cfg.model, "Vision classifier configured");
        Self {
            client: Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: secret_from_env(&cfg.api_key_env),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

#[async_trait]
impl VisionClassifier for ChatVisionClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<WasteItem>, DependencyError> {
        let data_url = format!("data:{};base64,{}", sniff_image_mime(image), BASE64.encode(image));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: CLASSIFY_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).timeout(self.timeout).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(DependencyError::transport("vision"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::Status {
                service: "vision",
                status,
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::malformed("vision", e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| DependencyError::malformed("vision", "empty choices"))?;

        debug!(reply_len = content.len(), "Vision reply received");
        parse_classification(content)
    }
}

/// Parse the model's reply into items.
///
/// Models like to wrap the array in prose or fences, so everything outside
/// the first `[` and the last `]` is discarded first.
pub fn parse_classification(reply: &str) -> Result<Vec<WasteItem>, DependencyError> {
    let json_str = extract_json_array(reply)?;
    let items: Vec<WasteItem> = serde_json::from_str(json_str).map_err(|e| {
        DependencyError::malformed("vision", format!("{e}; raw: {json_str}"))
    })?;
    Ok(items.into_iter().map(WasteItem::clamped).collect())
}

fn extract_json_array(s: &str) -> Result<&str, DependencyError> {
    let start = s
        .find('[')
        .ok_or_else(|| DependencyError::malformed("vision", "no '[' in reply"))?;
    let end = s
        .rfind(']')
        .ok_or_else(|| DependencyError::malformed("vision", "no ']' in reply"))?;
    if end <= start {
        return Err(DependencyError::malformed("vision", "brackets out of order"));
    }
    Ok(&s[start..=end])
}

/// Best-effort MIME type from magic bytes; JPEG when unsure.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}
