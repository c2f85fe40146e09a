// src/writer.rs

use crate::config::{WriterSection, secret_from_env};
use crate::error::DependencyError;
use crate::kpi::KpiState;
use crate::models::{Route, WasteLabel};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Short natural-language copy: per-item sorting tips and KPI summaries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn tip(&self, label: WasteLabel, route: Route) -> Result<String, DependencyError>;

    async fn kpi_summary(&self, kpis: &KpiState) -> Result<String, DependencyError>;
}

/// Deterministic tip used when the generator is absent or fails.
pub fn template_tip(label: WasteLabel, route: Route) -> String {
    format!("Place {} in the {} bin.", label.display_name(), route.as_str())
}

/// Deterministic summary used when the generator is absent or fails.
pub fn template_summary(kpis: &KpiState) -> String {
    format!(
        "Diversion {:.1}%. Reduce landfill by targeting top contaminants next week.",
        kpis.diversion_rate * 100.0
    )
}

fn tip_prompt(label: WasteLabel, route: Route) -> String {
    format!(
        "Write one friendly instruction (<=18 words) for a resident sorting waste.\n\
         Item: {}\nCorrect bin: {}\n\
         Constraints: short, specific, no emojis, imperative voice. Return plain text only.",
        label.display_name(),
        route.as_str()
    )
}

fn summary_prompt(kpis: &KpiState) -> String {
    let json = serde_json::to_string(kpis).unwrap_or_default();
    format!(
        "Summarize these waste KPIs for facilities ops in 2 sentences, direct and actionable.\n\
         JSON input:\n{json}\n\
         Rules: No emojis. Mention diversion % and one concrete next step. Return plain text."
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
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
    content: String,
}

/// Writer-style chat API (`POST {base_url}/chat`).
///
/// Without an API key no request is ever made: both operations answer with
/// the local templates.
pub struct WriterClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl WriterClient {
    pub fn new(cfg: &WriterSection) -> Self {
        Self::with_key(cfg, secret_from_env(&cfg.api_key_env))
    }

    pub fn with_key(cfg: &WriterSection, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String, DependencyError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(DependencyError::transport("writer"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::Status {
                service: "writer",
                status,
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::malformed("writer", e.to_string()))?;
        let text = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(DependencyError::malformed("writer", "empty completion"));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for WriterClient {
    async fn tip(&self, label: WasteLabel, route: Route) -> Result<String, DependencyError> {
        match &self.api_key {
            Some(key) => self.complete(key, &tip_prompt(label, route)).await,
            None => Ok(template_tip(label, route)),
        }
    }

    async fn kpi_summary(&self, kpis: &KpiState) -> Result<String, DependencyError> {
        match &self.api_key {
            Some(key) => self.complete(key, &summary_prompt(kpis)).await,
            None => Ok(template_summary(kpis)),
        }
    }
}
