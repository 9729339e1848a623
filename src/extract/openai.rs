//! OpenAI extraction via the Responses API.
//!
//! Attachments are uploaded to `/v1/files` first, then referenced as
//! `input_file` items in a `/v1/responses` call constrained to the strict
//! five-field output schema. The response text can arrive in three shapes:
//! a flat `output_text`, `output_text`-typed content blocks inside `message`
//! items, or a pre-parsed payload on the first content block.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::ExtractError;

use super::DecisionExtractor;
use super::decision::{DecisionData, parse_decision};

const API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct OpenAiExtractor {
    api_key: Option<SecretString>,
    default_model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiExtractor {
    pub fn new(api_key: Option<SecretString>, default_model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, default_model, API_BASE)
    }

    /// Same as [`new`](Self::new), pointed at a different API base URL.
    pub fn with_base_url(
        api_key: Option<SecretString>,
        default_model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            default_model: default_model.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&SecretString, ExtractError> {
        self.api_key
            .as_ref()
            .ok_or(ExtractError::MissingCredential("OPENAI_API_KEY"))
    }

    /// Upload one attachment, returning the provider's file id.
    async fn upload_file(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractError::Upload {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment.pdf")
            .to_string();

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("purpose", "batch");

        let resp = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(self.api_key()?.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ExtractError::Api {
                status: status.as_u16(),
                body,
            });
        }

        #[derive(Deserialize)]
        struct FileRef {
            id: String,
        }
        let file: FileRef =
            serde_json::from_str(&body).map_err(|e| ExtractError::Parse(e.to_string()))?;
        Ok(file.id)
    }
}

#[async_trait]
impl DecisionExtractor for OpenAiExtractor {
    async fn extract(
        &self,
        system_prompt: &str,
        attachment_paths: &[PathBuf],
        model: &str,
    ) -> Result<DecisionData, ExtractError> {
        let api_key = self.api_key()?.clone();

        let model = model.trim();
        let model = if model.is_empty() {
            self.default_model.as_str()
        } else {
            model
        };

        let mut input = Vec::new();
        for path in attachment_paths {
            let file_id = self.upload_file(path).await?;
            debug!(file_id = %file_id, path = %path.display(), "uploaded attachment");
            input.push(json!({"type": "input_file", "file_id": file_id}));
        }

        let body = json!({
            "model": model,
            "input": input,
            "instructions": system_prompt,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "ExtractedData",
                    "strict": true,
                    "schema": output_schema(),
                }
            },
        });

        let url = format!("{}/responses", self.base_url);
        let mut response = None;
        let mut last_err = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self
                .client
                .post(&url)
                .bearer_auth(api_key.expose_secret())
                .timeout(REQUEST_TIMEOUT)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => {
                    response = Some(resp);
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "extraction request failed");
                    last_err = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        let resp = response.ok_or_else(|| ExtractError::NoResponse {
            attempts: RETRY_ATTEMPTS,
            reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })?;

        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() >= 400 {
            return Err(ExtractError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: ResponsesPayload =
            serde_json::from_str(&text).map_err(|e| ExtractError::Parse(e.to_string()))?;

        parse_decision(&decision_text(&payload)?)
    }
}

/// The strict output schema sent with every extraction request.
fn output_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["username", "email", "agencyName", "referenceNumber", "date"],
        "properties": {
            "username": {"type": "string"},
            "email": {"type": "string"},
            "agencyName": {"type": "string"},
            "referenceNumber": {"type": "string"},
            "date": {"type": "string", "format": "date-time"},
        },
        "additionalProperties": false,
    })
}

// ── Response payload shapes ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output_text: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: TextContent,
}

/// Accepts both the documented object shape and plain strings.
#[derive(Debug, Default)]
struct TextContent {
    value: String,
    parsed: Option<serde_json::Value>,
}

impl<'de> Deserialize<'de> for TextContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => TextContent {
                value: s,
                parsed: None,
            },
            serde_json::Value::Object(mut map) => {
                let parsed = map.remove("parsed").filter(|v| !v.is_null());
                let value = match map.remove("value") {
                    Some(serde_json::Value::String(s)) if !s.is_empty() => s,
                    _ => match map.remove("text") {
                        Some(serde_json::Value::String(s)) => s,
                        _ => String::new(),
                    },
                };
                TextContent { value, parsed }
            }
            _ => TextContent::default(),
        })
    }
}

/// Locate the decision text in a Responses API payload.
///
/// Order of preference: flat `output_text`; concatenated `output_text`
/// content blocks of `message` items; the first block's pre-parsed payload.
fn decision_text(payload: &ResponsesPayload) -> Result<String, ExtractError> {
    if !payload.output_text.is_empty() {
        return Ok(payload.output_text.clone());
    }

    let mut parts = Vec::new();
    for item in &payload.output {
        if item.kind != "message" {
            continue;
        }
        for block in &item.content {
            if block.kind == "output_text" && !block.text.value.is_empty() {
                parts.push(block.text.value.as_str());
            }
        }
    }
    if !parts.is_empty() {
        return Ok(parts.join("\n"));
    }

    if let Some(parsed) = payload
        .output
        .first()
        .and_then(|item| item.content.first())
        .and_then(|block| block.text.parsed.as_ref())
    {
        return Ok(parsed.to_string());
    }

    Err(ExtractError::EmptyResponse)
}
