use std::time::Duration;

use anyhow::{bail, Context, Result};
use portrait_contracts::InlineImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{response_json_or_error, GenerationRequest, GenerationResponse, GenerationService};
use crate::config::StudioConfig;

/// Direct calls to the Gemini `generateContent` endpoint with image output.
pub struct GeminiService {
    api_base: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiService {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts = Vec::new();
        if let Some(base) = request.base_image.as_ref() {
            parts.push(json!({
                "inlineData": {
                    "mimeType": base.media_type,
                    "data": base.data,
                }
            }));
        }
        parts.push(json!({ "text": request.text }));
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        })
    }

    fn extract_images(response_payload: &Value) -> Vec<InlineImage> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let media_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                out.push(InlineImage {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                });
            }
        }
        out
    }
}

impl GenerationService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn send(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);
        tracing::info!(
            model = %self.model,
            with_base_image = request.base_image.is_some(),
            "sending Gemini image request"
        );

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;

        Ok(GenerationResponse {
            images: Self::extract_images(&response_payload),
        })
    }
}
