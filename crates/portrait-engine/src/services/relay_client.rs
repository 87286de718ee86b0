use std::time::Duration;

use anyhow::{Context, Result};
use portrait_contracts::Artifact;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{response_json_or_error, GenerationRequest, GenerationResponse, GenerationService};
use crate::config::StudioConfig;

/// Client for a generation relay: `POST {prompt, baseImage}` → `{imageUrl}`.
///
/// The relay holds the API key and applies the style-transform instruction
/// itself, so only the raw prompt and the base data URL travel.
pub struct RelayService {
    url: String,
    timeout: Duration,
    http: HttpClient,
}

impl RelayService {
    pub fn new(config: &StudioConfig) -> Self {
        Self::with_url(config.relay_url.clone(), config.request_timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_body(request: &GenerationRequest) -> Value {
        json!({
            "prompt": request.prompt,
            "baseImage": request
                .base_image
                .as_ref()
                .map(|image| Value::String(Artifact::from_inline(image).into_string()))
                .unwrap_or(Value::Null),
        })
    }
}

impl GenerationService for RelayService {
    fn name(&self) -> &str {
        "relay"
    }

    fn send(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        tracing::info!(url = %self.url, "sending relay generation request");
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&Self::build_body(request))
            .send()
            .with_context(|| format!("Relay request failed ({})", self.url))?;
        let payload = response_json_or_error("Relay", response)?;

        let Some(image_url) = payload.get("imageUrl").and_then(Value::as_str) else {
            return Ok(GenerationResponse::default());
        };
        let image = Artifact::from_data_url(image_url)
            .split()
            .context("Relay returned an imageUrl that is not a data URL")?;
        Ok(GenerationResponse {
            images: vec![image],
        })
    }
}

#[cfg(test)]
mod tests {
    use portrait_contracts::InlineImage;
    use serde_json::json;

    use super::*;

    #[test]
    fn body_carries_raw_prompt_and_data_url() {
        let request = GenerationRequest {
            prompt: "red coat".to_string(),
            text: "CRITICAL INSTRUCTION ... red coat".to_string(),
            base_image: Some(InlineImage {
                media_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            }),
        };
        assert_eq!(
            RelayService::build_body(&request),
            json!({"prompt": "red coat", "baseImage": "data:image/png;base64,AAAA"})
        );
    }

    #[test]
    fn body_without_base_sends_null() {
        let request = GenerationRequest {
            prompt: "p".to_string(),
            text: "p".to_string(),
            base_image: None,
        };
        assert_eq!(
            RelayService::build_body(&request),
            json!({"prompt": "p", "baseImage": null})
        );
    }
}
