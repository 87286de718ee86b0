mod dryrun;
mod gemini;
mod relay_client;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use portrait_contracts::error::clip;
use portrait_contracts::InlineImage;
use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;

use crate::config::StudioConfig;

pub use dryrun::DryrunService;
pub use gemini::GeminiService;
pub use relay_client::RelayService;

/// One request to the external image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The user's prompt as typed.
    pub prompt: String,
    /// Text part sent to the model: the prompt itself, or the style-transform
    /// instruction wrapping it when a base image is attached.
    pub text: String,
    pub base_image: Option<InlineImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub images: Vec<InlineImage>,
}

/// An external image-generation backend. Implementations send exactly one
/// request per call and never retry.
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend has what it needs (credentials, endpoint) to be called.
    fn is_configured(&self) -> bool {
        true
    }

    fn send(&self, request: &GenerationRequest) -> Result<GenerationResponse>;
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<dyn GenerationService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: GenerationService + 'static>(&mut self, service: S) {
        self.services
            .insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationService>> {
        self.services.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

pub fn default_service_registry(config: &StudioConfig) -> ServiceRegistry {
    let mut services = ServiceRegistry::new();
    services.register(DryrunService);
    services.register(GeminiService::new(config));
    services.register(RelayService::new(config));
    services
}

pub(crate) fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{service} response body read failed"))?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|payload| error_message_from_payload(&payload))
            .unwrap_or_else(|| clip(&body, 512));
        bail!("{service} request failed ({code}): {detail}");
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{service} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Pulls a message out of `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message_from_payload(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_registry_lists_services_by_name() {
        let registry = default_service_registry(&StudioConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini", "relay"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn error_message_reads_string_and_object_forms() {
        assert_eq!(
            error_message_from_payload(&json!({"error": "Prompt is required"})).as_deref(),
            Some("Prompt is required")
        );
        assert_eq!(
            error_message_from_payload(&json!({"error": {"code": 400, "message": "bad key"}}))
                .as_deref(),
            Some("bad key")
        );
        assert_eq!(error_message_from_payload(&json!({"ok": true})), None);
    }
}
