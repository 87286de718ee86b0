use std::sync::Arc;

use anyhow::bail;
use portrait_contracts::{Artifact, GenerationTicket, StudioError, StudioResult};

use crate::config::StudioConfig;
use crate::services::{default_service_registry, GenerationRequest, GenerationService};

const STYLE_TRANSFORM_INSTRUCTION: &str = "CRITICAL INSTRUCTION: Analyze the provided image to understand the character's core features (like face shape, hair style and color, eye color). Your primary task is to completely transform the artistic style of this character based *only* on the text prompt. You MUST IGNORE the original art style of the image (e.g., 2D, anime, cartoon). Re-imagine the character in the new style described in the text. Text prompt: ";

const SERVICE_ERROR_MAX_CHARS: usize = 600;

/// Wraps the user's prompt in the instruction sent alongside a base image.
pub fn style_transform_instruction(prompt: &str) -> String {
    format!("{STYLE_TRANSFORM_INSTRUCTION}{prompt}")
}

/// Turns (prompt, base artifact) into exactly one service call.
///
/// Stateless between calls; cloning shares the underlying service.
#[derive(Clone)]
pub struct Orchestrator {
    service: Arc<dyn GenerationService>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    pub fn from_config(config: &StudioConfig) -> anyhow::Result<Self> {
        let registry = default_service_registry(config);
        let Some(service) = registry.get(&config.provider) else {
            bail!(
                "unknown provider '{}' (available: {})",
                config.provider,
                registry.names().join(", ")
            );
        };
        Ok(Self::new(service))
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_configured()
    }

    pub fn build_request(
        prompt: &str,
        base_artifact: Option<&Artifact>,
    ) -> StudioResult<GenerationRequest> {
        let Some(base) = base_artifact else {
            return Ok(GenerationRequest {
                prompt: prompt.to_string(),
                text: prompt.to_string(),
                base_image: None,
            });
        };
        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            text: style_transform_instruction(prompt),
            base_image: Some(base.split()?),
        })
    }

    pub fn generate(&self, prompt: &str, base_artifact: Option<&Artifact>) -> StudioResult<Artifact> {
        let request = Self::build_request(prompt, base_artifact)?;
        let response = self
            .service
            .send(&request)
            .map_err(|err| StudioError::service_fault(&err, SERVICE_ERROR_MAX_CHARS))?;
        let image = response
            .images
            .into_iter()
            .next()
            .ok_or(StudioError::NoImageReturned)?;
        Ok(Artifact::from_inline(&image))
    }

    pub fn run_ticket(&self, ticket: &GenerationTicket) -> StudioResult<Artifact> {
        self.generate(&ticket.prompt, ticket.base_artifact.as_ref())
    }
}
