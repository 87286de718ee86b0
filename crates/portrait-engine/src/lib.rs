pub mod config;
pub mod orchestrator;
pub mod relay;
pub mod services;

pub use config::StudioConfig;
pub use orchestrator::{style_transform_instruction, Orchestrator};
pub use relay::{RelayServer, RelayShutdown};
pub use services::{GenerationRequest, GenerationResponse, GenerationService, ServiceRegistry};
