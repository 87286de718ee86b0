//! HTTP relay in front of the image model.
//!
//! Serves `POST /api/generate` with a `{prompt, baseImage}` JSON body and
//! answers `{imageUrl}` or `{error}`, so a client never holds the API key.
//! Requests are handled one at a time on the serving thread.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use portrait_contracts::{Artifact, StudioError};
use serde_json::{json, Value};
use tiny_http::{Header, Request, Response, Server};

use crate::orchestrator::Orchestrator;

pub const GENERATE_PATH: &str = "/api/generate";
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Status code plus JSON body for one relay request.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReply {
    pub status: u16,
    pub body: Value,
}

impl RelayReply {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// Handles one `/api/generate` call independent of the HTTP server.
pub fn handle_generate(orchestrator: &Orchestrator, method: &str, body: &[u8]) -> RelayReply {
    if !method.eq_ignore_ascii_case("POST") {
        return RelayReply::error(405, "Method not allowed");
    }
    let Ok(payload) = serde_json::from_slice::<Value>(body) else {
        return RelayReply::error(400, "Invalid JSON body");
    };
    let prompt = payload
        .get("prompt")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty());
    let Some(prompt) = prompt else {
        return RelayReply::error(400, "Prompt is required");
    };
    if !orchestrator.is_configured() {
        return RelayReply::error(500, "API key is not configured on the server");
    }

    let base = match payload.get("baseImage") {
        None | Some(Value::Null) => None,
        Some(Value::String(url)) if url.is_empty() => None,
        Some(Value::String(url)) => Some(Artifact::from_data_url(url.as_str())),
        Some(other) => {
            let err = StudioError::MalformedSourceImage(format!("expected a string, got {other}"));
            return RelayReply::error(500, format!("Internal server error: {err}"));
        }
    };

    match orchestrator.generate(prompt, base.as_ref()) {
        Ok(artifact) => RelayReply {
            status: 200,
            body: json!({ "imageUrl": artifact.into_string() }),
        },
        Err(err) => {
            tracing::error!(error = %err, "relay generation failed");
            RelayReply::error(500, format!("Internal server error: {err}"))
        }
    }
}

/// Stops a running [`RelayServer::serve`] loop.
#[derive(Clone)]
pub struct RelayShutdown {
    server: Arc<Server>,
}

impl RelayShutdown {
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

pub struct RelayServer {
    server: Arc<Server>,
    orchestrator: Orchestrator,
}

impl RelayServer {
    pub fn bind(addr: &str, orchestrator: Orchestrator) -> Result<Self> {
        let server = Server::http(addr).map_err(|err| anyhow!("failed to bind {addr}: {err}"))?;
        Ok(Self {
            server: Arc::new(server),
            orchestrator,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> RelayShutdown {
        RelayShutdown {
            server: Arc::clone(&self.server),
        }
    }

    /// Serves until the shutdown handle fires.
    pub fn serve(&self) {
        tracing::info!(
            addr = ?self.local_addr(),
            service = self.orchestrator.service_name(),
            "relay listening"
        );
        for request in self.server.incoming_requests() {
            self.respond(request);
        }
        tracing::info!("relay stopped");
    }

    fn respond(&self, mut request: Request) {
        let method = request.method().to_string();
        let path = request
            .url()
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        let reply = if path != GENERATE_PATH {
            RelayReply::error(404, "Not found")
        } else {
            let mut body = Vec::new();
            match request
                .as_reader()
                .take(MAX_BODY_BYTES)
                .read_to_end(&mut body)
            {
                Ok(_) => handle_generate(&self.orchestrator, &method, &body),
                Err(err) => RelayReply::error(400, format!("Failed to read request body: {err}")),
            }
        };
        tracing::info!(%method, %path, status = reply.status, "relay request");

        let mut response =
            Response::from_string(reply.body.to_string()).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
        if let Err(err) = request.respond(response) {
            tracing::warn!(error = %err, "relay response write failed");
        }
    }
}
