use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::session::CharacterSession;

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of studio transitions.
///
/// Every line carries `type`, `session_id` and `ts`; the caller's payload is
/// flattened after them. Clones append to the same file.
#[derive(Debug, Clone)]
pub struct SessionEventLog {
    inner: Arc<SessionEventLogInner>,
}

#[derive(Debug)]
struct SessionEventLogInner {
    path: PathBuf,
    session_id: String,
    appending: Mutex<()>,
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    payload: EventPayload,
}

/// Compact description of the session; artifacts appear by short id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub artifact_id: Option<String>,
    pub prompt: String,
    pub busy: bool,
    pub error: Option<String>,
    pub history_len: usize,
}

impl SessionSnapshot {
    pub fn of(session: &CharacterSession) -> Self {
        Self {
            artifact_id: session.artifact().map(|artifact| artifact.short_id()),
            prompt: session.prompt().to_string(),
            busy: session.is_busy(),
            error: session.last_error().map(str::to_string),
            history_len: session.history().len(),
        }
    }

    fn into_payload(self) -> anyhow::Result<EventPayload> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(anyhow!("session snapshot serialized as {other}")),
        }
    }
}

impl SessionEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_session_id(path, Uuid::new_v4().to_string())
    }

    pub fn with_session_id(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionEventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                appending: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Appends one event and returns it as written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let event = serde_json::to_value(EventLine {
            event_type,
            session_id: &self.inner.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            payload,
        })?;

        let path = &self.inner.path;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed creating {}", dir.display()))?;
        }
        let _appending = self
            .inner
            .appending
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed opening event log {}", path.display()))?;
        writeln!(file, "{event}")
            .with_context(|| format!("failed appending to {}", path.display()))?;
        Ok(event)
    }

    /// Emits `event_type` with a snapshot of the session; `payload` keys win.
    pub fn emit_session(
        &self,
        event_type: &str,
        session: &CharacterSession,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut fields = SessionSnapshot::of(session).into_payload()?;
        fields.extend(payload);
        self.emit(event_type, fields)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;
    use crate::artifact::Artifact;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = SessionEventLog::with_session_id(&path, "session-1");

        let mut payload = EventPayload::new();
        payload.insert("index".to_string(), Value::from(2));
        let emitted = log.emit("gallery_deleted", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("gallery_deleted".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-1".to_string()));
        assert_eq!(parsed["index"], Value::from(2));
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn new_log_gets_a_uuid_session_id() {
        let log = SessionEventLog::new("events.jsonl");
        assert!(Uuid::parse_str(log.session_id()).is_ok());
    }

    #[test]
    fn emit_session_records_state_and_appends() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = SessionEventLog::with_session_id(&path, "session-1");

        let mut session = CharacterSession::new();
        log.emit_session("session_started", &session, EventPayload::new())?;
        let ticket = session.begin_generation().unwrap_or_else(|| panic!("not started"));
        let artifact = Artifact::from_data_url("data:image/png;base64,AAAA");
        session.finish_generation(&ticket, Ok(artifact.clone()));
        log.emit_session("generation_succeeded", &session, EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let rows: Vec<Value> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["artifact_id"], Value::Null);
        assert_eq!(rows[1]["artifact_id"], Value::String(artifact.short_id()));
        assert_eq!(rows[1]["history_len"], Value::from(1));
        assert_eq!(rows[1]["busy"], Value::Bool(false));
        Ok(())
    }

    #[test]
    fn emit_into_a_directory_fails() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = SessionEventLog::with_session_id(temp.path(), "session-1");
        let err = log
            .emit_session("session_started", &CharacterSession::new(), EventPayload::new())
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("failed opening event log"), "{err}");
        Ok(())
    }
}
