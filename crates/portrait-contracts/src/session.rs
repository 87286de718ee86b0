use crate::artifact::{Artifact, FileBlob};
use crate::error::{StudioError, StudioResult};
use crate::history::HistoryStack;

pub const DEFAULT_CHARACTER_PROMPT: &str =
    "A beautiful Filipina-Chinese (Chinita) model, smiling, professional headshot, studio lighting, high detail";
pub const OUTFIT_CHANGE_SUGGESTION: &str = "Change her outfit to a summer dress";
pub const SCENE_PLACEMENT_SUGGESTION: &str =
    "Now, place her on a beach in the Philippines, sunset lighting";
pub const GALLERY_MODIFICATION_SUGGESTION: &str = "Change her outfit to a red ball gown";

const INVALID_FILE_MESSAGE: &str = "Please select a valid image file.";

/// Operation status of the session. Busy and errored are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Busy,
    Error(String),
}

/// Inputs of one in-flight generation, handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    id: u64,
    pub prompt: String,
    pub base_artifact: Option<Artifact>,
}

impl GenerationTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// The working character: current artifact, editable prompt, status and undo chain.
///
/// All transitions are synchronous. A generation is split in two halves,
/// [`begin_generation`](Self::begin_generation) and
/// [`finish_generation`](Self::finish_generation), so the network call can
/// happen anywhere in between while the session stays busy.
#[derive(Debug, Clone)]
pub struct CharacterSession {
    artifact: Option<Artifact>,
    prompt: String,
    status: SessionStatus,
    history: HistoryStack,
    next_ticket_id: u64,
    in_flight: Option<u64>,
}

impl Default for CharacterSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterSession {
    pub fn new() -> Self {
        Self {
            artifact: None,
            prompt: DEFAULT_CHARACTER_PROMPT.to_string(),
            status: SessionStatus::Idle,
            history: HistoryStack::new(),
            next_ticket_id: 1,
            in_flight: None,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_busy(&self) -> bool {
        self.status == SessionStatus::Busy
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.status {
            SessionStatus::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.is_busy() && !self.history.is_empty()
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Snapshots the current state and marks the session busy.
    ///
    /// Returns `None` without touching anything when the prompt is blank or
    /// another operation is outstanding.
    pub fn begin_generation(&mut self) -> Option<GenerationTicket> {
        if self.prompt.trim().is_empty() || self.is_busy() {
            return None;
        }
        self.history
            .push_snapshot(self.artifact.clone(), self.prompt.clone());
        self.status = SessionStatus::Busy;

        let id = self.next_ticket_id;
        self.next_ticket_id += 1;
        self.in_flight = Some(id);
        tracing::debug!(ticket = id, history = self.history.len(), "generation started");

        Some(GenerationTicket {
            id,
            prompt: self.prompt.clone(),
            base_artifact: self.artifact.clone(),
        })
    }

    /// Applies the outcome of the generation `ticket` started.
    ///
    /// A failure keeps the snapshot pushed by `begin_generation`, so the undo
    /// chain still points back at the pre-attempt state. Returns false for a
    /// ticket that is not the one in flight.
    pub fn finish_generation(
        &mut self,
        ticket: &GenerationTicket,
        result: StudioResult<Artifact>,
    ) -> bool {
        if self.in_flight != Some(ticket.id) {
            tracing::warn!(ticket = ticket.id, "ignoring stale generation result");
            return false;
        }
        self.in_flight = None;

        match result {
            Ok(artifact) => {
                self.prompt = if ticket.base_artifact.is_some() {
                    OUTFIT_CHANGE_SUGGESTION.to_string()
                } else {
                    SCENE_PLACEMENT_SUGGESTION.to_string()
                };
                self.artifact = Some(artifact);
                self.status = SessionStatus::Idle;
                tracing::debug!(ticket = ticket.id, "generation finished");
            }
            Err(err) => {
                tracing::warn!(ticket = ticket.id, error = %err, "generation failed");
                self.status = SessionStatus::Error(format!("Failed to generate image. {err}"));
            }
        }
        true
    }

    /// Replaces the current artifact with a decoded file and starts a fresh undo chain.
    ///
    /// Returns `Ok(false)` while another operation is outstanding. On failure
    /// the error slot is set and history is left alone.
    pub fn upload(&mut self, blob: &FileBlob) -> StudioResult<bool> {
        if self.is_busy() {
            return Ok(false);
        }
        if let Err(err) = check_media_type(blob) {
            self.status = SessionStatus::Error(INVALID_FILE_MESSAGE.to_string());
            return Err(err);
        }

        self.status = SessionStatus::Busy;
        match blob.decode() {
            Ok(artifact) => {
                self.artifact = Some(artifact);
                self.history.clear();
                self.status = SessionStatus::Idle;
                Ok(true)
            }
            Err(err) => {
                self.status =
                    SessionStatus::Error(format!("Failed to read the selected file. {err}"));
                Err(err)
            }
        }
    }

    pub fn new_character(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.artifact = None;
        self.prompt = DEFAULT_CHARACTER_PROMPT.to_string();
        self.status = SessionStatus::Idle;
        self.history.clear();
        true
    }

    pub fn select_from_gallery(&mut self, artifact: Artifact) -> bool {
        if self.is_busy() {
            return false;
        }
        self.artifact = Some(artifact);
        self.prompt = GALLERY_MODIFICATION_SUGGESTION.to_string();
        self.history.clear();
        true
    }

    /// Restores artifact and prompt from the latest snapshot. The status is
    /// not part of a snapshot and stays as it is.
    pub fn undo(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        let Some(entry) = self.history.pop_snapshot() else {
            return false;
        };
        self.artifact = entry.artifact;
        self.prompt = entry.prompt;
        true
    }
}

fn check_media_type(blob: &FileBlob) -> StudioResult<()> {
    if blob.media_type.starts_with("image/") {
        return Ok(());
    }
    Err(StudioError::InvalidFileType {
        media_type: blob.media_type.clone(),
    })
}
