use thiserror::Error;

/// Failures surfaced by the studio core.
///
/// Every variant renders as a single human-readable line; that line is what
/// ends up in the session's error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    /// The picked file does not declare an `image/*` media type.
    #[error("file type '{media_type}' is not an image")]
    InvalidFileType { media_type: String },

    /// The file declared an image type but its bytes could not be decoded.
    #[error("{0}")]
    DecodeError(String),

    /// The base artifact is not a `data:<mime>;base64,<payload>` value.
    #[error("Invalid data URL format: {0}")]
    MalformedSourceImage(String),

    #[error("No image was generated in the API response.")]
    NoImageReturned,

    /// Transport or service fault, carrying the service's own message.
    #[error("{0}")]
    GenerationServiceError(String),

    /// Stored gallery data was unreadable. Never fatal.
    #[error("failed to read gallery storage: {0}")]
    StorageReadError(String),

    #[error("failed to write gallery storage: {0}")]
    StorageWriteError(String),
}

pub type StudioResult<T> = Result<T, StudioError>;

impl StudioError {
    /// Flattens a service failure and its distinct causes into one line.
    pub fn service_fault(err: &anyhow::Error, max_chars: usize) -> Self {
        let mut causes: Vec<String> = err
            .chain()
            .map(|cause| cause.to_string().trim().to_string())
            .filter(|cause| !cause.is_empty())
            .collect();
        causes.dedup();
        Self::GenerationServiceError(clip(&causes.join(" | caused by: "), max_chars))
    }
}

/// Cuts `text` after `max_chars` characters, marking the cut with an ellipsis.
pub fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
