use std::fmt;
use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StudioError, StudioResult};

const BASE64_MARKER: &str = ";base64,";

/// An encoded image as a `data:<media-type>;base64,<payload>` string.
///
/// The value is opaque to the studio: it is displayed, stored and sent back
/// to the generation service as-is. Equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact(String);

/// A media type plus its base64 payload, the shape image services exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub media_type: String,
    pub data: String,
}

impl Artifact {
    pub fn from_data_url(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        Self(format!(
            "data:{media_type}{BASE64_MARKER}{}",
            BASE64.encode(bytes)
        ))
    }

    pub fn from_inline(image: &InlineImage) -> Self {
        Self(format!(
            "data:{}{BASE64_MARKER}{}",
            image.media_type, image.data
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Splits the data URL into its media type and payload.
    pub fn split(&self) -> StudioResult<InlineImage> {
        let mut parts = self.0.split(BASE64_MARKER);
        let (Some(head), Some(payload), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(StudioError::MalformedSourceImage(
                "expected exactly one ';base64,' separator".to_string(),
            ));
        };
        let media_type = head
            .split(':')
            .nth(1)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                StudioError::MalformedSourceImage("could not extract MIME type".to_string())
            })?;
        Ok(InlineImage {
            media_type: media_type.to_string(),
            data: payload.to_string(),
        })
    }

    pub fn decode_bytes(&self) -> StudioResult<Vec<u8>> {
        let inline = self.split()?;
        BASE64
            .decode(inline.data.as_bytes())
            .map_err(|err| StudioError::DecodeError(format!("image payload is not base64: {err}")))
    }

    /// File extension for downloads, falling back to png.
    pub fn file_extension(&self) -> &'static str {
        let media_type = self
            .split()
            .map(|inline| inline.media_type.to_ascii_lowercase())
            .unwrap_or_default();
        if media_type.contains("jpeg") || media_type.contains("jpg") {
            return "jpg";
        }
        if media_type.contains("webp") {
            return "webp";
        }
        if media_type.contains("gif") {
            return "gif";
        }
        "png"
    }

    /// First 8 hex characters of the value's SHA-256, for display.
    pub fn short_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let media_type = self
            .split()
            .map(|inline| inline.media_type)
            .unwrap_or_else(|_| "unknown".to_string());
        write!(f, "{} ({}, {} chars)", self.short_id(), media_type, self.0.len())
    }
}

/// A picked file: its declared media type and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a file, declaring its media type from the extension the way a
    /// browser file picker would.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let media_type = media_type_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(media_type, bytes))
    }

    /// Decodes the blob into an artifact.
    ///
    /// Payloads in a raster format the `image` crate recognises must decode
    /// cleanly; other `image/*` payloads (svg, for example) pass through.
    pub fn decode(&self) -> StudioResult<Artifact> {
        if !self.media_type.starts_with("image/") {
            return Err(StudioError::InvalidFileType {
                media_type: self.media_type.clone(),
            });
        }
        if self.bytes.is_empty() {
            return Err(StudioError::DecodeError("file is empty".to_string()));
        }
        if image::guess_format(&self.bytes).is_ok() {
            image::load_from_memory(&self.bytes)
                .map_err(|err| StudioError::DecodeError(err.to_string()))?;
        }
        Ok(Artifact::from_bytes(&self.media_type, &self.bytes))
    }
}

pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn tiny_png() -> Vec<u8> {
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn split_extracts_media_type_and_payload() {
        let artifact = Artifact::from_data_url("data:image/jpeg;base64,LzlqLzRBQ");
        let inline = artifact.split().unwrap();
        assert_eq!(inline.media_type, "image/jpeg");
        assert_eq!(inline.data, "LzlqLzRBQ");
        assert_eq!(Artifact::from_inline(&inline), artifact);
    }

    #[test]
    fn split_rejects_values_without_exactly_one_marker() {
        for raw in [
            "not a data url",
            "data:image/png;base64,AAA;base64,BBB",
            "https://example.com/a.png",
        ] {
            let err = Artifact::from_data_url(raw).split().unwrap_err();
            assert!(matches!(err, StudioError::MalformedSourceImage(_)), "{raw}");
        }
    }

    #[test]
    fn split_rejects_missing_media_type() {
        let err = Artifact::from_data_url("data:;base64,AAAA")
            .split()
            .unwrap_err();
        assert_eq!(
            err,
            StudioError::MalformedSourceImage("could not extract MIME type".to_string())
        );
    }

    #[test]
    fn from_bytes_decodes_back_to_same_bytes() {
        let artifact = Artifact::from_bytes("image/png", &[1, 2, 3, 250]);
        assert!(artifact.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(artifact.decode_bytes().unwrap(), vec![1, 2, 3, 250]);
        assert_eq!(artifact.file_extension(), "png");
    }

    #[test]
    fn short_id_is_stable_hex() {
        let artifact = Artifact::from_data_url("data:image/png;base64,AAAA");
        let id = artifact.short_id();
        assert_eq!(id.len(), 8);
        assert_eq!(id, artifact.clone().short_id());
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn decode_rejects_non_image_media_type() {
        let blob = FileBlob::new("text/plain", b"hello".to_vec());
        assert_eq!(
            blob.decode().unwrap_err(),
            StudioError::InvalidFileType {
                media_type: "text/plain".to_string()
            }
        );
    }

    #[test]
    fn decode_accepts_real_png() {
        let bytes = tiny_png();
        let artifact = FileBlob::new("image/png", bytes.clone()).decode().unwrap();
        assert_eq!(artifact.decode_bytes().unwrap(), bytes);
    }

    #[test]
    fn decode_rejects_truncated_png() {
        let mut bytes = tiny_png();
        bytes.truncate(24);
        let err = FileBlob::new("image/png", bytes).decode().unwrap_err();
        assert!(matches!(err, StudioError::DecodeError(_)));
    }

    #[test]
    fn decode_rejects_empty_file() {
        let err = FileBlob::new("image/png", Vec::new()).decode().unwrap_err();
        assert_eq!(err, StudioError::DecodeError("file is empty".to_string()));
    }

    #[test]
    fn from_path_declares_media_type_from_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let png = temp.path().join("face.PNG");
        std::fs::write(&png, tiny_png())?;
        let notes = temp.path().join("notes.txt");
        std::fs::write(&notes, "hi")?;

        assert_eq!(FileBlob::from_path(&png)?.media_type, "image/png");
        assert_eq!(
            FileBlob::from_path(&notes)?.media_type,
            "application/octet-stream"
        );
        Ok(())
    }
}
