use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use portrait_contracts::InlineImage;
use sha2::{Digest, Sha256};

use super::{GenerationRequest, GenerationResponse, GenerationService};

const DRYRUN_SIZE: u32 = 256;

/// Offline backend: a solid-color PNG whose color is derived from the request.
pub struct DryrunService;

impl GenerationService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn send(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let (r, g, b) = color_from_request(request);
        let image = RgbImage::from_pixel(DRYRUN_SIZE, DRYRUN_SIZE, Rgb([r, g, b]));
        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .context("dryrun PNG encode failed")?;

        Ok(GenerationResponse {
            images: vec![InlineImage {
                media_type: "image/png".to_string(),
                data: BASE64.encode(encoded.into_inner()),
            }],
        })
    }
}

fn color_from_request(request: &GenerationRequest) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(request.text.as_bytes());
    if let Some(base) = request.base_image.as_ref() {
        hasher.update(base.data.as_bytes());
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
