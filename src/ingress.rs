use std::path::PathBuf;

use base64::Engine;
use image::ImageFormat;
use url::Url;

/// Largest accepted image, inclusive.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Longest `data:` URL the inline store can produce: base64 of the largest
/// image plus the `data:<mime>;base64,` prefix.
pub const MAX_INLINE_URL_LEN: usize = MAX_IMAGE_BYTES.div_ceil(3) * 4 + 64;

/// Route prefix under which disk-stored images are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("No file provided")]
    MissingFile,
    #[error("Please select an image file")]
    NotAnImage,
    #[error("File size must be less than 10MB")]
    TooLarge,
    #[error("Form submission is too large")]
    FormTooLarge,
    #[error("Invalid upload: {0}")]
    Multipart(String),
    #[error("Failed to store image")]
    Storage(#[from] std::io::Error),
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Turns uploaded bytes into a URL the inference provider can fetch.
#[derive(Debug, Clone)]
pub enum ImageStore {
    /// Files written under `dir`, served back at `public_base/uploads/`.
    Disk { dir: PathBuf, public_base: Url },
    /// `data:` URLs, nothing written.
    Inline,
}

impl ImageStore {
    pub async fn store(&self, bytes: &[u8], content_type: &str) -> Result<Url, IngressError> {
        validate(content_type, bytes.len())?;
        let format = sniff(bytes)?;

        match self {
            ImageStore::Disk { dir, public_base } => {
                let ext = format.extensions_str().first().copied().unwrap_or("bin");
                let name = format!("{}.{ext}", uuid::Uuid::new_v4());
                tokio::fs::create_dir_all(dir).await?;
                tokio::fs::write(dir.join(&name), bytes).await?;
                tracing::info!(file = %name, size = bytes.len(), "stored upload");

                public_base
                    .join(&format!("{}/{name}", UPLOADS_ROUTE.trim_start_matches('/')))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e).into())
            }
            ImageStore::Inline => {
                let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
                Url::parse(&format!("data:{};base64,{payload}", format.to_mime_type()))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e).into())
            }
        }
    }

    /// Directory to serve at [`UPLOADS_ROUTE`], if any.
    pub fn serve_dir(&self) -> Option<&PathBuf> {
        match self {
            ImageStore::Disk { dir, .. } => Some(dir),
            ImageStore::Inline => None,
        }
    }
}

pub fn validate(content_type: &str, size: usize) -> Result<(), IngressError> {
    if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(IngressError::NotAnImage);
    }
    if size > MAX_IMAGE_BYTES {
        return Err(IngressError::TooLarge);
    }
    Ok(())
}

/// Detects the format from the file's own signature. The declared content
/// type is not trusted for what gets stored and served back: SVG, HTML or
/// anything else without a raster image signature is refused.
pub fn sniff(bytes: &[u8]) -> Result<ImageFormat, IngressError> {
    image::guess_format(bytes).map_err(|_| {
        tracing::debug!(size = bytes.len(), "upload has no image signature");
        IngressError::NotAnImage
    })
}
