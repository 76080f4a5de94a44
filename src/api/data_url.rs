//! Syntactic validation of `data:<mime>;base64,<payload>` image URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Largest decoded image accepted from the client.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Why a data URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("imageData must be a data URL (data:<mime>;base64,<payload>)")]
    NotDataUrl,
    #[error("imageData must be base64 encoded")]
    NotBase64,
    #[error("imageData has an invalid MIME type '{0}'")]
    InvalidMime(String),
    #[error("imageData must be an image, got '{0}'")]
    NotImage(String),
    #[error("imageData payload is empty")]
    EmptyPayload,
    #[error("imageData payload is not valid base64")]
    InvalidPayload,
    #[error("Image size exceeds {} MB limit", MAX_IMAGE_BYTES / (1024 * 1024))]
    TooLarge,
}

/// Borrowed view of a validated data URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Parse and validate a data URL.
    ///
    /// The MIME type must be `type/subtype`; parameters such as `charset=`
    /// between the MIME type and `;base64` are allowed.
    pub fn parse(input: &'a str) -> Result<Self, DataUrlError> {
        let rest = input.strip_prefix("data:").ok_or(DataUrlError::NotDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;
        let media = header
            .strip_suffix(";base64")
            .ok_or(DataUrlError::NotBase64)?;
        let mime = media.split(';').next().unwrap_or_default().trim();

        match mime.split_once('/') {
            Some((kind, subtype))
                if !kind.is_empty() && !subtype.is_empty() && !subtype.contains('/') => {}
            _ => return Err(DataUrlError::InvalidMime(mime.to_string())),
        }

        if payload.is_empty() {
            return Err(DataUrlError::EmptyPayload);
        }
        // Rough size check before decoding anything large
        if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
            return Err(DataUrlError::TooLarge);
        }
        let decoded = STANDARD
            .decode(payload)
            .map_err(|_| DataUrlError::InvalidPayload)?;
        if decoded.len() > MAX_IMAGE_BYTES {
            return Err(DataUrlError::TooLarge);
        }

        Ok(Self { mime, payload })
    }

    /// Parse and additionally require an `image/*` MIME type.
    pub fn parse_image(input: &'a str) -> Result<Self, DataUrlError> {
        let url = Self::parse(input)?;
        if !url.mime.to_ascii_lowercase().starts_with("image/") {
            return Err(DataUrlError::NotImage(url.mime.to_string()));
        }
        Ok(url)
    }
}
