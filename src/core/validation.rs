//! Validation gate for candidate images.
//!
//! Runs on metadata only, before any bytes are read or sent anywhere.

use crate::utils::constants::{ACCEPTED_IMAGE_TYPES, MAX_IMAGE_BYTES};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid file type: {mime_type}. Please upload an image.")]
    UnsupportedType { mime_type: String },

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },
}

/// Checks the declared MIME type and then the size. Type is checked first so a
/// huge non-image is reported as the wrong type.
pub fn validate(mime_type: &str, size_bytes: u64) -> Result<(), ValidationError> {
    if !mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(ValidationError::UnsupportedType {
            mime_type: mime_type.to_string(),
        });
    }

    if size_bytes > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge {
            size: size_bytes,
            max: MAX_IMAGE_BYTES,
        });
    }

    Ok(())
}

/// Whether the type is one of the advertised upload formats.
pub fn is_accepted_type(mime_type: &str) -> bool {
    let normalized = mime_type.trim().to_ascii_lowercase();
    ACCEPTED_IMAGE_TYPES.iter().any(|t| *t == normalized)
}

/// Guesses a MIME type from a file extension.
pub fn mime_from_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
