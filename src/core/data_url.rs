//! `data:<mime>;base64,<payload>` encoding and decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::core::validation::mime_from_extension;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to read {source_name}: {message}")]
    ReadError {
        source_name: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("Image data must be a base64 data URL")]
    Malformed,

    #[error("Image data is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Where the bytes of a selected file live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Bytes(Bytes),
}

/// A user-selected file: a handle plus the metadata the validation gate needs.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub source: FileSource,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl SelectedFile {
    /// Stats a file on disk. The MIME type comes from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EncodeError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| read_error(&path.display().to_string(), e))?;

        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(mime_from_extension)
            .unwrap_or("application/octet-stream");

        Ok(Self {
            source: FileSource::Path(path.to_path_buf()),
            mime_type: mime_type.to_string(),
            size_bytes: metadata.len(),
        })
    }

    pub fn from_bytes(bytes: Bytes, mime_type: impl Into<String>) -> Self {
        Self {
            size_bytes: bytes.len() as u64,
            source: FileSource::Bytes(bytes),
            mime_type: mime_type.into(),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.source {
            FileSource::Path(p) => p.display().to_string(),
            FileSource::Bytes(_) => "in-memory image".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Reads the whole file and encodes it as a data URL. One attempt, no retry.
pub async fn encode(file: &SelectedFile) -> Result<String, EncodeError> {
    match &file.source {
        FileSource::Path(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| read_error(&file.display_name(), e))?;
            Ok(encode_bytes(&file.mime_type, &bytes))
        }
        FileSource::Bytes(bytes) => Ok(encode_bytes(&file.mime_type, bytes)),
    }
}

pub fn encode_bytes(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        BASE64_STANDARD.encode(bytes)
    )
}

pub fn parse(data_url: &str) -> Result<DecodedDataUrl, DataUrlError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUrlError::Malformed)?;
    let (meta, payload) = rest.split_once(',').ok_or(DataUrlError::Malformed)?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or(DataUrlError::Malformed)?;
    if mime_type.is_empty() || payload.is_empty() {
        return Err(DataUrlError::Malformed);
    }

    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| DataUrlError::InvalidBase64(e.to_string()))?;

    Ok(DecodedDataUrl {
        mime_type: mime_type.to_string(),
        bytes,
    })
}

fn read_error(source_name: &str, err: std::io::Error) -> EncodeError {
    EncodeError::ReadError {
        source_name: source_name.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_encode_file_on_disk() {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        tmp.write_all(&[0x89, b'P', b'N', b'G']).unwrap();

        let file = SelectedFile::from_path(tmp.path()).await.unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size_bytes, 4);

        let encoded = encode(&file).await.unwrap();
        assert_eq!(encoded, "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_encode_missing_file_is_read_error() {
        let file = SelectedFile {
            source: FileSource::Path(PathBuf::from("/definitely/not/here.png")),
            mime_type: "image/png".to_string(),
            size_bytes: 10,
        };
        let err = encode(&file).await.unwrap_err();
        assert!(matches!(err, EncodeError::ReadError { .. }));
    }

    #[tokio::test]
    async fn test_encode_in_memory_bytes() {
        let file = SelectedFile::from_bytes(Bytes::from_static(b"GIF89a"), "image/gif");
        assert_eq!(file.size_bytes, 6);
        assert_eq!(encode(&file).await.unwrap(), "data:image/gif;base64,R0lGODlh");
    }

    #[test]
    fn test_parse_data_url() {
        let decoded = parse("data:image/gif;base64,R0lGODlh").unwrap();
        assert_eq!(decoded.mime_type, "image/gif");
        assert_eq!(decoded.bytes, b"GIF89a");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(parse("R0lGODlh"), Err(DataUrlError::Malformed));
        assert_eq!(parse("data:image/gif,R0lGODlh"), Err(DataUrlError::Malformed));
        assert_eq!(parse("data:;base64,R0lGODlh"), Err(DataUrlError::Malformed));
        assert_eq!(parse("data:image/gif;base64,"), Err(DataUrlError::Malformed));
        assert!(matches!(
            parse("data:image/gif;base64,!!!"),
            Err(DataUrlError::InvalidBase64(_))
        ));
    }
}
