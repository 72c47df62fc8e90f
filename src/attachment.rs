//! Attachment descriptors, picking and size validation.
//!
//! Picking is split in two: an [`AttachmentSource`] talks to whatever lets the
//! user choose a file (the terminal prompt in the binary, a stub in tests) and
//! [`AttachmentPicker`] turns its raw answer into an [`Attachment`].

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

pub const IMAGE_MIME_TYPES: &[&str] = &["image/*"];
pub const DOCUMENT_MIME_TYPES: &[&str] = &["application/pdf", "application/msword"];

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AttachmentError {
    pub message: String,
}

impl AttachmentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Document,
    Other,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Document => "document",
            AttachmentKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub uri: String,
    pub kind: AttachmentKind,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// What a source hands back before normalization.
#[derive(Debug, Clone, Default)]
pub struct PickedFile {
    pub uri: String,
    pub name: Option<String>,
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
    Image,
    Document,
}

#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// `Ok(None)` means the user backed out.
    async fn pick(&self, kind: PickKind, accept: &[&str]) -> Result<Option<PickedFile>, io::Error>;
}

pub struct AttachmentPicker<S> {
    source: S,
}

impl<S: AttachmentSource> AttachmentPicker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub async fn pick_image(&self) -> Result<Option<Attachment>, AttachmentError> {
        let picked = match self.source.pick(PickKind::Image, IMAGE_MIME_TYPES).await {
            Ok(Some(picked)) => picked,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(error = %err, "error picking image");
                return Err(AttachmentError::new("Error picking image"));
            }
        };
        ensure_accepted(&picked, IMAGE_MIME_TYPES)?;

        let display_name = last_segment(&picked.uri).unwrap_or("image.jpg").to_string();
        Ok(Some(Attachment {
            uri: picked.uri,
            kind: AttachmentKind::Image,
            display_name,
            size_bytes: picked.size_bytes,
            mime_type: Some("image/jpeg".to_string()),
        }))
    }

    pub async fn pick_document(&self) -> Result<Option<Attachment>, AttachmentError> {
        let picked = match self.source.pick(PickKind::Document, DOCUMENT_MIME_TYPES).await {
            Ok(Some(picked)) => picked,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(error = %err, "error picking document");
                return Err(AttachmentError::new("Error picking document"));
            }
        };
        ensure_accepted(&picked, DOCUMENT_MIME_TYPES)?;

        let kind = match picked.mime_type.as_deref() {
            Some(mime) if mime.contains("pdf") => AttachmentKind::Pdf,
            _ => AttachmentKind::Document,
        };
        let display_name = picked
            .name
            .clone()
            .or_else(|| last_segment(&picked.uri).map(str::to_string))
            .unwrap_or_else(|| "document".to_string());
        Ok(Some(Attachment {
            uri: picked.uri,
            kind,
            display_name,
            size_bytes: picked.size_bytes,
            mime_type: picked.mime_type,
        }))
    }
}

/// Rejects attachments larger than [`MAX_ATTACHMENT_BYTES`]. Unknown size passes.
pub fn validate(attachment: &Attachment) -> Result<(), AttachmentError> {
    match attachment.size_bytes {
        Some(size) if size > MAX_ATTACHMENT_BYTES => Err(AttachmentError::new(format!(
            "File size exceeds {} limit",
            format_size(MAX_ATTACHMENT_BYTES)
        ))),
        _ => Ok(()),
    }
}

pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    // Round to two places, then let f64 Display drop trailing zeros.
    let rounded: f64 = format!("{value:.2}").parse().unwrap_or(value);
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

fn ensure_accepted(picked: &PickedFile, accept: &[&str]) -> Result<(), AttachmentError> {
    let Some(mime) = picked.mime_type.as_deref() else {
        return Err(AttachmentError::new("Unsupported file type"));
    };
    let accepted = accept.iter().any(|pattern| match pattern.strip_suffix("/*") {
        Some(prefix) => mime
            .split_once('/')
            .is_some_and(|(top, _)| top.eq_ignore_ascii_case(prefix)),
        None => mime.eq_ignore_ascii_case(pattern),
    });
    if accepted {
        Ok(())
    } else {
        Err(AttachmentError::new(format!("Unsupported file type: {mime}")))
    }
}

fn last_segment(uri: &str) -> Option<&str> {
    uri.rsplit('/').next().filter(|segment| !segment.is_empty())
}

/// Terminal-backed source: uses a path given up front, or prompts for one.
/// An empty answer cancels.
pub struct PathSource {
    preset: Option<PathBuf>,
}

impl PathSource {
    pub fn new(preset: Option<PathBuf>) -> Self {
        Self { preset }
    }

    fn prompt(kind: PickKind) -> Result<Option<PathBuf>, io::Error> {
        let label = match kind {
            PickKind::Image => "Image path (empty to cancel)",
            PickKind::Document => "PDF or Word document path (empty to cancel)",
        };
        let answer: String = dialoguer::Input::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .map_err(|err| io::Error::other(err.to_string()))?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(answer)))
    }
}

#[async_trait]
impl AttachmentSource for PathSource {
    async fn pick(&self, kind: PickKind, _accept: &[&str]) -> Result<Option<PickedFile>, io::Error> {
        let path = match &self.preset {
            Some(path) => path.clone(),
            None => match Self::prompt(kind)? {
                Some(path) => path,
                None => return Ok(None),
            },
        };
        picked_from_path(&path).await.map(Some)
    }
}

async fn picked_from_path(path: &Path) -> Result<PickedFile, io::Error> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file: {}", path.display()),
        ));
    }
    let absolute = tokio::fs::canonicalize(path).await?;
    let uri = url::Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot build a file url for {}", absolute.display()),
            )
        })?;
    let name = absolute
        .file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string);
    let mime_type = mime_guess::from_path(&absolute)
        .first()
        .map(|mime| mime.essence_str().to_string());

    Ok(PickedFile {
        uri,
        name,
        size_bytes: Some(metadata.len()),
        mime_type,
    })
}
