//! Input intake: turn a user-supplied path into an [`UploadedImage`].
//!
//! Intake mirrors a browser upload control: it checks that the file exists,
//! is readable, and carries an accepted extension. It deliberately does not
//! look inside the file. A text file renamed to `.jpg` passes intake and is
//! rejected by [`crate::pipeline::encode`], which owns content validation.

use crate::error::RexError;
use std::path::Path;
use tracing::debug;

/// Extensions the upload control accepts (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Raw image bytes as uploaded, plus the original file name if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        Self { bytes, file_name }
    }

    /// Name to show the user.
    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("<upload>")
    }
}

/// Whether `path` has one of the [`ACCEPTED_EXTENSIONS`].
pub fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|ok| e.eq_ignore_ascii_case(ok))
        })
        .unwrap_or(false)
}

/// Read an image from disk the way the upload control would accept it.
pub async fn load_image(path: impl AsRef<Path>) -> Result<UploadedImage, RexError> {
    let path = path.as_ref();

    if !has_accepted_extension(path) {
        return Err(RexError::UnsupportedFileType {
            path: path.to_path_buf(),
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RexError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => RexError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => RexError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());

    Ok(UploadedImage {
        bytes,
        file_name: file_name_of(path),
    })
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
