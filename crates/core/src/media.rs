// crates/core/src/media.rs
//! Upload policy: which media are accepted and how they are recognized.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default size ceiling: 50 MiB, matching the UI copy "less than 50MB".
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Supported input media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Png,
    Jpeg,
    Mp4,
    Avi,
}

impl MediaKind {
    /// Recognize a declared content type (the browser's `file.type`, the
    /// multipart part header). Declared values are hints; `sniff` has the
    /// last word.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "video/mp4" => Some(Self::Mp4),
            // Browsers report AVI as video/avi; the registered type is x-msvideo.
            "video/avi" | "video/x-msvideo" | "video/msvideo" => Some(Self::Avi),
            _ => None,
        }
    }

    /// Canonical content type for this kind.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Mp4 => "video/mp4",
            Self::Avi => "video/x-msvideo",
        }
    }

    pub fn from_extension(filename: &str) -> Option<Self> {
        let ext = std::path::Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "mp4" => Some(Self::Mp4),
            "avi" => Some(Self::Avi),
            _ => None,
        }
    }

    /// Identify content by signature. PNG, JPEG and RIFF/AVI magic sits at
    /// byte 0; MP4 carries an `ftyp` box at offset 4.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            return Some(Self::Mp4);
        }
        if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"AVI " {
            return Some(Self::Avi);
        }
        None
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::Mp4 | Self::Avi)
    }

    /// Extension of the artifact the renderer writes for this input.
    /// Stills render to PNG composites, videos to MP4.
    pub fn artifact_extension(self) -> &'static str {
        if self.is_video() {
            "mp4"
        } else {
            "png"
        }
    }
}

/// What `POST /upload` accepts. Built from `AppConfig::policy()`.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Size ceiling in whole megabytes, as shown to users.
    pub fn limit_mb(&self) -> u64 {
        self.max_bytes / (1024 * 1024)
    }

    /// Validate one upload before any byte is persisted.
    ///
    /// The declared content type and filename gate the request; the bytes
    /// decide the final kind. A file whose signature is recognized is
    /// accepted as what it actually is, even if the declared type says
    /// otherwise; bytes matching no supported signature are rejected.
    pub fn validate(
        &self,
        filename: &str,
        declared_mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<MediaKind, ValidationError> {
        if filename.is_empty() {
            return Err(ValidationError::MissingFile);
        }

        let declared = declared_mime
            .and_then(MediaKind::from_mime)
            .or_else(|| MediaKind::from_extension(filename));
        if declared.is_none() {
            return Err(ValidationError::UnsupportedType {
                declared: declared_mime.unwrap_or("unknown").to_string(),
            });
        }

        if bytes.len() as u64 > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size: bytes.len() as u64,
                limit_mb: self.limit_mb(),
            });
        }

        match MediaKind::sniff(bytes) {
            Some(kind) => Ok(kind),
            None => Err(ValidationError::ContentMismatch),
        }
    }
}
