//! Images handed to the tracker.
//!
//! The protocol never carries pixels directly; an image travels as a string
//! descriptor:
//!
//! | Variant | Format   | Wire form                          |
//! |---------|----------|------------------------------------|
//! | Path    | `path`   | `file:///absolute/path.jpg`        |
//! | Url     | `url`    | the URL as-is                      |
//! | Buffer  | `buffer` | `data:image/<jpeg\|png>;<base64>`  |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};

const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: [u8; 4] = [0x89, b'P', b'N', b'G'];

/// Image formats a tracker may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Local file path
    Path,
    /// Remote URL
    Url,
    /// Raw pixel memory
    Memory,
    /// Encoded file contents
    Buffer,
}

impl ImageFormat {
    /// Wire name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Url => "url",
            Self::Memory => "memory",
            Self::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "url" => Ok(Self::Url),
            "memory" => Ok(Self::Memory),
            "buffer" => Ok(Self::Buffer),
            _ => Err(format!("Unknown image format: {}", s)),
        }
    }
}

/// Encoded image file types recognised in buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
}

impl FileType {
    /// Sniff the file type from leading magic bytes
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(TraxError::InvalidImage(format!(
                "Image buffer too short: {} bytes",
                data.len()
            )));
        }
        if data.starts_with(&JPEG_SIGNATURE) {
            Ok(FileType::Jpeg)
        } else if data.starts_with(&PNG_SIGNATURE) {
            Ok(FileType::Png)
        } else {
            Err(TraxError::InvalidImage(
                "Unsupported image file format".to_string(),
            ))
        }
    }

    /// MIME type
    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Jpeg => "image/jpeg",
            FileType::Png => "image/png",
        }
    }
}

/// An image reference sent with INITIALIZE and FRAME requests
#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    /// Local file
    Path(PathBuf),
    /// Remote resource
    Url(String),
    /// In-memory encoded file
    Buffer {
        /// Raw file contents
        data: Vec<u8>,
        /// Detected file type
        file_type: FileType,
    },
}

impl Image {
    /// Reference a local file
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Image::Path(path.into())
    }

    /// Reference a remote URL
    pub fn url(url: impl Into<String>) -> Self {
        Image::Url(url.into())
    }

    /// Wrap an encoded JPEG or PNG file.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let file_type = FileType::detect(&data)?;
        Ok(Image::Buffer { data, file_type })
    }

    /// Parse an image descriptor back into an image.
    ///
    /// Returns `None` for malformed `file:` and `data:` descriptors.
    pub fn parse(input: &str) -> Option<Image> {
        let (scheme, rest) = match input.split_once(':') {
            // A one-letter scheme is a drive letter, not a URI.
            Some((scheme, rest)) if scheme.len() > 1 => (scheme.to_lowercase(), rest),
            _ => return Some(Image::path(input)),
        };

        match scheme.as_str() {
            "file" => rest
                .strip_prefix("//")
                .filter(|path| !path.is_empty())
                .map(Image::path),
            "data" => {
                let (_, payload) = input.split_once(';')?;
                let payload = payload.strip_prefix("base64,").unwrap_or(payload);
                let data = STANDARD.decode(payload).ok()?;
                Image::from_bytes(data).ok()
            },
            _ => Some(Image::url(input)),
        }
    }

    /// Format tag of this image
    pub fn format(&self) -> ImageFormat {
        match self {
            Image::Path(_) => ImageFormat::Path,
            Image::Url(_) => ImageFormat::Url,
            Image::Buffer { .. } => ImageFormat::Buffer,
        }
    }

    /// Descriptor string placed on the wire
    pub fn wire_form(&self) -> String {
        match self {
            Image::Path(path) => file_uri(path),
            Image::Url(url) => url.clone(),
            Image::Buffer { data, file_type } => {
                format!("data:{};{}", file_type.mime(), STANDARD.encode(data))
            },
        }
    }
}

fn file_uri(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    };
    let text = absolute.to_string_lossy().replace('\\', "/");
    if text.starts_with('/') {
        format!("file://{}", text)
    } else {
        format!("file:///{}", text)
    }
}
