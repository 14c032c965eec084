use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Text,
    Image,
    Video,
    Audio,
    Pdf,
    Document,
    Other,
}

impl FileType {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "json" | "xml" | "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf"
            | "csv" | "log" => Self::Text,
            "go" | "py" | "js" | "ts" | "java" | "c" | "cpp" | "h" | "hpp" | "rs" | "rb"
            | "php" | "sh" | "bash" => Self::Text,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" => Self::Image,
            "mp4" | "avi" | "mkv" | "mov" | "wmv" | "flv" | "webm" => Self::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "wma" | "m4a" => Self::Audio,
            "pdf" => Self::Pdf,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp" => {
                Self::Document
            }
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Pdf => write!(f, "pdf"),
            Self::Document => write!(f, "document"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "pdf" => Ok(Self::Pdf),
            "document" => Ok(Self::Document),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown file type: {s}")),
        }
    }
}

/// One row of the persisted index, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,
    pub description: String,
    pub file_type: FileType,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub symlink_target: Option<String>,
}

impl IndexedFile {
    /// Builds a record from the live (non-followed) metadata of `path`.
    pub fn from_disk(path: &Path, description: &str, file_type: FileType) -> std::io::Result<Self> {
        let metadata = std::fs::symlink_metadata(path)?;
        let symlink_target = if metadata.file_type().is_symlink() {
            Some(std::fs::read_link(path)?.to_string_lossy().to_string())
        } else {
            None
        };
        let now = Utc::now();

        Ok(Self {
            path: path.to_string_lossy().to_string(),
            description: description.to_string(),
            file_type,
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(metadata.modified()?),
            indexed_at: now,
            updated_at: now,
            symlink_target,
        })
    }
}
