use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tabular format, derived from a file's extension.
///
/// The Loader may override this after sniffing (a `.txt` file may turn out
/// to be delimited data; a `.csv` file never needs sniffing since the
/// extension is authoritative for that format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    Xlsx,
    Xls,
    Txt,
}

impl FileFormat {
    /// Derive a format from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" => Some(FileFormat::Tsv),
            "json" => Some(FileFormat::Json),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            "txt" => Some(FileFormat::Txt),
            _ => None,
        }
    }
}

/// An uploaded tabular artifact. Bytes live in the data directory; the core
/// only ever reads them through the Loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFile {
    pub name: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub format: Option<FileFormat>,
}

impl DataFile {
    pub fn from_path(path: &Path, size: u64, mtime: DateTime<Utc>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension);
        Self {
            name,
            size,
            mtime,
            format,
        }
    }
}
