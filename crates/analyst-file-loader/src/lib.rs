//! Content-aware loading of tabular files into a uniform [`Frame`].
//!
//! Dispatch is by extension (spec §4.2): `.csv`/`.tsv` go straight to the
//! delimited reader with a fixed delimiter, `.json` is sniffed across three
//! shapes, `.xlsx`/`.xls` go through `calamine`, and `.txt` gets its
//! delimiter auto-detected before falling back to single-column text.
//! Extensions outside that set are `UnsupportedFormat`.

mod delimited;
mod error;
mod excel_loader;
mod infer;
mod json_loader;
mod txt_loader;

pub use error::LoaderError;

use analyst_core::{FileFormat, Frame};
use std::path::Path;

/// Default cap on how many data rows a full [`load`] will return; callers
/// needing more should page through the source file themselves. This does
/// not bound [`load_head`], which takes its own explicit row count.
pub const DEFAULT_MAX_ROWS: usize = 1_000_000;

/// Load every row of `path`, dispatching by its extension.
///
/// Returns [`LoaderError::FileTooLarge`] if the file exceeds `max_file_bytes`
/// before any parsing is attempted, and [`LoaderError::UnsupportedFormat`]
/// for extensions outside `{csv, tsv, json, xlsx, xls, txt}`.
pub fn load(path: &Path, max_file_bytes: u64) -> Result<Frame, LoaderError> {
    load_bounded(path, max_file_bytes, None)
}

/// Load only the first `n` data rows of `path`, dispatching by extension.
///
/// Used by the Schema Inspector and by prompt context assembly, both of
/// which only need a handful of rows to characterize a file.
pub fn load_head(path: &Path, n: usize, max_file_bytes: u64) -> Result<Frame, LoaderError> {
    load_bounded(path, max_file_bytes, Some(n))
}

fn load_bounded(path: &Path, max_file_bytes: u64, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > max_file_bytes {
        return Err(LoaderError::FileTooLarge(metadata.len(), max_file_bytes));
    }

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FileFormat::from_extension)
        .ok_or_else(|| LoaderError::UnsupportedFormat(path.display().to_string()))?;

    match format {
        FileFormat::Csv => delimited::load_delimited(path, b',', limit),
        FileFormat::Tsv => delimited::load_delimited(path, b'\t', limit),
        FileFormat::Json => json_loader::load_json(path, limit),
        FileFormat::Xlsx | FileFormat::Xls => excel_loader::load_excel(path, limit),
        FileFormat::Txt => txt_loader::load_txt(path, limit),
    }
}
