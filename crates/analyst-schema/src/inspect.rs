use crate::lexicon;
use analyst_core::{Column, DataFile, FrameValue, Schema, SemanticHint};
use std::path::Path;

/// Rows sampled per file when deriving a [`Schema`], absent an explicit
/// override.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Enumerates `DataFile`s and derives a [`Schema`] for each via a cheap
/// head-only read. Side-effect free: results are recomputed per call, never
/// cached across jobs.
pub struct SchemaInspector {
    sample_rows: usize,
    max_file_bytes: u64,
}

impl SchemaInspector {
    pub fn new(sample_rows: usize, max_file_bytes: u64) -> Self {
        Self {
            sample_rows: if sample_rows == 0 { DEFAULT_SAMPLE_ROWS } else { sample_rows },
            max_file_bytes,
        }
    }

    /// Derive a [`Schema`] for every file in `data_files`, skipping (and
    /// logging) any file whose path no longer resolves under `data_dir` —
    /// the inspector degrades gracefully rather than failing a whole job
    /// over one unreadable file.
    pub fn inspect_all(&self, data_dir: &Path, data_files: &[DataFile]) -> Vec<Schema> {
        data_files
            .iter()
            .filter_map(|df| match self.inspect_one(&data_dir.join(&df.name), df) {
                Ok(schema) => Some(schema),
                Err(err) => {
                    tracing::warn!(file = %df.name, error = %err, "schema inspection failed for file");
                    None
                }
            })
            .collect()
    }

    fn inspect_one(&self, path: &Path, data_file: &DataFile) -> Result<Schema, analyst_file_loader::LoaderError> {
        let frame = analyst_file_loader::load_head(path, self.sample_rows, self.max_file_bytes)?;

        let columns: Vec<Column> = frame
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| Column {
                name: name.clone(),
                inferred_type: frame.column_types[idx],
                sample_values: frame
                    .rows
                    .iter()
                    .take(5)
                    .map(|row| match row.get(idx) {
                        Some(v) => v.to_display_string(),
                        None => FrameValue::Null.to_display_string(),
                    })
                    .collect(),
            })
            .collect();

        let semantic_hints: Vec<SemanticHint> = frame
            .columns
            .iter()
            .filter_map(|name| lexicon::match_concept(name).map(|(_, synonyms)| SemanticHint {
                column: name.clone(),
                synonyms,
            }))
            .collect();

        let format = data_file.format.unwrap_or(analyst_core::FileFormat::Txt);

        Ok(Schema {
            file: data_file.name.clone(),
            format,
            row_count_estimate: estimate_row_count(data_file.size, &frame),
            columns,
            semantic_hints,
        })
    }
}

fn estimate_row_count(file_size: u64, frame: &analyst_core::Frame) -> usize {
    if frame.row_count() == 0 {
        return 0;
    }
    let total_sample_bytes: usize = frame
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string().len() + 1).sum::<usize>())
        .sum();
    let avg_row_bytes = (total_sample_bytes / frame.row_count()).max(1);
    (file_size as usize / avg_row_bytes).max(frame.row_count())
}
