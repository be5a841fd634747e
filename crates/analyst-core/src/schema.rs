use crate::{ColumnType, FileFormat};
use serde::{Deserialize, Serialize};

/// A column's name paired with the natural-language synonyms the Schema
/// Inspector's lexicon matched against it, e.g. `revenue` -> `["sales",
/// "income", "total_amount"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHint {
    pub column: String,
    pub synonyms: Vec<String>,
}

/// One inferred column: its name, type, and up to five sampled values
/// (rendered as display strings so the model prompt doesn't need to know
/// about [`crate::FrameValue`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub inferred_type: ColumnType,
    pub sample_values: Vec<String>,
}

/// Derived, cheap description of a [`crate::DataFile`]'s shape. Cacheable
/// but inexpensive enough that the Schema Inspector recomputes it on every
/// job rather than persisting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub file: String,
    pub format: FileFormat,
    pub row_count_estimate: usize,
    pub columns: Vec<Column>,
    pub semantic_hints: Vec<SemanticHint>,
}
