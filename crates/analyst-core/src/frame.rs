use serde::{Deserialize, Serialize};

/// Inferred per-column type, used both on [`Frame`] columns and on
/// [`crate::schema::Column`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Date,
    Boolean,
}

/// A single cell value. `Null` is the single uniform missing-value sentinel
/// every loader emits instead of leaking format-specific residue (empty
/// string, `NaN`, Excel's blank cell, JSON's `null`) to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum FrameValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl FrameValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FrameValue::Null)
    }

    /// Render the value the way generated analysis code would expect to see
    /// it when stringified (for debugging, prompts, and loader-equivalence
    /// tests). `Null` stringifies to the empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            FrameValue::Null => String::new(),
            FrameValue::Int(i) => i.to_string(),
            FrameValue::Real(r) => {
                if r.fract() == 0.0 && r.abs() < 1e15 {
                    format!("{r:.0}")
                } else {
                    r.to_string()
                }
            }
            FrameValue::Text(s) => s.clone(),
            FrameValue::Bool(b) => b.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FrameValue::Int(i) => Some(*i as f64),
            FrameValue::Real(r) => Some(*r),
            _ => None,
        }
    }
}

/// The unified in-memory table every Loader strategy converges on: ordered
/// column names, a per-column inferred type, and row-major values. Column
/// names are preserved exactly as seen in the source file — no implicit
/// renaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<Vec<FrameValue>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, column_types: Vec<ColumnType>, rows: Vec<Vec<FrameValue>>) -> Self {
        Self {
            columns,
            column_types,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values in a named column, in row order. Empty if the column does
    /// not exist.
    pub fn column_values(&self, name: &str) -> Vec<&FrameValue> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|row| &row[idx]).collect(),
            None => Vec::new(),
        }
    }

    /// Truncate to the first `n` rows in place; used by `load_head` callers
    /// for formats that can only be parsed in full (JSON, Excel).
    pub fn truncate_rows(&mut self, n: usize) {
        self.rows.truncate(n);
    }
}
