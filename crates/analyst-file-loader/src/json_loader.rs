use crate::error::LoaderError;
use crate::infer::{infer_column_type, parse_cell};
use analyst_core::Frame;
use serde_json::Value;
use std::path::Path;

/// Attempt, in order, the three JSON shapes spec §4.2 names: a top-level
/// array of objects, a top-level object wrapping exactly one array-valued
/// field, or newline-delimited objects. The first strategy that succeeds
/// wins; failure of all three is `MalformedJson`.
pub fn load_json(path: &Path, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let text = std::fs::read_to_string(path)?;
    let rows = sniff_and_parse(&text)?;
    build_frame(rows, limit)
}

fn sniff_and_parse(text: &str) -> Result<Vec<serde_json::Map<String, Value>>, LoaderError> {
    let trimmed = text.trim_start();
    array_of_objects(trimmed)
        .or_else(|_| object_wrapping_array(trimmed))
        .or_else(|_| newline_delimited(text))
}

fn as_object_rows(value: Value) -> Result<Vec<serde_json::Map<String, Value>>, LoaderError> {
    let Value::Array(items) = value else {
        return Err(LoaderError::MalformedJson("expected a JSON array".into()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(obj) => Ok(obj),
            other => Err(LoaderError::MalformedJson(format!(
                "expected an object row, found {other}"
            ))),
        })
        .collect()
}

/// Strategy 1: top-level array of objects.
fn array_of_objects(text: &str) -> Result<Vec<serde_json::Map<String, Value>>, LoaderError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LoaderError::MalformedJson(e.to_string()))?;
    as_object_rows(value)
}

/// Strategy 2: a top-level object containing exactly one array-valued
/// field; unwrap it and treat it as strategy 1.
fn object_wrapping_array(text: &str) -> Result<Vec<serde_json::Map<String, Value>>, LoaderError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LoaderError::MalformedJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(LoaderError::MalformedJson("expected a JSON object".into()));
    };
    let array_fields: Vec<_> = obj
        .into_iter()
        .filter(|(_, v)| matches!(v, Value::Array(_)))
        .collect();
    match array_fields.len() {
        1 => as_object_rows(array_fields.into_iter().next().unwrap().1),
        0 => Err(LoaderError::MalformedJson("no array-valued field found".into())),
        n => Err(LoaderError::MalformedJson(format!(
            "expected exactly one array-valued field, found {n}"
        ))),
    }
}

/// Strategy 3: newline-delimited objects, one row per non-blank line.
fn newline_delimited(text: &str) -> Result<Vec<serde_json::Map<String, Value>>, LoaderError> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).map_err(|e| LoaderError::MalformedJson(e.to_string()))?;
        match value {
            Value::Object(obj) => rows.push(obj),
            other => {
                return Err(LoaderError::MalformedJson(format!(
                    "expected an object per line, found {other}"
                )))
            }
        }
    }
    if rows.is_empty() {
        return Err(LoaderError::MalformedJson("no rows parsed".into()));
    }
    Ok(rows)
}

fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn build_frame(
    rows: Vec<serde_json::Map<String, Value>>,
    limit: Option<usize>,
) -> Result<Frame, LoaderError> {
    // Columns are the union of keys in first-seen order across all rows.
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let limited: Vec<_> = match limit {
        Some(n) => rows.into_iter().take(n).collect(),
        None => rows,
    };

    let raw_rows: Vec<Vec<String>> = limited
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| row.get(col).map(json_value_to_string).unwrap_or_default())
                .collect()
        })
        .collect();

    let column_types = (0..columns.len())
        .map(|col| infer_column_type(raw_rows.iter().map(|r| r[col].as_str())))
        .collect::<Vec<_>>();

    let frame_rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(column_types.iter())
                .map(|(raw, ty)| parse_cell(&raw, *ty))
                .collect()
        })
        .collect();

    Ok(Frame::new(columns, column_types, frame_rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn array_of_objects_strategy() {
        let f = write_temp(r#"[{"revenue": 500}, {"revenue": 1500}]"#);
        let frame = load_json(f.path(), None).unwrap();
        assert_eq!(frame.columns, vec!["revenue"]);
        assert_eq!(frame.row_count(), 2);
    }

    #[test]
    fn object_wrapping_array_strategy() {
        let f = write_temp(r#"{"meta": "x", "data": [{"a": 1}, {"a": 2}]}"#);
        let frame = load_json(f.path(), None).unwrap();
        assert_eq!(frame.columns, vec!["a"]);
        assert_eq!(frame.row_count(), 2);
    }

    #[test]
    fn newline_delimited_strategy() {
        let f = write_temp("{\"a\": 1}\n{\"a\": 2}\n{\"a\": 3}\n");
        let frame = load_json(f.path(), None).unwrap();
        assert_eq!(frame.row_count(), 3);
    }

    #[test]
    fn all_three_shapes_agree_on_columns_and_row_count() {
        let array = write_temp(r#"[{"revenue": 1}, {"revenue": 2}]"#);
        let wrapped = write_temp(r#"{"data": [{"revenue": 1}, {"revenue": 2}]}"#);
        let ndjson = write_temp("{\"revenue\": 1}\n{\"revenue\": 2}\n");

        let f1 = load_json(array.path(), None).unwrap();
        let f2 = load_json(wrapped.path(), None).unwrap();
        let f3 = load_json(ndjson.path(), None).unwrap();

        assert_eq!(f1.columns, f2.columns);
        assert_eq!(f2.columns, f3.columns);
        assert_eq!(f1.row_count(), f2.row_count());
        assert_eq!(f2.row_count(), f3.row_count());
    }
}
