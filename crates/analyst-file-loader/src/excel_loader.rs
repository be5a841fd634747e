use crate::error::LoaderError;
use crate::infer::{infer_column_type, parse_cell};
use analyst_core::Frame;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

/// Read the first worksheet of an `.xlsx`/`.xls` workbook: the header row is
/// the first non-empty row, subsequent rows are data, blank trailing rows
/// are trimmed.
pub fn load_excel(path: &Path, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LoaderError::MalformedExcel(e.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LoaderError::MalformedExcel("workbook has no worksheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LoaderError::MalformedExcel(e.to_string()))?;

    let mut rows_iter = range.rows().filter(|row| !row.iter().all(is_blank_cell));

    let header_row = rows_iter
        .next()
        .ok_or_else(|| LoaderError::MalformedExcel("worksheet has no header row".into()))?;
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for row in rows_iter {
        let mut values: Vec<String> = row.iter().map(cell_to_string).collect();
        values.resize(headers.len(), String::new());
        raw_rows.push(values);
        if let Some(n) = limit {
            if raw_rows.len() >= n {
                break;
            }
        }
    }

    let column_types = (0..headers.len())
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

    Ok(Frame::new(headers, column_types, frame_rows))
}

fn is_blank_cell(cell: &Data) -> bool {
    matches!(cell, Data::Empty) || cell_to_string(cell).trim().is_empty()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cell_detection() {
        assert!(is_blank_cell(&Data::Empty));
        assert!(is_blank_cell(&Data::String("   ".to_string())));
        assert!(!is_blank_cell(&Data::String("x".to_string())));
        assert!(!is_blank_cell(&Data::Int(0)));
    }

    #[test]
    fn integral_floats_render_without_a_decimal_point() {
        assert_eq!(cell_to_string(&Data::Float(110.0)), "110");
        assert_eq!(cell_to_string(&Data::Float(110.5)), "110.5");
    }

    #[test]
    fn non_numeric_variants_round_trip_as_strings() {
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::DateTimeIso("2024-01-01".to_string())), "2024-01-01");
    }

    #[test]
    fn missing_workbook_path_is_malformed_excel() {
        let err = load_excel(Path::new("/nonexistent/path/does-not-exist.xlsx"), None).unwrap_err();
        assert!(matches!(err, LoaderError::MalformedExcel(_)));
    }
}
