use crate::error::LoaderError;
use crate::infer::{infer_column_type, parse_cell};
use analyst_core::Frame;
use std::path::Path;

/// Shared implementation for CSV (`,`) and TSV (`\t`): first row is header,
/// types inferred column-wise by majority vote over sampled rows.
///
/// `limit` bounds how many data rows are read — `Some(n)` for
/// `load_head`'s streaming short-circuit, `None` for a full `load`.
pub fn load_delimited(path: &Path, delimiter: u8, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoaderError::MalformedCsv(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| LoaderError::MalformedCsv(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| LoaderError::MalformedCsv(e.to_string()))?;
        let mut row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        row.resize(headers.len(), String::new());
        raw_rows.push(row);
        if let Some(n) = limit {
            if raw_rows.len() >= n {
                break;
            }
        }
    }

    let column_types = (0..headers.len())
        .map(|col| infer_column_type(raw_rows.iter().map(|r| r[col].as_str())))
        .collect::<Vec<_>>();

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(column_types.iter())
                .map(|(raw, ty)| parse_cell(&raw, *ty))
                .collect()
        })
        .collect();

    Ok(Frame::new(headers, column_types, rows))
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
    fn parses_header_and_infers_types() {
        let f = write_temp("Avg_Price,Name\n110.92,a\n127.24,b\n101.71,c\n");
        let frame = load_delimited(f.path(), b',', None).unwrap();
        assert_eq!(frame.columns, vec!["Avg_Price", "Name"]);
        assert_eq!(frame.row_count(), 3);
        assert_eq!(frame.column_values("Avg_Price")[0].as_f64(), Some(110.92));
    }

    #[test]
    fn load_head_stops_after_n_rows() {
        let f = write_temp("x\n1\n2\n3\n4\n5\n");
        let frame = load_delimited(f.path(), b',', Some(2)).unwrap();
        assert_eq!(frame.row_count(), 2);
    }
}
