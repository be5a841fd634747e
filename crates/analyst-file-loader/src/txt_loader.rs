use crate::delimited::load_delimited;
use crate::error::LoaderError;
use crate::infer::{infer_column_type, parse_cell};
use analyst_core::Frame;
use std::path::Path;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b'|', b';'];
const SNIFF_LINES: usize = 20;

/// Score each candidate delimiter over the first up to 20 lines by the
/// count of fields it produces per line; the delimiter with the highest
/// *uniform* count across those lines wins. Falls back to single-column
/// text if no delimiter yields a uniform count.
pub fn load_txt(path: &Path, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let text = std::fs::read_to_string(path)?;
    let sample: Vec<&str> = text.lines().take(SNIFF_LINES).collect();

    match detect_delimiter(&sample) {
        Some(delimiter) => load_delimited(path, delimiter, limit),
        None => load_single_column(&text, limit),
    }
}

fn detect_delimiter(sample: &[&str]) -> Option<u8> {
    let non_blank: Vec<&str> = sample.iter().copied().filter(|l| !l.trim().is_empty()).collect();
    if non_blank.is_empty() {
        return None;
    }

    let mut best: Option<(u8, usize)> = None;
    for &delim in &CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = non_blank
            .iter()
            .map(|line| line.matches(delim as char).count() + 1)
            .collect();
        let first = counts[0];
        let uniform = first > 1 && counts.iter().all(|c| *c == first);
        if uniform {
            match best {
                Some((_, best_count)) if best_count >= first => {}
                _ => best = Some((delim, first)),
            }
        }
    }
    best.map(|(delim, _)| delim)
}

fn load_single_column(text: &str, limit: Option<usize>) -> Result<Frame, LoaderError> {
    let mut raw_rows: Vec<String> = Vec::new();
    for line in text.lines() {
        raw_rows.push(line.to_string());
        if let Some(n) = limit {
            if raw_rows.len() >= n {
                break;
            }
        }
    }
    let column_type = infer_column_type(raw_rows.iter().map(|s| s.as_str()));
    let rows = raw_rows
        .iter()
        .map(|raw| vec![parse_cell(raw, column_type)])
        .collect();
    Ok(Frame::new(vec!["text".to_string()], vec![column_type], rows))
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
    fn detects_pipe_delimiter() {
        let f = write_temp("a|b|c\n1|2|3\n4|5|6\n");
        let frame = load_txt(f.path(), None).unwrap();
        assert_eq!(frame.columns, vec!["a", "b", "c"]);
        assert_eq!(frame.row_count(), 2);
    }

    #[test]
    fn detects_semicolon_delimiter() {
        let f = write_temp("a;b\n1;2\n3;4\n");
        let frame = load_txt(f.path(), None).unwrap();
        assert_eq!(frame.columns, vec!["a", "b"]);
    }

    #[test]
    fn falls_back_to_single_column_text() {
        let f = write_temp("hello world\nfoo bar\nbaz\n");
        let frame = load_txt(f.path(), None).unwrap();
        assert_eq!(frame.columns, vec!["text"]);
        assert_eq!(frame.row_count(), 3);
    }
}
