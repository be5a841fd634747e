//! Column-wise type inference shared by every per-format loader.
//!
//! Per spec §4.2: types are inferred column-wise by majority vote over
//! sampled rows, with priority `integer > real > date > boolean > text` on
//! a tie, and a fallback to `text` whenever a cell can't be reconciled with
//! the winning type.

use analyst_core::{ColumnType, FrameValue};
use chrono::NaiveDate;

const MAX_SAMPLE_ROWS: usize = 200;

/// Classify a single raw cell into the narrowest type it parses as.
fn classify(raw: &str) -> ColumnType {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        // empty cells don't vote; caller filters these out before counting
        return ColumnType::Text;
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return ColumnType::Boolean;
    }
    if trimmed.parse::<i64>().is_ok() {
        return ColumnType::Integer;
    }
    if trimmed.parse::<f64>().is_ok() {
        return ColumnType::Real;
    }
    if parse_date(trimmed).is_some() {
        return ColumnType::Date;
    }
    ColumnType::Text
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];
    FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Priority rank used to break a tied majority vote: lower wins.
fn priority(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Integer => 0,
        ColumnType::Real => 1,
        ColumnType::Date => 2,
        ColumnType::Boolean => 3,
        ColumnType::Text => 4,
    }
}

/// Infer a column's type from up to [`MAX_SAMPLE_ROWS`] non-empty sampled
/// values by majority vote, breaking ties by `integer > real > date >
/// boolean > text`. A column with no non-empty samples is `Text`.
pub fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut counts = [0usize; 5];
    let mut seen_any = false;
    for raw in values.take(MAX_SAMPLE_ROWS) {
        if raw.trim().is_empty() {
            continue;
        }
        seen_any = true;
        counts[priority(classify(raw)) as usize] += 1;
    }
    if !seen_any {
        return ColumnType::Text;
    }
    let winner = counts
        .iter()
        .enumerate()
        .max_by_key(|(rank, count)| (**count, std::cmp::Reverse(*rank)))
        .map(|(rank, _)| rank)
        .unwrap_or(4);
    match winner {
        0 => ColumnType::Integer,
        1 => ColumnType::Real,
        2 => ColumnType::Date,
        3 => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

/// Parse a raw cell against a column's inferred type. A cell that cannot be
/// reconciled with the column type becomes `Null` rather than silently
/// coercing to text under a non-text column, keeping every value in a
/// typed column actually of that type.
pub fn parse_cell(raw: &str, ty: ColumnType) -> FrameValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FrameValue::Null;
    }
    match ty {
        ColumnType::Integer => trimmed
            .parse::<i64>()
            .map(FrameValue::Int)
            .unwrap_or(FrameValue::Null),
        ColumnType::Real => trimmed
            .parse::<f64>()
            .map(FrameValue::Real)
            .unwrap_or(FrameValue::Null),
        ColumnType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                FrameValue::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                FrameValue::Bool(false)
            } else {
                FrameValue::Null
            }
        }
        ColumnType::Date => {
            if parse_date(trimmed).is_some() {
                FrameValue::Text(trimmed.to_string())
            } else {
                FrameValue::Null
            }
        }
        ColumnType::Text => FrameValue::Text(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_vote_prefers_integer_on_tie() {
        let values = vec!["1", "2.5"];
        let ty = infer_column_type(values.into_iter());
        assert_eq!(ty, ColumnType::Integer);
    }

    #[test]
    fn mostly_real_wins_over_minority_integer() {
        let values = vec!["1.5", "2.5", "3.5", "4"];
        let ty = infer_column_type(values.into_iter());
        assert_eq!(ty, ColumnType::Real);
    }

    #[test]
    fn empty_samples_default_to_text() {
        let values: Vec<&str> = vec!["", "", ""];
        let ty = infer_column_type(values.into_iter());
        assert_eq!(ty, ColumnType::Text);
    }
}
