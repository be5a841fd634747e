//! Prompt assembly (spec §4.5's contract): the categories of content a
//! prompt must include, independent of exact wording. Kept as pure
//! functions over already-derived data so they're testable without a
//! running model or filesystem.

use crate::model::{Message, Role};
use analyst_core::{DataFile, Schema};
use std::fmt::Write as _;

/// Crude heuristic for "the data references a timespan whose analysis will
/// benefit from inflation" (spec §4.5's context-step condition): the
/// question mentions the word "inflation"/"adjust"/"adjusted", or contains
/// at least one plausible calendar year. Returns the year range to
/// summarize (from the earliest year mentioned, or ten years back absent
/// an explicit year, through the current year inclusive).
pub fn detect_inflation_range(question: &str, current_year: i32) -> Option<(i32, i32)> {
    let lower = question.to_ascii_lowercase();
    let mentions_keyword = lower.contains("inflation")
        || lower.contains("adjust")
        || lower.contains("real terms")
        || lower.contains("today's dollars");

    let years: Vec<i32> = question
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<i32>().ok())
        .filter(|y| (1900..=2100).contains(y))
        .collect();

    if years.is_empty() && !mentions_keyword {
        return None;
    }

    let start = years.iter().copied().min().unwrap_or(current_year - 10);
    let end = (current_year + 1).max(start + 1);
    Some((start, end))
}

/// Render the `(name, size, format)` listing required by the prompt
/// contract's multi-file-listing category.
fn render_file_listing(data_files: &[DataFile]) -> String {
    let mut out = String::new();
    for file in data_files {
        let format = file
            .format
            .map(|f| format!("{f:?}"))
            .unwrap_or_else(|| "unknown".to_string());
        let _ = writeln!(out, "  - {} ({} bytes, {})", file.name, file.size, format);
    }
    out
}

/// Build the system + initial user messages for a job. `normalization_guide`
/// is only included when two or more files are present; `inflation_summary`
/// is only included when [`detect_inflation_range`] found the question
/// timespan-relevant.
pub fn assemble_initial_conversation(
    question: &str,
    primary_file: Option<&str>,
    data_files: &[DataFile],
    schemas: &[Schema],
    normalization_guide: Option<&str>,
    inflation_summary: Option<&str>,
) -> Vec<Message> {
    let mut system = String::new();
    system.push_str(
        "You are a data analyst. You answer questions about tabular data files by \
         writing and running small scripts. Every time you need the contents of a \
         file, obtain a Frame through the File Loader — never write an ad-hoc parser \
         for CSV, TSV, JSON, Excel, or delimited text yourself. Reply with either a \
         single fenced code block to execute, or, once you have your final answer, \
         plain text with no code block.\n\n",
    );

    let _ = writeln!(system, "Question: {question}");
    if let Some(primary) = primary_file {
        let _ = writeln!(system, "Primary file hint: {primary}");
    }

    system.push_str("\nAvailable files:\n");
    system.push_str(&render_file_listing(data_files));

    system.push_str("\nSchema summary:\n");
    for schema in schemas {
        let _ = writeln!(system, "File: {} (~{} rows)", schema.file, schema.row_count_estimate);
        for column in &schema.columns {
            let _ = write!(system, "  - {} [{:?}]", column.name, column.inferred_type);
            if !column.sample_values.is_empty() {
                let _ = write!(system, " e.g. {}", column.sample_values.join(", "));
            }
            system.push('\n');
        }
        for hint in &schema.semantic_hints {
            let _ = writeln!(system, "    ({} may also be called: {})", hint.column, hint.synonyms.join(", "));
        }
    }

    if let Some(guide) = normalization_guide {
        system.push_str("\nMulti-file normalization guide:\n");
        system.push_str(guide);
    }

    if let Some(inflation) = inflation_summary {
        system.push_str("\nInflation reference data:\n");
        system.push_str(inflation);
    }

    vec![Message { role: Role::System, content: system }]
}
