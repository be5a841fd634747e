use crate::lexicon;
use analyst_core::Schema;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// `concept -> ["file:column", ...]`, in the order files were supplied and
/// columns appear within each file. A column matching no concept is absent
/// here — it still appears under its own file in the rendered guide.
pub fn group_by_concept(schemas: &[Schema]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for schema in schemas {
        for column in &schema.columns {
            if let Some((concept, _)) = lexicon::match_concept(&column.name) {
                groups
                    .entry(concept)
                    .or_default()
                    .push(format!("{}:{}", schema.file, column.name));
            }
        }
    }
    groups
}

/// A textual block suitable for injection into a model prompt: per-file
/// column listings followed by the cross-file concept groupings.
pub fn render_normalization_guide(schemas: &[Schema]) -> String {
    let mut out = String::new();

    for schema in schemas {
        let _ = writeln!(out, "File: {} ({:?}, ~{} rows)", schema.file, schema.format, schema.row_count_estimate);
        for column in &schema.columns {
            let samples = column.sample_values.join(", ");
            let _ = writeln!(
                out,
                "  - {} [{:?}] e.g. {}",
                column.name, column.inferred_type, samples
            );
        }
    }

    let groups = group_by_concept(schemas);
    if !groups.is_empty() {
        let _ = writeln!(out, "\nCross-file correspondences:");
        for (concept, members) in &groups {
            let _ = writeln!(out, "  {concept}: {}", members.join(", "));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::{Column, FileFormat};

    fn schema(file: &str, columns: &[&str]) -> Schema {
        Schema {
            file: file.to_string(),
            format: FileFormat::Csv,
            row_count_estimate: 100,
            columns: columns
                .iter()
                .map(|name| Column {
                    name: name.to_string(),
                    inferred_type: analyst_core::ColumnType::Real,
                    sample_values: vec!["1".to_string()],
                })
                .collect(),
            semantic_hints: Vec::new(),
        }
    }

    #[test]
    fn ticket_cost_and_revenue_group_under_one_concept() {
        let schemas = vec![schema("fileA", &["Ticket_Cost"]), schema("fileB", &["revenue"])];
        let groups = group_by_concept(&schemas);
        assert_eq!(groups.len(), 1);
        let (_, members) = groups.iter().next().unwrap();
        assert!(members.contains(&"fileA:Ticket_Cost".to_string()));
        assert!(members.contains(&"fileB:revenue".to_string()));
    }

    #[test]
    fn unmatched_column_produces_no_group() {
        let schemas = vec![schema("fileA", &["zzqqxx"])];
        let groups = group_by_concept(&schemas);
        assert!(groups.is_empty());
    }

    #[test]
    fn guide_lists_every_file_and_the_groups() {
        let schemas = vec![schema("fileA", &["Ticket_Cost"]), schema("fileB", &["revenue"])];
        let guide = render_normalization_guide(&schemas);
        assert!(guide.contains("File: fileA"));
        assert!(guide.contains("File: fileB"));
        assert!(guide.contains("Cross-file correspondences:"));
    }
}
