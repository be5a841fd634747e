//! The concept→synonym mapping is a bundled data file, not match arms:
//! adding a concept is an edit to `data/lexicon.json`, never a code change.

use std::collections::BTreeMap;
use std::sync::OnceLock;

static LEXICON: OnceLock<BTreeMap<String, Vec<String>>> = OnceLock::new();

fn raw() -> &'static BTreeMap<String, Vec<String>> {
    LEXICON.get_or_init(|| {
        serde_json::from_str(include_str!("../data/lexicon.json"))
            .expect("bundled lexicon.json is valid JSON")
    })
}

/// Split on non-alphanumeric boundaries and lowercase, e.g. `Ticket_Cost`
/// -> `["ticket", "cost"]`.
pub fn normalize(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_ascii_lowercase())
        .collect()
}

/// Match a column name against every concept's synonym set; a concept
/// matches when any of its (normalized) synonyms overlaps any token of the
/// column name. Among matching concepts, the one with the most overlapping
/// tokens wins; ties break by the concept's position in the lexicon file.
///
/// Returns the winning concept's name and its full synonym list, or `None`
/// if the column matched no concept at all.
pub fn match_concept(column_name: &str) -> Option<(String, Vec<String>)> {
    let tokens = normalize(column_name);
    if tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, &String, &Vec<String>)> = None;
    for (concept, synonyms) in raw() {
        let overlap = synonyms
            .iter()
            .filter(|syn| tokens.iter().any(|t| t == &normalize(syn).join("")))
            .count();
        if overlap == 0 {
            continue;
        }
        match best {
            Some((best_overlap, ..)) if best_overlap >= overlap => {}
            _ => best = Some((overlap, concept, synonyms)),
        }
    }
    best.map(|(_, concept, synonyms)| (concept.clone(), synonyms.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mixed_case_and_underscores() {
        assert_eq!(normalize("Ticket_Cost"), vec!["ticket", "cost"]);
    }

    #[test]
    fn ticket_cost_matches_price_concept() {
        let (concept, synonyms) = match_concept("Ticket_Cost").unwrap();
        assert_eq!(concept, "price");
        assert!(synonyms.iter().any(|s| s == "cost"));
    }

    #[test]
    fn revenue_column_matches_price_concept() {
        // "revenue" is listed as a synonym of `price`, so a column literally
        // named "revenue" groups with Ticket_Cost-style columns under one
        // concept rather than splitting into its own group.
        let (concept, _) = match_concept("revenue").unwrap();
        assert_eq!(concept, "price");
    }

    #[test]
    fn sales_column_matches_revenue_concept() {
        let (concept, _) = match_concept("sales").unwrap();
        assert_eq!(concept, "revenue");
    }

    #[test]
    fn unrecognized_column_matches_nothing() {
        assert!(match_concept("zzqqxx").is_none());
    }
}
