use crate::error::InflationError;
use crate::table::{InflationTable, MONTHS};
use chrono::Utc;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Fetch the reference page and parse its table into a fresh
/// [`InflationTable`] stamped with the current time.
///
/// The reference page is expected to render one `<table>` with a header row
/// of month abbreviations and one data row per year, first cell the year —
/// the shape common to published CPI percentage-change tables. Rows that
/// don't parse as `year, pct...` are skipped rather than failing the whole
/// fetch, so a page with an extra notes row still yields a usable table.
pub async fn fetch_and_parse(client: &reqwest::Client, source_url: &str) -> Result<InflationTable, InflationError> {
    let body = client
        .get(source_url)
        .send()
        .await
        .map_err(|e| InflationError::FetchFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| InflationError::FetchFailed(e.to_string()))?
        .text()
        .await
        .map_err(|e| InflationError::FetchFailed(e.to_string()))?;

    parse_table_html(&body, source_url)
}

fn parse_table_html(html: &str, source_url: &str) -> Result<InflationTable, InflationError> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").expect("static selector is valid");
    let row_selector = Selector::parse("tr").expect("static selector is valid");
    let cell_selector = Selector::parse("td,th").expect("static selector is valid");

    let table_el = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| InflationError::MalformedSource("no <table> element found".into()))?;

    let mut rows: BTreeMap<i32, BTreeMap<String, f64>> = BTreeMap::new();
    let mut header: Vec<String> = Vec::new();

    for (row_idx, row) in table_el.select(&row_selector).enumerate() {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if cells.is_empty() {
            continue;
        }

        if row_idx == 0 {
            header = cells;
            continue;
        }

        let Ok(year) = cells[0].parse::<i32>() else {
            continue;
        };
        let mut months = BTreeMap::new();
        for (col_idx, raw) in cells.iter().enumerate().skip(1) {
            let Some(month_name) = header.get(col_idx) else {
                continue;
            };
            let Some(abbrev) = MONTHS.iter().find(|m| month_name.starts_with(*m)) else {
                continue;
            };
            if let Ok(pct) = raw.trim_end_matches('%').parse::<f64>() {
                months.insert(abbrev.to_string(), pct);
            }
        }
        if !months.is_empty() {
            rows.insert(year, months);
        }
    }

    if rows.is_empty() {
        return Err(InflationError::MalformedSource(
            "table parsed but yielded no year rows".into(),
        ));
    }

    Ok(InflationTable {
        fetched_at: Utc::now(),
        source_identifier: source_url.to_string(),
        rows,
        stale: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_table() {
        let html = r#"
            <table>
              <tr><th>Year</th><th>Jan</th><th>Feb</th></tr>
              <tr><td>2023</td><td>6.4%</td><td>6.0%</td></tr>
              <tr><td>2024</td><td>3.1%</td><td>3.2%</td></tr>
            </table>
        "#;
        let table = parse_table_html(html, "https://example.test/cpi").unwrap();
        assert_eq!(table.rows.get(&2023).unwrap().get("Jan"), Some(&6.4));
        assert_eq!(table.rows.get(&2024).unwrap().get("Feb"), Some(&3.2));
    }

    #[test]
    fn skips_non_year_rows_without_failing() {
        let html = r#"
            <table>
              <tr><th>Year</th><th>Jan</th></tr>
              <tr><td>Source: demo</td><td></td></tr>
              <tr><td>2023</td><td>4.7%</td></tr>
            </table>
        "#;
        let table = parse_table_html(html, "https://example.test/cpi").unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows.get(&2023).unwrap().get("Jan"), Some(&4.7));
    }

    #[test]
    fn missing_table_is_malformed_source() {
        let err = parse_table_html("<html><body>no data here</body></html>", "x").unwrap_err();
        assert!(matches!(err, InflationError::MalformedSource(_)));
    }
}
