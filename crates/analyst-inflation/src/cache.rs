use crate::error::InflationError;
use crate::scrape;
use crate::table::{self, InflationTable};
use chrono::{Datelike, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Persistent historical inflation table with conditional refresh.
pub struct InflationCache {
    path: PathBuf,
    source_url: String,
    max_age_days: i64,
    client: reqwest::Client,
}

impl InflationCache {
    pub fn new(path: impl Into<PathBuf>, source_url: impl Into<String>, max_age_days: i64) -> Self {
        Self {
            path: path.into(),
            source_url: source_url.into(),
            max_age_days,
            client: reqwest::Client::new(),
        }
    }

    /// Read the persisted table; empty (not an error) if absent.
    pub fn load(&self) -> Result<InflationTable, InflationError> {
        table::load_from_disk(&self.path, &self.source_url)
    }

    fn needs_refresh(&self, current: &InflationTable, force: bool) -> bool {
        if force {
            return true;
        }
        if current.rows.is_empty() {
            return true;
        }
        let age = Utc::now().signed_duration_since(current.fetched_at);
        if age.num_days() > self.max_age_days {
            return true;
        }
        current.fetched_at.year() != Utc::now().year()
    }

    /// Refresh if warranted (missing, stale by age, or stamped from a
    /// different year than now); otherwise return the cached table as-is.
    /// A fetch/parse failure never crashes the caller or loses good data:
    /// the previously cached table is returned with `stale = true`.
    pub async fn refresh(&self, force: bool) -> Result<InflationTable, InflationError> {
        let mut current = self.load()?;
        if !self.needs_refresh(&current, force) {
            return Ok(current);
        }

        match scrape::fetch_and_parse(&self.client, &self.source_url).await {
            Ok(fresh) => {
                current.merge(&fresh);
                current.source_identifier = fresh.source_identifier;
                current.stale = false;
                table::write_to_disk(&self.path, &current)?;
                Ok(current)
            }
            Err(err) => {
                tracing::warn!(error = %err, "inflation refresh failed, serving stale cache");
                current.stale = true;
                Ok(current)
            }
        }
    }

    /// Mean of available monthly percentages for `year`; `None` if no
    /// months are present (callers supply their own fallback).
    pub fn annual_rate(table: &InflationTable, year: i32) -> Option<f64> {
        let months = table.rows.get(&year)?;
        if months.is_empty() {
            return None;
        }
        Some(months.values().sum::<f64>() / months.len() as f64)
    }

    /// Compound growth over `[start_year, end_year)`; years with no data
    /// contribute `default_pct` (3.0 unless the caller overrides it).
    pub fn cumulative(table: &InflationTable, start_year: i32, end_year: i32, default_pct: Option<f64>) -> f64 {
        let fallback = default_pct.unwrap_or(3.0);
        let mut growth = 1.0;
        for year in start_year..end_year {
            let pct = Self::annual_rate(table, year).unwrap_or(fallback);
            growth *= 1.0 + pct / 100.0;
        }
        growth - 1.0
    }

    /// Human-readable block suitable for injection into a model prompt.
    pub fn summary(table: &InflationTable, start_year: i32, end_year: i32) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Inflation reference (source: {}, fetched {}{}):",
            table.source_identifier,
            table.fetched_at.format("%Y-%m-%d"),
            if table.stale { ", STALE" } else { "" }
        );
        for year in start_year..end_year {
            match Self::annual_rate(table, year) {
                Some(rate) => {
                    let _ = writeln!(out, "  {year}: {rate:.2}%");
                }
                None => {
                    let _ = writeln!(out, "  {year}: no data");
                }
            }
        }
        let cumulative = Self::cumulative(table, start_year, end_year, None);
        let _ = writeln!(out, "Cumulative {start_year}-{end_year}: {:.1}%", cumulative * 100.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table_with(years: &[(i32, f64)]) -> InflationTable {
        let mut table = InflationTable::empty("test");
        table.fetched_at = Utc::now();
        for (year, pct) in years {
            table.rows.insert(*year, BTreeMap::from([("Jan".to_string(), *pct)]));
        }
        table
    }

    #[test]
    fn annual_rate_averages_available_months() {
        let mut table = InflationTable::empty("test");
        table.rows.insert(2023, BTreeMap::from([("Jan".to_string(), 4.0), ("Feb".to_string(), 6.0)]));
        assert_eq!(InflationCache::annual_rate(&table, 2023), Some(5.0));
    }

    #[test]
    fn annual_rate_is_none_for_absent_year() {
        let table = InflationTable::empty("test");
        assert_eq!(InflationCache::annual_rate(&table, 1999), None);
    }

    #[test]
    fn cumulative_compounds_known_years_and_defaults_missing() {
        let table = table_with(&[(2020, 2.0), (2021, 3.0)]);
        // 2022 has no data, falls back to the 3% default.
        let cumulative = InflationCache::cumulative(&table, 2020, 2023, None);
        let expected = (1.02 * 1.03 * 1.03) - 1.0;
        assert!((cumulative - expected).abs() < 1e-9);
    }

    #[test]
    fn summary_marks_stale_tables() {
        let mut table = table_with(&[(2023, 4.7)]);
        table.stale = true;
        let text = InflationCache::summary(&table, 2023, 2024);
        assert!(text.contains("STALE"));
    }
}
