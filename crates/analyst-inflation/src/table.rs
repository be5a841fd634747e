use crate::error::InflationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

/// Calendar-month abbreviations in the order the wire shape and scrape
/// output both use.
pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Persisted reference data: `fetched_at`, an identifier for where it came
/// from, and `year -> month_abbrev -> annual-change percentage`.
///
/// `source_identifier` is in-memory bookkeeping, not part of the on-disk
/// shape (the persisted file carries only `fetched_at` and `data`, per the
/// wire shape the system prescribes).
#[derive(Debug, Clone)]
pub struct InflationTable {
    pub fetched_at: DateTime<Utc>,
    pub source_identifier: String,
    pub rows: BTreeMap<i32, BTreeMap<String, f64>>,
    /// Set when the table is a prior good value returned after a failed
    /// refresh attempt, rather than freshly fetched or freshly loaded.
    pub stale: bool,
}

impl InflationTable {
    pub fn empty(source_identifier: impl Into<String>) -> Self {
        Self {
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
            source_identifier: source_identifier.into(),
            rows: BTreeMap::new(),
            stale: false,
        }
    }

    /// Merge `incoming` onto `self`: years present in `incoming` overwrite
    /// (their months replace wholesale), years absent from `incoming` are
    /// preserved untouched. Never removes a year `self` already has.
    pub fn merge(&mut self, incoming: &InflationTable) {
        for (year, months) in &incoming.rows {
            self.rows.insert(*year, months.clone());
        }
        self.fetched_at = incoming.fetched_at;
    }
}

/// On-disk shape: `{ "fetched_at": ..., "data": { "<year>": { "Jan": ... } } }`.
/// Year keys are strings for stability across readers that don't expect a
/// numeric-keyed JSON object.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    fetched_at: DateTime<Utc>,
    data: BTreeMap<String, BTreeMap<String, f64>>,
}

impl CacheFile {
    fn from_table(table: &InflationTable) -> Self {
        Self {
            fetched_at: table.fetched_at,
            data: table
                .rows
                .iter()
                .map(|(year, months)| (year.to_string(), months.clone()))
                .collect(),
        }
    }

    fn into_table(self, source_identifier: impl Into<String>) -> Result<InflationTable, InflationError> {
        let mut rows = BTreeMap::new();
        for (year_str, months) in self.data {
            let year: i32 = year_str
                .parse()
                .map_err(|_| InflationError::MalformedCache(format!("non-numeric year key {year_str}")))?;
            rows.insert(year, months);
        }
        Ok(InflationTable {
            fetched_at: self.fetched_at,
            source_identifier: source_identifier.into(),
            rows,
            stale: false,
        })
    }
}

/// Read the persisted table at `path`; an absent file is an empty table
/// rather than an error.
pub fn load_from_disk(path: &Path, source_identifier: &str) -> Result<InflationTable, InflationError> {
    if !path.exists() {
        return Ok(InflationTable::empty(source_identifier));
    }
    let text = std::fs::read_to_string(path)?;
    let file: CacheFile =
        serde_json::from_str(&text).map_err(|e| InflationError::MalformedCache(e.to_string()))?;
    file.into_table(source_identifier)
}

/// Atomically replace the persisted table: write to a sibling temp file in
/// the same directory, then rename over the target. A crash mid-write never
/// leaves a truncated cache in place.
pub fn write_to_disk(path: &Path, table: &InflationTable) -> Result<(), InflationError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let body = serde_json::to_string_pretty(&CacheFile::from_table(table))
        .map_err(|e| InflationError::MalformedCache(e.to_string()))?;
    tmp.write_all(body.as_bytes())?;
    tmp.persist(path).map_err(|e| InflationError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = load_from_disk(&dir.path().join("absent.json"), "test").unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut table = InflationTable::empty("test-source");
        table.fetched_at = Utc::now();
        table.rows.insert(2023, BTreeMap::from([("Jan".to_string(), 4.7)]));

        write_to_disk(&path, &table).unwrap();
        let loaded = load_from_disk(&path, "test-source").unwrap();

        assert_eq!(loaded.rows.get(&2023).unwrap().get("Jan"), Some(&4.7));
    }

    #[test]
    fn merge_overwrites_matching_years_and_preserves_others() {
        let mut base = InflationTable::empty("x");
        base.rows.insert(2020, BTreeMap::from([("Jan".to_string(), 1.0)]));
        base.rows.insert(2021, BTreeMap::from([("Jan".to_string(), 2.0)]));

        let mut incoming = InflationTable::empty("x");
        incoming.rows.insert(2021, BTreeMap::from([("Jan".to_string(), 9.9)]));

        base.merge(&incoming);

        assert_eq!(base.rows.get(&2020).unwrap().get("Jan"), Some(&1.0));
        assert_eq!(base.rows.get(&2021).unwrap().get("Jan"), Some(&9.9));
    }
}
