use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::warn;

use crate::error::{PulseError, Result};
use crate::models::{Month, MonthRow, MonthlyTotals};

pub const CACHE_FILE: &str = "monthly_commits.csv";
pub const CHECKPOINT_FILE: &str = ".fetch_checkpoint";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// On-disk home of the month cache and the day checkpoint.
///
/// Both files are only ever written by the process that read them at
/// startup; there is no concurrent-writer protocol.
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Store {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join(CHECKPOINT_FILE)
    }

    pub fn load_totals(&self) -> Result<MonthlyTotals> {
        load_totals_from(&self.cache_path())
    }

    pub fn save_totals(&self, totals: &MonthlyTotals) -> Result<()> {
        write_atomic(&self.cache_path(), &render_totals(totals)?)
    }

    /// The set of fully-attempted days, ascending. Malformed entries are
    /// dropped with a warning rather than poisoning the whole file.
    pub fn load_checkpoint(&self) -> Result<BTreeSet<NaiveDate>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        let text = fs::read_to_string(&path)?;
        let mut days = BTreeSet::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match NaiveDate::parse_from_str(line, DATE_FORMAT) {
                Ok(day) => {
                    days.insert(day);
                }
                Err(err) => warn!("skipping malformed checkpoint entry '{}': {}", line, err),
            }
        }
        Ok(days)
    }

    pub fn save_checkpoint(&self, days: &BTreeSet<NaiveDate>) -> Result<()> {
        let mut text = days
            .iter()
            .map(|day| day.format(DATE_FORMAT).to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(&self.checkpoint_path(), text.as_bytes())
    }

    /// Persist one completed day: cache first, checkpoint second, each via
    /// temp-file rename. The checkpoint never claims a day whose counts the
    /// cache is missing.
    pub fn commit_day(&self, totals: &MonthlyTotals, days: &BTreeSet<NaiveDate>) -> Result<()> {
        self.save_totals(totals)?;
        self.save_checkpoint(days)
    }
}

/// Load month totals from an arbitrary cache file path. A missing file is an
/// empty mapping, not an error; callers that require the file to exist check
/// before calling.
pub fn load_totals_from(path: &Path) -> Result<MonthlyTotals> {
    if !path.exists() {
        return Ok(MonthlyTotals::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut totals = MonthlyTotals::new();
    for row in reader.deserialize() {
        let row: MonthRow = row?;
        let month: Month = row.month.parse()?;
        totals.insert(month, row.commits);
    }
    Ok(totals)
}

fn render_totals(totals: &MonthlyTotals) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(["month", "commits"])?;
    for (month, commits) in totals {
        writer.write_record([month.to_string(), commits.to_string()])?;
    }
    writer
        .into_inner()
        .map_err(|err| PulseError::Other(err.to_string()))
}

/// Write the full file to a sibling temp path, then rename it into place, so
/// a crash mid-write leaves the previous contents intact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn month(text: &str) -> Month {
        text.parse().unwrap()
    }

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, DATE_FORMAT).unwrap()
    }

    #[test]
    fn totals_round_trip_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();

        let mut totals = MonthlyTotals::new();
        totals.insert(month("2023-02"), 42);
        totals.insert(month("2023-01"), 170_000_000);
        store.save_totals(&totals).unwrap();

        let first = fs::read(store.cache_path()).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&first),
            "month,commits\n2023-01,170000000\n2023-02,42\n"
        );

        let reloaded = store.load_totals().unwrap();
        assert_eq!(reloaded, totals);
        store.save_totals(&reloaded).unwrap();
        let second = fs::read(store.cache_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_totals_still_write_the_header() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();
        store.save_totals(&MonthlyTotals::new()).unwrap();
        let bytes = fs::read(store.cache_path()).unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes), "month,commits\n");
        assert!(store.load_totals().unwrap().is_empty());
    }

    #[test]
    fn missing_cache_loads_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();
        assert!(store.load_totals().unwrap().is_empty());
    }

    #[test]
    fn checkpoint_is_sorted_ascending() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();

        let mut days = BTreeSet::new();
        days.insert(day("2023-01-03"));
        days.insert(day("2023-01-01"));
        days.insert(day("2023-01-02"));
        store.save_checkpoint(&days).unwrap();

        let text = fs::read_to_string(store.checkpoint_path()).unwrap();
        assert_eq!(text, "2023-01-01\n2023-01-02\n2023-01-03\n");
        assert_eq!(store.load_checkpoint().unwrap(), days);
    }

    #[test]
    fn checkpoint_skips_malformed_lines() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();
        fs::write(
            store.checkpoint_path(),
            "2023-01-01\nnot-a-date\n2023-01-02\n",
        )
        .unwrap();
        let days = store.load_checkpoint().unwrap();
        assert_eq!(days.len(), 2);
        assert!(days.contains(&day("2023-01-01")));
        assert!(days.contains(&day("2023-01-02")));
    }

    #[test]
    fn commit_day_writes_both_files() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path()).unwrap();

        let mut totals = MonthlyTotals::new();
        totals.insert(month("2023-01"), 7);
        let mut days = BTreeSet::new();
        days.insert(day("2023-01-15"));

        store.commit_day(&totals, &days).unwrap();
        assert_eq!(store.load_totals().unwrap(), totals);
        assert_eq!(store.load_checkpoint().unwrap(), days);
    }
}
