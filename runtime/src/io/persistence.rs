//! Append-only cycle log, partitioned by UTC date.
//!
//! Layout under the log root:
//! - `<YYYY-MM-DD>/cycles.jsonl`: one JSON record per line, oldest first.
//! - `<YYYY-MM-DD>/artifacts/<cycle_id>/<name>`: per-cycle content blobs.
//!
//! Directories are created lazily on first write; a missing partition reads as
//! empty. A single writer per log root is assumed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{debug, instrument};

use crate::core::types::CycleRecord;
use crate::error::RuntimeError;

pub const CYCLES_FILE: &str = "cycles.jsonl";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 2;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Handle on one log root.
#[derive(Debug, Clone)]
pub struct CycleLog {
    root: PathBuf,
    lookback_days: u32,
}

impl CycleLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Days `get_latest_cycle` searches, counting today. `0` searches every partition.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cycles_path(&self, date: &str) -> PathBuf {
        self.root.join(date).join(CYCLES_FILE)
    }

    pub fn artifacts_dir(&self, date: &str, cycle_id: &str) -> PathBuf {
        self.root.join(date).join(ARTIFACTS_DIR).join(cycle_id)
    }

    /// Append a hashed record to the partition of its start date.
    #[instrument(skip_all, fields(cycle_id = %record.cycle_id))]
    pub fn append_cycle(&self, record: &CycleRecord) -> Result<PathBuf> {
        if record.hash.is_empty() {
            return Err(RuntimeError::Storage(format!(
                "refusing to append unhashed cycle {}",
                record.cycle_id
            ))
            .into());
        }
        let date = partition_date(&record.timestamp_start)?;
        let path = self.cycles_path(&date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(record)
            .with_context(|| format!("serialize cycle {}", record.cycle_id))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;

        debug!(path = %path.display(), "appended cycle record");
        Ok(path)
    }

    /// Records of one partition (today if `None`), newest first.
    ///
    /// `limit` bounds the count; `Some(0)` returns nothing.
    pub fn read_cycles(&self, date: Option<&str>, limit: Option<usize>) -> Result<Vec<CycleRecord>> {
        let date = match date {
            Some(date) => checked_date(date)?,
            None => today(),
        };
        let mut records = self.read_partition(&date)?;
        records.reverse();
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Most recent record within the lookback window, or `None`.
    pub fn get_latest_cycle(&self) -> Result<Option<CycleRecord>> {
        self.get_latest_cycle_from(Utc::now().date_naive())
    }

    /// Like [`get_latest_cycle`](Self::get_latest_cycle) with an explicit "today".
    pub fn get_latest_cycle_from(&self, today: NaiveDate) -> Result<Option<CycleRecord>> {
        let dates: Vec<String> = if self.lookback_days == 0 {
            self.list_dates()?
        } else {
            (0..self.lookback_days)
                .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
                .map(|day| day.format(DATE_FORMAT).to_string())
                .collect()
        };

        for date in dates {
            if let Some(latest) = self.read_cycles(Some(&date), Some(1))?.into_iter().next() {
                return Ok(Some(latest));
            }
        }
        Ok(None)
    }

    /// Last record of the newest non-empty partition, however old it is.
    ///
    /// The chain always continues from here; the lookback window of
    /// [`get_latest_cycle`](Self::get_latest_cycle) plays no part.
    pub fn tail(&self) -> Result<Option<CycleRecord>> {
        for date in self.list_dates()? {
            if let Some(line) = self.raw_lines(&date)?.pop() {
                let path = self.cycles_path(&date);
                let record = serde_json::from_str(&line)
                    .with_context(|| format!("parse last record of {}", path.display()))?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Partition dates present under the root, newest first.
    pub fn list_dates(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in
            fs::read_dir(&self.root).with_context(|| format!("read {}", self.root.display()))?
        {
            let entry = entry.with_context(|| format!("read {}", self.root.display()))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if entry.path().is_dir() && NaiveDate::parse_from_str(&name, DATE_FORMAT).is_ok() {
                dates.push(name);
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    /// Every record in the log, oldest first (the order chain verification expects).
    pub fn read_all_cycles(&self) -> Result<Vec<CycleRecord>> {
        let mut records = Vec::new();
        for date in self.list_dates()?.iter().rev() {
            records.extend(self.read_partition(date)?);
        }
        Ok(records)
    }

    /// Non-empty raw lines of one partition, oldest first.
    pub fn raw_lines(&self, date: &str) -> Result<Vec<String>> {
        let path = self.cycles_path(&checked_date(date)?);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Store `content` as artifact `name` of a cycle (today's partition if `date` is `None`).
    pub fn save_artifact(
        &self,
        cycle_id: &str,
        name: &str,
        content: &[u8],
        date: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = self.artifact_dir_for(cycle_id, date)?;
        checked_name("artifact name", name)?;
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
        let path = dir.join(name);
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "saved artifact");
        Ok(path)
    }

    /// Artifact bytes, or `None` if no such artifact exists.
    pub fn read_artifact(
        &self,
        cycle_id: &str,
        name: &str,
        date: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let dir = self.artifact_dir_for(cycle_id, date)?;
        checked_name("artifact name", name)?;
        let path = dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .with_context(|| format!("read {}", path.display()))
    }

    /// Artifact names of a cycle, sorted.
    pub fn list_artifacts(&self, cycle_id: &str, date: Option<&str>) -> Result<Vec<String>> {
        let dir = self.artifact_dir_for(cycle_id, date)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read {}", dir.display()))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn artifact_dir_for(&self, cycle_id: &str, date: Option<&str>) -> Result<PathBuf> {
        checked_name("cycle id", cycle_id)?;
        let date = match date {
            Some(date) => checked_date(date)?,
            None => today(),
        };
        Ok(self.artifacts_dir(&date, cycle_id))
    }

    fn read_partition(&self, date: &str) -> Result<Vec<CycleRecord>> {
        let path = self.cycles_path(date);
        self.raw_lines(date)?
            .iter()
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("parse {} record {}", path.display(), index + 1))
            })
            .collect()
    }
}

/// UTC calendar date (`YYYY-MM-DD`) of an RFC 3339 timestamp.
pub fn partition_date(timestamp: &str) -> Result<String> {
    let at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|err| RuntimeError::Storage(format!("invalid timestamp '{timestamp}': {err}")))?;
    Ok(at.with_timezone(&Utc).format(DATE_FORMAT).to_string())
}

fn today() -> String {
    Utc::now().format(DATE_FORMAT).to_string()
}

fn checked_date(date: &str) -> Result<String> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map(|day| day.format(DATE_FORMAT).to_string())
        .map_err(|_| RuntimeError::Storage(format!("invalid partition date '{date}'")).into())
}

fn checked_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(RuntimeError::Storage(format!("invalid {what} '{name}'")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signing::verify_hash_chain;
    use crate::test_support::{chain_at, chained_records};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).expect("date")
    }

    #[test]
    fn partition_date_uses_utc() {
        assert_eq!(
            partition_date("2026-01-15T23:30:00-02:00").expect("date"),
            "2026-01-16"
        );
        assert!(partition_date("yesterday").is_err());
    }

    #[test]
    fn missing_root_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path().join("absent"));
        assert!(log.read_cycles(Some("2026-01-15"), None).expect("read").is_empty());
        assert!(log.list_dates().expect("dates").is_empty());
        assert!(log.get_latest_cycle().expect("latest").is_none());
        assert!(!temp.path().join("absent").exists());
    }

    /// Records come back newest first and survive the round trip byte for byte.
    #[test]
    fn append_then_read_newest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        let records = chained_records(3);
        for record in &records {
            let path = log.append_cycle(record).expect("append");
            assert!(path.ends_with("2026-01-15/cycles.jsonl"));
        }

        let read = log.read_cycles(Some("2026-01-15"), None).expect("read");
        assert_eq!(read.len(), 3);
        assert_eq!(read[0], records[2]);
        assert_eq!(read[2], records[0]);

        let limited = log.read_cycles(Some("2026-01-15"), Some(1)).expect("read");
        assert_eq!(limited, vec![records[2].clone()]);
        assert!(log.read_cycles(Some("2026-01-15"), Some(0)).expect("read").is_empty());

        assert!(verify_hash_chain(&log.read_all_cycles().expect("all")));
    }

    #[test]
    fn append_rejects_unhashed_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        let mut record = chained_records(1).remove(0);
        record.hash.clear();
        let err = log.append_cycle(&record).expect_err("unhashed");
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Storage(_))
        ));
    }

    /// Partitions are listed newest first and read back oldest first overall.
    #[test]
    fn read_all_spans_partitions_oldest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        let records = chain_at(&[
            "2026-01-14T23:58:00.000000Z",
            "2026-01-14T23:59:00.000000Z",
            "2026-01-15T00:01:00.000000Z",
        ]);
        for record in &records {
            log.append_cycle(record).expect("append");
        }
        fs::create_dir_all(temp.path().join("not-a-date")).expect("mkdir");

        assert_eq!(log.list_dates().expect("dates"), vec!["2026-01-15", "2026-01-14"]);
        let all = log.read_all_cycles().expect("all");
        let ids: Vec<&str> = all.iter().map(|r| r.cycle_id.as_str()).collect();
        let expected: Vec<&str> = records.iter().map(|r| r.cycle_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(verify_hash_chain(&all));
    }

    /// The tail ignores the lookback window and skips empty newer partitions.
    #[test]
    fn tail_is_last_record_of_newest_partition() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        assert!(log.tail().expect("tail").is_none());

        let records = chain_at(&[
            "2025-12-01T08:00:00.000000Z",
            "2025-12-03T08:00:00.000000Z",
            "2025-12-03T09:00:00.000000Z",
        ]);
        for record in &records {
            log.append_cycle(record).expect("append");
        }
        fs::create_dir_all(temp.path().join("2025-12-09")).expect("empty partition");

        assert_eq!(log.tail().expect("tail"), Some(records[2].clone()));
        assert!(log.get_latest_cycle().expect("latest").is_none());
    }

    /// The default window sees today and yesterday only; `0` sees everything.
    #[test]
    fn latest_respects_lookback_window() {
        let temp = tempfile::tempdir().expect("tempdir");
        let records = chain_at(&["2026-01-10T08:00:00.000000Z"]);
        CycleLog::new(temp.path())
            .append_cycle(&records[0])
            .expect("append");

        let bounded = CycleLog::new(temp.path());
        assert!(bounded.get_latest_cycle_from(day("2026-01-15")).expect("latest").is_none());
        assert_eq!(
            bounded.get_latest_cycle_from(day("2026-01-11")).expect("latest"),
            Some(records[0].clone())
        );

        let unbounded = CycleLog::new(temp.path()).with_lookback_days(0);
        assert_eq!(
            unbounded.get_latest_cycle_from(day("2026-03-01")).expect("latest"),
            Some(records[0].clone())
        );
    }

    #[test]
    fn artifacts_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        let date = Some("2026-01-15");
        assert!(log.list_artifacts("cycle_1", date).expect("list").is_empty());
        assert!(log.read_artifact("cycle_1", "b.txt", date).expect("read").is_none());

        let path = log.save_artifact("cycle_1", "b.txt", b"beta", date).expect("save");
        assert!(path.ends_with("2026-01-15/artifacts/cycle_1/b.txt"));
        log.save_artifact("cycle_1", "a.txt", b"alpha", date).expect("save");

        assert_eq!(log.list_artifacts("cycle_1", date).expect("list"), vec!["a.txt", "b.txt"]);
        assert_eq!(
            log.read_artifact("cycle_1", "a.txt", date).expect("read"),
            Some(b"alpha".to_vec())
        );
    }

    #[test]
    fn artifact_names_cannot_escape_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        for name in ["", "../x", "a/b", "a\\b", ".."] {
            assert!(log.save_artifact("cycle_1", name, b"x", None).is_err(), "{name}");
        }
        assert!(log.list_artifacts("../cycle", None).is_err());
        assert!(log.read_cycles(Some("../../etc"), None).is_err());
    }
}
