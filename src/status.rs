//! Status ledger: the latest processing state of every detected file.
//!
//! Persisted as one JSON object at `status.path`:
//!
//! ```json
//! {
//!   "syllabus.pdf": { "status": "completed", "chunks_count": 7, "timestamp": "2026-10-16T09:12:03.511Z" }
//! }
//! ```
//!
//! Every [`StatusLedger::record`] rewrites the whole file through a temp
//! file in the same directory followed by a rename, so readers only ever
//! see a complete snapshot. Writers in this process are serialized by a
//! mutex; the watcher thread and the ingestion worker both write.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Status,
    pub chunks_count: usize,
    pub timestamp: DateTime<Utc>,
}

pub type StatusMap = BTreeMap<String, StatusRecord>;

pub struct StatusLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StatusLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the entry for `filename` and persist the full mapping.
    pub fn record(&self, filename: &str, status: Status, chunks_count: usize) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("status ledger lock poisoned"))?;

        let mut map = read_map(&self.path)?;
        map.insert(
            filename.to_string(),
            StatusRecord {
                status,
                chunks_count,
                timestamp: Utc::now(),
            },
        );
        write_map(&self.path, &map)?;

        tracing::debug!("[status] {} -> {} ({} chunks)", filename, status, chunks_count);
        Ok(())
    }

    /// Record `filename` as `processing` unless it already has an entry.
    /// Returns whether the entry was created. The check and the write
    /// happen under the same lock as [`record`](Self::record).
    pub fn claim(&self, filename: &str) -> Result<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("status ledger lock poisoned"))?;

        let mut map = read_map(&self.path)?;
        if map.contains_key(filename) {
            return Ok(false);
        }
        map.insert(
            filename.to_string(),
            StatusRecord {
                status: Status::Processing,
                chunks_count: 0,
                timestamp: Utc::now(),
            },
        );
        write_map(&self.path, &map)?;
        Ok(true)
    }

    /// The persisted mapping; empty if the ledger file does not exist yet.
    pub fn read_all(&self) -> Result<StatusMap> {
        read_map(&self.path)
    }

    pub fn get(&self, filename: &str) -> Result<Option<StatusRecord>> {
        Ok(self.read_all()?.remove(filename))
    }

    /// Mark `processing` records older than `max_age` as `failed`.
    ///
    /// A record left in `processing` means the process stopped while the
    /// file was queued or in flight. Returns the filenames that changed.
    pub fn reconcile_stale(&self, max_age: Duration) -> Result<Vec<String>> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("status ledger lock poisoned"))?;

        let mut map = read_map(&self.path)?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).context("stale age out of range")?;
        let now = Utc::now();

        let mut changed = Vec::new();
        for (filename, record) in map.iter_mut() {
            if record.status == Status::Processing && record.timestamp < cutoff {
                record.status = Status::Failed;
                record.chunks_count = 0;
                record.timestamp = now;
                changed.push(filename.clone());
            }
        }

        if !changed.is_empty() {
            write_map(&self.path, &map)?;
        }
        Ok(changed)
    }
}

fn read_map(path: &Path) -> Result<StatusMap> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StatusMap::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read status file {}", path.display()))
        }
    };
    if content.trim().is_empty() {
        return Ok(StatusMap::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("invalid status file {}", path.display()))
}

fn write_map(path: &Path, map: &StatusMap) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, map)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("cannot replace status file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = StatusLedger::new(tmp.path().join("file_status.json"));
        assert!(ledger.read_all().unwrap().is_empty());
        assert!(ledger.get("x.pdf").unwrap().is_none());
    }

    #[test]
    fn test_record_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let ledger = StatusLedger::new(tmp.path().join("file_status.json"));
        ledger.record("syllabus.pdf", Status::Processing, 0).unwrap();
        ledger.record("syllabus.pdf", Status::Completed, 7).unwrap();
        ledger.record("notes.txt", Status::Failed, 0).unwrap();

        let map = ledger.read_all().unwrap();
        assert_eq!(map.len(), 2);
        let rec = &map["syllabus.pdf"];
        assert_eq!(rec.status, Status::Completed);
        assert_eq!(rec.chunks_count, 7);
        assert!((Utc::now() - rec.timestamp).num_seconds() < 5);
    }

    #[test]
    fn test_claim_only_creates_missing_entries() {
        let tmp = TempDir::new().unwrap();
        let ledger = StatusLedger::new(tmp.path().join("file_status.json"));
        ledger.record("seen.pdf", Status::Processing, 0).unwrap();

        assert!(ledger.claim("new.pdf").unwrap());
        assert!(!ledger.claim("new.pdf").unwrap());
        assert!(!ledger.claim("seen.pdf").unwrap());
        assert_eq!(
            ledger.get("new.pdf").unwrap().unwrap().status,
            Status::Processing
        );
    }

    #[test]
    fn test_file_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/file_status.json");
        let ledger = StatusLedger::new(&path);
        ledger.record("a.pdf", Status::Completed, 3).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["a.pdf"]["status"], "completed");
        assert_eq!(raw["a.pdf"]["chunks_count"], 3);
        assert!(raw["a.pdf"]["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let ledger = StatusLedger::new(tmp.path().join("file_status.json"));
        for i in 0..5 {
            ledger.record(&format!("f{i}.txt"), Status::Processing, 0).unwrap();
        }
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file_status.json");
        std::fs::write(&path, "{not json").unwrap();
        let ledger = StatusLedger::new(&path);
        assert!(ledger.read_all().is_err());
    }

    #[test]
    fn test_reconcile_stale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file_status.json");
        let old = Utc::now() - chrono::Duration::hours(2);
        let mut map = StatusMap::new();
        map.insert(
            "stuck.pdf".into(),
            StatusRecord {
                status: Status::Processing,
                chunks_count: 0,
                timestamp: old,
            },
        );
        map.insert(
            "done.pdf".into(),
            StatusRecord {
                status: Status::Completed,
                chunks_count: 4,
                timestamp: old,
            },
        );
        write_map(&path, &map).unwrap();

        let ledger = StatusLedger::new(&path);
        ledger.record("fresh.pdf", Status::Processing, 0).unwrap();

        let changed = ledger.reconcile_stale(Duration::from_secs(3600)).unwrap();
        assert_eq!(changed, vec!["stuck.pdf".to_string()]);

        let map = ledger.read_all().unwrap();
        assert_eq!(map["stuck.pdf"].status, Status::Failed);
        assert_eq!(map["done.pdf"].status, Status::Completed);
        assert_eq!(map["fresh.pdf"].status, Status::Processing);
    }

    #[test]
    fn test_concurrent_writers_keep_every_entry() {
        let tmp = TempDir::new().unwrap();
        let ledger = std::sync::Arc::new(StatusLedger::new(tmp.path().join("s.json")));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger
                        .record(&format!("doc{i}.pdf"), Status::Completed, i)
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.read_all().unwrap().len(), 8);
    }
}
