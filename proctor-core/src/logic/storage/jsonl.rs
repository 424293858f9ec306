//! JSON-lines alert journal
//!
//! One entry per line, appended and flushed under a single lock on the
//! blocking pool. The file is replayed on open so listing never touches disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::logic::error::{ProctorError, ProctorResult};
use super::journal::{AlertEntry, AlertFilter, AlertJournal};

struct JournalFile {
    file: File,
    /// Last write may have left a partial line behind
    torn: bool,
    entries: Vec<AlertEntry>,
}

pub struct JsonlAlertJournal {
    path: PathBuf,
    inner: Arc<Mutex<JournalFile>>,
}

impl JsonlAlertJournal {
    /// Open or create the journal at `path`, replaying existing entries
    pub fn open(path: &Path) -> ProctorResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (entries, torn) = if path.exists() {
            replay(path)?
        } else {
            (Vec::new(), false)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("Alert journal {:?} opened with {} entries", path, entries.len());

        Ok(Self {
            path: path.to_path_buf(),
            inner: Arc::new(Mutex::new(JournalFile { file, torn, entries })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write one newline-terminated record with a single `write_all`. A pending
/// partial line is terminated first; any failure marks the output torn.
fn write_record<W: Write>(out: &mut W, torn: &mut bool, record: &[u8]) -> io::Result<()> {
    if *torn {
        out.write_all(b"\n")?;
        *torn = false;
    }
    let result = out.write_all(record).and_then(|()| out.flush());
    if result.is_err() {
        *torn = true;
    }
    result
}

/// Entries in file order, plus whether the last line lacks its newline
fn replay(path: &Path) -> ProctorResult<(Vec<AlertEntry>, bool)> {
    let content = fs::read_to_string(path)?;
    let torn = !content.is_empty() && !content.ends_with('\n');
    let mut entries = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AlertEntry>(line) {
            Ok(entry) => entries.push(entry),
            // A torn final line from a crash is the only expected corruption
            Err(e) => log::warn!("Skipping unreadable journal line {} in {:?}: {}", lineno + 1, path, e),
        }
    }
    Ok((entries, torn))
}

#[async_trait]
impl AlertJournal for JsonlAlertJournal {
    async fn append(&self, entry: AlertEntry) -> ProctorResult<()> {
        let mut record = serde_json::to_string(&entry)
            .map_err(|e| ProctorError::storage(format!("cannot encode alert: {}", e)))?;
        record.push('\n');

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || -> ProctorResult<()> {
            let mut guard = inner.lock();
            let JournalFile { file, torn, entries } = &mut *guard;
            write_record(file, torn, record.as_bytes())
                .map_err(|e| ProctorError::storage(format!("cannot append alert: {}", e)))?;
            entries.push(entry);
            Ok(())
        })
        .await
        .map_err(|e| ProctorError::storage(format!("journal writer failed: {}", e)))?
    }

    async fn list(&self, filter: &AlertFilter) -> ProctorResult<Vec<AlertEntry>> {
        Ok(filter.apply(self.inner.lock().entries.iter()))
    }

    async fn ping(&self) -> ProctorResult<()> {
        fs::metadata(&self.path)
            .map(|_| ())
            .map_err(|e| ProctorError::storage(format!("journal {:?} unavailable: {}", self.path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::logic::detectors::SignalKind;
    use crate::logic::signal::StudentId;
    use chrono::Utc;
    use serde_json::json;

    fn entry(direction: &str) -> AlertEntry {
        AlertEntry::new(
            StudentId::parse("TEST001").unwrap(),
            SignalKind::Audio,
            "anomaly_detected",
            direction,
            json!({"anomalies": ["volume"], "volume_level": 0.6}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_survives_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.jsonl");

        {
            let journal = JsonlAlertJournal::open(&path).unwrap();
            journal.append(entry("one")).await.unwrap();
            journal.append(entry("two")).await.unwrap();
        }

        let journal = JsonlAlertJournal::open(&path).unwrap();
        journal.append(entry("three")).await.unwrap();
        let listed: Vec<_> = journal
            .list(&AlertFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.direction)
            .collect();
        assert_eq!(listed, vec!["three", "two", "one"]);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_details_roundtrip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let original = entry("Audio anomaly");
        {
            let journal = JsonlAlertJournal::open(&path).unwrap();
            journal.append(original.clone()).await.unwrap();
        }
        let reopened = JsonlAlertJournal::open(&path).unwrap();
        let listed = reopened.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(listed, vec![original]);
        assert_eq!(listed[0].details["volume_level"], json!(0.6));
    }

    #[tokio::test]
    async fn test_torn_line_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        {
            let journal = JsonlAlertJournal::open(&path).unwrap();
            journal.append(entry("kept")).await.unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":\"trunc").unwrap();
        drop(file);

        let journal = JsonlAlertJournal::open(&path).unwrap();
        assert_eq!(journal.list(&AlertFilter::default()).await.unwrap().len(), 1);
        journal.append(entry("after")).await.unwrap();
        drop(journal);

        let journal = JsonlAlertJournal::open(&path).unwrap();
        let listed = journal.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].direction, "after");
        assert!(journal.ping().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_one_line_each() {
        const N: usize = 64;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let journal = Arc::new(JsonlAlertJournal::open(&path).unwrap());

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let journal = Arc::clone(&journal);
                tokio::spawn(async move { journal.append(entry(&format!("alert {i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listed = journal.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(listed.len(), N);
        let ids: HashSet<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), N);
        drop(journal);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), N);
        for line in &lines {
            serde_json::from_str::<AlertEntry>(line).unwrap();
        }

        let reopened = JsonlAlertJournal::open(&path).unwrap();
        let replayed = reopened.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(replayed, listed);
    }

    /// Accepts `budget` bytes, then fails every write until refilled
    struct FlakyWriter {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_terminates_partial_line_next_time() {
        let mut out = FlakyWriter { written: Vec::new(), budget: 5 };
        let mut torn = false;

        assert!(write_record(&mut out, &mut torn, b"{\"n\":1}\n").is_err());
        assert!(torn);
        assert_eq!(out.written, b"{\"n\":");

        out.budget = usize::MAX;
        write_record(&mut out, &mut torn, b"{\"n\":2}\n").unwrap();
        assert!(!torn);
        assert_eq!(out.written, b"{\"n\":\n{\"n\":2}\n");

        write_record(&mut out, &mut torn, b"{\"n\":3}\n").unwrap();
        let text = String::from_utf8(out.written).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["{\"n\":", "{\"n\":2}", "{\"n\":3}"]);
    }

    #[tokio::test]
    async fn test_torn_reopen_appends_on_fresh_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        fs::write(&path, "{\"id\":\"trunc").unwrap();

        let journal = JsonlAlertJournal::open(&path).unwrap();
        assert!(journal.list(&AlertFilter::default()).await.unwrap().is_empty());
        journal.append(entry("first")).await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(serde_json::from_str::<AlertEntry>(lines[1]).unwrap().direction, "first");
    }
}
