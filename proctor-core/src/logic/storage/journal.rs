//! Alert Journal
//!
//! Append-only record of alerting verdicts. Every backend lists newest
//! appended first and never exposes a half-written entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::detectors::SignalKind;
use crate::logic::error::ProctorResult;
use crate::logic::signal::StudentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub id: Uuid,
    pub student_id: StudentId,
    pub signal_kind: SignalKind,
    pub verdict_status: String,
    /// Dashboard label, e.g. "Looking Left"
    pub direction: String,
    pub details: serde_json::Value,
    pub alert_time: DateTime<Utc>,
}

impl AlertEntry {
    pub fn new(
        student_id: StudentId,
        signal_kind: SignalKind,
        verdict_status: &str,
        direction: impl Into<String>,
        details: serde_json::Value,
        alert_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            signal_kind,
            verdict_status: verdict_status.to_string(),
            direction: direction.into(),
            details,
            alert_time,
        }
    }
}

/// `from` inclusive, `to` exclusive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub student_id: Option<StudentId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn for_student(student_id: StudentId) -> Self {
        Self {
            student_id: Some(student_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AlertEntry) -> bool {
        if let Some(id) = &self.student_id {
            if &entry.student_id != id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.alert_time < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.alert_time >= to {
                return false;
            }
        }
        true
    }

    /// Filter entries given in insertion order; output newest first
    pub fn apply<'a>(&self, entries: impl DoubleEndedIterator<Item = &'a AlertEntry>) -> Vec<AlertEntry> {
        entries
            .rev()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[async_trait]
pub trait AlertJournal: Send + Sync {
    async fn append(&self, entry: AlertEntry) -> ProctorResult<()>;

    /// Newest appended first
    async fn list(&self, filter: &AlertFilter) -> ProctorResult<Vec<AlertEntry>>;

    /// `Storage` error when the backing store is unreachable
    async fn ping(&self) -> ProctorResult<()>;
}

// ============================================================================
// IN-MEMORY JOURNAL
// ============================================================================

#[derive(Default)]
pub struct MemoryAlertJournal {
    entries: RwLock<Vec<AlertEntry>>,
}

impl MemoryAlertJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AlertJournal for MemoryAlertJournal {
    async fn append(&self, entry: AlertEntry) -> ProctorResult<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn list(&self, filter: &AlertFilter) -> ProctorResult<Vec<AlertEntry>> {
        Ok(filter.apply(self.entries.read().iter()))
    }

    async fn ping(&self) -> ProctorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry(student: &str, direction: &str, hour: u32) -> AlertEntry {
        AlertEntry::new(
            StudentId::parse(student).unwrap(),
            SignalKind::Head,
            "looking_away",
            direction,
            json!({}),
            Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_list_newest_appended_first() {
        let journal = MemoryAlertJournal::new();
        // appended out of alert_time order on purpose
        journal.append(entry("S1", "first", 12)).await.unwrap();
        journal.append(entry("S1", "second", 9)).await.unwrap();
        journal.append(entry("S2", "third", 10)).await.unwrap();

        let all = journal.list(&AlertFilter::default()).await.unwrap();
        let directions: Vec<_> = all.iter().map(|e| e.direction.as_str()).collect();
        assert_eq!(directions, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_filter_student_window_and_limit() {
        let journal = MemoryAlertJournal::new();
        for hour in 8..14 {
            journal.append(entry("S1", &format!("h{}", hour), hour)).await.unwrap();
        }
        journal.append(entry("S2", "other", 10)).await.unwrap();

        let filter = AlertFilter {
            student_id: Some(StudentId::parse("S1").unwrap()),
            from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
            limit: None,
        };
        let hits: Vec<_> = journal.list(&filter).await.unwrap().into_iter().map(|e| e.direction).collect();
        assert_eq!(hits, vec!["h11", "h10", "h9"]);

        let limited = journal
            .list(&AlertFilter { limit: Some(2), ..filter })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].direction, "h11");
    }

    #[tokio::test]
    async fn test_entries_never_mutated_by_later_appends() {
        let journal = MemoryAlertJournal::new();
        let first = entry("S1", "Looking Left", 9);
        journal.append(first.clone()).await.unwrap();
        journal.append(entry("S1", "Looking Right", 10)).await.unwrap();

        let all = journal.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(all.last(), Some(&first));
        assert_eq!(journal.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_all_kept() {
        const N: usize = 64;
        let journal = Arc::new(MemoryAlertJournal::new());

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let journal = Arc::clone(&journal);
                tokio::spawn(async move { journal.append(entry("S1", &format!("alert {i}"), 10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listed = journal.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(listed.len(), N);
        let ids: HashSet<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), N);
    }
}
