//! Call archive: per-session history and operator feedback on sled.
//!
//! Keyspace mirrors a flat cache layout: `history:{session_id}` and
//! `feedback:{session_id}` each hold a JSON list with append semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::CoreResult;
use crate::shared::{CallSummaryData, FeedbackRecord};

const HISTORY_PREFIX: &str = "history:";
const FEEDBACK_PREFIX: &str = "feedback:";

/// Durable record of finished calls and operator feedback.
pub trait CallArchive: Send + Sync {
    fn store_call(&self, session_id: &str, summary: &CallSummaryData) -> CoreResult<()>;
    fn record_feedback(&self, session_id: &str, record: &FeedbackRecord) -> CoreResult<()>;
    /// Archived summaries for a session, oldest first. Unknown session → empty.
    fn history(&self, session_id: &str) -> CoreResult<Vec<Value>>;
    /// Feedback log for a session, oldest first.
    fn feedback(&self, session_id: &str) -> CoreResult<Vec<FeedbackRecord>>;
}

/// Sled-backed archive with a write-through DashMap in front, so history
/// reads during a live call never hit disk.
pub struct SledCallStore {
    db: sled::Db,
    cache: Arc<DashMap<String, Vec<Value>>>,
}

impl SledCallStore {
    pub fn new(db: sled::Db) -> Self {
        Self {
            db,
            cache: Arc::new(DashMap::new()),
        }
    }

    fn load(&self, key: &str) -> CoreResult<Vec<Value>> {
        if let Some(list) = self.cache.get(key) {
            return Ok(list.clone());
        }
        let list = match self.db.get(key.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => Vec::new(),
        };
        self.cache.insert(key.to_string(), list.clone());
        Ok(list)
    }

    fn append(&self, key: String, value: Value) -> CoreResult<()> {
        let mut list = self.load(&key)?;
        list.push(value);
        self.db.insert(key.as_bytes(), serde_json::to_vec(&list)?)?;
        self.cache.insert(key, list);
        Ok(())
    }
}

impl CallArchive for SledCallStore {
    fn store_call(&self, session_id: &str, summary: &CallSummaryData) -> CoreResult<()> {
        self.append(
            format!("{HISTORY_PREFIX}{session_id}"),
            serde_json::to_value(summary)?,
        )
    }

    fn record_feedback(&self, session_id: &str, record: &FeedbackRecord) -> CoreResult<()> {
        self.append(
            format!("{FEEDBACK_PREFIX}{session_id}"),
            serde_json::to_value(record)?,
        )
    }

    fn history(&self, session_id: &str) -> CoreResult<Vec<Value>> {
        self.load(&format!("{HISTORY_PREFIX}{session_id}"))
    }

    fn feedback(&self, session_id: &str) -> CoreResult<Vec<FeedbackRecord>> {
        let raw = self.load(&format!("{FEEDBACK_PREFIX}{session_id}"))?;
        let mut records = Vec::with_capacity(raw.len());
        for value in raw {
            records.push(serde_json::from_value(value)?);
        }
        Ok(records)
    }
}

/// In-memory archive that counts calls, for engine tests.
#[derive(Default)]
pub struct RecordingArchive {
    pub stored_calls: AtomicUsize,
    pub summaries: Mutex<Vec<(String, CallSummaryData)>>,
    pub feedback_records: Mutex<Vec<(String, FeedbackRecord)>>,
}

impl CallArchive for RecordingArchive {
    fn store_call(&self, session_id: &str, summary: &CallSummaryData) -> CoreResult<()> {
        self.stored_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut list) = self.summaries.lock() {
            list.push((session_id.to_string(), summary.clone()));
        }
        Ok(())
    }

    fn record_feedback(&self, session_id: &str, record: &FeedbackRecord) -> CoreResult<()> {
        if let Ok(mut list) = self.feedback_records.lock() {
            list.push((session_id.to_string(), record.clone()));
        }
        Ok(())
    }

    fn history(&self, session_id: &str) -> CoreResult<Vec<Value>> {
        let list = self
            .summaries
            .lock()
            .map_err(|_| crate::error::CoreError::Config("archive lock poisoned".to_string()))?;
        Ok(list
            .iter()
            .filter(|(sid, _)| sid == session_id)
            .filter_map(|(_, s)| serde_json::to_value(s).ok())
            .collect())
    }

    fn feedback(&self, session_id: &str) -> CoreResult<Vec<FeedbackRecord>> {
        let list = self
            .feedback_records
            .lock()
            .map_err(|_| crate::error::CoreError::Config("archive lock poisoned".to_string()))?;
        Ok(list
            .iter()
            .filter(|(sid, _)| sid == session_id)
            .map(|(_, r)| r.clone())
            .collect())
    }
}
