//! Append-only transition journal
//!
//! Write-ahead log of state transitions for one orchestrator process. Records
//! are hash-chained so tampering or reordering is detectable, and the log can
//! be replayed into a latest-state snapshot per subject, which is what an
//! idempotent resumption needs after a restart.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Journal failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JournalError {
    /// Hash chain or sequence order is broken
    #[error("journal integrity violation at seq {seq}")]
    IntegrityViolation {
        /// Sequence number of the offending record
        seq: u64,
    },
}

/// One recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Monotonic sequence number within this journal
    pub seq: u64,
    /// Trace id of the owning saga
    pub trace_id: String,
    /// Subject of the transition ("saga", "agent_a", "agent_b")
    pub subject: String,
    /// State left
    pub from: String,
    /// State entered
    pub to: String,
    /// Wall-clock record time (observational only, never read back by
    /// decision logic)
    pub recorded_at: DateTime<Utc>,
    /// Hash of the previous record
    pub prev_hash: [u8; 32],
    /// Hash of this record
    pub hash: [u8; 32],
}

/// Append-only, hash-chained log of transitions.
#[derive(Debug, Default)]
pub struct TransitionJournal {
    inner: Mutex<Vec<TransitionRecord>>,
}

impl TransitionJournal {
    /// Create an empty journal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition and return its sequence number.
    pub fn append(&self, trace_id: &str, subject: &str, from: &str, to: &str) -> u64 {
        let mut guard = self.inner.lock();
        let seq = guard.len() as u64;
        let prev_hash = guard.last().map(|r| r.hash).unwrap_or([0u8; 32]);
        let mut record = TransitionRecord {
            seq,
            trace_id: trace_id.to_string(),
            subject: subject.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            recorded_at: Utc::now(),
            prev_hash,
            hash: [0u8; 32],
        };
        record.hash = compute_hash(&record);
        guard.push(record);
        seq
    }

    /// All records, in append order.
    #[must_use]
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.inner.lock().clone()
    }

    /// Latest recorded state for `subject`, if any.
    #[must_use]
    pub fn latest(&self, subject: &str) -> Option<TransitionRecord> {
        self.inner
            .lock()
            .iter()
            .rev()
            .find(|r| r.subject == subject)
            .cloned()
    }

    /// Replay the log into the latest known state per subject.
    #[must_use]
    pub fn replay(&self) -> BTreeMap<String, String> {
        let guard = self.inner.lock();
        let mut snapshot = BTreeMap::new();
        for record in guard.iter() {
            snapshot.insert(record.subject.clone(), record.to.clone());
        }
        snapshot
    }

    /// Verify sequence monotonicity and the hash chain.
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for (i, record) in guard.iter().enumerate() {
            if record.seq != i as u64 || record.prev_hash != prev {
                return Err(JournalError::IntegrityViolation { seq: record.seq });
            }
            if record.hash != compute_hash(record) {
                return Err(JournalError::IntegrityViolation { seq: record.seq });
            }
            prev = record.hash;
        }
        Ok(())
    }
}

fn compute_hash(record: &TransitionRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.seq.to_le_bytes());
    hasher.update(record.trace_id.as_bytes());
    hasher.update([0]);
    hasher.update(record.subject.as_bytes());
    hasher.update([0]);
    hasher.update(record.from.as_bytes());
    hasher.update([0]);
    hasher.update(record.to.as_bytes());
    hasher.update([0]);
    hasher.update(record.recorded_at.timestamp_micros().to_le_bytes());
    hasher.update(record.prev_hash);
    hasher.finalize().into()
}
