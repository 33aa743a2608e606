//! Code-keyed task/result handoff store.
//!
//! # Protocol
//!
//! A producer publishes a [`Task`] under a code, a consumer polls for it,
//! publishes a [`HandoffResult`] under the same code (which retires the
//! task), and the producer polls for the result and clears the code. At
//! most one pending task and one pending result exist per code; a second
//! publish of the same kind overwrites the first.
//!
//! # Concurrency
//!
//! Entries live in a [`DashMap`]. Every single-key operation runs under
//! that key's shard lock, so readers never observe a half-written entry
//! and concurrent publishes resolve as last-write-wins. Reaping goes
//! through [`DashMap::retain`], which decides and removes under the same
//! lock. No operation awaits while holding a lock.
//!
//! # Expiry
//!
//! An entry expires once its latest activity (task or result publish) is
//! older than the configured TTL. Expired entries are invisible to reads
//! immediately and are physically removed by [`reap`](HandoffStore::reap),
//! normally driven by a [`Reaper`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use handoff_relay::store::{HandoffStore, ResultPayload, TaskPayload};
//!
//! let store = HandoffStore::new(Duration::from_secs(1800));
//! store.publish_task("AB12", TaskPayload::new("u1", "t1")).unwrap();
//! assert!(store.fetch_task("AB12").is_some());
//!
//! store.publish_result("AB12", ResultPayload::new("s1")).unwrap();
//! assert!(store.fetch_task("AB12").is_none());
//! assert_eq!(store.fetch_result("AB12").unwrap().status, "completed");
//!
//! store.clear("AB12");
//! assert!(store.fetch_result("AB12").is_none());
//! ```

pub mod payload;
pub mod reaper;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::error::RelayError;

pub use payload::{HandoffResult, ResultPayload, Task, TaskPayload, DEFAULT_RESULT_STATUS};
pub use reaper::Reaper;

/// Per-code record: at most one pending task and one pending result.
///
/// Owned by the store; callers only ever see clones of the records.
#[derive(Debug, Clone, Default)]
struct Entry {
    task: Option<Task>,
    result: Option<HandoffResult>,
    task_at: Option<Instant>,
    result_at: Option<Instant>,
    /// Client address captured from the latest task, read by the proxy.
    identity_hint: Option<String>,
}

impl Entry {
    /// The most recent of the task and result publish instants.
    fn last_activity(&self) -> Option<Instant> {
        match (self.task_at, self.result_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the entry's latest activity is older than `ttl` at `now`.
    ///
    /// An entry with no activity at all counts as expired.
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.last_activity()
            .map_or(true, |at| now.saturating_duration_since(at) > ttl)
    }
}

/// A pending task as listed by [`HandoffStore::pending`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub code: String,
    /// Truncated subject id.
    pub subject_id: String,
    pub age_secs: u64,
}

/// A pending result as listed by [`HandoffStore::pending`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResult {
    pub code: String,
    /// Truncated session id.
    pub session_id: String,
    pub age_secs: u64,
}

/// Live pending records, ordered by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingSnapshot {
    pub tasks: Vec<PendingTask>,
    pub results: Vec<PendingResult>,
}

/// Snapshot counts for the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub pending_tasks: usize,
    pub pending_results: usize,
}

/// In-memory handoff store with TTL-based expiry.
///
/// Per-code entries stay inside the store; reads hand out clones of the
/// task and result records only.
///
/// ```compile_fail
/// use handoff_relay::store::Entry;
/// ```
pub struct HandoffStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for HandoffStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffStore")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl HandoffStore {
    /// Creates an empty store on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock: Arc::new(SystemClock),
            ttl,
        }
    }

    /// Replaces the clock used for timestamps and expiry.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries physically held, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Publishes a task under `code`, replacing any pending task.
    ///
    /// The task's non-empty `realIp` becomes the code's identity hint; a
    /// task without one clears the hint left by its predecessor. A pending
    /// result is left in place.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] when a required field is missing. The
    /// store is not modified in that case.
    pub fn publish_task(&self, code: &str, payload: TaskPayload) -> Result<(), RelayError> {
        let task = payload.into_task(epoch_millis())?;
        let now = self.clock.now();

        tracing::info!(
            code,
            subject = preview(&task.subject_id),
            real_ip = task.real_ip.as_deref().unwrap_or("none"),
            "task published"
        );

        let mut entry = self.entries.entry(code.to_owned()).or_default();
        if entry.is_expired(now, self.ttl) {
            *entry = Entry::default();
        }
        entry.identity_hint = task.real_ip.clone();
        entry.task = Some(task);
        entry.task_at = Some(now);
        Ok(())
    }

    /// Returns the pending task for `code`, if any.
    ///
    /// Polling does not consume the task.
    pub fn fetch_task(&self, code: &str) -> Option<Task> {
        let task = self.read(code, |entry| entry.task.clone());
        if task.is_some() {
            tracing::debug!(code, "task fetched");
        }
        task
    }

    /// Publishes a result under `code` and retires the pending task.
    ///
    /// No prior task is required.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] when `sessionId` is missing. The store is
    /// not modified in that case.
    pub fn publish_result(&self, code: &str, payload: ResultPayload) -> Result<(), RelayError> {
        let result = payload.into_result(epoch_millis())?;
        let now = self.clock.now();

        tracing::info!(code, session = preview(&result.session_id), "result published");

        let mut entry = self.entries.entry(code.to_owned()).or_default();
        if entry.is_expired(now, self.ttl) {
            *entry = Entry::default();
        }
        entry.task = None;
        entry.task_at = None;
        entry.result = Some(result);
        entry.result_at = Some(now);
        Ok(())
    }

    /// Returns the pending result for `code`, if any.
    ///
    /// Polling does not consume the result; callers clear explicitly.
    pub fn fetch_result(&self, code: &str) -> Option<HandoffResult> {
        let result = self.read(code, |entry| entry.result.clone());
        if result.is_some() {
            tracing::debug!(code, "result fetched");
        }
        result
    }

    /// Removes the entry for `code`. Returns whether one existed.
    pub fn clear(&self, code: &str) -> bool {
        let removed = self.entries.remove(code).is_some();
        tracing::info!(code, removed, "entry cleared");
        removed
    }

    /// The identity hint recorded for `code`, if the entry is live.
    pub fn identity_hint(&self, code: &str) -> Option<String> {
        self.read(code, |entry| entry.identity_hint.clone())
    }

    /// Removes every entry whose latest activity is older than `ttl` at `now`.
    ///
    /// Returns the number of entries removed. Codes deleted concurrently are
    /// simply not seen.
    pub fn reap(&self, now: Instant, ttl: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|code, entry| {
            let keep = !entry.is_expired(now, ttl);
            if !keep {
                tracing::debug!(code = code.as_str(), "entry expired");
                removed += 1;
            }
            keep
        });
        removed
    }

    /// [`reap`](Self::reap) with the store's own clock and TTL.
    pub fn reap_expired(&self) -> usize {
        self.reap(self.clock.now(), self.ttl)
    }

    /// Counts of live entries and their pending records.
    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .fold(StoreStats::default(), |mut stats, entry| {
                stats.entries += 1;
                stats.pending_tasks += usize::from(entry.task.is_some());
                stats.pending_results += usize::from(entry.result.is_some());
                stats
            })
    }

    /// Lists live pending records with truncated identifiers and their age.
    ///
    /// Ages are measured from each record's own publish instant. Identifiers
    /// are cut to [`DEBUG_PREVIEW_CHARS`] characters, with `...` appended
    /// when something was cut.
    pub fn pending(&self) -> PendingSnapshot {
        let now = self.clock.now();
        let age = |at: Option<Instant>| at.map_or(0, |at| now.saturating_duration_since(at).as_secs());

        let mut snapshot = PendingSnapshot::default();
        for entry in self.entries.iter() {
            if entry.is_expired(now, self.ttl) {
                continue;
            }
            if let Some(task) = &entry.task {
                snapshot.tasks.push(PendingTask {
                    code: entry.key().clone(),
                    subject_id: elide(&task.subject_id, DEBUG_PREVIEW_CHARS),
                    age_secs: age(entry.task_at),
                });
            }
            if let Some(result) = &entry.result {
                snapshot.results.push(PendingResult {
                    code: entry.key().clone(),
                    session_id: elide(&result.session_id, DEBUG_PREVIEW_CHARS),
                    age_secs: age(entry.result_at),
                });
            }
        }
        snapshot.tasks.sort_by(|a, b| a.code.cmp(&b.code));
        snapshot.results.sort_by(|a, b| a.code.cmp(&b.code));
        snapshot
    }

    fn read<T>(&self, code: &str, f: impl FnOnce(&Entry) -> Option<T>) -> Option<T> {
        let now = self.clock.now();
        let entry = self.entries.get(code)?;
        if entry.is_expired(now, self.ttl) {
            return None;
        }
        f(&entry)
    }
}

fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identifier length shown by [`HandoffStore::pending`].
pub const DEBUG_PREVIEW_CHARS: usize = 10;

/// First 20 characters of a payload value, for logs.
fn preview(value: &str) -> &str {
    truncate(value, 20)
}

fn truncate(value: &str, max_chars: usize) -> &str {
    value
        .char_indices()
        .nth(max_chars)
        .map_or(value, |(idx, _)| &value[..idx])
}

fn elide(value: &str, max_chars: usize) -> String {
    let cut = truncate(value, max_chars);
    if cut.len() < value.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}
