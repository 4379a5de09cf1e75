//! Per-conversation state and the session repository.
//!
//! Sessions are created lazily on the first message from a conversation and
//! never destroyed; a reset only blanks the report. The store hands out one
//! async mutex per conversation id so that messages for the same
//! conversation are processed strictly one at a time even when the
//! surrounding transport is concurrent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::report::{Report, ReportField};

/// How many prior report snapshots are kept for undo.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub report: Report,
    /// Pre-mutation snapshots, oldest first, bounded to [`HISTORY_LIMIT`].
    #[serde(default)]
    pub command_history: VecDeque<Report>,
    pub last_interaction: DateTime<Utc>,
    #[serde(default)]
    pub pending_input: Option<String>,
    #[serde(default)]
    pub awaiting_reset_confirmation: bool,
    #[serde(default)]
    pub awaiting_spelling_correction: Option<(ReportField, String)>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Session {
            report: Report::blank(now.date_naive()),
            command_history: VecDeque::new(),
            last_interaction: now,
            pending_input: None,
            awaiting_reset_confirmation: false,
            awaiting_spelling_correction: None,
        }
    }

    /// Pushes the current report as an undo snapshot, evicting the oldest
    /// when the bound is reached. Call before every report mutation.
    pub fn push_snapshot(&mut self) {
        if self.command_history.len() >= HISTORY_LIMIT {
            self.command_history.pop_front();
        }
        self.command_history.push_back(self.report.clone());
    }

    /// Restores the most recent snapshot. Returns false when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.command_history.pop_back() {
            Some(snapshot) => {
                self.report = snapshot;
                true
            }
            None => false,
        }
    }

    /// Blanks the report and drops the undo history.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        debug!("resetting report");
        self.report = Report::blank(now.date_naive());
        self.command_history.clear();
        self.pending_input = None;
        self.awaiting_reset_confirmation = false;
        self.awaiting_spelling_correction = None;
    }

    pub fn is_idle(&self, now: DateTime<Utc>, pause_threshold: Duration) -> bool {
        now - self.last_interaction > pause_threshold
    }
}

/// Session repository keyed by conversation id.
///
/// The outer map lock is held only to look up or insert the per-conversation
/// entry; callers then await the per-key mutex, which serializes the whole
/// message-processing unit of work for that conversation.
#[derive(Default)]
pub struct SessionStore {
    sessions: StdMutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from the persisted session layout.
    pub fn from_saved(saved: HashMap<String, Session>, _now: DateTime<Utc>) -> Self {
        let sessions = saved
            .into_iter()
            .map(|(id, session)| (id, Arc::new(Mutex::new(session))))
            .collect();
        Self {
            sessions: StdMutex::new(sessions),
        }
    }

    /// Returns the lock entry for `conversation_id`, creating a fresh
    /// session on first contact.
    pub fn entry(&self, conversation_id: &str, now: DateTime<Utc>) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!("creating session for conversation {}", conversation_id);
                Arc::new(Mutex::new(Session::new(now)))
            })
            .clone()
    }

    /// Clones out every session for persistence. Sessions currently locked
    /// by another message are still snapshotted via try_lock-free clone of
    /// the last committed state; callers invoke this after releasing the
    /// per-key lock, so the snapshot is consistent for the mutated key.
    pub async fn snapshot_all(&self) -> HashMap<String, Session> {
        let entries: Vec<(String, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };
        let mut saved = HashMap::with_capacity(entries.len());
        for (id, entry) in entries {
            let session = entry.lock().await;
            saved.insert(id, session.clone());
        }
        saved
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_undo_restores_previous_snapshot() {
        let mut session = Session::new(now());
        let blank = session.report.clone();

        session.push_snapshot();
        session.report.site_name = "Downtown".into();
        session.push_snapshot();
        session.report.weather = "cloudy".into();

        assert!(session.undo());
        assert_eq!(session.report.site_name, "Downtown");
        assert_eq!(session.report.weather, "");

        assert!(session.undo());
        assert_eq!(session.report, blank);

        assert!(!session.undo(), "empty history is a no-op");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = Session::new(now());
        for i in 0..(HISTORY_LIMIT + 5) {
            session.push_snapshot();
            session.report.comments = format!("change {}", i);
        }
        assert_eq!(session.command_history.len(), HISTORY_LIMIT);
        // Oldest snapshots were evicted; the deepest undo lands past them.
        for _ in 0..HISTORY_LIMIT {
            assert!(session.undo());
        }
        assert_eq!(session.report.comments, format!("change {}", 4));
    }

    #[test]
    fn test_reset_blanks_report_and_history() {
        let mut session = Session::new(now());
        session.push_snapshot();
        session.report.site_name = "Downtown".into();
        session.awaiting_reset_confirmation = true;
        session.pending_input = Some("tools: crane".into());

        session.reset(now());

        assert!(session.report.is_empty());
        assert!(!session.report.date.is_empty());
        assert!(session.command_history.is_empty());
        assert!(session.pending_input.is_none());
        assert!(!session.awaiting_reset_confirmation);
    }

    #[test]
    fn test_idle_detection() {
        let mut session = Session::new(now());
        session.last_interaction = Utc::now() - Duration::hours(9);
        assert!(session.is_idle(Utc::now(), Duration::hours(8)));
        assert!(!session.is_idle(Utc::now(), Duration::hours(24)));
    }

    #[tokio::test]
    async fn test_store_creates_lazily_and_reuses() {
        let store = SessionStore::new();
        let first = store.entry("chat-1", now());
        let second = store.entry("chat-1", now());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.conversation_ids(), vec!["chat-1".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let store = SessionStore::new();
        {
            let entry = store.entry("chat-1", now());
            let mut session = entry.lock().await;
            session.report.site_name = "Downtown".into();
        }
        let saved = store.snapshot_all().await;
        let restored = SessionStore::from_saved(saved, now());
        let entry = restored.entry("chat-1", now());
        let session = entry.lock().await;
        assert_eq!(session.report.site_name, "Downtown");
    }
}
