//! Per-session execution state and progress estimation.
//!
//! The pipeline mutates a session under the write lock; progress queries
//! only take the read lock, so status transitions are atomic with respect
//! to any concurrent reader.

use crate::error::OrchestratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Progress reported for a running session never reaches this ceiling.
pub const RUNNING_PROGRESS_CAP: f64 = 95.0;

/// Default estimate of how long a full run takes.
pub const DEFAULT_TOTAL_ESTIMATE: Duration = Duration::from_secs(600);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// State of one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub start_instant: Instant,
    pub execution_time: Option<f64>,
    pub errors: Vec<String>,
    pub components_completed: Vec<String>,
    pub recursion_prevented: usize,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            status: SessionStatus::Running,
            started_at: Utc::now(),
            start_instant: now,
            execution_time: None,
            errors: Vec::new(),
            components_completed: Vec::new(),
            recursion_prevented: 0,
        }
    }
}

/// Answer to a progress query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub completed: bool,
    pub status: SessionStatus,
    pub percentage: f64,
    pub label: String,
    pub components_completed: usize,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe session store.
#[derive(Debug)]
pub struct SessionTracker {
    total_estimate: Duration,
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_ESTIMATE)
    }
}

impl SessionTracker {
    pub fn new(total_estimate: Duration) -> Self {
        Self {
            total_estimate,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionState>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionState>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start tracking `session_id`. A finished session with the same id is
    /// replaced; a running one is rejected.
    pub fn begin(&self, session_id: &str) -> Result<(), OrchestratorError> {
        let mut sessions = self.write();
        if let Some(existing) = sessions.get(session_id) {
            if existing.status == SessionStatus::Running {
                return Err(OrchestratorError::DuplicateSession(session_id.to_string()));
            }
        }
        sessions.insert(session_id.to_string(), SessionState::new(Instant::now()));
        debug!(session = %session_id, "Session started");
        Ok(())
    }

    pub fn complete(&self, session_id: &str, execution_time: f64) {
        if let Some(state) = self.write().get_mut(session_id) {
            state.status = SessionStatus::Completed;
            state.execution_time = Some(execution_time);
        }
    }

    pub fn fail(&self, session_id: &str, error: &str) {
        if let Some(state) = self.write().get_mut(session_id) {
            state.status = SessionStatus::Failed;
            state.execution_time = Some(state.start_instant.elapsed().as_secs_f64());
            state.errors.push(error.to_string());
        }
    }

    pub fn record_component(&self, session_id: &str, component: &str) {
        if let Some(state) = self.write().get_mut(session_id) {
            state.components_completed.push(component.to_string());
        }
    }

    pub fn record_error(&self, session_id: &str, error: &str) {
        if let Some(state) = self.write().get_mut(session_id) {
            state.errors.push(error.to_string());
        }
    }

    pub fn record_recursion_prevented(&self, session_id: &str) {
        if let Some(state) = self.write().get_mut(session_id) {
            state.recursion_prevented += 1;
        }
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        self.read().get(session_id).cloned()
    }

    pub fn progress(&self, session_id: &str) -> Option<ProgressRecord> {
        self.progress_at(session_id, Instant::now())
    }

    /// Progress as observed at `now`.
    pub fn progress_at(&self, session_id: &str, now: Instant) -> Option<ProgressRecord> {
        let sessions = self.read();
        let state = sessions.get(session_id)?;
        let components_completed = state.components_completed.len();
        let started_at = state.started_at;

        let record = match state.status {
            SessionStatus::Running => {
                let elapsed = now.saturating_duration_since(state.start_instant);
                let percentage = estimate_percentage(elapsed, self.total_estimate);
                ProgressRecord {
                    completed: false,
                    status: state.status,
                    percentage,
                    label: format!("Processing... ({:.0}%)", percentage),
                    components_completed,
                    started_at,
                }
            }
            SessionStatus::Completed => ProgressRecord {
                completed: true,
                status: state.status,
                percentage: 100.0,
                label: "Completed".to_string(),
                components_completed,
                started_at,
            },
            SessionStatus::Failed => ProgressRecord {
                completed: false,
                status: state.status,
                percentage: 0.0,
                label: format!(
                    "Failed: {}",
                    state.errors.last().map(String::as_str).unwrap_or("unknown error")
                ),
                components_completed,
                started_at,
            },
        };

        Some(record)
    }
}

/// `min(elapsed / total * 100, 95)`.
fn estimate_percentage(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return RUNNING_PROGRESS_CAP;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).min(RUNNING_PROGRESS_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_duplicate_begin_while_running_fails() {
        let tracker = SessionTracker::default();
        tracker.begin("s-1").unwrap();
        let err = tracker.begin("s-1").unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateSession(ref id) if id == "s-1"));
    }

    #[test]
    fn test_begin_after_completion_is_allowed() {
        let tracker = SessionTracker::default();
        tracker.begin("s-1").unwrap();
        tracker.complete("s-1", 1.5);
        assert!(tracker.begin("s-1").is_ok());
        assert_eq!(
            tracker.snapshot("s-1").unwrap().status,
            SessionStatus::Running
        );
    }

    #[test]
    fn test_unknown_session_has_no_progress() {
        let tracker = SessionTracker::default();
        assert!(tracker.progress("nope").is_none());
    }

    #[test]
    fn test_running_progress_is_monotonic_and_capped() {
        let tracker = SessionTracker::new(Duration::from_secs(100));
        tracker.begin("s").unwrap();
        let start = tracker.snapshot("s").unwrap().start_instant;

        let early = tracker
            .progress_at("s", start + Duration::from_secs(10))
            .unwrap();
        let later = tracker
            .progress_at("s", start + Duration::from_secs(50))
            .unwrap();
        let way_later = tracker
            .progress_at("s", start + Duration::from_secs(1000))
            .unwrap();

        assert!(!early.completed);
        assert!((early.percentage - 10.0).abs() < 1e-6);
        assert!(later.percentage >= early.percentage);
        assert_eq!(way_later.percentage, RUNNING_PROGRESS_CAP);
        assert_eq!(way_later.label, "Processing... (95%)");
    }

    #[test]
    fn test_completed_reports_exactly_100() {
        let tracker = SessionTracker::default();
        tracker.begin("s").unwrap();
        tracker.record_component("s", "web_research");
        tracker.complete("s", 2.0);

        let progress = tracker.progress("s").unwrap();
        assert!(progress.completed);
        assert_eq!(progress.percentage, 100.0);
        assert_eq!(progress.components_completed, 1);

        let state = tracker.snapshot("s").unwrap();
        assert_eq!(state.execution_time, Some(2.0));
        assert_eq!(progress.started_at, state.started_at);
    }

    #[test]
    fn test_failed_session() {
        let tracker = SessionTracker::default();
        tracker.begin("s").unwrap();
        tracker.fail("s", "network down");

        let progress = tracker.progress("s").unwrap();
        assert!(!progress.completed);
        assert_eq!(progress.status, SessionStatus::Failed);
        assert_eq!(progress.label, "Failed: network down");
        assert!(tracker.begin("s").is_ok());
    }

    #[test]
    fn test_bookkeeping() {
        let tracker = SessionTracker::default();
        tracker.begin("s").unwrap();
        tracker.record_error("s", "avatar: boom");
        tracker.record_recursion_prevented("s");
        tracker.record_recursion_prevented("s");

        let state = tracker.snapshot("s").unwrap();
        assert_eq!(state.errors, vec!["avatar: boom".to_string()]);
        assert_eq!(state.recursion_prevented, 2);

        // Unknown ids are ignored.
        tracker.record_error("other", "x");
        assert!(tracker.snapshot("other").is_none());
    }

    #[test]
    fn test_concurrent_readers_see_completion() {
        let tracker = Arc::new(SessionTracker::default());
        tracker.begin("s").unwrap();

        let writer = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || tracker.complete("s", 0.1))
        };
        writer.join().unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.progress("s").unwrap().completed)
            })
            .collect();

        for reader in readers {
            assert!(reader.join().unwrap());
        }
    }
}
