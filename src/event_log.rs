//! Event log for graph building and execution
//!
//! Append-only audit trail:
//! - Event: envelope with id + timestamp + kind
//! - EventKind: build-level and job-level variants
//! - EventLog: thread-safe, cheap to clone (shared storage)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All event types
///
/// Uses Arc<str> for rule names so events share them with jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // BUILD LEVEL
    // ═══════════════════════════════════════════
    BuildStarted {
        targets: Vec<String>,
    },
    JobResolved {
        rule: Arc<str>,
        wildcards: String,
        outputs: Vec<String>,
    },
    SourceRegistered {
        path: String,
        exists: bool,
    },
    BuildCompleted {
        jobs: usize,
        sources: usize,
        duration_ms: u64,
    },
    BuildFailed {
        error: String,
    },

    // ═══════════════════════════════════════════
    // EXECUTION LEVEL
    // ═══════════════════════════════════════════
    JobStarted {
        rule: Arc<str>,
        job_id: usize,
        command: Option<String>,
    },
    JobSkipped {
        rule: Arc<str>,
        job_id: usize,
    },
    JobCompleted {
        rule: Arc<str>,
        job_id: usize,
        duration_ms: u64,
    },
    JobFailed {
        rule: Arc<str>,
        job_id: usize,
        error: String,
    },
}

impl EventKind {
    /// Rule name if the event concerns a job
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::JobResolved { rule, .. }
            | Self::JobStarted { rule, .. }
            | Self::JobSkipped { rule, .. }
            | Self::JobCompleted { rule, .. }
            | Self::JobFailed { rule, .. } => Some(rule),
            Self::BuildStarted { .. }
            | Self::SourceRegistered { .. }
            | Self::BuildCompleted { .. }
            | Self::BuildFailed { .. } => None,
        }
    }

    /// True for events emitted while building the graph
    pub fn is_build_event(&self) -> bool {
        matches!(
            self,
            Self::BuildStarted { .. }
                | Self::JobResolved { .. }
                | Self::SourceRegistered { .. }
                | Self::BuildCompleted { .. }
                | Self::BuildFailed { .. }
        )
    }

    /// Serialized type tag, e.g. `job_started`
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildStarted { .. } => "build_started",
            Self::JobResolved { .. } => "job_resolved",
            Self::SourceRegistered { .. } => "source_registered",
            Self::BuildCompleted { .. } => "build_completed",
            Self::BuildFailed { .. } => "build_failed",
            Self::JobStarted { .. } => "job_started",
            Self::JobSkipped { .. } => "job_skipped",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
        }
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events of one rule's jobs
    pub fn filter_rule(&self, rule: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.rule() == Some(rule))
            .collect()
    }

    pub fn build_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_build_event())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started(rule: &str, job_id: usize) -> EventKind {
        EventKind::JobStarted {
            rule: rule.into(),
            job_id,
            command: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // EventKind tests
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn eventkind_rule_extraction() {
        assert_eq!(started("trim", 0).rule(), Some("trim"));
        let build = EventKind::BuildStarted { targets: vec![] };
        assert_eq!(build.rule(), None);
    }

    #[test]
    fn eventkind_is_build_event() {
        assert!(EventKind::BuildFailed { error: "x".into() }.is_build_event());
        assert!(EventKind::JobResolved {
            rule: "trim".into(),
            wildcards: "sample=a".into(),
            outputs: vec!["trimmed/a.fq".into()],
        }
        .is_build_event());
        assert!(!started("trim", 0).is_build_event());
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let kind = EventKind::JobCompleted {
            rule: "count".into(),
            job_id: 3,
            duration_ms: 150,
        };

        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "job_completed");
        assert_eq!(json["type"], kind.name());
        assert_eq!(json["rule"], "count");
        assert_eq!(json["job_id"], 3);
    }

    #[test]
    fn eventkind_deserializes_from_tagged_json() {
        let json = json!({
            "type": "source_registered",
            "path": "raw/a.fq",
            "exists": false
        });

        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(
            kind,
            EventKind::SourceRegistered {
                path: "raw/a.fq".into(),
                exists: false,
            }
        );
    }

    // ═══════════════════════════════════════════════════════════════
    // EventLog tests
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn eventlog_emit_returns_monotonic_ids() {
        let log = EventLog::new();
        assert!(log.is_empty());

        let id1 = log.emit(EventKind::BuildStarted { targets: vec![] });
        let id2 = log.emit(started("a", 0));
        let id3 = log.emit(started("b", 1));

        assert_eq!((id1, id2, id3), (0, 1, 2));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn eventlog_filter_rule_returns_only_matching() {
        let log = EventLog::new();
        log.emit(EventKind::BuildStarted { targets: vec![] });
        log.emit(started("alpha", 0));
        log.emit(started("beta", 1));
        log.emit(EventKind::JobCompleted {
            rule: "alpha".into(),
            job_id: 0,
            duration_ms: 5,
        });

        let alpha = log.filter_rule("alpha");
        assert_eq!(alpha.len(), 2);
        assert!(alpha.iter().all(|e| e.kind.rule() == Some("alpha")));
        assert_eq!(log.build_events().len(), 1);
    }

    #[test]
    fn eventlog_to_json() {
        let log = EventLog::new();
        log.emit(started("t", 0));

        let json = log.to_json();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["kind"]["type"], "job_started");
    }

    #[test]
    fn eventlog_clones_share_storage() {
        let log = EventLog::new();
        let cloned = log.clone();
        log.emit(started("t", 0));
        assert_eq!(cloned.len(), 1);
    }

    #[test]
    fn eventlog_thread_safe_concurrent_emits() {
        use std::thread;

        let log = EventLog::new();
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || log.emit(started(&format!("rule{}", i), i)))
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let events = log.events();
        assert_eq!(events.len(), 10);
        // Ids follow insertion order
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }
}
