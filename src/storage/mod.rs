//! Storage layer for investigation persistence.
//!
//! Sessions, tree snapshots, the event log and reflections are kept in
//! SQLite so an investigation can be inspected or resumed after the process
//! exits.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// A persisted investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub id: String,
    /// The question under investigation.
    pub question: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
    /// Optional metadata for the session.
    pub metadata: Option<serde_json::Value>,
}

impl SessionRecord {
    /// Create a running session for `question`
    pub fn new(question: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            status: SessionStatus::Running,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Search in progress.
    #[default]
    Running,
    /// A trajectory reached reward 1.
    Succeeded,
    /// The iteration budget ran out; the best node was returned.
    Exhausted,
    /// The run aborted with an error.
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Succeeded => write!(f, "succeeded"),
            SessionStatus::Exhausted => write!(f, "exhausted"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(SessionStatus::Running),
            "succeeded" => Ok(SessionStatus::Succeeded),
            "exhausted" => Ok(SessionStatus::Exhausted),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Serialized search tree at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unique snapshot identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Serialized session state.
    pub data: serde_json::Value,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Create a snapshot record
    pub fn new(session_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// One entry of the persisted event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub id: String,
    /// Session the event belongs to, if any.
    pub session_id: Option<String>,
    /// Event discriminator, e.g. `add_node`.
    pub event_type: String,
    /// Full event payload.
    pub payload: serde_json::Value,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Create an event record
    pub fn new(
        session_id: Option<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// A reflection written after an unsuccessful rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    /// Unique reflection identifier.
    pub id: String,
    /// Session that produced it.
    pub session_id: String,
    /// Reflection text.
    pub content: String,
    /// When it was written.
    pub created_at: DateTime<Utc>,
}

impl ReflectionRecord {
    /// Create a reflection record
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence backend.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a new session.
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>>;
    /// Update the status of a session.
    async fn update_session_status(&self, id: &str, status: SessionStatus) -> StorageResult<()>;

    // Snapshot operations

    /// Save a tree snapshot.
    async fn save_snapshot(&self, snapshot: &SnapshotRecord) -> StorageResult<()>;
    /// Get the most recent snapshot of a session.
    async fn get_latest_snapshot(&self, session_id: &str) -> StorageResult<Option<SnapshotRecord>>;

    // Event log

    /// Append an event.
    async fn log_event(&self, event: &EventRecord) -> StorageResult<()>;
    /// All events of a session in insertion order.
    async fn get_session_events(&self, session_id: &str) -> StorageResult<Vec<EventRecord>>;

    // Reflections

    /// Store a reflection.
    async fn add_reflection(&self, reflection: &ReflectionRecord) -> StorageResult<()>;
    /// Most recent reflections across all sessions, newest first.
    async fn get_recent_reflections(&self, limit: u32) -> StorageResult<Vec<ReflectionRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_session_record_new() {
        let session = SessionRecord::new("Where was this taken?");
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.question, "Where was this taken?");
        assert_eq!(session.created_at, session.updated_at);
        assert!(session.metadata.is_none());
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_session_record_builders() {
        let session = SessionRecord::new("q")
            .with_id("fixed")
            .with_metadata(serde_json::json!({"k": 1}));
        assert_eq!(session.id, "fixed");
        assert_eq!(session.metadata.unwrap()["k"], 1);
    }

    #[test]
    fn test_session_status_round_trip() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Succeeded,
            SessionStatus::Exhausted,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(SessionStatus::from_str("SUCCEEDED").unwrap(), SessionStatus::Succeeded);
        assert!(SessionStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_session_status_serde() {
        let json = serde_json::to_string(&SessionStatus::Exhausted).unwrap();
        assert_eq!(json, "\"exhausted\"");
    }

    #[test]
    fn test_event_record_without_session() {
        let event = EventRecord::new(None, "global_info_set", serde_json::json!({}));
        assert!(event.session_id.is_none());
        assert_eq!(event.event_type, "global_info_set");
    }
}
