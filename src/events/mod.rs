//! Observability events and the sinks that receive them.
//!
//! Pushing an event never fails from the caller's side and never blocks on
//! I/O; sinks that do I/O hand the work to the runtime and swallow errors.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::search::{Node, NodeState, Transition};
use crate::storage::{EventRecord, Storage};

/// Flat view of a node carried by node events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: usize,
    pub parent: Option<usize>,
    pub depth: usize,
    pub messages: Vec<String>,
    pub transition: Transition,
    pub observation: Option<String>,
    pub visits: u32,
    pub value: f64,
    pub is_terminal: bool,
    pub reward: f64,
    pub state: NodeState,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id().0,
            parent: node.parent().map(|p| p.0),
            depth: node.depth(),
            messages: node.messages.iter().map(|m| m.text.clone()).collect(),
            transition: node.transition.clone(),
            observation: node.observation.clone(),
            visits: node.visits,
            value: node.value,
            is_terminal: node.is_terminal,
            reward: node.reward,
            state: node.state(),
        }
    }
}

/// Notification emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GlobalInfoSet {
        key: String,
        value: Value,
    },
    SetSessionInfoKey {
        session_id: String,
        key: String,
        value: Value,
    },
    SetSessionInfo {
        session_id: String,
        info: Value,
    },
    SetCurrentSession {
        session_id: String,
    },
    RootNode {
        session_id: String,
        node: NodeView,
    },
    AddNode {
        session_id: String,
        parent: usize,
        node: NodeView,
    },
    UpdateNode {
        session_id: String,
        node: NodeView,
    },
}

impl Event {
    /// Stable discriminator, identical to the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::GlobalInfoSet { .. } => "global_info_set",
            Event::SetSessionInfoKey { .. } => "set_session_info_key",
            Event::SetSessionInfo { .. } => "set_session_info",
            Event::SetCurrentSession { .. } => "set_current_session",
            Event::RootNode { .. } => "root_node",
            Event::AddNode { .. } => "add_node",
            Event::UpdateNode { .. } => "update_node",
        }
    }

    /// Session the event concerns; global events have none.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::GlobalInfoSet { .. } => None,
            Event::SetSessionInfoKey { session_id, .. }
            | Event::SetSessionInfo { session_id, .. }
            | Event::SetCurrentSession { session_id }
            | Event::RootNode { session_id, .. }
            | Event::AddNode { session_id, .. }
            | Event::UpdateNode { session_id, .. } => Some(session_id),
        }
    }
}

/// Receiver of observability events.
pub trait EventSink: Send + Sync {
    fn push(&self, event: Event);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn push(&self, _event: Event) {}
}

/// Mirrors events into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn push(&self, event: Event) {
        match &event {
            Event::AddNode { node, parent, .. } => debug!(
                node = node.id,
                parent = parent,
                depth = node.depth,
                transition = ?node.transition,
                "Node added"
            ),
            Event::UpdateNode { node, .. } => debug!(
                node = node.id,
                state = %node.state,
                terminal = node.is_terminal,
                reward = node.reward,
                visits = node.visits,
                value = node.value,
                "Node updated"
            ),
            Event::RootNode { session_id, node } => {
                info!(session_id = %session_id, node = node.id, "Root node created")
            }
            Event::SetCurrentSession { session_id } => {
                info!(session_id = %session_id, "Current session set")
            }
            other => debug!(event_type = other.event_type(), session_id = ?other.session_id(), "Event"),
        }
    }
}

/// Fans every event out to several sinks.
#[derive(Default, Clone)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for MultiSink {
    fn push(&self, event: Event) {
        for sink in &self.sinks {
            sink.push(event.clone());
        }
    }
}

/// Appends events to the storage audit log in the background.
#[derive(Clone)]
pub struct StorageSink {
    storage: Arc<dyn Storage>,
}

impl StorageSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl EventSink for StorageSink {
    fn push(&self, event: Event) {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, event_type = event.event_type(), "Failed to serialize event");
                return;
            }
        };
        let record = EventRecord::new(
            event.session_id().map(str::to_string),
            event.event_type(),
            payload,
        );

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(event_type = %record.event_type, "No runtime available, event dropped");
                return;
            }
        };
        let storage = self.storage.clone();
        handle.spawn(async move {
            if let Err(e) = storage.log_event(&record).await {
                warn!(error = %e, event_type = %record.event_type, "Failed to persist event");
            }
        });
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn push(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Message;
    use crate::search::SearchTree;
    use crate::storage::SqliteStorage;

    fn root_view() -> NodeView {
        let tree = SearchTree::new(vec![Message::user("q")]);
        NodeView::from(&tree[tree.root()])
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let events = vec![
            Event::GlobalInfoSet {
                key: "k".to_string(),
                value: Value::Null,
            },
            Event::SetCurrentSession {
                session_id: "s".to_string(),
            },
            Event::AddNode {
                session_id: "s".to_string(),
                parent: 0,
                node: root_view(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn test_session_id() {
        let global = Event::GlobalInfoSet {
            key: "k".to_string(),
            value: Value::Null,
        };
        assert!(global.session_id().is_none());

        let update = Event::UpdateNode {
            session_id: "abc".to_string(),
            node: root_view(),
        };
        assert_eq!(update.session_id(), Some("abc"));
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let multi = MultiSink::default()
            .with_sink(a.clone())
            .with_sink(b.clone())
            .with_sink(Arc::new(NoopSink))
            .with_sink(Arc::new(TracingSink));
        assert_eq!(multi.len(), 4);

        multi.push(Event::SetCurrentSession {
            session_id: "s".to_string(),
        });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events(), a.events());
    }

    #[tokio::test]
    async fn test_storage_sink_persists() {
        let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let sink = StorageSink::new(storage.clone());
        sink.push(Event::SetSessionInfoKey {
            session_id: "s1".to_string(),
            key: "question".to_string(),
            value: Value::String("where?".to_string()),
        });

        let mut events = Vec::new();
        for _ in 0..50 {
            events = storage.get_session_events("s1").await.unwrap();
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "set_session_info_key");
        assert_eq!(events[0].payload["key"], "question");
    }
}
