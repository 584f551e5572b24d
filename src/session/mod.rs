//! Session state for one investigation run.
//!
//! A [`Session`] owns the search tree; the [`SessionEnv`] it shares with
//! observation tasks holds the tool table, tool context and event sink.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::{Event, EventSink, NodeView};
use crate::oracle::Message;
use crate::prompts::opening_prompt;
use crate::search::{NodeId, NodeSnapshot, SearchTree};
use crate::tools::{ToolContext, ToolTable};

/// Resources shared between the driver and concurrent observation tasks.
pub struct SessionEnv {
    tools: ToolTable,
    tool_ctx: ToolContext,
    sink: Arc<dyn EventSink>,
}

impl SessionEnv {
    pub fn new(tools: ToolTable, tool_ctx: ToolContext, sink: Arc<dyn EventSink>) -> Self {
        Self {
            tools,
            tool_ctx,
            sink,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.tool_ctx.session_id
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    pub fn tool_ctx(&self) -> &ToolContext {
        &self.tool_ctx
    }

    /// Push an event; never fails.
    pub fn emit(&self, event: Event) {
        self.sink.push(event);
    }
}

/// Serializable state of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub reflections: Vec<String>,
    pub conclusions: Vec<String>,
    pub tree: NodeSnapshot,
}

/// One investigation.
pub struct Session {
    id: String,
    question: String,
    created_at: DateTime<Utc>,
    env: Arc<SessionEnv>,
    tree: SearchTree,
    reflections: Vec<String>,
}

impl Session {
    /// Start a session whose root holds the opening prompt.
    ///
    /// `prior_reflections` come from earlier runs; reflections produced by
    /// this run are only recorded, never fed back into the current tree.
    pub fn start(
        question: &str,
        additional: Option<&str>,
        env: Arc<SessionEnv>,
        prior_reflections: &[String],
    ) -> Self {
        let input = match additional {
            Some(extra) if !extra.trim().is_empty() => format!("{question}\n{}", extra.trim()),
            _ => question.to_string(),
        };
        let tools = env.tools();
        let prompt = opening_prompt(
            &tools.describe(),
            &tools.names().join(", "),
            &input,
            prior_reflections,
            &env.tool_ctx().conclusions(),
        );
        let tree = SearchTree::new(vec![Message::user(prompt)]);

        let session = Self {
            id: env.session_id().to_string(),
            question: question.to_string(),
            created_at: Utc::now(),
            env,
            tree,
            reflections: Vec::new(),
        };
        session.announce();
        session
    }

    /// Rebuild a session from a snapshot, for inspection or replay.
    pub fn restore(snapshot: &SessionSnapshot, env: Arc<SessionEnv>) -> Self {
        for conclusion in &snapshot.conclusions {
            env.tool_ctx().add_conclusion(conclusion.clone());
        }
        Self {
            id: snapshot.session_id.clone(),
            question: snapshot.question.clone(),
            created_at: snapshot.created_at,
            env,
            tree: SearchTree::from_snapshot(&snapshot.tree),
            reflections: snapshot.reflections.clone(),
        }
    }

    fn announce(&self) {
        self.env.emit(Event::SetCurrentSession {
            session_id: self.id.clone(),
        });
        self.env.emit(Event::SetSessionInfo {
            session_id: self.id.clone(),
            info: json!({
                "question": self.question,
                "created_at": self.created_at.to_rfc3339(),
                "tools": self.env.tools().names(),
            }),
        });
        self.env.emit(Event::RootNode {
            session_id: self.id.clone(),
            node: NodeView::from(&self.tree[self.tree.root()]),
        });
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn env(&self) -> &Arc<SessionEnv> {
        &self.env
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SearchTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Reflections written during this run
    pub fn reflections(&self) -> &[String] {
        &self.reflections
    }

    pub fn add_reflections(&mut self, reflections: impl IntoIterator<Item = String>) {
        self.reflections.extend(reflections);
    }

    pub fn conclusions(&self) -> Vec<String> {
        self.env.tool_ctx().conclusions()
    }

    /// Publish a single session info entry.
    pub fn set_info(&self, key: &str, value: serde_json::Value) {
        self.env.emit(Event::SetSessionInfoKey {
            session_id: self.id.clone(),
            key: key.to_string(),
            value,
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            question: self.question.clone(),
            created_at: self.created_at,
            reflections: self.reflections.clone(),
            conclusions: self.conclusions(),
            tree: self.tree.snapshot(),
        }
    }

    /// Write the snapshot to `path` as pretty JSON.
    pub fn write_backup(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Internal {
                message: format!("Failed to create backup directory: {e}"),
            })?;
        }
        let data = serde_json::to_string_pretty(&self.snapshot()).map_err(|e| AppError::Internal {
            message: format!("Failed to serialize session: {e}"),
        })?;
        std::fs::write(path, data).map_err(|e| AppError::Internal {
            message: format!("Failed to write backup {}: {e}", path.display()),
        })?;
        info!(session_id = %self.id, path = %path.display(), "Session backup written");
        Ok(())
    }

    /// Load a snapshot written by [`Session::write_backup`].
    pub fn read_backup(path: &Path) -> AppResult<SessionSnapshot> {
        let data = std::fs::read_to_string(path).map_err(|e| AppError::Internal {
            message: format!("Failed to read backup {}: {e}", path.display()),
        })?;
        serde_json::from_str(&data).map_err(|e| AppError::Internal {
            message: format!("Corrupt backup {}: {e}", path.display()),
        })
    }
}

/// Generate a fresh session id
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::events::MemorySink;
    use crate::tools::DecideTool;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn env_with(sink: Arc<MemorySink>) -> Arc<SessionEnv> {
        let ctx = ToolContext::new("sess-1", Arc::new(ArtifactStore::new("./run")));
        Arc::new(SessionEnv::new(
            ToolTable::default().with_tool(Arc::new(DecideTool)),
            ctx,
            sink,
        ))
    }

    #[test]
    fn test_start_builds_opening_prompt() {
        let sink = Arc::new(MemorySink::new());
        let session = Session::start(
            "Where was this photo taken?",
            Some("The photo shows a tower."),
            env_with(sink.clone()),
            &["Check street signs first".to_string()],
        );

        let root = &session.tree()[session.root()];
        let prompt = &root.messages[0].text;
        assert!(prompt.contains("Where was this photo taken?\nThe photo shows a tower."));
        assert!(prompt.contains("[Decide]"));
        assert!(prompt.contains("Check street signs first"));
        assert!(session.reflections().is_empty());

        let types: Vec<&str> = sink.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["set_current_session", "set_session_info", "root_node"]);
    }

    #[test]
    fn test_backup_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backups").join("session.json");

        let mut session = Session::start("q", None, env_with(Arc::new(MemorySink::new())), &[]);
        let root = session.root();
        session
            .tree_mut()
            .add_child(root, vec![Message::assistant("Final Answer: x")])
            .unwrap();
        session.add_reflections(vec!["guessing failed".to_string()]);
        session.env().tool_ctx().add_conclusion("it is in Europe");

        session.write_backup(&path).unwrap();
        let snapshot = Session::read_backup(&path).unwrap();
        assert_eq!(snapshot, session.snapshot());

        let restored = Session::restore(&snapshot, env_with(Arc::new(MemorySink::new())));
        assert_eq!(restored.tree().len(), 2);
        assert_eq!(restored.reflections(), &["guessing failed".to_string()]);
        assert_eq!(restored.conclusions(), vec!["it is in Europe".to_string()]);
    }
}
