//! Top-level entry point: one investigation, end to end.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::{Config, RunMode};
use crate::error::{AppResult, StorageError};
use crate::events::{Event, EventSink, MultiSink, StorageSink, TracingSink};
use crate::operator::{ConsoleOperator, Operator};
use crate::oracle::{Oracle, OracleClient};
use crate::search::{LatsSearch, SearchCore, Transition};
use crate::session::{new_session_id, Session, SessionEnv};
use crate::storage::{
    ReflectionRecord, SessionRecord, SessionStatus, SnapshotRecord, SqliteStorage, Storage,
};
use crate::tools::{DecideTool, Tool, ToolContext, ToolTable};

/// How many stored reflections seed a new run.
const REFLECTION_LIMIT: u32 = 5;

/// Summary of a finished investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub session_id: String,
    pub success: bool,
    /// Transition of the returned node
    pub answer: Transition,
    pub reward: f64,
    /// Observation of the returned node
    pub observation: Option<String>,
    pub iterations: usize,
    pub nodes_explored: usize,
}

impl InvestigationResult {
    /// Answer text: the final answer, or the output of a return-direct tool
    /// that ended a successful run.
    pub fn answer_text(&self) -> Option<&str> {
        match &self.answer {
            Transition::Finish { return_value } => Some(return_value),
            Transition::Act { .. } if self.success => self.observation.as_deref(),
            _ => None,
        }
    }
}

/// Owns every collaborator needed to run investigations.
pub struct Agent {
    storage: Arc<dyn Storage>,
    core: SearchCore,
    tools: ToolTable,
    sink: Arc<dyn EventSink>,
    artifacts: Arc<ArtifactStore>,
}

impl Agent {
    /// Assemble an agent from explicit collaborators.
    ///
    /// Events go to the log and to the storage audit table.
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        oracle: Arc<dyn Oracle>,
        fast_oracle: Arc<dyn Oracle>,
    ) -> Self {
        let sink = MultiSink::default()
            .with_sink(Arc::new(TracingSink))
            .with_sink(Arc::new(StorageSink::new(storage.clone())));

        Self {
            core: SearchCore::new(oracle, fast_oracle, config.search.clone()),
            tools: ToolTable::default().with_tool(Arc::new(DecideTool)),
            sink: Arc::new(sink),
            artifacts: Arc::new(ArtifactStore::from_config(&config.artifacts)),
            storage,
        }
    }

    /// Build the production agent: SQLite storage and HTTP oracles.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let storage = SqliteStorage::new(&config.database).await?;
        let oracle = OracleClient::primary(&config.oracle, config.request.clone())?;
        let fast_oracle = OracleClient::secondary(&config.oracle, config.request.clone())?;

        let mut agent = Self::new(config, Arc::new(storage), Arc::new(oracle), Arc::new(fast_oracle));
        if config.search.run_mode == RunMode::Interactive {
            agent = agent.with_operator(Arc::new(ConsoleOperator::stdio()));
        }
        Ok(agent)
    }

    /// Register an additional tool
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools = self.tools.with_tool(tool);
        self
    }

    /// Replace the event sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach the operator consulted in interactive mode
    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.core = self.core.with_operator(operator);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    /// Run one investigation and return its summary.
    pub async fn investigate(
        &self,
        question: &str,
        additional: Option<&str>,
    ) -> AppResult<InvestigationResult> {
        self.run_session(question, additional).await.map(|(_, result)| result)
    }

    /// Run one investigation and keep the finished session for inspection.
    ///
    /// Once the session row exists, any error marks it `failed`.
    pub async fn run_session(
        &self,
        question: &str,
        additional: Option<&str>,
    ) -> AppResult<(Session, InvestigationResult)> {
        let start = Instant::now();
        self.artifacts.flush()?;

        let session_id = new_session_id();
        let record = SessionRecord::new(question)
            .with_id(session_id.clone())
            .with_metadata(json!({ "additional": additional }));
        self.storage.create_session(&record).await?;
        self.sink.push(Event::GlobalInfoSet {
            key: "active_session".to_string(),
            value: json!(session_id),
        });

        match self.execute(&session_id, question, additional).await {
            Ok((session, result)) => {
                info!(
                    session_id = %session_id,
                    success = result.success,
                    reward = result.reward,
                    iterations = result.iterations,
                    nodes = result.nodes_explored,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Investigation finished"
                );
                Ok((session, result))
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Investigation failed");
                if let Err(status_err) = self
                    .storage
                    .update_session_status(&session_id, SessionStatus::Failed)
                    .await
                {
                    warn!(session_id = %session_id, error = %status_err, "Failed to mark session as failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        session_id: &str,
        question: &str,
        additional: Option<&str>,
    ) -> AppResult<(Session, InvestigationResult)> {
        let prior: Vec<String> = self
            .storage
            .get_recent_reflections(REFLECTION_LIMIT)
            .await?
            .into_iter()
            .map(|r| r.content)
            .collect();

        let env = Arc::new(SessionEnv::new(
            self.tools.clone(),
            ToolContext::new(session_id, self.artifacts.clone()),
            self.sink.clone(),
        ));
        let mut session = Session::start(question, additional, env.clone(), &prior);
        info!(
            session_id = %session_id,
            prior_reflections = prior.len(),
            tools = self.tools.len(),
            "Investigation started"
        );

        let search = LatsSearch::new(self.core.clone(), env);
        let outcome = search.run(session.tree_mut()).await;
        session.add_reflections(outcome.reflections.clone());

        self.persist(&session, outcome.success).await?;

        let node = &session.tree()[outcome.node];
        let result = InvestigationResult {
            session_id: session_id.to_string(),
            success: outcome.success,
            answer: node.transition.clone(),
            reward: node.reward,
            observation: node.observation.clone(),
            iterations: outcome.iterations,
            nodes_explored: session.tree().len(),
        };
        session.set_info("result", json!(result));
        self.sink.push(Event::GlobalInfoSet {
            key: "last_result".to_string(),
            value: json!({ "session_id": session_id, "success": result.success }),
        });
        Ok((session, result))
    }

    async fn persist(&self, session: &Session, success: bool) -> AppResult<()> {
        for reflection in session.reflections() {
            self.storage
                .add_reflection(&ReflectionRecord::new(session.id(), reflection.clone()))
                .await?;
        }

        let data = serde_json::to_value(session.snapshot()).map_err(|e| {
            StorageError::Serialization {
                message: e.to_string(),
            }
        })?;
        self.storage
            .save_snapshot(&SnapshotRecord::new(session.id(), data))
            .await?;

        let status = if success {
            SessionStatus::Succeeded
        } else {
            SessionStatus::Exhausted
        };
        self.storage.update_session_status(session.id(), status).await?;
        Ok(())
    }
}
