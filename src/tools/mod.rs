//! Tool catalogue consulted by the observation executor.
//!
//! A tool is named, has a fixed positional arity, and turns a list of string
//! arguments into an observation text plus optional side data. Tools that set
//! [`Tool::return_direct`] end the trajectory with their output.

mod args;
mod builtin;

pub use args::{sanitize, split_args};
pub use builtin::DecideTool;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::artifacts::ArtifactStore;
use crate::error::ToolResult;

/// Output of a tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text shown to the oracle as the observation
    pub text: String,
    /// Structured side data merged into the node's auxiliary map
    pub side_data: Map<String, Value>,
}

impl ToolOutput {
    /// Create an output with observation text only
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            side_data: Map::new(),
        }
    }

    /// Attach a side data entry
    pub fn with_side_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.side_data.insert(key.into(), value);
        self
    }
}

/// Per-session state a tool may read or extend.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the invocation belongs to
    pub session_id: String,
    /// Run-scoped artifact namespace
    pub artifacts: Arc<ArtifactStore>,
    conclusions: Arc<Mutex<Vec<String>>>,
}

impl ToolContext {
    /// Create a context with no conclusions
    pub fn new(session_id: impl Into<String>, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            session_id: session_id.into(),
            artifacts,
            conclusions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Seed the context with conclusions from an earlier run.
    pub fn with_conclusions(self, conclusions: Vec<String>) -> Self {
        *self.lock_conclusions() = conclusions;
        self
    }

    /// Record a conclusion reached during the investigation.
    pub fn add_conclusion(&self, conclusion: impl Into<String>) {
        self.lock_conclusions().push(conclusion.into());
    }

    /// Snapshot of the recorded conclusions
    pub fn conclusions(&self) -> Vec<String> {
        self.lock_conclusions().clone()
    }

    fn lock_conclusions(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.conclusions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A callable tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the oracle uses in `Action:` lines
    fn name(&self) -> &str;

    /// One-line description rendered into the opening prompt
    fn description(&self) -> &str;

    /// Number of positional arguments
    fn arity(&self) -> usize;

    /// Whether the output is the final answer of the trajectory.
    fn return_direct(&self) -> bool {
        false
    }

    /// Invoke the tool with already split arguments.
    async fn invoke(&self, args: Vec<String>, ctx: &ToolContext) -> ToolResult<ToolOutput>;
}

/// Human readable signature used in rescue prompts
pub fn signature(tool: &dyn Tool) -> String {
    format!(
        "{} ({} argument{}): {}",
        tool.name(),
        tool.arity(),
        if tool.arity() == 1 { "" } else { "s" },
        tool.description()
    )
}

/// Ordered collection of tools with lenient name resolution.
#[derive(Clone, Default)]
pub struct ToolTable {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolTable {
    /// Create a table from a list of tools
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Add a tool
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Resolve a requested name.
    ///
    /// Tries an exact match, then a tool whose name appears inside the
    /// requested text (longest name wins), then the same containment test
    /// ignoring case.
    pub fn resolve(&self, requested: &str) -> Option<Arc<dyn Tool>> {
        let requested = requested.trim();
        if let Some(tool) = self.tools.iter().find(|t| t.name() == requested) {
            return Some(tool.clone());
        }

        let contained = self
            .tools
            .iter()
            .filter(|t| !t.name().is_empty() && requested.contains(t.name()))
            .max_by_key(|t| t.name().len());
        if let Some(tool) = contained {
            return Some(tool.clone());
        }

        let lowered = requested.to_lowercase();
        self.tools
            .iter()
            .filter(|t| !t.name().is_empty() && lowered.contains(&t.name().to_lowercase()))
            .max_by_key(|t| t.name().len())
            .cloned()
    }

    /// Tool names in catalogue order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Render the catalogue for the opening prompt, one tool per line.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| signature(t.as_ref()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolTable")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &'static str) -> Arc<dyn Tool> {
        let mut tool = MockTool::new();
        tool.expect_name().return_const(name.to_string());
        tool.expect_arity().return_const(1usize);
        tool.expect_description().return_const("test tool".to_string());
        Arc::new(tool)
    }

    #[test]
    fn test_resolve_exact() {
        let table = ToolTable::new(vec![named("search"), named("geocode")]);
        assert_eq!(table.resolve("geocode").unwrap().name(), "geocode");
    }

    #[test]
    fn test_resolve_contained_prefers_longest() {
        let table = ToolTable::new(vec![named("search"), named("search_images")]);
        assert_eq!(
            table.resolve("use search_images now").unwrap().name(),
            "search_images"
        );
        assert_eq!(table.resolve("search the web").unwrap().name(), "search");
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let table = ToolTable::new(vec![named("Decide")]);
        assert_eq!(table.resolve("decide").unwrap().name(), "Decide");
    }

    #[test]
    fn test_resolve_unknown() {
        let table = ToolTable::new(vec![named("search")]);
        assert!(table.resolve("geocode").is_none());
    }

    #[test]
    fn test_describe_lists_every_tool() {
        let table = ToolTable::default()
            .with_tool(named("search"))
            .with_tool(Arc::new(DecideTool));
        let rendered = table.describe();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.starts_with("search (1 argument): test tool"));
        assert_eq!(table.names(), vec!["search".to_string(), "Decide".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_tool_invocation() {
        let mut tool = MockTool::new();
        tool.expect_invoke()
            .withf(|args, _| args == &vec!["Paris".to_string()])
            .returning(|_, _| Ok(ToolOutput::text("48.85, 2.35")));

        let ctx = ToolContext::new("s", Arc::new(ArtifactStore::new("./run")));
        let out = tool.invoke(vec!["Paris".to_string()], &ctx).await.unwrap();
        assert_eq!(out.text, "48.85, 2.35");
    }
}
