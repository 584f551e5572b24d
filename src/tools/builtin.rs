use async_trait::async_trait;

use super::{Tool, ToolContext, ToolOutput};
use crate::error::ToolResult;

/// Records a decision about the direction of the investigation.
///
/// The decision becomes a conclusion of the current session and is saved
/// with the session snapshot. Conclusions are not shared between runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecideTool;

#[async_trait]
impl Tool for DecideTool {
    fn name(&self) -> &str {
        "Decide"
    }

    fn description(&self) -> &str {
        "Notes that a decision has been made. Use this to record possibilities for the path of investigation, \
         e.g. \"The image is in America\"."
    }

    fn arity(&self) -> usize {
        1
    }

    async fn invoke(&self, args: Vec<String>, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let decision = args.into_iter().next().unwrap_or_default();
        ctx.add_conclusion(decision.clone());
        Ok(ToolOutput::text("Decision noted").with_side_data("decision", decision.into()))
    }
}
