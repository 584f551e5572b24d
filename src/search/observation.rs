use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::transition::Transition;
use super::SearchCore;
use crate::error::{OracleResult, ToolError, ToolResult};
use crate::operator::{FailureChoice, Review};
use crate::oracle::Message;
use crate::prompts::{
    argument_rescue_prompt, observation_message, tool_name_rescue_prompt, ADJUST_INPUT_MESSAGE,
    GIVE_UP_MARKER,
};
use crate::session::SessionEnv;
use crate::tools::{sanitize, signature, split_args, Tool, ToolOutput};

/// Everything an observation task needs, detached from the tree.
#[derive(Debug, Clone)]
pub struct ObservationRequest {
    pub transition: Transition,
    /// Full transcript of the node being observed
    pub transcript: Vec<Message>,
    pub depth: usize,
}

/// Changes to apply to the observed node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationOutcome {
    pub messages: Vec<Message>,
    pub observation: Option<String>,
    pub auxiliary: Map<String, Value>,
    /// Set when the node became terminal
    pub terminal_reward: Option<f64>,
}

impl ObservationOutcome {
    fn corrective(depth: usize, text: String) -> Self {
        Self {
            messages: vec![Message::user(observation_message(depth, &text))],
            observation: Some(text),
            ..Default::default()
        }
    }
}

fn rescued_input_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Action\s*\d*\s*Input\s*\d*\s*:[ \t]*(.*)").expect("input pattern is valid")
    })
}

/// Extract corrected arguments from a rescue reply. `None` means give up.
fn parse_rescued_args(reply: &str) -> Option<String> {
    if reply.contains(GIVE_UP_MARKER) {
        return None;
    }
    let raw = match rescued_input_regex().captures(reply) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => reply.to_string(),
    };
    let args = sanitize(&raw);
    if args.is_empty() {
        None
    } else {
        Some(args)
    }
}

/// Executes the transition of a freshly expanded node.
#[derive(Clone)]
pub struct Observer {
    core: SearchCore,
    env: Arc<SessionEnv>,
}

impl Observer {
    pub fn new(core: SearchCore, env: Arc<SessionEnv>) -> Self {
        Self { core, env }
    }

    /// Observe one transition.
    ///
    /// Tool failures are folded into corrective messages; only an oracle
    /// failure while scoring a final answer is returned as an error.
    pub async fn observe(&self, request: ObservationRequest) -> OracleResult<ObservationOutcome> {
        match &request.transition {
            Transition::None => Ok(ObservationOutcome::corrective(
                request.depth,
                ADJUST_INPUT_MESSAGE.to_string(),
            )),
            Transition::Finish { return_value } => {
                self.conclude(return_value, request.transcript, request.depth, ObservationOutcome::default())
                    .await
            }
            Transition::Act { tool, tool_input } => {
                self.act(tool, tool_input, request.transcript, request.depth).await
            }
        }
    }

    /// Score or review a final answer and record the verdict in `outcome`.
    async fn conclude(
        &self,
        answer: &str,
        transcript: Vec<Message>,
        depth: usize,
        mut outcome: ObservationOutcome,
    ) -> OracleResult<ObservationOutcome> {
        if let Some(operator) = self.core.interactive_operator() {
            match operator.review_answer(answer).await {
                Review::Approve => {
                    info!(answer = %answer, "Answer approved by operator");
                    outcome.auxiliary.insert("reward".to_string(), Value::from(1.0));
                    outcome.terminal_reward = Some(1.0);
                }
                Review::Reject { feedback } => {
                    debug!(feedback = %feedback, "Answer rejected by operator");
                    outcome.messages.push(Message::user(observation_message(
                        depth,
                        &format!("The answer was rejected. Feedback: {feedback}"),
                    )));
                }
            }
            return Ok(outcome);
        }

        let mut scored = transcript;
        scored.extend(outcome.messages.iter().cloned());
        let reward = self.core.evaluator().score_reward(&scored).await?;
        outcome.auxiliary.insert("reward".to_string(), Value::from(reward));
        outcome.terminal_reward = Some(reward);
        Ok(outcome)
    }

    async fn act(
        &self,
        requested: &str,
        tool_input: &str,
        transcript: Vec<Message>,
        depth: usize,
    ) -> OracleResult<ObservationOutcome> {
        let tool = match self.env.tools().resolve(requested) {
            Some(tool) => tool,
            None => match self.rescue_tool_name(requested).await {
                Some(tool) => tool,
                None => {
                    let err = ToolError::NotFound {
                        name: requested.to_string(),
                    };
                    let text = format!(
                        "{err}. Valid tools are: {}",
                        self.env.tools().names().join(", ")
                    );
                    return Ok(ObservationOutcome::corrective(depth, text));
                }
            },
        };

        let args = sanitize(tool_input);
        match self.invoke_with_rescue(tool.as_ref(), &args).await {
            Ok(output) => {
                let mut outcome = ObservationOutcome {
                    messages: vec![Message::user(observation_message(depth, &output.text))],
                    observation: Some(output.text.clone()),
                    auxiliary: output.side_data,
                    terminal_reward: None,
                };
                if tool.return_direct() {
                    debug!(tool = %tool.name(), "Return-direct tool reached a terminal state");
                    outcome = self.conclude(&output.text, transcript, depth, outcome).await?;
                }
                Ok(outcome)
            }
            Err(err) => Ok(self.record_failure(tool.name(), err, depth).await),
        }
    }

    async fn record_failure(&self, tool: &str, err: ToolError, depth: usize) -> ObservationOutcome {
        warn!(tool = %tool, error = %err, "Tool call failed after rescue");
        let mut text = format!("Error: {err}");
        if let Some(operator) = self.core.interactive_operator() {
            if let FailureChoice::Feedback(feedback) =
                operator.review_failure(tool, &err.to_string()).await
            {
                text.push_str(&format!("\nFeedback: {feedback}"));
            }
        }
        ObservationOutcome::corrective(depth, text)
    }

    /// Ask the secondary oracle for the tool the agent meant.
    async fn rescue_tool_name(&self, requested: &str) -> Option<Arc<dyn Tool>> {
        let names = self.env.tools().names();
        let mut attempts: Vec<String> = Vec::new();

        for attempt in 1..=self.core.settings().rescue_threshold {
            let prompt = tool_name_rescue_prompt(requested, &names, &attempts);
            let reply = match self.core.fast_oracle().complete(&[Message::user(prompt)]).await {
                Ok(reply) => reply.text,
                Err(e) => {
                    warn!(error = %e, requested = %requested, "Tool name rescue call failed");
                    return None;
                }
            };

            let candidate = reply.trim();
            if candidate.contains(GIVE_UP_MARKER) {
                debug!(requested = %requested, attempt = attempt, "Tool name rescue gave up");
                return None;
            }
            if let Some(tool) = self.env.tools().resolve(candidate) {
                info!(requested = %requested, resolved = %tool.name(), attempt = attempt, "Tool name rescued");
                return Some(tool);
            }
            attempts.push(candidate.to_string());
        }

        None
    }

    /// Invoke a tool, repairing its arguments through the secondary oracle on failure.
    ///
    /// When rescue gives up or runs out of attempts the original error is returned.
    async fn invoke_with_rescue(&self, tool: &dyn Tool, args: &str) -> ToolResult<ToolOutput> {
        let original = match self.invoke_once(tool, args).await {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };

        let sig = signature(tool);
        let mut attempts: Vec<(String, String)> = Vec::new();
        let mut last_args = args.to_string();
        let mut last_error = original.to_string();

        for attempt in 1..=self.core.settings().rescue_threshold {
            let prompt = argument_rescue_prompt(&sig, &last_args, &last_error, &attempts);
            let reply = match self.core.fast_oracle().complete(&[Message::user(prompt)]).await {
                Ok(reply) => reply.text,
                Err(e) => {
                    warn!(error = %e, tool = %tool.name(), "Argument rescue call failed");
                    break;
                }
            };

            let Some(fixed) = parse_rescued_args(&reply) else {
                debug!(tool = %tool.name(), attempt = attempt, "Argument rescue gave up");
                break;
            };

            match self.invoke_once(tool, &fixed).await {
                Ok(output) => {
                    info!(tool = %tool.name(), attempt = attempt, "Tool call rescued");
                    return Ok(output);
                }
                Err(err) => {
                    debug!(tool = %tool.name(), attempt = attempt, error = %err, "Rescued call failed");
                    attempts.push((fixed.clone(), err.to_string()));
                    last_args = fixed;
                    last_error = err.to_string();
                }
            }
        }

        Err(original)
    }

    async fn invoke_once(&self, tool: &dyn Tool, args: &str) -> ToolResult<ToolOutput> {
        let arity = tool.arity();
        let parts = match arity {
            0 => Vec::new(),
            _ => split_args(args, arity),
        };
        if arity > 1 && parts.len() != arity {
            return Err(ToolError::InvalidArguments {
                tool: tool.name().to_string(),
                expected: arity,
                got: parts.len(),
            });
        }

        let timeout_ms = self.core.settings().tool_timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tool.invoke(parts, self.env.tool_ctx()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: tool.name().to_string(),
                timeout_ms,
            }),
        }
    }
}
