//! Shared helpers for integration tests.
//!
//! [`ScriptedOracle`] answers by looking at the last message of the
//! transcript: reward rubric, sibling comparison, reflection request, rescue
//! prompt, or (otherwise) candidate generation.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lats_engine::config::SearchConfig;
use lats_engine::error::{OracleError, OracleResult};
use lats_engine::events::MemorySink;
use lats_engine::oracle::{Message, Oracle};
use lats_engine::search::{LatsSearch, SearchCore};
use lats_engine::session::SessionEnv;
use lats_engine::artifacts::ArtifactStore;
use lats_engine::tools::{DecideTool, ToolContext, ToolTable};

type RewardRule = Box<dyn Fn(&[Message]) -> String + Send + Sync>;

/// Deterministic oracle driven by simple rules.
pub struct ScriptedOracle {
    batches: Mutex<VecDeque<Vec<String>>>,
    default_batch: Vec<String>,
    reward: RewardRule,
    sibling_reply: String,
    reflection_reply: String,
    rescue_replies: Mutex<VecDeque<String>>,
    generation_failures: AtomicUsize,
    pub generation_calls: AtomicUsize,
    pub reward_calls: AtomicUsize,
    pub rescue_prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            default_batch: Vec::new(),
            reward: Box::new(|_| "0".to_string()),
            sibling_reply: "branch 1: 5".to_string(),
            reflection_reply: "The trajectory guessed without evidence.".to_string(),
            rescue_replies: Mutex::new(VecDeque::new()),
            generation_failures: AtomicUsize::new(0),
            generation_calls: AtomicUsize::new(0),
            reward_calls: AtomicUsize::new(0),
            rescue_prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the candidates returned by the next generation call.
    pub fn with_batch(self, batch: &[&str]) -> Self {
        self.batches
            .lock()
            .unwrap()
            .push_back(batch.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Candidates returned once the queue is empty.
    pub fn with_default_batch(mut self, batch: &[&str]) -> Self {
        self.default_batch = batch.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_reward(mut self, rule: impl Fn(&[Message]) -> String + Send + Sync + 'static) -> Self {
        self.reward = Box::new(rule);
        self
    }

    pub fn with_sibling_reply(mut self, reply: &str) -> Self {
        self.sibling_reply = reply.to_string();
        self
    }

    pub fn with_rescue_replies(self, replies: &[&str]) -> Self {
        self.rescue_replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|s| s.to_string()));
        self
    }

    /// Every generation call fails.
    pub fn failing_generation(self) -> Self {
        self.failing_first_generations(usize::MAX)
    }

    /// The first `n` generation calls fail, later ones answer normally.
    pub fn failing_first_generations(self, n: usize) -> Self {
        self.generation_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn generations(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    pub fn rewards(&self) -> usize {
        self.reward_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn propose(
        &self,
        transcript: &[Message],
        _stop: &[&str],
        _n: usize,
    ) -> OracleResult<Vec<Message>> {
        let last = transcript.last().map(|m| m.text.clone()).unwrap_or_default();

        let reply = if last.contains("has reached a terminal state") {
            self.reward_calls.fetch_add(1, Ordering::SeqCst);
            (self.reward)(transcript)
        } else if last.contains("Begin Branch") {
            self.sibling_reply.clone()
        } else if last.contains("First summarize what you did") {
            self.reflection_reply.clone()
        } else if last.starts_with("An agent") {
            self.rescue_prompts.lock().unwrap().push(last.clone());
            self.rescue_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "GIVE UP".to_string())
        } else {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .generation_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(OracleError::Unavailable {
                    message: "scripted outage".to_string(),
                    retries: 3,
                });
            }
            let batch = self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default_batch.clone());
            return Ok(batch.into_iter().map(Message::assistant).collect());
        };

        Ok(vec![Message::assistant(reply)])
    }
}

/// Reward rule: 10 when the transcript contains `needle`, else 0.
pub fn reward_if(needle: &'static str) -> impl Fn(&[Message]) -> String + Send + Sync {
    move |transcript: &[Message]| {
        if transcript.iter().any(|m| m.text.contains(needle)) {
            "10".to_string()
        } else {
            "0".to_string()
        }
    }
}

pub fn settings() -> SearchConfig {
    SearchConfig::default()
}

pub fn decide_tools() -> ToolTable {
    ToolTable::default().with_tool(Arc::new(DecideTool))
}

/// Build a search over `tools` with a recording sink.
pub fn build_search(
    oracle: Arc<ScriptedOracle>,
    fast_oracle: Arc<ScriptedOracle>,
    settings: SearchConfig,
    tools: ToolTable,
) -> (LatsSearch, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let ctx = ToolContext::new("test-session", Arc::new(ArtifactStore::new("./run-test")));
    let env = Arc::new(SessionEnv::new(tools, ctx, sink.clone()));
    let core = SearchCore::new(oracle, fast_oracle, settings);
    (LatsSearch::new(core, env), sink)
}
