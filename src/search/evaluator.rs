use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::error::OracleResult;
use crate::oracle::{Message, Oracle};
use crate::prompts::{multi_evaluation_prompt, REFLECTION_PROMPT, REWARD_PROMPT};

/// Scores nodes by asking the oracle to grade transcripts.
#[derive(Clone)]
pub struct Evaluator {
    oracle: Arc<dyn Oracle>,
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"))
}

fn branch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)branch\s*(\d+)\s*:\s*(\d+(?:\.\d+)?)").expect("branch pattern is valid")
    })
}

fn normalize(raw: f64) -> f64 {
    (raw / 10.0).clamp(0.0, 1.0)
}

/// Extract a 0-10 grade from the last line that carries a number.
///
/// Returns the grade normalized to `[0, 1]`, or 0 when nothing parses.
pub fn parse_score(text: &str) -> f64 {
    text.lines()
        .rev()
        .find_map(|line| number_regex().find(line))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(normalize)
        .unwrap_or(0.0)
}

/// Map `branch <i>: <score>` lines onto `n` positions (1-based labels).
///
/// Missing or out-of-range branches score 0.
pub fn parse_branch_scores(text: &str, n: usize) -> Vec<f64> {
    let mut scores = vec![0.0; n];
    for caps in branch_regex().captures_iter(text) {
        let index = caps[1].parse::<usize>().ok();
        let score = caps[2].parse::<f64>().ok();
        if let (Some(index), Some(score)) = (index, score) {
            if (1..=n).contains(&index) {
                scores[index - 1] = normalize(score);
            }
        }
    }
    scores
}

impl Evaluator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Grade a terminal trajectory.
    pub async fn score_reward(&self, transcript: &[Message]) -> OracleResult<f64> {
        let mut messages = transcript.to_vec();
        messages.push(Message::user(REWARD_PROMPT));
        let reply = self.oracle.complete(&messages).await?;
        let score = parse_score(&reply.text);
        debug!(score = score, "Reward scored");
        Ok(score)
    }

    /// Grade sibling fragments against each other.
    ///
    /// `context` is the shared transcript up to the parent; `fragments` are
    /// the siblings' own texts, in child order.
    pub async fn score_siblings(
        &self,
        context: &[Message],
        fragments: &[String],
    ) -> OracleResult<Vec<f64>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }

        let mut branches = String::new();
        for (i, fragment) in fragments.iter().enumerate() {
            let label = i + 1;
            branches.push_str(&format!(
                "Begin Branch {label}\n{}\nEnd Branch {label}\n\n",
                fragment.trim()
            ));
        }
        branches.push_str(&multi_evaluation_prompt(fragments.len()));

        let mut messages = context.to_vec();
        messages.push(Message::user(branches));
        let reply = self.oracle.complete(&messages).await?;
        let scores = parse_branch_scores(&reply.text, fragments.len());
        debug!(scores = ?scores, "Siblings scored");
        Ok(scores)
    }

    /// Ask for a post-mortem of an unsuccessful trajectory.
    pub async fn reflect(&self, transcript: &[Message]) -> OracleResult<String> {
        let mut messages = transcript.to_vec();
        messages.push(Message::user(REFLECTION_PROMPT));
        let reply = self.oracle.complete(&messages).await?;
        Ok(reply.text.trim().to_string())
    }
}
