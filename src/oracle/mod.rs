//! Reasoning oracle seam and its HTTP implementation.
//!
//! The search core only sees the [`Oracle`] trait. [`OracleClient`] talks to an
//! OpenAI-compatible chat-completions endpoint; tests substitute scripted oracles.

mod client;
mod types;

pub use client::OracleClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::{OracleError, OracleResult};

/// Turns a transcript into one or more sampled continuations.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Sample `n` continuations of `transcript`, stopping at any of `stop`.
    async fn propose(
        &self,
        transcript: &[Message],
        stop: &[&str],
        n: usize,
    ) -> OracleResult<Vec<Message>>;

    /// Single continuation, used for scoring, reflection and rescue prompts.
    async fn complete(&self, transcript: &[Message]) -> OracleResult<Message> {
        self.propose(transcript, &[], 1)
            .await?
            .into_iter()
            .next()
            .ok_or(OracleError::EmptyResponse)
    }
}
