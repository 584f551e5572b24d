//! # LATS Engine
//!
//! Language-agent tree search: a reasoning oracle proposes the next step of
//! an investigation, tools execute it, and the outcome is scored and fed back
//! into a UCT-guided Monte-Carlo tree search.
//!
//! ## Architecture
//!
//! ```text
//! Agent → LatsSearch (select → expand → evaluate → rollout → backprop)
//!            ↓                ↓                    ↓
//!      Oracle (HTTP)    Tools + Artifacts     EventSink → SQLite (State)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lats_engine::{Agent, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let agent = Agent::from_config(&config).await?;
//!     let result = agent.investigate("Where was this photo taken?", None).await?;
//!     println!("{:?}", result.answer);
//!     Ok(())
//! }
//! ```

/// Investigation entry point.
pub mod agent;
/// Artifact namespace for files produced during a run.
pub mod artifacts;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Observability events and sinks.
pub mod events;
/// Interactive-mode operator seam.
pub mod operator;
/// Reasoning oracle trait and HTTP client.
pub mod oracle;
/// Prompt text used by the search loop.
pub mod prompts;
/// Tree search: nodes, policy, expansion, observation, evaluation, rollout.
pub mod search;
/// Session state and snapshots.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;
/// Tool trait, tool table and built-in tools.
pub mod tools;

pub use agent::{Agent, InvestigationResult};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use search::{LatsSearch, SearchCore, SearchTree, Transition};
pub use session::Session;
