//! Language-agent tree search.
//!
//! The tree is an arena ([`SearchTree`]) owned by the driver. Each outer
//! iteration selects a frontier node by UCT, expands it into oracle
//! candidates, observes those candidates concurrently, scores the siblings,
//! rolls out the best one and backpropagates the result.

mod driver;
mod evaluator;
mod expansion;
mod node;
mod observation;
mod policy;
mod rollout;
mod transition;
mod tree;

pub use driver::{LatsSearch, SearchOutcome};
pub use evaluator::{parse_branch_scores, parse_score, Evaluator};
pub use node::{Node, NodeId, NodeState, StateCell, StateGuard};
pub use observation::{ObservationOutcome, ObservationRequest, Observer};
pub use policy::{select, uct};
pub use rollout::backpropagate;
pub use transition::{DedupKey, Transition};
pub use tree::{NodeSnapshot, SearchTree};

use std::sync::Arc;

use crate::config::{RunMode, SearchConfig};
use crate::operator::Operator;
use crate::oracle::Oracle;

/// Collaborators shared by every search phase.
#[derive(Clone)]
pub struct SearchCore {
    /// Oracle proposing candidates and scoring them.
    oracle: Arc<dyn Oracle>,
    /// Cheaper oracle used by rescue cycles.
    fast_oracle: Arc<dyn Oracle>,
    settings: SearchConfig,
    operator: Option<Arc<dyn Operator>>,
}

impl SearchCore {
    pub fn new(oracle: Arc<dyn Oracle>, fast_oracle: Arc<dyn Oracle>, settings: SearchConfig) -> Self {
        Self {
            oracle,
            fast_oracle,
            settings,
            operator: None,
        }
    }

    /// Attach the operator consulted in interactive mode
    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    #[inline]
    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    #[inline]
    pub fn fast_oracle(&self) -> &Arc<dyn Oracle> {
        &self.fast_oracle
    }

    #[inline]
    pub fn settings(&self) -> &SearchConfig {
        &self.settings
    }

    /// Operator to consult, present only in interactive mode.
    pub fn interactive_operator(&self) -> Option<&Arc<dyn Operator>> {
        match self.settings.run_mode {
            RunMode::Interactive => self.operator.as_ref(),
            RunMode::Autonomous => None,
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.oracle.clone())
    }
}
