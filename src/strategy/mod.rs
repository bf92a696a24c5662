//! Navigation strategies: traversal algorithms over the stage catalog.
//!
//! The engine holds one strategy behind [`NavigationStrategy`] and does not
//! care which one is active. Strategy operations are synchronous; the engine
//! runs them inside queued tasks, which is where the awaiting happens.

pub mod referral;
pub mod scenario;

pub use referral::ReferralStrategy;
pub use scenario::ScenarioStrategy;

use crate::error::Result;
use crate::fault::HookFault;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options recognized by `next`, `prev`, `set_current_stage` and
/// `navigate_to_stage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavOptions {
    /// Permit direct jumps beyond the max reached stage (scenario strategy).
    #[serde(default)]
    pub allow_forward: bool,
    /// Skip enable/disable guards, the submit hook, and the navigable check.
    #[serde(default)]
    pub force: bool,
}

impl NavOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn allow_forward() -> Self {
        Self {
            allow_forward: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Scenario,
    Referral,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Scenario => "ScenarioStrategy",
            StrategyKind::Referral => "ReferralStrategy",
        }
    }

    pub fn create(self) -> Box<dyn NavigationStrategy> {
        match self {
            StrategyKind::Scenario => Box::new(ScenarioStrategy::new()),
            StrategyKind::Referral => Box::new(ReferralStrategy::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressMode {
    Current,
    #[default]
    MaxReached,
}

/// Argument to `start`: the scenario strategy takes an optional scenario,
/// the referral strategy an optional entry stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StartData {
    #[default]
    Default,
    Scenario(Vec<String>),
    Stage(String),
}

impl From<&str> for StartData {
    fn from(id: &str) -> Self {
        StartData::Stage(id.to_string())
    }
}

impl From<Vec<String>> for StartData {
    fn from(scenario: Vec<String>) -> Self {
        StartData::Scenario(scenario)
    }
}

/// Why a navigation attempt did not move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Already at the first/last stage, or at a terminal referral stage.
    AtBoundary,
    /// The stage's prev/next guard is off.
    GuardDisabled,
    /// Referral history is empty.
    NoHistory,
    /// A pre-navigation hook returned false.
    Vetoed,
    /// The submit hook resolved to false (or next was disabled).
    SubmitDeclined,
    /// The submit hook resolved to an error.
    SubmitRejected(String),
    /// The strategy refused the step with an error.
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum NavOutcome {
    Moved(Arc<Stage>),
    Denied(Denial),
    Faulted(HookFault),
}

impl NavOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, NavOutcome::Moved(_))
    }

    pub fn stage(&self) -> Option<&Arc<Stage>> {
        match self {
            NavOutcome::Moved(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn stage_id(&self) -> Option<&str> {
        self.stage().map(|stage| stage.id())
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            NavOutcome::Denied(denial) => Some(denial),
            _ => None,
        }
    }

    /// True when navigation stopped because the last stage was reached.
    pub fn is_at_end(&self) -> bool {
        matches!(self, NavOutcome::Denied(Denial::AtBoundary))
    }

    /// Outcome that stops a move at a stage guard, if any.
    pub(crate) fn from_guard(check: std::result::Result<bool, HookFault>) -> Option<Self> {
        match check {
            Ok(true) => None,
            Ok(false) => Some(NavOutcome::Denied(Denial::GuardDisabled)),
            Err(fault) => Some(NavOutcome::Faulted(fault)),
        }
    }
}

/// One-shot initialization signal raised by a strategy and collected by the
/// engine after each strategy call.
#[derive(Debug, Default)]
pub(crate) struct InitSignal {
    raised: bool,
    pending: bool,
}

impl InitSignal {
    pub fn raise(&mut self) {
        if !self.raised {
            self.raised = true;
            self.pending = true;
        }
    }

    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}

pub trait NavigationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn set_stages(&mut self, stages: Vec<Arc<Stage>>) -> Result<()>;
    fn stages(&self) -> &[Arc<Stage>];

    fn stage(&self, id: &str) -> Option<Arc<Stage>> {
        self.stages().iter().find(|stage| stage.id() == id).cloned()
    }

    fn has_stage(&self, id: &str) -> bool {
        self.stages().iter().any(|stage| stage.id() == id)
    }

    fn has_stage_in_current_scenario(&self, id: &str) -> Result<bool>;

    fn first_stage(&self) -> Option<Arc<Stage>>;
    fn last_stage(&self) -> Result<Option<Arc<Stage>>>;
    fn is_first_stage(&self, id: &str) -> Result<bool>;
    fn is_last_stage(&self, id: &str) -> Result<bool>;

    fn current_stage(&self) -> Option<Arc<Stage>>;
    fn current_stage_index(&self) -> usize;
    fn max_reached_stage(&self) -> Result<Option<Arc<Stage>>>;
    fn prev_stage(&self) -> Option<Arc<Stage>>;
    fn next_stage(&self) -> Result<Option<Arc<Stage>>>;

    fn has_prev_stage(&self) -> bool {
        self.prev_stage().is_some()
    }

    fn has_next_stage(&self) -> bool {
        matches!(self.next_stage(), Ok(Some(_)))
    }

    fn is_in_first_stage(&self) -> bool;
    fn is_in_last_stage(&self) -> bool;

    fn prev_enabled(&self) -> bool {
        !self.is_in_first_stage()
            && self
                .current_stage()
                .is_some_and(|stage| stage.prev_enabled())
    }

    fn next_enabled(&self) -> bool {
        !self.is_in_last_stage()
            && self
                .current_stage()
                .is_some_and(|stage| stage.next_enabled())
    }

    fn set_current_stage(&mut self, id: &str, opts: NavOptions) -> Result<bool>;

    fn set_scenario(&mut self, scenario: Option<Vec<String>>) -> Result<bool>;
    fn scenario(&self) -> Result<Vec<String>>;

    fn start(&mut self, data: StartData) -> Result<Option<Arc<Stage>>>;
    fn prev(&mut self, opts: NavOptions) -> Result<NavOutcome>;
    fn next(&mut self, opts: NavOptions) -> Result<NavOutcome>;

    fn progress(&self, mode: ProgressMode) -> Result<Vec<Arc<Stage>>>;
    fn reset_max_reached_stage(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// True exactly once: on the first call after the strategy initialized.
    fn take_init_signal(&mut self) -> bool;
}
