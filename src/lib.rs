//! Serialized asynchronous navigation for multi-step wizards.
//!
//! A [`WizardEngine`] owns a stage catalog and a navigation strategy
//! ([`ScenarioStrategy`] or [`ReferralStrategy`]). All mutating operations
//! run one at a time on the engine's task queue; transitions are published
//! as [`WizardEvent`]s.

pub mod config;
pub mod error;
pub mod events;
pub mod fault;
pub mod queue;
pub mod stage;
pub mod strategy;
pub mod wizard;

pub use config::WizardConfig;
pub use error::{Result, WizardError};
pub use events::{EventName, ListenerId, WizardEvent};
pub use fault::{HookFault, HookKind};
pub use queue::{TaskFilter, TaskHandle, TaskQueue};
pub use stage::{Guard, NextStage, Stage, StageDescriptor, StageEntry, Submission};
pub use strategy::{
    Denial, NavOptions, NavOutcome, NavigationStrategy, ProgressMode, ReferralStrategy,
    ScenarioStrategy, StartData, StrategyKind,
};
pub use wizard::WizardEngine;

use tracing_subscriber::EnvFilter;

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG` (default
/// `info`). Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
