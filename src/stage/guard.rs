//! Guard flags and successor resolution attached to stages.

use crate::stage::Stage;
use std::fmt;
use std::sync::Arc;

pub type StagePredicate = Arc<dyn Fn(&Stage) -> bool + Send + Sync>;
pub type NextStageResolver = Arc<dyn Fn(&Stage) -> Option<String> + Send + Sync>;

/// A stage flag that is either fixed or computed from the stage on demand.
///
/// Predicates are evaluated while the engine's navigation state is locked
/// and must not call back into the engine.
#[derive(Clone)]
pub enum Guard {
    Fixed(bool),
    Predicate(StagePredicate),
}

impl Guard {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Stage) -> bool + Send + Sync + 'static,
    {
        Guard::Predicate(Arc::new(f))
    }

    pub fn evaluate(&self, stage: &Stage) -> bool {
        match self {
            Guard::Fixed(value) => *value,
            Guard::Predicate(f) => f(stage),
        }
    }
}

impl From<bool> for Guard {
    fn from(value: bool) -> Self {
        Guard::Fixed(value)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Fixed(value) => write!(f, "Fixed({})", value),
            Guard::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Successor of a stage: a fixed stage id, or a resolver that picks one
/// (or none, for a terminal stage) when navigation happens.
#[derive(Clone)]
pub enum NextStage {
    Fixed(String),
    Resolver(NextStageResolver),
}

impl NextStage {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&Stage) -> Option<String> + Send + Sync + 'static,
    {
        NextStage::Resolver(Arc::new(f))
    }

    pub fn resolve(&self, stage: &Stage) -> Option<String> {
        match self {
            NextStage::Fixed(id) => Some(id.clone()),
            NextStage::Resolver(f) => f(stage),
        }
    }
}

impl From<&str> for NextStage {
    fn from(id: &str) -> Self {
        NextStage::Fixed(id.to_string())
    }
}

impl From<String> for NextStage {
    fn from(id: String) -> Self {
        NextStage::Fixed(id)
    }
}

impl fmt::Debug for NextStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextStage::Fixed(id) => write!(f, "Fixed({:?})", id),
            NextStage::Resolver(_) => write!(f, "Resolver(..)"),
        }
    }
}
