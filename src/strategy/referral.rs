//! Referral strategy: an ad-hoc chain where each stage names its successor.
//!
//! Moving forward pushes the current stage onto a history stack; moving back
//! pops it. There is no redo list and no notion of a scenario.

use super::{
    Denial, InitSignal, NavOptions, NavOutcome, NavigationStrategy, ProgressMode, StartData,
    StrategyKind,
};
use crate::error::{Result, WizardError};
use crate::stage::Stage;
use std::sync::Arc;

#[derive(Default)]
pub struct ReferralStrategy {
    stages: Vec<Arc<Stage>>,
    current: Option<Arc<Stage>>,
    history: Vec<Arc<Stage>>,
    init: InitSignal,
}

impl ReferralStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Arc<Stage>] {
        &self.history
    }

    fn unsupported<T>(&self, method: &'static str) -> Result<T> {
        Err(WizardError::Unsupported {
            method,
            strategy: self.kind().as_str(),
        })
    }

    fn started(&self) -> Result<Arc<Stage>> {
        self.current.clone().ok_or(WizardError::NotStarted)
    }

    /// Resolve `stage`'s successor against the catalog.
    fn successor(&self, stage: &Stage) -> Result<Option<Arc<Stage>>> {
        self.lookup(stage, stage.next_stage_id())
    }

    fn lookup(&self, stage: &Stage, next: Option<String>) -> Result<Option<Arc<Stage>>> {
        let Some(next) = next else {
            return Ok(None);
        };
        self.stage(&next)
            .map(Some)
            .ok_or_else(|| WizardError::InvalidNextStage {
                stage_id: stage.id().to_string(),
                next,
            })
    }
}

impl NavigationStrategy for ReferralStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Referral
    }

    fn set_stages(&mut self, stages: Vec<Arc<Stage>>) -> Result<()> {
        self.stages = stages;

        if let Some(current) = self.current.take() {
            self.current = self
                .stage(current.id())
                .or_else(|| self.stages.first().cloned());
        }
        let history = std::mem::take(&mut self.history);
        self.history = history
            .iter()
            .filter_map(|stage| self.stage(stage.id()))
            .collect();
        Ok(())
    }

    fn stages(&self) -> &[Arc<Stage>] {
        &self.stages
    }

    fn has_stage_in_current_scenario(&self, _id: &str) -> Result<bool> {
        self.unsupported("hasStageInCurrentScenario")
    }

    fn first_stage(&self) -> Option<Arc<Stage>> {
        self.history.first().cloned().or_else(|| self.current.clone())
    }

    fn last_stage(&self) -> Result<Option<Arc<Stage>>> {
        self.unsupported("getLastStage")
    }

    fn is_first_stage(&self, id: &str) -> Result<bool> {
        Ok(self.first_stage().is_some_and(|stage| stage.id() == id))
    }

    fn is_last_stage(&self, _id: &str) -> Result<bool> {
        self.unsupported("isLastStage")
    }

    fn current_stage(&self) -> Option<Arc<Stage>> {
        self.current.clone()
    }

    fn current_stage_index(&self) -> usize {
        self.history.len()
    }

    fn max_reached_stage(&self) -> Result<Option<Arc<Stage>>> {
        self.unsupported("getMaxReachedStage")
    }

    fn prev_stage(&self) -> Option<Arc<Stage>> {
        self.history.last().cloned()
    }

    fn next_stage(&self) -> Result<Option<Arc<Stage>>> {
        match &self.current {
            Some(current) => self.successor(current),
            None => Ok(None),
        }
    }

    fn is_in_first_stage(&self) -> bool {
        self.history.is_empty()
    }

    fn is_in_last_stage(&self) -> bool {
        self.current
            .as_ref()
            .map_or(true, |stage| stage.next_stage_id().is_none())
    }

    fn set_current_stage(&mut self, id: &str, _opts: NavOptions) -> Result<bool> {
        let current = self.started()?;
        let target = self
            .stage(id)
            .ok_or_else(|| WizardError::UnknownStage(id.to_string()))?;
        if Arc::ptr_eq(&current, &target) {
            return Ok(false);
        }
        self.history.push(current);
        self.current = Some(target);
        Ok(true)
    }

    fn set_scenario(&mut self, _scenario: Option<Vec<String>>) -> Result<bool> {
        self.unsupported("setScenario")
    }

    fn scenario(&self) -> Result<Vec<String>> {
        self.unsupported("getScenario")
    }

    fn start(&mut self, data: StartData) -> Result<Option<Arc<Stage>>> {
        if self.stages.is_empty() {
            return Err(WizardError::StagesNotSet);
        }
        let entry = match data {
            StartData::Default => self.stages.first().cloned(),
            StartData::Stage(id) => Some(
                self.stage(&id)
                    .ok_or(WizardError::UnknownStage(id))?,
            ),
            StartData::Scenario(_) => {
                return Err(WizardError::InvalidStartData {
                    strategy: self.kind().as_str(),
                    reason: "expected a start stage id, got a scenario".to_string(),
                });
            }
        };

        self.history.clear();
        self.current = entry;
        self.init.raise();
        tracing::debug!(
            "Referral chain started at {:?}",
            self.current.as_ref().map(|stage| stage.id())
        );
        Ok(self.current.clone())
    }

    fn prev(&mut self, opts: NavOptions) -> Result<NavOutcome> {
        let current = self.started()?;
        if self.history.is_empty() {
            return Ok(NavOutcome::Denied(Denial::NoHistory));
        }
        if !opts.force {
            if let Some(outcome) = NavOutcome::from_guard(current.try_prev_enabled()) {
                return Ok(outcome);
            }
        }
        let Some(previous) = self.history.pop() else {
            return Ok(NavOutcome::Denied(Denial::NoHistory));
        };
        self.current = Some(Arc::clone(&previous));
        Ok(NavOutcome::Moved(previous))
    }

    fn next(&mut self, opts: NavOptions) -> Result<NavOutcome> {
        let current = self.started()?;
        if !opts.force {
            if let Some(outcome) = NavOutcome::from_guard(current.try_next_enabled()) {
                return Ok(outcome);
            }
        }
        let next = match current.try_next_stage_id() {
            Ok(next) => next,
            Err(fault) => return Ok(NavOutcome::Faulted(fault)),
        };
        let Some(successor) = self.lookup(&current, next)? else {
            return Ok(NavOutcome::Denied(Denial::AtBoundary));
        };
        self.history.push(current);
        self.current = Some(Arc::clone(&successor));
        Ok(NavOutcome::Moved(successor))
    }

    fn progress(&self, _mode: ProgressMode) -> Result<Vec<Arc<Stage>>> {
        Ok(self
            .history
            .iter()
            .chain(self.current.iter())
            .cloned()
            .collect())
    }

    fn reset_max_reached_stage(&mut self) -> Result<()> {
        self.unsupported("resetMaxReachedStage")
    }

    fn is_initialized(&self) -> bool {
        self.init.is_raised()
    }

    fn take_init_signal(&mut self) -> bool {
        self.init.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{ids, stage_ids, stages};

    /// A -> B -> C, D standalone.
    fn chain() -> Vec<Arc<Stage>> {
        let stages = stages(&["A", "B", "C", "D"]);
        stages[0].set_next_stage("B");
        stages[1].set_next_stage("C");
        stages
    }

    fn started() -> ReferralStrategy {
        let mut strategy = ReferralStrategy::new();
        strategy.set_stages(chain()).unwrap();
        strategy.start(StartData::Default).unwrap();
        strategy
    }

    #[test]
    fn test_start_requires_known_stage() {
        let mut strategy = ReferralStrategy::new();
        assert!(matches!(
            strategy.start(StartData::from("A")),
            Err(WizardError::StagesNotSet)
        ));

        strategy.set_stages(chain()).unwrap();
        assert!(matches!(
            strategy.start(StartData::from("Z")),
            Err(WizardError::UnknownStage(id)) if id == "Z"
        ));
        assert!(matches!(
            strategy.start(StartData::Scenario(ids(&["A"]))),
            Err(WizardError::InvalidStartData { strategy: "ReferralStrategy", .. })
        ));
        assert!(!strategy.is_initialized());

        let stage = strategy.start(StartData::from("B")).unwrap().unwrap();
        assert_eq!(stage.id(), "B");
        assert!(strategy.take_init_signal());
        assert!(!strategy.take_init_signal());
    }

    #[test]
    fn test_stack_discipline() {
        let mut strategy = started();
        let opts = NavOptions::default();

        assert_eq!(strategy.prev(opts).unwrap().denial(), Some(&Denial::NoHistory));
        assert_eq!(strategy.next(opts).unwrap().stage_id(), Some("B"));
        assert_eq!(strategy.next(opts).unwrap().stage_id(), Some("C"));
        assert!(strategy.is_in_last_stage());
        assert_eq!(strategy.next(opts).unwrap().denial(), Some(&Denial::AtBoundary));

        assert_eq!(stage_ids(strategy.history()), ids(&["A", "B"]));
        assert_eq!(
            stage_ids(&strategy.progress(ProgressMode::Current).unwrap()),
            ids(&["A", "B", "C"])
        );

        assert_eq!(strategy.prev(opts).unwrap().stage_id(), Some("B"));
        assert_eq!(strategy.prev(opts).unwrap().stage_id(), Some("A"));
        assert_eq!(strategy.prev(opts).unwrap().denial(), Some(&Denial::NoHistory));
    }

    #[test]
    fn test_jump_pushes_history() {
        let mut strategy = started();
        assert!(strategy.set_current_stage("D", NavOptions::default()).unwrap());
        assert_eq!(strategy.current_stage().unwrap().id(), "D");
        assert_eq!(strategy.first_stage().unwrap().id(), "A");
        assert!(strategy.is_first_stage("A").unwrap());
        assert!(!strategy.is_first_stage("D").unwrap());
        assert_eq!(strategy.current_stage_index(), 1);

        assert!(!strategy.set_current_stage("D", NavOptions::default()).unwrap());
        assert!(matches!(
            strategy.set_current_stage("Q", NavOptions::default()),
            Err(WizardError::UnknownStage(_))
        ));

        assert_eq!(
            strategy.prev(NavOptions::default()).unwrap().stage_id(),
            Some("A")
        );
    }

    #[test]
    fn test_guards_and_invalid_successor() {
        let mut strategy = started();
        let a = strategy.current_stage().unwrap();

        a.set_next_enabled(false);
        assert_eq!(
            strategy.next(NavOptions::default()).unwrap().denial(),
            Some(&Denial::GuardDisabled)
        );
        a.set_next_enabled(true);

        a.set_next_stage("nowhere");
        let err = strategy.next(NavOptions::default()).unwrap_err();
        assert!(
            matches!(err, WizardError::InvalidNextStage { stage_id, next } if stage_id == "A" && next == "nowhere")
        );
        assert!(strategy.history().is_empty());
    }

    #[test]
    fn test_branching_successor() {
        let mut strategy = started();
        let a = strategy.current_stage().unwrap();
        a.set_next_stage(crate::stage::NextStage::resolver(|stage| {
            if stage.complete() {
                Some("D".to_string())
            } else {
                Some("B".to_string())
            }
        }));
        a.set_complete(true);
        assert_eq!(
            strategy.next(NavOptions::default()).unwrap().stage_id(),
            Some("D")
        );
        assert!(strategy.is_in_last_stage());
    }

    #[test]
    fn test_scenario_methods_unsupported() {
        let mut strategy = started();
        let err = strategy.scenario().unwrap_err();
        assert!(matches!(
            err,
            WizardError::Unsupported { method: "getScenario", strategy: "ReferralStrategy" }
        ));
        assert!(strategy.set_scenario(None).is_err());
        assert!(strategy.last_stage().is_err());
        assert!(strategy.is_last_stage("C").is_err());
        assert!(strategy.max_reached_stage().is_err());
        assert!(strategy.reset_max_reached_stage().is_err());
        assert!(strategy.has_stage_in_current_scenario("A").is_err());
    }

    #[test]
    fn test_set_stages_remaps_history() {
        let mut strategy = started();
        strategy.next(NavOptions::default()).unwrap();
        let old_b = strategy.current_stage().unwrap();

        let replacement = chain();
        strategy.set_stages(replacement.clone()).unwrap();
        let new_b = strategy.current_stage().unwrap();
        assert_eq!(new_b.id(), "B");
        assert!(!Arc::ptr_eq(&old_b, &new_b));
        assert!(Arc::ptr_eq(&strategy.history()[0], &replacement[0]));
    }
}
