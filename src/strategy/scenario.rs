//! Scenario strategy: a strictly ordered sequence of stages.
//!
//! The active scenario is an ordered, duplicate-free subset of the catalog.
//! Besides the current index the strategy tracks the max reached index, the
//! high-water mark that limits direct forward jumps.

use super::{
    Denial, InitSignal, NavOptions, NavOutcome, NavigationStrategy, ProgressMode, StartData,
    StrategyKind,
};
use crate::error::{Result, WizardError};
use crate::stage::Stage;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Default)]
pub struct ScenarioStrategy {
    stages: Vec<Arc<Stage>>,
    scenario: Vec<Arc<Stage>>,
    current: usize,
    max_reached: usize,
    init: InitSignal,
}

impl ScenarioStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_started(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(WizardError::NotStarted)
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.scenario.iter().position(|stage| stage.id() == id)
    }

    /// Check a proposed scenario against the catalog without touching state.
    fn resolve_scenario(&self, ids: &[String]) -> Result<Vec<Arc<Stage>>> {
        if self.stages.is_empty() {
            return Err(WizardError::StagesNotSet);
        }

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                duplicates.push(id.as_str());
            }
        }
        if !duplicates.is_empty() {
            return Err(WizardError::DuplicateScenarioIds(duplicates.join(",")));
        }

        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !self.has_stage(id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(WizardError::MissingScenarioStages(missing.join(",")));
        }

        if ids.is_empty() {
            return Err(WizardError::Validation(
                "Scenario must contain at least one stage".to_string(),
            ));
        }

        Ok(ids.iter().filter_map(|id| self.stage(id)).collect())
    }

    fn install_scenario(&mut self, scenario: Vec<Arc<Stage>>) {
        let current_id = self.current_stage().map(|stage| stage.id().to_string());
        self.scenario = scenario;
        self.current = current_id
            .and_then(|id| self.position(&id))
            .unwrap_or(0);
        self.max_reached = self.current;
        self.init.raise();

        tracing::debug!(
            "Scenario set to [{}], current index {}",
            self.scenario_ids().join(", "),
            self.current
        );
    }

    fn scenario_ids(&self) -> Vec<String> {
        self.scenario
            .iter()
            .map(|stage| stage.id().to_string())
            .collect()
    }

    fn current_outcome(&self) -> NavOutcome {
        match self.current_stage() {
            Some(stage) => NavOutcome::Moved(stage),
            None => NavOutcome::Denied(Denial::AtBoundary),
        }
    }
}

impl NavigationStrategy for ScenarioStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scenario
    }

    fn set_stages(&mut self, stages: Vec<Arc<Stage>>) -> Result<()> {
        let current_id = self.current_stage().map(|stage| stage.id().to_string());
        let max_id = self
            .scenario
            .get(self.max_reached)
            .map(|stage| stage.id().to_string());

        self.stages = stages;
        if !self.is_initialized() {
            return Ok(());
        }

        self.scenario = self.stages.clone();
        self.current = current_id
            .and_then(|id| self.position(&id))
            .unwrap_or(0);
        self.max_reached = max_id
            .and_then(|id| self.position(&id))
            .unwrap_or(self.current)
            .max(self.current);

        tracing::debug!(
            "Stages replaced, scenario reset to default, current index {}",
            self.current
        );
        Ok(())
    }

    fn stages(&self) -> &[Arc<Stage>] {
        &self.stages
    }

    fn has_stage_in_current_scenario(&self, id: &str) -> Result<bool> {
        Ok(self.position(id).is_some())
    }

    fn first_stage(&self) -> Option<Arc<Stage>> {
        self.scenario.first().cloned()
    }

    fn last_stage(&self) -> Result<Option<Arc<Stage>>> {
        Ok(self.scenario.last().cloned())
    }

    fn is_first_stage(&self, id: &str) -> Result<bool> {
        self.position(id)
            .map(|index| index == 0)
            .ok_or_else(|| WizardError::StageNotInScenario(id.to_string()))
    }

    fn is_last_stage(&self, id: &str) -> Result<bool> {
        self.position(id)
            .map(|index| index + 1 == self.scenario.len())
            .ok_or_else(|| WizardError::StageNotInScenario(id.to_string()))
    }

    fn current_stage(&self) -> Option<Arc<Stage>> {
        self.scenario.get(self.current).cloned()
    }

    fn current_stage_index(&self) -> usize {
        self.current
    }

    fn max_reached_stage(&self) -> Result<Option<Arc<Stage>>> {
        Ok(self.scenario.get(self.max_reached).cloned())
    }

    fn prev_stage(&self) -> Option<Arc<Stage>> {
        self.current
            .checked_sub(1)
            .and_then(|index| self.scenario.get(index))
            .cloned()
    }

    fn next_stage(&self) -> Result<Option<Arc<Stage>>> {
        Ok(self.scenario.get(self.current + 1).cloned())
    }

    fn is_in_first_stage(&self) -> bool {
        self.current == 0
    }

    fn is_in_last_stage(&self) -> bool {
        self.current + 1 >= self.scenario.len()
    }

    fn set_current_stage(&mut self, id: &str, opts: NavOptions) -> Result<bool> {
        self.require_started()?;
        let index = self
            .position(id)
            .ok_or_else(|| WizardError::StageNotInScenario(id.to_string()))?;
        if index > self.max_reached && !opts.allow_forward {
            return Err(WizardError::ForwardNavigationProhibited(id.to_string()));
        }

        let moved = index != self.current;
        self.current = index;
        self.max_reached = self.max_reached.max(index);
        Ok(moved)
    }

    fn set_scenario(&mut self, scenario: Option<Vec<String>>) -> Result<bool> {
        let resolved = match scenario {
            Some(ids) => self.resolve_scenario(&ids)?,
            None if self.stages.is_empty() => return Err(WizardError::StagesNotSet),
            None => self.stages.clone(),
        };
        self.install_scenario(resolved);
        Ok(true)
    }

    fn scenario(&self) -> Result<Vec<String>> {
        Ok(self.scenario_ids())
    }

    fn start(&mut self, data: StartData) -> Result<Option<Arc<Stage>>> {
        match data {
            StartData::Default if self.is_initialized() => {}
            StartData::Default => {
                self.set_scenario(None)?;
            }
            StartData::Scenario(ids) => {
                self.set_scenario(Some(ids))?;
            }
            StartData::Stage(id) => {
                return Err(WizardError::InvalidStartData {
                    strategy: self.kind().as_str(),
                    reason: format!("expected a scenario, got stage id '{}'", id),
                });
            }
        }
        Ok(self.current_stage())
    }

    fn prev(&mut self, opts: NavOptions) -> Result<NavOutcome> {
        self.require_started()?;
        if self.is_in_first_stage() {
            return Ok(NavOutcome::Denied(Denial::AtBoundary));
        }
        if !opts.force {
            let stopped = self
                .current_stage()
                .and_then(|stage| NavOutcome::from_guard(stage.try_prev_enabled()));
            if let Some(outcome) = stopped {
                return Ok(outcome);
            }
        }
        self.current -= 1;
        Ok(self.current_outcome())
    }

    fn next(&mut self, opts: NavOptions) -> Result<NavOutcome> {
        self.require_started()?;
        if self.is_in_last_stage() {
            return Ok(NavOutcome::Denied(Denial::AtBoundary));
        }
        if !opts.force {
            let stopped = self
                .current_stage()
                .and_then(|stage| NavOutcome::from_guard(stage.try_next_enabled()));
            if let Some(outcome) = stopped {
                return Ok(outcome);
            }
        }
        self.current += 1;
        self.max_reached = self.max_reached.max(self.current);
        Ok(self.current_outcome())
    }

    fn progress(&self, mode: ProgressMode) -> Result<Vec<Arc<Stage>>> {
        if self.scenario.is_empty() {
            return Ok(Vec::new());
        }
        let through = match mode {
            ProgressMode::Current => self.current,
            ProgressMode::MaxReached => self.max_reached,
        };
        Ok(self.scenario[..=through].to_vec())
    }

    fn reset_max_reached_stage(&mut self) -> Result<()> {
        self.max_reached = self.current;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.init.is_raised()
    }

    fn take_init_signal(&mut self) -> bool {
        self.init.take()
    }
}
