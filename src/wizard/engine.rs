//! `WizardEngine`: every mutating operation runs as a named task on the
//! engine's [`TaskQueue`], so navigation never interleaves. Operations
//! return a [`TaskHandle`] right away; awaiting it yields the result.

use super::tasks;
use crate::config::{validate_config, WizardConfig};
use crate::error::{Result, WizardError};
use crate::events::{EventBroadcaster, EventName, ListenerId, WizardEvent};
use crate::fault::{Diagnostics, HookFault};
use crate::queue::{TaskFilter, TaskHandle, TaskQueue};
use crate::stage::{Stage, StageDescriptor, StageOwner, Submission};
use crate::strategy::{
    Denial, NavOptions, NavOutcome, NavigationStrategy, ProgressMode, StartData, StrategyKind,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

struct EngineState {
    strategy: Box<dyn NavigationStrategy>,
    initialized: bool,
}

struct EngineInner {
    /// Navigation state. Never held across an await or while hooks and
    /// listeners run.
    state: Mutex<EngineState>,
    queue: TaskQueue,
    events: EventBroadcaster,
    diagnostics: Diagnostics,
    dirty: AtomicBool,
    /// Generation of the installed stage set; callbacks from older stages are ignored.
    generation: AtomicU64,
}

/// Cheap to clone; clones share the same wizard.
#[derive(Clone)]
pub struct WizardEngine {
    inner: Arc<EngineInner>,
}

impl WizardEngine {
    pub fn new(kind: StrategyKind) -> Self {
        Self::from_parts(kind.create(), EventBroadcaster::new())
    }

    pub fn with_event_capacity(kind: StrategyKind, capacity: usize) -> Self {
        Self::from_parts(kind.create(), EventBroadcaster::with_capacity(capacity))
    }

    pub fn with_strategy(strategy: Box<dyn NavigationStrategy>) -> Self {
        Self::from_parts(strategy, EventBroadcaster::new())
    }

    fn from_parts(strategy: Box<dyn NavigationStrategy>, events: EventBroadcaster) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState {
                    strategy,
                    initialized: false,
                }),
                queue: TaskQueue::new(),
                events,
                diagnostics: Diagnostics::new(),
                dirty: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Build, populate and start an engine from a wizard definition.
    pub async fn from_config(config: &WizardConfig) -> Result<Self> {
        validate_config(config)?;

        let engine = Self::with_event_capacity(config.strategy, config.settings.event_capacity);
        engine.set_stages(config.stages.iter().cloned()).await?;

        let data = match config.strategy {
            StrategyKind::Scenario => config
                .scenario
                .clone()
                .map(StartData::Scenario)
                .unwrap_or_default(),
            StrategyKind::Referral => config
                .start_stage
                .clone()
                .map(StartData::Stage)
                .unwrap_or_default(),
        };
        let current = engine.start(data).await?;

        tracing::info!(
            "Wizard loaded: strategy={} stages={} current={:?}",
            config.strategy.as_str(),
            config.stages.len(),
            current.as_ref().map(|stage| stage.id())
        );
        Ok(engine)
    }

    // Queued operations

    /// Replace the stage catalog. Cancels pending `next`/`prev` tasks.
    pub fn set_stages<I, D>(&self, stages: I) -> TaskHandle<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<StageDescriptor>,
    {
        let descriptors: Vec<StageDescriptor> = stages.into_iter().map(Into::into).collect();
        self.cancel_navigation(tasks::SET_STAGES);
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::SET_STAGES, move || async move { inner.set_stages(descriptors) })
    }

    pub fn start(&self, data: impl Into<StartData>) -> TaskHandle<Option<Arc<Stage>>> {
        let data = data.into();
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::START, move || async move { inner.start(data) })
    }

    pub fn next(&self, opts: NavOptions) -> TaskHandle<NavOutcome> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::NEXT, move || async move { inner.next(opts).await })
    }

    pub fn prev(&self, opts: NavOptions) -> TaskHandle<NavOutcome> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::PREV, move || async move { inner.prev(opts) })
    }

    /// Jump to `id`. Resolves to whether the current stage changed.
    pub fn set_current_stage(&self, id: impl Into<String>, opts: NavOptions) -> TaskHandle<bool> {
        let id = id.into();
        self.cancel_navigation(tasks::SET_CURRENT_STAGE);
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::SET_CURRENT_STAGE, move || async move {
                inner.reposition(&id, opts, false)
            })
    }

    /// Like [`set_current_stage`](Self::set_current_stage), but the target
    /// must be navigable unless `opts.force` is set.
    pub fn navigate_to_stage(&self, id: impl Into<String>, opts: NavOptions) -> TaskHandle<bool> {
        let id = id.into();
        self.cancel_navigation(tasks::NAVIGATE_TO_STAGE);
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::NAVIGATE_TO_STAGE, move || async move {
                inner.reposition(&id, opts, true)
            })
    }

    /// Install a scenario, or restore the default one with `None`.
    pub fn set_scenario(&self, scenario: Option<Vec<String>>) -> TaskHandle<bool> {
        self.cancel_navigation(tasks::SET_SCENARIO);
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue(tasks::SET_SCENARIO, move || async move { inner.set_scenario(scenario) })
    }

    fn cancel_navigation(&self, by: &str) {
        self.inner.queue.cancel_pending(
            TaskFilter::Names(tasks::NAVIGATION),
            format!("Canceled by '{}'", by),
        );
    }

    // Read accessors

    fn read<R>(&self, f: impl FnOnce(&dyn NavigationStrategy) -> R) -> R {
        let state = self.inner.state.lock();
        f(state.strategy.as_ref())
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.read(|strategy| strategy.kind())
    }

    pub fn stages(&self) -> Vec<Arc<Stage>> {
        self.read(|strategy| strategy.stages().to_vec())
    }

    pub fn stage_ids(&self) -> Vec<String> {
        self.read(|strategy| {
            strategy
                .stages()
                .iter()
                .map(|stage| stage.id().to_string())
                .collect()
        })
    }

    pub fn stage(&self, id: &str) -> Option<Arc<Stage>> {
        self.read(|strategy| strategy.stage(id))
    }

    pub fn has_stage(&self, id: &str) -> bool {
        self.read(|strategy| strategy.has_stage(id))
    }

    pub fn current_stage(&self) -> Option<Arc<Stage>> {
        self.read(|strategy| strategy.current_stage())
    }

    pub fn current_stage_index(&self) -> usize {
        self.read(|strategy| strategy.current_stage_index())
    }

    pub fn is_current_stage(&self, id: &str) -> bool {
        self.current_stage().is_some_and(|stage| stage.id() == id)
    }

    pub fn first_stage(&self) -> Option<Arc<Stage>> {
        self.read(|strategy| strategy.first_stage())
    }

    pub fn last_stage(&self) -> Result<Option<Arc<Stage>>> {
        self.read(|strategy| strategy.last_stage())
    }

    pub fn is_first_stage(&self, id: &str) -> Result<bool> {
        self.read(|strategy| strategy.is_first_stage(id))
    }

    pub fn is_last_stage(&self, id: &str) -> Result<bool> {
        self.read(|strategy| strategy.is_last_stage(id))
    }

    pub fn max_reached_stage(&self) -> Result<Option<Arc<Stage>>> {
        self.read(|strategy| strategy.max_reached_stage())
    }

    pub fn prev_stage(&self) -> Option<Arc<Stage>> {
        self.read(|strategy| strategy.prev_stage())
    }

    pub fn next_stage(&self) -> Result<Option<Arc<Stage>>> {
        self.read(|strategy| strategy.next_stage())
    }

    pub fn has_prev_stage(&self) -> bool {
        self.read(|strategy| strategy.has_prev_stage())
    }

    pub fn has_next_stage(&self) -> bool {
        self.read(|strategy| strategy.has_next_stage())
    }

    pub fn is_in_first_stage(&self) -> bool {
        self.read(|strategy| strategy.is_in_first_stage())
    }

    pub fn is_in_last_stage(&self) -> bool {
        self.read(|strategy| strategy.is_in_last_stage())
    }

    pub fn prev_enabled(&self) -> bool {
        self.read(|strategy| strategy.prev_enabled())
    }

    pub fn next_enabled(&self) -> bool {
        self.read(|strategy| strategy.next_enabled())
    }

    pub fn scenario(&self) -> Result<Vec<String>> {
        self.read(|strategy| strategy.scenario())
    }

    pub fn has_stage_in_current_scenario(&self, id: &str) -> Result<bool> {
        self.read(|strategy| strategy.has_stage_in_current_scenario(id))
    }

    pub fn progress(&self, mode: ProgressMode) -> Result<Vec<Arc<Stage>>> {
        self.read(|strategy| strategy.progress(mode))
    }

    /// A stage is navigable if it is flagged so or if it is the first stage.
    pub fn is_navigable_stage(&self, id: &str) -> Result<bool> {
        self.read(|strategy| is_navigable(strategy, id))
    }

    pub fn reset_max_reached_stage(&self) -> Result<()> {
        self.inner.state.lock().strategy.reset_max_reached_stage()
    }

    // Status

    pub fn is_busy(&self) -> bool {
        self.inner.queue.is_busy()
    }

    pub fn has_pending(&self, names: &[&str]) -> bool {
        self.inner.queue.has_pending(names)
    }

    /// True once any stage of the current set reported dirty content.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().initialized
    }

    // Events

    pub fn on<F>(&self, event: &str, callback: F) -> Result<ListenerId>
    where
        F: Fn(&WizardEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(event, callback)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool> {
        self.inner.events.off(event, id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.inner.events.subscribe()
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.inner.events.listener_count(name)
    }

    /// Hook faults caught while navigating.
    pub fn faults(&self) -> broadcast::Receiver<HookFault> {
        self.inner.diagnostics.subscribe()
    }

    /// Completion is decided by the host, never by the engine.
    pub fn notify_wizard_complete(&self) {
        self.inner.events.notify(WizardEvent::WizardComplete);
    }
}

fn is_navigable(strategy: &dyn NavigationStrategy, id: &str) -> Result<bool> {
    let stage = strategy
        .stage(id)
        .ok_or_else(|| WizardError::UnknownStage(id.to_string()))?;
    let is_first = strategy
        .first_stage()
        .is_some_and(|first| first.id() == id);
    Ok(stage.is_navigable() || is_first)
}

fn go_to(stage: &Stage) -> WizardEvent {
    WizardEvent::GoTo {
        stage_id: stage.id().to_string(),
    }
}

impl EngineInner {
    fn set_stages(self: &Arc<Self>, descriptors: Vec<StageDescriptor>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for descriptor in &descriptors {
            if descriptor.id.trim().is_empty() {
                return Err(WizardError::InvalidStageId(descriptor.id.clone()));
            }
            let id = descriptor.id.as_str();
            if !seen.insert(id) && !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }
        if !duplicates.is_empty() {
            return Err(WizardError::DuplicateStageIds(duplicates.join(",")));
        }

        let events = {
            let mut state = self.state.lock();
            if state.initialized {
                if let Some(current) = state.strategy.current_stage() {
                    if !seen.contains(current.id()) {
                        return Err(WizardError::CurrentStageMissing(current.id().to_string()));
                    }
                }
            }

            let generation = self.generation.load(Ordering::SeqCst) + 1;
            let stages = descriptors
                .into_iter()
                .map(|descriptor| self.bind_stage(descriptor, generation))
                .collect::<Result<Vec<_>>>()?;
            let count = stages.len();
            state.strategy.set_stages(stages)?;
            self.generation.store(generation, Ordering::SeqCst);
            tracing::debug!("Installed {} stage(s), generation {}", count, generation);

            init_events(&mut state)
        };
        self.emit(events);
        Ok(())
    }

    fn bind_stage(self: &Arc<Self>, descriptor: StageDescriptor, generation: u64) -> Result<Arc<Stage>> {
        let stage = Arc::new(Stage::from_descriptor(descriptor)?);
        let dirty_owner = Arc::downgrade(self);
        let change_owner = Arc::downgrade(self);
        stage.bind(StageOwner {
            generation,
            on_dirty: Arc::new(move |stage: &Stage| {
                if let Some(inner) = dirty_owner.upgrade() {
                    inner.stage_dirty(stage);
                }
            }),
            on_state_change: Arc::new(move |stage: &Stage, complete: bool| {
                if let Some(inner) = change_owner.upgrade() {
                    inner.stage_state_changed(stage, complete);
                }
            }),
        })?;
        Ok(stage)
    }

    fn is_stale(&self, stage: &Stage) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        if stage.generation() == Some(current) {
            return false;
        }
        tracing::warn!(
            "Ignoring callback from replaced stage {} (generation {:?}, current {})",
            stage.id(),
            stage.generation(),
            current
        );
        true
    }

    fn stage_dirty(&self, stage: &Stage) {
        if self.is_stale(stage) {
            return;
        }
        self.dirty.store(true, Ordering::SeqCst);
        self.events.notify(WizardEvent::Dirty {
            stage_id: stage.id().to_string(),
        });
    }

    fn stage_state_changed(&self, stage: &Stage, complete: bool) {
        if self.is_stale(stage) {
            return;
        }
        self.events.notify(WizardEvent::StageStateChange {
            stage_id: stage.id().to_string(),
            complete,
        });
    }

    fn start(&self, data: StartData) -> Result<Option<Arc<Stage>>> {
        let (current, events) = {
            let mut state = self.state.lock();
            let before = state
                .strategy
                .current_stage()
                .map(|stage| stage.id().to_string());
            let current = state.strategy.start(data)?;

            let mut events = init_events(&mut state);
            if events.is_empty() {
                if let Some(stage) = &current {
                    if before.as_deref() != Some(stage.id()) {
                        events.push(go_to(stage));
                    }
                }
            }
            (current, events)
        };
        self.emit(events);
        Ok(current)
    }

    fn current(&self) -> Result<Arc<Stage>> {
        self.state
            .lock()
            .strategy
            .current_stage()
            .ok_or(WizardError::NotStarted)
    }

    async fn next(&self, opts: NavOptions) -> Result<NavOutcome> {
        let current = self.current()?;

        match current.call_pre_next_hook() {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Next from stage {} vetoed by preNextHook", current.id());
                return Ok(NavOutcome::Denied(Denial::Vetoed));
            }
            Err(fault) => return Ok(self.faulted(fault)),
        }

        if !opts.force {
            match current.submit().await {
                Submission::Accepted => {}
                Submission::Declined => {
                    tracing::warn!("Submit of stage {} declined", current.id());
                    return Ok(NavOutcome::Denied(Denial::SubmitDeclined));
                }
                Submission::Rejected(reason) => {
                    tracing::warn!("Submit of stage {} rejected: {}", current.id(), reason);
                    return Ok(NavOutcome::Denied(Denial::SubmitRejected(reason)));
                }
                Submission::Faulted(fault) => return Ok(self.faulted(fault)),
            }
        }

        let result = self.state.lock().strategy.next(opts);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Next from stage {} failed: {}", current.id(), e);
                NavOutcome::Denied(Denial::Failed(e.to_string()))
            }
        };
        self.announce(&outcome);
        Ok(outcome)
    }

    fn prev(&self, opts: NavOptions) -> Result<NavOutcome> {
        let current = self.current()?;

        match current.call_pre_prev_hook() {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Prev from stage {} vetoed by prePrevHook", current.id());
                return Ok(NavOutcome::Denied(Denial::Vetoed));
            }
            Err(fault) => return Ok(self.faulted(fault)),
        }

        let outcome = self.state.lock().strategy.prev(opts)?;
        self.announce(&outcome);
        Ok(outcome)
    }

    fn reposition(&self, id: &str, opts: NavOptions, check_navigable: bool) -> Result<bool> {
        let (moved, current) = {
            let mut state = self.state.lock();
            if check_navigable {
                if !state.strategy.has_stage(id) {
                    return Err(WizardError::UnknownStage(id.to_string()));
                }
                if !opts.force && !is_navigable(state.strategy.as_ref(), id)? {
                    return Err(WizardError::NotNavigable(id.to_string()));
                }
            }
            let moved = state.strategy.set_current_stage(id, opts)?;
            (moved, state.strategy.current_stage())
        };

        if let (true, Some(stage)) = (moved, current) {
            self.events.notify(go_to(&stage));
        }
        Ok(moved)
    }

    fn set_scenario(&self, scenario: Option<Vec<String>>) -> Result<bool> {
        let (changed, events) = {
            let mut state = self.state.lock();
            let before = state
                .strategy
                .current_stage()
                .map(|stage| stage.id().to_string());
            let changed = state.strategy.set_scenario(scenario)?;

            let mut events = init_events(&mut state);
            if events.is_empty() {
                if let Some(stage) = state.strategy.current_stage() {
                    if before.as_deref() != Some(stage.id()) {
                        events.push(go_to(&stage));
                    }
                }
            }
            (changed, events)
        };
        self.emit(events);
        Ok(changed)
    }

    /// Report the result of a strategy step: `goTo` on a move, diagnostics on a guard fault.
    fn announce(&self, outcome: &NavOutcome) {
        match outcome {
            NavOutcome::Moved(stage) => self.events.notify(go_to(stage)),
            NavOutcome::Faulted(fault) => self.diagnostics.report(fault),
            NavOutcome::Denied(_) => {}
        }
    }

    fn faulted(&self, fault: HookFault) -> NavOutcome {
        self.diagnostics.report(&fault);
        NavOutcome::Faulted(fault)
    }

    fn emit(&self, events: Vec<WizardEvent>) {
        for event in events {
            self.events.notify(event);
        }
    }
}

/// Collect the one-time `init` + `goTo` pair after the strategy initialized.
fn init_events(state: &mut EngineState) -> Vec<WizardEvent> {
    let signalled = state.strategy.take_init_signal();
    if !signalled || state.initialized {
        return Vec::new();
    }
    state.initialized = true;
    tracing::info!("Wizard initialized with {}", state.strategy.kind().as_str());

    let mut events = vec![WizardEvent::Init];
    if let Some(stage) = state.strategy.current_stage() {
        events.push(go_to(&stage));
    }
    events
}
