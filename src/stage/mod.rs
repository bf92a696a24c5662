//! A single wizard step: guard flags, completion state and host hooks.
//!
//! Stages are created and bound by the engine from [`StageDescriptor`]s.
//! Hosts look them up afterwards (`WizardEngine::stage`) to attach guards
//! and hooks; every setter takes `&self`.

pub mod descriptor;
pub mod guard;

pub use descriptor::{StageDescriptor, StageEntry};
pub use guard::{Guard, NextStage, NextStageResolver, StagePredicate};

use crate::error::{Result, WizardError};
use crate::fault::{self, HookFault, HookKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Pre-navigation hook. Returning `false` vetoes the navigation.
pub type NavHook = Arc<dyn Fn(&Stage) -> bool + Send + Sync>;
pub type SubmitFuture = BoxFuture<'static, anyhow::Result<bool>>;
pub type SubmitHook = Arc<dyn Fn(&Stage) -> SubmitFuture + Send + Sync>;

/// Outcome of [`Stage::submit`].
#[derive(Debug)]
pub enum Submission {
    Accepted,
    /// `next_enabled` was off, or the hook resolved to `false`.
    Declined,
    /// The hook resolved to an error.
    Rejected(String),
    /// The hook panicked.
    Faulted(HookFault),
}

/// Connection from a stage back to the engine that built it.
pub(crate) struct StageOwner {
    pub generation: u64,
    pub on_dirty: Arc<dyn Fn(&Stage) + Send + Sync>,
    pub on_state_change: Arc<dyn Fn(&Stage, bool) + Send + Sync>,
}

struct StageState {
    label: Option<String>,
    navigable: bool,
    content_data: Option<serde_json::Value>,
    next_stage: Option<NextStage>,
    prev_enabled: Guard,
    next_enabled: Guard,
    is_complete: Guard,
    submitting: Guard,
    pre_prev_hook: Option<NavHook>,
    pre_next_hook: Option<NavHook>,
    submit_hook: Option<SubmitHook>,
}

pub struct Stage {
    id: String,
    state: RwLock<StageState>,
    dirty: AtomicBool,
    complete: AtomicBool,
    owner: OnceLock<StageOwner>,
}

impl Stage {
    pub fn from_descriptor(descriptor: StageDescriptor) -> Result<Self> {
        if descriptor.id.trim().is_empty() {
            return Err(WizardError::InvalidStageId(descriptor.id));
        }
        Ok(Self {
            id: descriptor.id,
            state: RwLock::new(StageState {
                label: descriptor.label,
                navigable: descriptor.navigable,
                content_data: descriptor.content_data,
                next_stage: descriptor.next_stage.map(NextStage::Fixed),
                prev_enabled: Guard::Fixed(true),
                next_enabled: Guard::Fixed(true),
                is_complete: Guard::Fixed(false),
                submitting: Guard::Fixed(false),
                pre_prev_hook: None,
                pre_next_hook: None,
                submit_hook: None,
            }),
            dirty: AtomicBool::new(false),
            complete: AtomicBool::new(descriptor.complete),
            owner: OnceLock::new(),
        })
    }

    /// Bind the stage to its owning engine. A stage can be bound only once.
    pub(crate) fn bind(&self, owner: StageOwner) -> Result<()> {
        self.owner
            .set(owner)
            .map_err(|_| WizardError::StageAlreadyBound(self.id.clone()))
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        self.owner.get().map(|owner| owner.generation)
    }

    pub fn is_bound(&self) -> bool {
        self.owner.get().is_some()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> Option<String> {
        self.state.read().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) -> &Self {
        self.state.write().label = Some(label.into());
        self
    }

    pub fn is_navigable(&self) -> bool {
        self.state.read().navigable
    }

    pub fn set_navigable(&self, navigable: bool) -> &Self {
        self.state.write().navigable = navigable;
        self
    }

    pub fn content_data(&self) -> Option<serde_json::Value> {
        self.state.read().content_data.clone()
    }

    pub fn set_content_data(&self, data: serde_json::Value) -> &Self {
        self.state.write().content_data = Some(data);
        self
    }

    // Guards
    //
    // The plain accessors treat a panicking predicate as a closed guard; the
    // `try_` forms hand the fault to the caller.

    fn check(&self, guard: &Guard) -> std::result::Result<bool, HookFault> {
        fault::call_external(&self.id, HookKind::Guard, || guard.evaluate(self))
    }

    fn check_or_closed(&self, guard: &Guard) -> bool {
        self.check(guard).unwrap_or_else(|fault| {
            tracing::error!("{}; treating guard as closed", fault);
            false
        })
    }

    pub fn prev_enabled(&self) -> bool {
        let guard = self.state.read().prev_enabled.clone();
        self.check_or_closed(&guard)
    }

    pub fn try_prev_enabled(&self) -> std::result::Result<bool, HookFault> {
        let guard = self.state.read().prev_enabled.clone();
        self.check(&guard)
    }

    pub fn set_prev_enabled(&self, guard: impl Into<Guard>) -> &Self {
        self.state.write().prev_enabled = guard.into();
        self
    }

    pub fn next_enabled(&self) -> bool {
        let guard = self.state.read().next_enabled.clone();
        self.check_or_closed(&guard)
    }

    pub fn try_next_enabled(&self) -> std::result::Result<bool, HookFault> {
        let guard = self.state.read().next_enabled.clone();
        self.check(&guard)
    }

    pub fn set_next_enabled(&self, guard: impl Into<Guard>) -> &Self {
        self.state.write().next_enabled = guard.into();
        self
    }

    pub fn is_complete(&self) -> bool {
        let guard = self.state.read().is_complete.clone();
        self.check_or_closed(&guard)
    }

    pub fn set_is_complete(&self, guard: impl Into<Guard>) -> &Self {
        self.state.write().is_complete = guard.into();
        self
    }

    pub fn submitting(&self) -> bool {
        let guard = self.state.read().submitting.clone();
        self.check_or_closed(&guard)
    }

    pub fn set_submitting(&self, guard: impl Into<Guard>) -> &Self {
        self.state.write().submitting = guard.into();
        self
    }

    // Successor

    /// Id of the successor stage, if any. Resolution against the stage
    /// catalog is done by the navigation strategy.
    pub fn next_stage_id(&self) -> Option<String> {
        self.try_next_stage_id().unwrap_or_else(|fault| {
            tracing::error!("{}; treating stage as terminal", fault);
            None
        })
    }

    pub fn try_next_stage_id(&self) -> std::result::Result<Option<String>, HookFault> {
        let next = self.state.read().next_stage.clone();
        match next {
            Some(next) => fault::call_external(&self.id, HookKind::NextStage, || next.resolve(self)),
            None => Ok(None),
        }
    }

    pub fn set_next_stage(&self, next: impl Into<NextStage>) -> &Self {
        self.state.write().next_stage = Some(next.into());
        self
    }

    pub fn clear_next_stage(&self) -> &Self {
        self.state.write().next_stage = None;
        self
    }

    // Hooks

    pub fn set_pre_prev_hook<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Stage) -> bool + Send + Sync + 'static,
    {
        self.state.write().pre_prev_hook = Some(Arc::new(hook));
        self
    }

    pub fn set_pre_next_hook<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Stage) -> bool + Send + Sync + 'static,
    {
        self.state.write().pre_next_hook = Some(Arc::new(hook));
        self
    }

    pub fn on_submit<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn(&Stage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let hook: SubmitHook = Arc::new(move |stage: &Stage| hook(stage).boxed());
        self.state.write().submit_hook = Some(hook);
        self
    }

    pub fn call_pre_prev_hook(&self) -> std::result::Result<bool, HookFault> {
        let hook = self.state.read().pre_prev_hook.clone();
        match hook {
            Some(hook) => fault::call_external(&self.id, HookKind::PrePrev, || hook(self)),
            None => Ok(true),
        }
    }

    pub fn call_pre_next_hook(&self) -> std::result::Result<bool, HookFault> {
        let hook = self.state.read().pre_next_hook.clone();
        match hook {
            Some(hook) => fault::call_external(&self.id, HookKind::PreNext, || hook(self)),
            None => Ok(true),
        }
    }

    /// Run the submit hook ahead of advancing past this stage.
    pub async fn submit(&self) -> Submission {
        match self.try_next_enabled() {
            Ok(true) => {}
            Ok(false) => return Submission::Declined,
            Err(fault) => return Submission::Faulted(fault),
        }
        let hook = self.state.read().submit_hook.clone();
        let Some(hook) = hook else {
            return Submission::Accepted;
        };

        let pending = match fault::call_external(&self.id, HookKind::Submit, || hook(self)) {
            Ok(pending) => pending,
            Err(fault) => return Submission::Faulted(fault),
        };
        match fault::call_external_async(&self.id, HookKind::Submit, pending).await {
            Ok(Ok(true)) => Submission::Accepted,
            Ok(Ok(false)) => Submission::Declined,
            Ok(Err(e)) => Submission::Rejected(e.to_string()),
            Err(fault) => Submission::Faulted(fault),
        }
    }

    // Lifecycle flags

    pub fn dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Only the transition to dirty is reported to the engine.
    pub fn set_dirty(&self, dirty: bool) {
        if self.dirty.swap(dirty, Ordering::SeqCst) == dirty {
            return;
        }
        if dirty {
            if let Some(owner) = self.owner.get() {
                (owner.on_dirty)(self);
            }
        }
    }

    pub fn mark_dirty(&self) {
        self.set_dirty(true);
    }

    pub fn complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn set_complete(&self, complete: bool) {
        if self.complete.swap(complete, Ordering::SeqCst) == complete {
            return;
        }
        if let Some(owner) = self.owner.get() {
            (owner.on_state_change)(self, complete);
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("label", &state.label)
            .field("navigable", &state.navigable)
            .field("next_stage", &state.next_stage)
            .field("dirty", &self.dirty())
            .field("complete", &self.complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_owner(dirty: &Arc<AtomicUsize>, changes: &Arc<AtomicUsize>) -> StageOwner {
        let dirty = Arc::clone(dirty);
        let changes = Arc::clone(changes);
        StageOwner {
            generation: 1,
            on_dirty: Arc::new(move |_: &Stage| {
                dirty.fetch_add(1, Ordering::SeqCst);
            }),
            on_state_change: Arc::new(move |_: &Stage, _: bool| {
                changes.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }

    fn stage(id: &str) -> Stage {
        Stage::from_descriptor(StageDescriptor::new(id)).unwrap()
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = Stage::from_descriptor(StageDescriptor::new("  ")).unwrap_err();
        assert!(matches!(err, WizardError::InvalidStageId(_)));
    }

    #[test]
    fn test_bind_only_once() {
        let (d, c) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let stage = stage("A");
        stage.bind(counting_owner(&d, &c)).unwrap();
        let err = stage.bind(counting_owner(&d, &c)).unwrap_err();
        assert!(matches!(err, WizardError::StageAlreadyBound(id) if id == "A"));
        assert_eq!(stage.generation(), Some(1));
    }

    #[test]
    fn test_guard_fixed_and_predicate() {
        let stage = stage("A");
        assert!(stage.prev_enabled());
        assert!(stage.next_enabled());
        assert!(!stage.is_complete());

        stage.set_next_enabled(false);
        assert!(!stage.next_enabled());

        stage.set_next_enabled(Guard::predicate(|s| s.complete()));
        assert!(!stage.next_enabled());
        stage.set_complete(true);
        assert!(stage.next_enabled());

        stage.set_submitting(Guard::predicate(|s| s.label().is_some()));
        assert!(!stage.submitting());
        stage.set_label("Address");
        assert!(stage.submitting());
    }

    #[test]
    fn test_dirty_and_complete_are_idempotent() {
        let (d, c) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let stage = stage("A");
        stage.bind(counting_owner(&d, &c)).unwrap();

        stage.set_dirty(true);
        stage.set_dirty(true);
        assert_eq!(d.load(Ordering::SeqCst), 1);
        stage.set_dirty(false);
        assert_eq!(d.load(Ordering::SeqCst), 1);
        assert!(!stage.dirty());

        stage.set_complete(true);
        stage.set_complete(true);
        assert_eq!(c.load(Ordering::SeqCst), 1);
        stage.set_complete(false);
        assert_eq!(c.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hooks_default_to_true_and_catch_panics() {
        let stage = stage("A");
        assert_eq!(stage.call_pre_next_hook(), Ok(true));
        assert_eq!(stage.call_pre_prev_hook(), Ok(true));

        stage.set_pre_next_hook(|_| false);
        assert_eq!(stage.call_pre_next_hook(), Ok(false));

        stage.set_pre_prev_hook(|_| panic!("broken"));
        let fault = stage.call_pre_prev_hook().unwrap_err();
        assert_eq!(fault.hook, HookKind::PrePrev);
        assert_eq!(fault.stage_id, "A");
    }

    #[tokio::test]
    async fn test_submit_outcomes() {
        let stage = stage("A");
        assert!(matches!(stage.submit().await, Submission::Accepted));

        stage.on_submit(|_| async { Ok(false) });
        assert!(matches!(stage.submit().await, Submission::Declined));

        stage.on_submit(|_| async { Err(anyhow::anyhow!("server said no")) });
        match stage.submit().await {
            Submission::Rejected(reason) => assert_eq!(reason, "server said no"),
            other => panic!("unexpected {:?}", other),
        }

        stage.on_submit(|s: &Stage| -> futures::future::Ready<anyhow::Result<bool>> {
            panic!("sync failure in {}", s.id())
        });
        match stage.submit().await {
            Submission::Faulted(fault) => assert_eq!(fault.message, "sync failure in A"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_skips_hook_when_next_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stage = stage("B");
        {
            let calls = Arc::clone(&calls);
            stage.on_submit(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            });
        }
        stage.set_next_enabled(false);
        assert!(matches!(stage.submit().await, Submission::Declined));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_guards_are_contained() {
        let stage = stage("A");
        stage.set_next_enabled(Guard::predicate(|_| panic!("guard bug")));
        assert!(!stage.next_enabled());
        let fault = stage.try_next_enabled().unwrap_err();
        assert_eq!(fault.hook, HookKind::Guard);
        assert_eq!(fault.message, "guard bug");
        match stage.submit().await {
            Submission::Faulted(fault) => assert_eq!(fault.hook, HookKind::Guard),
            other => panic!("unexpected {:?}", other),
        }

        stage.set_next_stage(NextStage::resolver(|_| panic!("resolver bug")));
        assert_eq!(stage.next_stage_id(), None);
        let fault = stage.try_next_stage_id().unwrap_err();
        assert_eq!(fault.hook, HookKind::NextStage);
    }

    #[test]
    fn test_next_stage_resolution() {
        let stage = stage("A");
        assert_eq!(stage.next_stage_id(), None);
        stage.set_next_stage("B");
        assert_eq!(stage.next_stage_id().as_deref(), Some("B"));
        stage.set_next_stage(NextStage::resolver(|s| {
            if s.complete() {
                Some("done".to_string())
            } else {
                Some("review".to_string())
            }
        }));
        assert_eq!(stage.next_stage_id().as_deref(), Some("review"));
        stage.clear_next_stage();
        assert_eq!(stage.next_stage_id(), None);
    }
}
