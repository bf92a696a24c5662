//! Fault isolation for host-supplied stage hooks.
//!
//! Hooks are called through [`call_external`] / [`call_external_async`]. A
//! panic inside a hook is caught and turned into a [`HookFault`] so that a
//! buggy hook fails the navigation attempt instead of tearing down the
//! queue. Faults are also reported to a [`Diagnostics`] sink.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::broadcast;

/// Maximum number of faults buffered per diagnostics subscriber.
const FAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    PrePrev,
    PreNext,
    Submit,
    Guard,
    NextStage,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::PrePrev => "prePrevHook",
            HookKind::PreNext => "preNextHook",
            HookKind::Submit => "onSubmit",
            HookKind::Guard => "guard",
            HookKind::NextStage => "nextStage",
        };
        write!(f, "{}", s)
    }
}

/// A hook that panicked while the engine was navigating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{hook} of stage {stage_id} panicked: {message}")]
pub struct HookFault {
    pub stage_id: String,
    pub hook: HookKind,
    pub message: String,
}

impl HookFault {
    fn new(stage_id: &str, hook: HookKind, payload: &(dyn Any + Send)) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            hook,
            message: panic_message(payload),
        }
    }
}

/// Call a synchronous hook, converting a panic into a [`HookFault`].
pub fn call_external<R>(
    stage_id: &str,
    hook: HookKind,
    f: impl FnOnce() -> R,
) -> Result<R, HookFault> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| HookFault::new(stage_id, hook, payload.as_ref()))
}

/// Drive a hook's future, converting a panic during polling into a [`HookFault`].
pub async fn call_external_async<F: Future>(
    stage_id: &str,
    hook: HookKind,
    fut: F,
) -> Result<F::Output, HookFault> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| HookFault::new(stage_id, hook, payload.as_ref()))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Out-of-band sink for hook faults: every fault is logged and pushed to
/// all subscribers.
#[derive(Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<HookFault>,
}

impl Diagnostics {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn report(&self, fault: &HookFault) {
        tracing::error!("Hook fault: {}", fault);
        let _ = self.tx.send(fault.clone());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HookFault> {
        self.tx.subscribe()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
