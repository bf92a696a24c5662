//! Event broadcaster over the wizard's fixed event vocabulary.
//!
//! Listeners register by event name with [`EventBroadcaster::on`]; streaming
//! consumers can instead [`subscribe`](EventBroadcaster::subscribe) to a
//! broadcast channel that receives every event.

use crate::error::{Result, WizardError};
use crate::fault::panic_message;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Maximum number of events to buffer per subscriber.
pub const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    Init,
    Dirty,
    GoTo,
    StageStateChange,
    WizardComplete,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::Init,
        EventName::Dirty,
        EventName::GoTo,
        EventName::StageStateChange,
        EventName::WizardComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Init => "init",
            EventName::Dirty => "dirty",
            EventName::GoTo => "goTo",
            EventName::StageStateChange => "stageStateChange",
            EventName::WizardComplete => "wizardComplete",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventName {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| WizardError::UnsupportedEvent(s.to_string()))
    }
}

/// Events published by the wizard engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WizardEvent {
    /// Navigation strategy initialized (fires once per engine).
    Init,
    /// A stage reported its content as changed.
    Dirty { stage_id: String },
    /// The current stage changed.
    GoTo { stage_id: String },
    /// A stage's completion flag changed.
    StageStateChange { stage_id: String, complete: bool },
    /// Fired by the host when the flow is finished.
    WizardComplete,
}

impl WizardEvent {
    pub fn name(&self) -> EventName {
        match self {
            WizardEvent::Init => EventName::Init,
            WizardEvent::Dirty { .. } => EventName::Dirty,
            WizardEvent::GoTo { .. } => EventName::GoTo,
            WizardEvent::StageStateChange { .. } => EventName::StageStateChange,
            WizardEvent::WizardComplete => EventName::WizardComplete,
        }
    }
}

pub type EventCallback = Arc<dyn Fn(&WizardEvent) + Send + Sync>;

/// Handle returned by [`EventBroadcaster::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

pub struct EventBroadcaster {
    listeners: Mutex<HashMap<EventName, Vec<(ListenerId, EventCallback)>>>,
    tx: broadcast::Sender<WizardEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Register `callback` for the named event. Unknown names are rejected.
    pub fn on<F>(&self, event: &str, callback: F) -> Result<ListenerId>
    where
        F: Fn(&WizardEvent) + Send + Sync + 'static,
    {
        let name: EventName = event.parse()?;
        let id = ListenerId(Uuid::new_v4());
        self.listeners
            .lock()
            .entry(name)
            .or_default()
            .push((id, Arc::new(callback)));
        Ok(id)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool> {
        let name: EventName = event.parse()?;
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&name) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|(listener, _)| *listener != id);
        Ok(entries.len() != before)
    }

    /// Deliver `event` to its listeners and to broadcast subscribers.
    ///
    /// Listeners are called outside the registry lock, so they may call
    /// `on`/`off` themselves. A panicking listener is logged and skipped.
    pub fn notify(&self, event: WizardEvent) {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .lock()
            .get(&event.name())
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                tracing::error!(
                    "Listener for '{}' panicked: {}",
                    event.name(),
                    panic_message(payload.as_ref())
                );
            }
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners.lock().get(&name).map_or(0, Vec::len)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
