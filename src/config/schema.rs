use crate::events::CHANNEL_CAPACITY;
use crate::stage::StageEntry;
use crate::strategy::StrategyKind;
use serde::{Deserialize, Serialize};

/// A wizard definition as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Traversal strategy
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Stage catalog, in default scenario order
    #[serde(default)]
    pub stages: Vec<StageEntry>,

    /// Initial scenario (scenario strategy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Vec<String>>,

    /// Entry stage (referral strategy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_stage: Option<String>,

    /// Engine settings
    #[serde(default)]
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Events buffered per broadcast subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    CHANNEL_CAPACITY
}

impl WizardConfig {
    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(StageEntry::id)
    }
}
