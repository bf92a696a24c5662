use thiserror::Error;

#[derive(Error, Debug)]
pub enum WizardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid stage id: {0:?}")]
    InvalidStageId(String),

    #[error("Duplicate ids in list: {0}")]
    DuplicateStageIds(String),

    #[error("Duplicate stages in scenario: {0}")]
    DuplicateScenarioIds(String),

    #[error("Stages missing from stage list: {0}")]
    MissingScenarioStages(String),

    #[error("Stage not found: {0}")]
    UnknownStage(String),

    #[error("Stage id doesn't exist in current scenario: {0}")]
    StageNotInScenario(String),

    #[error("Current stage id is missing from new stages list: {0}")]
    CurrentStageMissing(String),

    #[error("Stage is already bound to a wizard: {0}")]
    StageAlreadyBound(String),

    #[error("Invalid next stage {next:?} referenced by stage {stage_id}")]
    InvalidNextStage { stage_id: String, next: String },

    #[error("Stages must be set first")]
    StagesNotSet,

    #[error("Wizard has not been started")]
    NotStarted,

    #[error("Invalid start data for {strategy}: {reason}")]
    InvalidStartData {
        strategy: &'static str,
        reason: String,
    },

    #[error("Forward navigation is prohibited: stage id: {0}")]
    ForwardNavigationProhibited(String),

    #[error("Stage is not navigable: id: {0}")]
    NotNavigable(String),

    #[error("Method '{method}' is not supported by {strategy}")]
    Unsupported {
        method: &'static str,
        strategy: &'static str,
    },

    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Task '{task}' canceled: {reason}")]
    Cancelled { task: &'static str, reason: String },

    #[error("Task '{task}' panicked: {message}")]
    TaskPanicked { task: &'static str, message: String },
}

impl WizardError {
    /// Errors that mean "this navigation was refused", as opposed to a broken
    /// stage list or a misuse of the API.
    pub fn is_navigation_denied(&self) -> bool {
        matches!(
            self,
            WizardError::ForwardNavigationProhibited(_) | WizardError::NotNavigable(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WizardError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, WizardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stages_message_lists_ids() {
        let err = WizardError::MissingScenarioStages("X,Y".to_string());
        assert_eq!(err.to_string(), "Stages missing from stage list: X,Y");
    }

    #[test]
    fn test_denied_classification() {
        assert!(WizardError::ForwardNavigationProhibited("C".into()).is_navigation_denied());
        assert!(!WizardError::UnknownStage("C".into()).is_navigation_denied());
        let cancelled = WizardError::Cancelled {
            task: "next",
            reason: "Canceled by 'setCurrentStage'".into(),
        };
        assert!(cancelled.is_cancelled());
    }
}
