//! The wizard engine: public orchestrator over the task queue, the stage
//! catalog, the navigation strategy and the event broadcaster.

pub mod engine;

pub use engine::WizardEngine;

/// Queue task names, as reported in cancellation errors.
pub mod tasks {
    pub const SET_STAGES: &str = "setStages";
    pub const START: &str = "start";
    pub const NEXT: &str = "next";
    pub const PREV: &str = "prev";
    pub const SET_CURRENT_STAGE: &str = "setCurrentStage";
    pub const NAVIGATE_TO_STAGE: &str = "navigateToStage";
    pub const SET_SCENARIO: &str = "setScenario";

    /// Tasks cancelled by a command that repositions the wizard.
    pub const NAVIGATION: &[&str] = &[NEXT, PREV];
}
