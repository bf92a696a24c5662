use crate::config::schema::WizardConfig;
use crate::error::{Result, WizardError};
use crate::stage::StageEntry;
use crate::strategy::StrategyKind;
use std::collections::HashSet;

/// Validate a wizard definition before it is handed to the engine.
pub fn validate_config(config: &WizardConfig) -> Result<()> {
    if config.stages.is_empty() {
        return Err(WizardError::Validation(
            "Wizard must define at least one stage".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for id in config.stage_ids() {
        if id.trim().is_empty() {
            return Err(WizardError::Validation(
                "Stage id cannot be empty".to_string(),
            ));
        }
        if !ids.insert(id) {
            return Err(WizardError::Validation(format!(
                "Duplicate stage id: {}",
                id
            )));
        }
    }

    // Referral successors must point into the catalog
    let dangling: Vec<String> = config
        .stages
        .iter()
        .filter_map(|entry| match entry {
            StageEntry::Descriptor(descriptor) => descriptor
                .next_stage
                .as_deref()
                .filter(|next| !ids.contains(next))
                .map(|next| format!("{} -> {}", descriptor.id, next)),
            StageEntry::Id(_) => None,
        })
        .collect();
    if !dangling.is_empty() {
        return Err(WizardError::Validation(format!(
            "Unknown next_stage reference(s): {}",
            dangling.join(", ")
        )));
    }

    if let Some(scenario) = &config.scenario {
        if config.strategy != StrategyKind::Scenario {
            return Err(WizardError::Validation(format!(
                "scenario is not supported by {}",
                config.strategy.as_str()
            )));
        }
        validate_scenario(scenario, &ids)?;
    }

    if let Some(start) = &config.start_stage {
        if config.strategy != StrategyKind::Referral {
            return Err(WizardError::Validation(format!(
                "start_stage is not supported by {}",
                config.strategy.as_str()
            )));
        }
        if !ids.contains(start.as_str()) {
            return Err(WizardError::Validation(format!(
                "Unknown start_stage: {}",
                start
            )));
        }
    }

    if config.settings.event_capacity == 0 {
        return Err(WizardError::Validation(
            "event_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scenario(scenario: &[String], ids: &HashSet<&str>) -> Result<()> {
    if scenario.is_empty() {
        return Err(WizardError::Validation(
            "Scenario must contain at least one stage".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for id in scenario {
        if !seen.insert(id.as_str()) {
            return Err(WizardError::Validation(format!(
                "Duplicate stage in scenario: {}",
                id
            )));
        }
    }

    let missing: Vec<&str> = scenario
        .iter()
        .map(String::as_str)
        .filter(|id| !ids.contains(id))
        .collect();
    if !missing.is_empty() {
        return Err(WizardError::Validation(format!(
            "Scenario references unknown stage(s): {}",
            missing.join(",")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn message(config: &WizardConfig) -> String {
        match validate_config(config) {
            Err(WizardError::Validation(message)) => message,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_valid_scenario_wizard() {
        let config = parse_config(
            r#"
            stages = ["A", "B", { id = "C", label = "Confirm" }]
            scenario = ["A", "C"]
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_and_duplicate_stages() {
        assert!(message(&WizardConfig::default()).contains("at least one stage"));

        let config = parse_config(r#"stages = ["A", "B", "A"]"#).unwrap();
        assert_eq!(message(&config), "Duplicate stage id: A");

        let config = parse_config(r#"stages = ["A", ""]"#).unwrap();
        assert!(message(&config).contains("empty"));
    }

    #[test]
    fn test_validate_scenario_reports_all_missing() {
        let config = parse_config(
            r#"
            stages = ["A", "B"]
            scenario = ["A", "X", "Y"]
            "#,
        )
        .unwrap();
        assert_eq!(message(&config), "Scenario references unknown stage(s): X,Y");
    }

    #[test]
    fn test_validate_strategy_specific_fields() {
        let config = parse_config(
            r#"
            strategy = "referral"
            stages = ["A", "B"]
            scenario = ["A"]
            "#,
        )
        .unwrap();
        assert!(message(&config).contains("ReferralStrategy"));

        let config = parse_config(
            r#"
            stages = ["A", "B"]
            start_stage = "B"
            "#,
        )
        .unwrap();
        assert!(message(&config).contains("ScenarioStrategy"));
    }

    #[test]
    fn test_validate_referral_references() {
        let config = parse_config(
            r#"
            strategy = "referral"
            start_stage = "A"
            stages = [
                { id = "A", next_stage = "B" },
                { id = "B", next_stage = "Z" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(message(&config), "Unknown next_stage reference(s): B -> Z");

        let config = parse_config(
            r#"
            strategy = "referral"
            start_stage = "Q"
            stages = ["A"]
            "#,
        )
        .unwrap();
        assert_eq!(message(&config), "Unknown start_stage: Q");
    }
}
