//! wizard-nav: load a wizard definition and walk it forward.
//!
//! Usage: wizard-nav [CONFIG]  (defaults to the per-user wizard.toml)

use std::path::PathBuf;
use wizard_nav::config::{default_config_path, load_config};
use wizard_nav::{NavOptions, NavOutcome, ProgressMode, WizardEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wizard_nav::init_tracing();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&path)?;

    let engine = WizardEngine::from_config(&config).await?;
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    if let Some(stage) = engine.current_stage() {
        println!("start: {}", stage.id());
    }
    let mut finished = false;
    // At most one step per stage: referral chains may cycle
    for _ in 0..config.stages.len() {
        let outcome = engine.next(NavOptions::default()).await?;
        finished = outcome.is_at_end();
        match outcome {
            NavOutcome::Moved(stage) => println!("next:  {}", stage.id()),
            NavOutcome::Denied(denial) => {
                println!("stop:  {:?}", denial);
                break;
            }
            NavOutcome::Faulted(fault) => {
                eprintln!("fault: {}", fault);
                break;
            }
        }
    }

    let ids: Vec<String> = engine
        .progress(ProgressMode::Current)?
        .iter()
        .map(|stage| stage.id().to_string())
        .collect();
    println!("progress: {}", ids.join(" -> "));

    if finished {
        engine.notify_wizard_complete();
    } else {
        tracing::warn!("Wizard stopped before its last stage");
    }
    Ok(())
}
