use crate::config::schema::WizardConfig;
use crate::error::{Result, WizardError};
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the wizard definition
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("wizard-nav"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wizard.toml")
}

/// Parse a wizard definition from TOML text
pub fn parse_config(content: &str) -> Result<WizardConfig> {
    Ok(toml::from_str(content)?)
}

/// Load a wizard definition from file
pub fn load_config(path: &Path) -> Result<WizardConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        WizardError::Config(format!("Failed to read wizard from {:?}: {}", path, e))
    })?;

    let config = parse_config(&content)?;

    tracing::info!("Loaded wizard from {:?}", path);
    Ok(config)
}

/// Save a wizard definition to file
pub fn save_config(path: &Path, config: &WizardConfig) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            WizardError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(path, content).map_err(|e| {
        WizardError::Config(format!("Failed to write wizard to {:?}: {}", path, e))
    })?;

    tracing::info!("Saved wizard to {:?}", path);
    Ok(())
}
