//! Configuration shared by reconciliation and enforcement.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::handler::ApplicationId;
use crate::ignore::IgnoreFilter;
use crate::synth::DEFAULT_PREFIX;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// IO error while reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing the file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for a [`ViewGate`](crate::ViewGate).
///
/// Every field is optional in the JSON form:
///
/// ```json
/// {
///   "prefix": "access_view_",
///   "ignore": ["shop.views.health"],
///   "applications": ["shop", "billing"],
///   "enforced_applications": ["billing"],
///   "language": "de"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewGateConfig {
    /// Permission key prefix.
    pub prefix: String,

    /// Exact qualified names of handlers to ignore.
    pub ignore: Vec<String>,

    /// Applications targeted by reconciliation. Empty means all.
    pub applications: Vec<ApplicationId>,

    /// Applications enforced even while they own no records.
    pub enforced_applications: Vec<ApplicationId>,

    /// Locale used to translate label overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for ViewGateConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            ignore: Vec::new(),
            applications: Vec::new(),
            enforced_applications: Vec::new(),
            language: None,
        }
    }
}

impl ViewGateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that no entry is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pos) = self.ignore.iter().position(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "ignore entry {} is empty",
                pos
            )));
        }

        let mut apps = self.applications.iter().chain(&self.enforced_applications);
        if apps.any(|a| a.as_str().trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "application names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the ignore filter from [`ignore`](Self::ignore).
    pub fn ignore_filter(&self) -> IgnoreFilter {
        IgnoreFilter::new(self.ignore.iter().cloned())
    }
}

/// Load configuration from a JSON file.
///
/// A leading `~` in the path is expanded to the home directory.
pub async fn load_config_file(path: impl AsRef<Path>) -> Result<ViewGateConfig, ConfigError> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    let expanded_path = shellexpand::tilde(&path_str);
    let path = Path::new(expanded_path.as_ref());

    let content = tokio::fs::read_to_string(path).await?;
    ViewGateConfig::from_json(&content)
}
