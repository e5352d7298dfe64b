use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Timer thresholds for the drift-detection subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Grace period before a hidden work surface counts as drift.
    pub visibility_grace_secs: u64,
    /// Inactivity span before the idle signal fires.
    pub idle_threshold_secs: u64,
    /// Period of the multimodal heartbeat.
    pub heartbeat_interval_secs: u64,
    /// Continuous distraction span that triggers an intervention.
    pub sustained_drift_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            visibility_grace_secs: 5,
            idle_threshold_secs: 90,
            heartbeat_interval_secs: 60,
            sustained_drift_secs: 300,
        }
    }
}

/// Settings for the voice intervention dialogue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Re-open the mic automatically after each assistant reply.
    pub auto_restart: bool,
    /// Settle delay between playback end and the next recording.
    pub settle_delay_ms: u64,
    /// Time in `AwaitingUser` without a completed user turn after which
    /// the dialogue force-ends.
    pub inactivity_ceiling_secs: u64,
    /// Delay before re-engaging after a recoverable error.
    pub retry_delay_ms: u64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            auto_restart: true,
            settle_delay_ms: 1500,
            inactivity_ceiling_secs: 45,
            retry_delay_ms: 2000,
        }
    }
}

/// Extensions to the built-in context rule lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub blacklist: Vec<String>,
    pub productivity: Vec<String>,
}

/// Endpoints and credentials for the external services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub base_url: String,
    /// Read from `HELMSMAN_API_KEY` when unset here.
    pub api_key: Option<String>,
    pub voice: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            api_key: None,
            voice: "coach".to_string(),
        }
    }
}

impl ServicesConfig {
    /// Config value, then environment, then empty (services that need no
    /// key, e.g. a local gateway).
    #[must_use]
    pub fn effective_api_key(&self) -> String {
        self.api_key
            .clone()
            .or_else(|| std::env::var("HELMSMAN_API_KEY").ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HelmsmanConfig {
    pub timing: TimingConfig,
    pub dialogue: DialogueConfig,
    pub rules: RulesConfig,
    pub services: ServicesConfig,
}

impl HelmsmanConfig {
    /// Load from the config file, falling back to defaults when the file
    /// does not exist. A present-but-malformed file is an error.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    #[must_use]
    pub fn visibility_grace(&self) -> Duration {
        Duration::from_secs(self.timing.visibility_grace_secs)
    }

    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.timing.idle_threshold_secs)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.timing.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn sustained_drift(&self) -> Duration {
        Duration::from_secs(self.timing.sustained_drift_secs)
    }
}

/// Path of the user config file.
pub fn config_path() -> Result<PathBuf> {
    let mut path =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("failed to get config dir"))?;
    path.push("helmsman");
    path.push("config.toml");
    Ok(path)
}

/// Local data directory for persisted records.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("failed to get local data dir"))?;
    path.push("helmsman");
    Ok(path)
}
