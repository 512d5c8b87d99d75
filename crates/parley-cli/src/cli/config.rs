use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use parley_core::models::Role;
use parley_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Address of the logged-in user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Base URL of the message service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// `host:port` of the push channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_secs: Option<u64>,
}

impl CliConfig {
    /// `<config dir>/parley/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parley").join("config.json"))
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load the config at the default location, or an empty one if there is none.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize config")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    /// Values set in `overrides` win.
    pub fn merge(self, overrides: CliConfig) -> Self {
        Self {
            email: overrides.email.or(self.email),
            role: overrides.role.or(self.role),
            service_url: overrides.service_url.or(self.service_url),
            push_address: overrides.push_address.or(self.push_address),
            auth_token: overrides.auth_token.or(self.auth_token),
            poll_interval_secs: overrides.poll_interval_secs.or(self.poll_interval_secs),
            reconnect_delay_secs: overrides.reconnect_delay_secs.or(self.reconnect_delay_secs),
        }
    }

    pub fn into_core(self) -> Result<CoreConfig> {
        let email = self
            .email
            .context("No email configured (set \"email\" in the config file or pass --email)")?;
        let role = self
            .role
            .context("No role configured (set \"role\" in the config file or pass --role)")?;

        let mut config = CoreConfig::new(&email, role).with_auth_token(self.auth_token);
        if let Some(url) = self.service_url {
            config = config.with_service_url(url);
        }
        if let Some(address) = self.push_address {
            config = config.with_push_address(address);
        }
        if let Some(secs) = self.poll_interval_secs {
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.reconnect_delay_secs {
            config = config.with_reconnect_delay(Duration::from_secs(secs));
        }
        Ok(config)
    }
}
