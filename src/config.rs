//! Client configuration: credentials and host endpoints.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{PlanhatError, Result};

/// Default Planhat API host.
pub const DEFAULT_API_URL: &str = "https://api.planhat.com";
/// Default Planhat analytics ingestion host.
pub const DEFAULT_ANALYTICS_URL: &str = "https://analytics.planhat.com";

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_analytics_url() -> String {
  DEFAULT_ANALYTICS_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// API key, sent as a bearer token on every request.
  pub api_key: String,
  /// Tenant UUID. Only required for analytics ingestion calls.
  pub tenant_uuid: Option<String>,
  /// API host override.
  #[serde(default = "default_api_url")]
  pub api_url: String,
  /// Analytics host override.
  #[serde(default = "default_analytics_url")]
  pub analytics_url: String,
}

impl Config {
  /// Create a configuration with the given API key and default hosts.
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      tenant_uuid: None,
      api_url: default_api_url(),
      analytics_url: default_analytics_url(),
    }
  }

  /// Set the tenant UUID used by analytics ingestion calls.
  pub fn with_tenant_uuid(mut self, tenant_uuid: impl Into<String>) -> Self {
    self.tenant_uuid = Some(tenant_uuid.into());
    self
  }

  /// Build a configuration from environment variables.
  ///
  /// Reads `PLANHAT_API_TOKEN` (with `PLANHAT_API_KEY` as fallback) and the
  /// optional `PLANHAT_TENANT_UUID`.
  pub fn from_env() -> Result<Self> {
    let api_key = std::env::var("PLANHAT_API_TOKEN")
      .or_else(|_| std::env::var("PLANHAT_API_KEY"))
      .map_err(|_| {
        PlanhatError::Config(
          "Planhat API token not found. Set PLANHAT_API_TOKEN or PLANHAT_API_KEY.".to_string(),
        )
      })?;

    let mut config = Self::new(api_key);
    config.tenant_uuid = std::env::var("PLANHAT_TENANT_UUID").ok();
    Ok(config)
  }

  /// Load configuration from a YAML file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./planhat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/planhat/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(PlanhatError::Config(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(PlanhatError::Config(
        "No configuration file found. Create one at ~/.config/planhat/config.yaml \
         or set PLANHAT_API_TOKEN and use Config::from_env()."
          .to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("planhat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("planhat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      PlanhatError::Config(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      PlanhatError::Config(format!(
        "Failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Ok(config)
  }

  /// Ensure the configuration is usable for API calls.
  pub(crate) fn require_api_key(&self) -> Result<()> {
    if self.api_key.is_empty() {
      return Err(PlanhatError::Config(
        "No Planhat API key provided. Authenticate with an API key before making requests."
          .to_string(),
      ));
    }
    Ok(())
  }

  /// Return the tenant UUID or a configuration error.
  pub(crate) fn require_tenant_uuid(&self) -> Result<&str> {
    self.tenant_uuid.as_deref().ok_or_else(|| {
      PlanhatError::Config(
        "No Planhat tenant UUID provided. Analytics calls require a tenant UUID.".to_string(),
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_uses_default_hosts() {
    let config = Config::new("key");
    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert_eq!(config.analytics_url, DEFAULT_ANALYTICS_URL);
    assert!(config.tenant_uuid.is_none());
  }

  #[test]
  fn test_empty_api_key_is_config_error() {
    let config = Config::new("");
    assert!(matches!(
      config.require_api_key(),
      Err(PlanhatError::Config(_))
    ));
  }

  #[test]
  fn test_missing_tenant_uuid_is_config_error() {
    let config = Config::new("key");
    assert!(matches!(
      config.require_tenant_uuid(),
      Err(PlanhatError::Config(_))
    ));
    let config = config.with_tenant_uuid("tenant");
    assert_eq!(config.require_tenant_uuid().unwrap(), "tenant");
  }

  #[test]
  fn test_parse_yaml_config() {
    let config: Config = serde_yaml::from_str("api_key: secret\ntenant_uuid: tenant-1\n").unwrap();
    assert_eq!(config.api_key, "secret");
    assert_eq!(config.tenant_uuid.as_deref(), Some("tenant-1"));
    assert_eq!(config.api_url, DEFAULT_API_URL);
  }
}
