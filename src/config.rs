use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_CACHE_TTL;
use crate::db::DEFAULT_TOKEN_KEY;
use crate::services::social::SOCIAL_CACHE_TTL;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub services: ServicesConfig,
  pub http: HttpConfig,
  pub auth: AuthConfig,
}

/// One backend: where it lives and how long its reads stay cached.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
  pub url: String,
  /// Overrides the default response cache TTL (seconds; 0 disables caching)
  pub cache_ttl_secs: Option<u64>,
}

impl ServiceConfig {
  fn local(port: u16) -> Self {
    Self {
      url: format!("http://localhost:{}", port),
      cache_ttl_secs: None,
    }
  }

  pub fn cache_ttl(&self, default: Duration) -> Duration {
    self.cache_ttl_secs.map(Duration::from_secs).unwrap_or(default)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
  Payments,
  Deliverables,
  Disputes,
  Social,
  Notifications,
  Media,
}

impl ServiceName {
  pub const ALL: [ServiceName; 6] = [
    Self::Payments,
    Self::Deliverables,
    Self::Disputes,
    Self::Social,
    Self::Notifications,
    Self::Media,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Payments => "payments",
      Self::Deliverables => "deliverables",
      Self::Disputes => "disputes",
      Self::Social => "social",
      Self::Notifications => "notifications",
      Self::Media => "media",
    }
  }

  /// `NILBX_PAYMENTS_URL` and friends.
  pub fn env_var(self) -> String {
    format!("NILBX_{}_URL", self.as_str().to_ascii_uppercase())
  }

  pub fn default_cache_ttl(self) -> Duration {
    match self {
      Self::Social => SOCIAL_CACHE_TTL,
      _ => DEFAULT_CACHE_TTL,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
  pub payments: ServiceConfig,
  pub deliverables: ServiceConfig,
  /// Disputes and refunds are served by the payment service
  pub disputes: ServiceConfig,
  pub social: ServiceConfig,
  pub notifications: ServiceConfig,
  pub media: ServiceConfig,
}

impl Default for ServicesConfig {
  fn default() -> Self {
    Self {
      payments: ServiceConfig::local(8005),
      deliverables: ServiceConfig::local(8011),
      disputes: ServiceConfig::local(8005),
      social: ServiceConfig::local(8013),
      notifications: ServiceConfig::local(8007),
      media: ServiceConfig::local(8012),
    }
  }
}

impl ServicesConfig {
  pub fn get(&self, name: ServiceName) -> &ServiceConfig {
    match name {
      ServiceName::Payments => &self.payments,
      ServiceName::Deliverables => &self.deliverables,
      ServiceName::Disputes => &self.disputes,
      ServiceName::Social => &self.social,
      ServiceName::Notifications => &self.notifications,
      ServiceName::Media => &self.media,
    }
  }

  fn get_mut(&mut self, name: ServiceName) -> &mut ServiceConfig {
    match name {
      ServiceName::Payments => &mut self.payments,
      ServiceName::Deliverables => &mut self.deliverables,
      ServiceName::Disputes => &mut self.disputes,
      ServiceName::Social => &mut self.social,
      ServiceName::Notifications => &mut self.notifications,
      ServiceName::Media => &mut self.media,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
  pub timeout_secs: u64,
  pub user_agent: Option<String>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: None,
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
  /// Name of the credential entry in the local store
  pub storage_key: String,
  /// Credential database location (defaults to the user data directory)
  pub store_path: Option<PathBuf>,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      storage_key: DEFAULT_TOKEN_KEY.to_string(),
      store_path: None,
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./nilbx.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/nilbx/config.yaml
  ///
  /// Without a file the local development defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("nilbx.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("nilbx").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit, not an empty map
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Replace service URLs from `NILBX_<SERVICE>_URL` when set.
  pub fn apply_env<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    for name in ServiceName::ALL {
      if let Some(url) = lookup(&name.env_var()).filter(|v| !v.trim().is_empty()) {
        self.services.get_mut(name).url = url.trim().to_string();
      }
    }
  }

  fn validate(&self) -> Result<()> {
    for name in ServiceName::ALL {
      let url = &self.services.get(name).url;
      let parsed = url::Url::parse(url)
        .map_err(|e| eyre!("Invalid URL for service {}: {} ({})", name.as_str(), url, e))?;
      if !matches!(parsed.scheme(), "http" | "https") {
        return Err(eyre!(
          "Service {} must use http or https: {}",
          name.as_str(),
          url
        ));
      }
    }
    if self.http.timeout_secs == 0 {
      return Err(eyre!("http.timeout_secs must be greater than 0"));
    }
    if self.auth.storage_key.trim().is_empty() {
      return Err(eyre!("auth.storage_key must not be empty"));
    }
    Ok(())
  }

  /// Cache TTL for a service, honouring its `cache_ttl_secs` override.
  pub fn cache_ttl(&self, name: ServiceName) -> Duration {
    self.services.get(name).cache_ttl(name.default_cache_ttl())
  }
}
