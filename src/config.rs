use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Employee new cart sessions are attributed to.
  pub employee_id: Option<String>,
  /// Store location tag for new sessions.
  pub location: Option<String>,
  /// Overrides the default data directory.
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tillsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tillsync/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/tillsync/config.yaml\n\
                 with at least:\n  api:\n    base_url: https://pos.example.com"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tillsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tillsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Directory holding the store, cache, and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;
    Ok(data_dir.join("tillsync"))
  }

  pub fn store_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("store.db"))
  }

  pub fn cache_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("cache.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal_config() {
    let config: Config =
      serde_yaml::from_str("api:\n  base_url: https://pos.example.com\nemployee_id: emp-7\n")
        .unwrap();

    assert_eq!(config.api.base_url, "https://pos.example.com");
    assert_eq!(config.employee_id.as_deref(), Some("emp-7"));
    assert!(config.location.is_none());
  }

  #[test]
  fn test_data_dir_override() {
    let config: Config = serde_yaml::from_str(
      "api:\n  base_url: https://pos.example.com\ndata_dir: /tmp/tillsync-test\n",
    )
    .unwrap();

    let dir = config.data_dir().unwrap();
    assert_eq!(dir, PathBuf::from("/tmp/tillsync-test"));
    assert_eq!(
      config.store_db_path().unwrap(),
      PathBuf::from("/tmp/tillsync-test/store.db")
    );
  }
}
