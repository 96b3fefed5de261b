use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RenoError, Result};
use crate::model::Phase;

pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_CRM_BACKEND: &str = "RENO_CRM_BACKEND";
pub const ENV_AIRTABLE_BASE: &str = "RENO_AIRTABLE_BASE";
pub const ENV_AIRTABLE_TOKEN: &str = "RENO_AIRTABLE_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmBackend {
    /// Local JSON export of the CRM table.
    #[default]
    Snapshot,
    Airtable,
}

impl std::str::FromStr for CrmBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "airtable" => Ok(Self::Airtable),
            other => Err(format!("unknown crm backend '{other}'")),
        }
    }
}

impl std::fmt::Display for CrmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot => write!(f, "snapshot"),
            Self::Airtable => write!(f, "airtable"),
        }
    }
}

/// Names of the CRM columns read and written by sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmFields {
    pub unique_id: String,
    pub status: String,
    pub address: String,
    pub area: String,
    pub renovator: String,
    pub technical_constructor: String,
}

impl Default for CrmFields {
    fn default() -> Self {
        Self {
            unique_id: "Unique ID".into(),
            status: "Set Up Status".into(),
            address: "Address".into(),
            area: "Area".into(),
            renovator: "Renovator".into(),
            technical_constructor: "Technical Constructor".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub backend: CrmBackend,
    pub api_url: String,
    pub base_id: Option<String>,
    pub table: String,
    pub fields: CrmFields,
    pub timeout_secs: u64,
    /// Snapshot file, relative to `.reno/`.
    pub snapshot_path: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            backend: CrmBackend::Snapshot,
            api_url: "https://api.airtable.com".into(),
            base_id: None,
            table: "Properties".into(),
            fields: CrmFields::default(),
            timeout_secs: 30,
            snapshot_path: "crm.json".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl SyncConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// `.reno/config.yaml`. Missing keys fall back to defaults; environment
/// variables override the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crm: CrmConfig,
    pub sync: SyncConfig,
    /// Extra status aliases per phase, merged into the built-in table.
    pub aliases: BTreeMap<Phase, Vec<String>>,
}

impl Config {
    /// Load `config.yaml` from the `.reno/` directory, then apply env overrides.
    pub fn load(reno_dir: &Path) -> Result<Self> {
        let path = reno_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_yaml_str(&contents)
                    .map_err(|e| RenoError::InvalidConfig(path.display().to_string(), e.to_string()))?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => return Err(err.into()),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .map_err(|msg| RenoError::InvalidConfig(path.display().to_string(), msg))?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Priority: env var > YAML > default.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_CRM_BACKEND) {
            match raw.parse() {
                Ok(backend) => self.crm.backend = backend,
                Err(msg) => tracing::warn!("ignoring {ENV_CRM_BACKEND}: {msg}"),
            }
        }
        if let Some(base) = lookup(ENV_AIRTABLE_BASE).filter(|b| !b.trim().is_empty()) {
            self.crm.base_id = Some(base);
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sync.max_attempts == 0 {
            return Err("sync.max_attempts must be at least 1".into());
        }
        if self.crm.timeout_secs == 0 {
            return Err("crm.timeout_secs must be at least 1".into());
        }
        if self.crm.backend == CrmBackend::Airtable && self.crm.base_id.is_none() {
            return Err(format!(
                "crm.base_id (or {ENV_AIRTABLE_BASE}) is required for the airtable backend"
            ));
        }
        if self.crm.fields.unique_id.trim().is_empty() || self.crm.fields.status.trim().is_empty()
        {
            return Err("crm.fields.unique_id and crm.fields.status cannot be empty".into());
        }
        Ok(())
    }

    /// The Airtable token is never read from the config file.
    pub fn airtable_token() -> Option<String> {
        std::env::var(ENV_AIRTABLE_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.crm.fields.status, "Set Up Status");
        assert_eq!(config.sync.max_attempts, 3);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml_str(
            r#"
crm:
  table: Reno Pipeline
sync:
  max_attempts: 5
aliases:
  reno-in-progress: ["obras"]
"#,
        )
        .unwrap();
        assert_eq!(config.crm.table, "Reno Pipeline");
        assert_eq!(config.crm.fields.unique_id, "Unique ID");
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.initial_backoff_ms, 500);
        assert_eq!(
            config.aliases.get(&Phase::RenoInProgress),
            Some(&vec!["obras".to_string()])
        );
    }

    #[test]
    fn default_config_round_trips_through_yaml() {
        let yaml = Config::default().to_yaml().unwrap();
        assert_eq!(Config::from_yaml_str(&yaml).unwrap(), Config::default());
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (ENV_CRM_BACKEND, "Airtable"),
            (ENV_AIRTABLE_BASE, "appXYZ"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.crm.backend, CrmBackend::Airtable);
        assert_eq!(config.crm.base_id.as_deref(), Some("appXYZ"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_backend_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == ENV_CRM_BACKEND).then(|| "salesforce".to_string()));
        assert_eq!(config.crm.backend, CrmBackend::Snapshot);
    }

    #[test]
    fn airtable_without_base_is_invalid() {
        let mut config = Config::default();
        config.crm.backend = CrmBackend::Airtable;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let mut config = Config::default();
        config.sync.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "sync: [not, a, map]").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert_eq!(err.code(), "invalid_config");
    }
}
