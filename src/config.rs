//! Run parameters and per-repository peer configuration

use crate::error::{PeerError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Default per-repository configuration file
pub const DEFAULT_CONFIG_FILE: &str = ".app.json";

/// Key of the peer object inside the configuration file
pub const PEER_CONFIG_KEY: &str = "peer";

/// Account that predates per-account domains and TLS endpoints
pub const LEGACY_ACCOUNT: &str = "articulate";

/// Product used when none is supplied
pub const DEFAULT_PRODUCT: &str = "peer";

/// Immutable per-run values supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalParameters {
    /// Image that replaces locally built images
    pub image_name: String,
    /// Deployment (build) name, e.g. `pr-42-app`
    pub build_name: String,
    /// Account the deployment runs in
    pub account_name: String,
    /// Product the deployment belongs to
    pub product_name: String,
}

impl GlobalParameters {
    /// Create parameters, falling back to the legacy account and default product
    pub fn new(
        image_name: impl Into<String>,
        build_name: impl Into<String>,
        account_name: Option<&str>,
        product_name: Option<&str>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            build_name: build_name.into(),
            account_name: non_empty(account_name)
                .unwrap_or(LEGACY_ACCOUNT)
                .to_string(),
            product_name: non_empty(product_name)
                .unwrap_or(DEFAULT_PRODUCT)
                .to_string(),
        }
    }

    /// Build name with its trailing dash-separated segment removed
    pub fn app_name(&self) -> &str {
        match self.build_name.rsplit_once('-') {
            Some((app, _)) if !app.is_empty() => app,
            _ => &self.build_name,
        }
    }

    /// Image name docker-compose gives the locally built `app` service
    pub fn compose_image_marker(&self) -> String {
        let stripped: String = self
            .app_name()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect();
        format!("{}_app", stripped)
    }

    /// Whether the deployment runs in the legacy account
    pub fn is_legacy_account(&self) -> bool {
        self.account_name == LEGACY_ACCOUNT
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Peer section of the per-repository configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerConfig {
    /// Service name to config key holding that service's environment list
    #[serde(default)]
    pub env_mapping: Option<HashMap<String, String>>,
    /// Environment additions for the primary service
    #[serde(default)]
    pub env: Option<serde_json::Value>,
    /// Service name to container paths bound under the deployment directory
    #[serde(default)]
    pub volumes: Option<HashMap<String, serde_json::Value>>,
    /// Service name to fields set on the service after every other step
    #[serde(default)]
    pub additional_fields: Option<HashMap<String, serde_yaml::Mapping>>,
    /// Variable that receives the computed service address
    #[serde(default)]
    pub service_address_env: Option<String>,
    /// Variable that receives the computed service host
    #[serde(default)]
    pub service_host_env: Option<String>,
    /// Remaining keys, targets of `env_mapping`
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl PeerConfig {
    /// Load the peer section from a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PeerError::ConfigNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse the peer section from configuration file content
    pub fn parse_str(content: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(content)?;
        let object = root
            .as_object()
            .ok_or_else(|| PeerError::Config("top level must be an object".to_string()))?;

        match object.get(PEER_CONFIG_KEY) {
            None => Err(PeerError::Config(format!(
                "missing '{}' object",
                PEER_CONFIG_KEY
            ))),
            Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(peer) => Ok(serde_json::from_value(peer.clone())?),
        }
    }

    /// Config key whose environment list applies to a service
    pub fn mapped_env_key(&self, service: &str) -> Option<&str> {
        self.env_mapping
            .as_ref()
            .and_then(|mapping| mapping.get(service))
            .map(String::as_str)
    }

    /// Environment list stored under a config key
    ///
    /// Missing keys and non-string entries contribute nothing.
    pub fn env_list(&self, key: &str) -> Vec<String> {
        let value = if key == "env" {
            self.env.as_ref()
        } else {
            self.extra.get(key)
        };

        match value {
            Some(value) => string_entries(key, value),
            None => {
                tracing::debug!("Environment key '{}' not present in peer config", key);
                Vec::new()
            }
        }
    }

    /// Container paths to mount for a service
    pub fn volume_paths(&self, service: &str) -> Vec<String> {
        self.volumes
            .as_ref()
            .and_then(|volumes| volumes.get(service))
            .map(|paths| string_entries(&format!("volumes.{}", service), paths))
            .unwrap_or_default()
    }

    /// Field overrides for a service
    pub fn additional_fields_for(&self, service: &str) -> Option<&serde_yaml::Mapping> {
        self.additional_fields
            .as_ref()
            .and_then(|fields| fields.get(service))
    }
}

/// Strings of a list-valued config entry, warning about anything skipped
fn string_entries(key: &str, value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.clone()),
                other => {
                    tracing::warn!("Ignoring non-string entry {} in '{}'", other, key);
                    None
                }
            })
            .collect(),
        serde_json::Value::Null => Vec::new(),
        other => {
            tracing::warn!("Ignoring '{}': expected a list, found {}", key, other);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_name_strips_last_segment() {
        let params = GlobalParameters::new("img:tag", "pr-42-app", None, None);
        assert_eq!(params.app_name(), "pr-42");

        let params = GlobalParameters::new("img:tag", "standalone", None, None);
        assert_eq!(params.app_name(), "standalone");
    }

    #[test]
    fn test_compose_image_marker() {
        let params = GlobalParameters::new("img:tag", "my-service_x-pr7", None, None);
        assert_eq!(params.compose_image_marker(), "myservicex_app");
    }

    #[test]
    fn test_account_defaults_to_legacy() {
        let params = GlobalParameters::new("img", "b-1", None, Some(""));
        assert_eq!(params.account_name, LEGACY_ACCOUNT);
        assert_eq!(params.product_name, DEFAULT_PRODUCT);
        assert!(params.is_legacy_account());

        let params = GlobalParameters::new("img", "b-1", Some("staging"), Some("rise"));
        assert!(!params.is_legacy_account());
        assert_eq!(params.product_name, "rise");
    }

    #[test]
    fn test_parse_peer_config() {
        let json = r#"{
            "name": "ignored",
            "peer": {
                "env": ["FOO=1"],
                "env_mapping": {"worker": "worker_env"},
                "worker_env": ["QUEUE=jobs", 3],
                "volumes": {"db": ["/var/lib/mysql"]},
                "additional_fields": {"app": {"cpu_shares": 512}}
            }
        }"#;

        let config = PeerConfig::parse_str(json).unwrap();
        assert_eq!(config.env_list("env"), vec!["FOO=1".to_string()]);
        assert_eq!(config.mapped_env_key("worker"), Some("worker_env"));
        assert_eq!(config.env_list("worker_env"), vec!["QUEUE=jobs".to_string()]);
        assert!(config.env_list("absent").is_empty());
        assert_eq!(config.volume_paths("db"), vec!["/var/lib/mysql".to_string()]);
        assert!(config.volume_paths("app").is_empty());
        assert!(config.additional_fields_for("app").is_some());
    }

    #[test]
    fn test_null_peer_is_empty_config() {
        let config = PeerConfig::parse_str(r#"{"peer": null}"#).unwrap();
        assert!(config.env.is_none());
        assert!(config.env_mapping.is_none());
    }

    #[test]
    fn test_non_list_entries_are_skipped() {
        let config = PeerConfig::parse_str(
            r#"{"peer": {"env": "FOO=1", "volumes": {"db": "/data", "cache": ["/tmp", 1]}}}"#,
        )
        .unwrap();
        assert!(config.env_list("env").is_empty());
        assert!(config.volume_paths("db").is_empty());
        assert_eq!(config.volume_paths("cache"), vec!["/tmp".to_string()]);
    }

    #[test]
    fn test_missing_peer_is_error() {
        let result = PeerConfig::parse_str(r#"{"name": "app"}"#);
        assert!(matches!(result, Err(PeerError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = PeerConfig::load(&dir.path().join(DEFAULT_CONFIG_FILE));
        assert!(matches!(result, Err(PeerError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"peer": {{"env": ["A=b"]}}}}"#).unwrap();

        let config = PeerConfig::load(&path).unwrap();
        assert_eq!(config.env_list("env"), vec!["A=b".to_string()]);
    }
}
