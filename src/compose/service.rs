//! Service definition model
//!
//! A service is kept as an ordered YAML mapping so that fields this tool does
//! not know about survive the rewrite untouched. Typed views exist only for the
//! fields the enrichment pipeline reads.

use crate::error::{PeerError, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// Name of the primary application service
pub const PRIMARY_SERVICE: &str = "app";

/// Role of a service within the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The application service built from the repository
    Primary,
    /// Any supporting service
    Secondary,
}

impl Role {
    /// Role for a service name
    pub fn for_service(name: &str) -> Self {
        if name == PRIMARY_SERVICE {
            Role::Primary
        } else {
            Role::Secondary
        }
    }

    pub fn is_primary(self) -> bool {
        self == Role::Primary
    }
}

/// Command configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Shell command string
    Shell(String),
    /// Exec form array
    Exec(Vec<String>),
}

impl Command {
    /// Read a `command` value, rejecting any shape other than string or string array
    pub fn from_value(service: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Command::Shell(s.clone())),
            Value::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(PeerError::InvalidCommand {
                        service: service.to_string(),
                        reason: format!("argument {} is not a string", describe(other)),
                    }),
                })
                .collect::<Result<Vec<_>>>()
                .map(Command::Exec),
            other => Err(PeerError::InvalidCommand {
                service: service.to_string(),
                reason: format!("expected a string or a list, found {}", describe(other)),
            }),
        }
    }
}

/// Labels configuration
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Array of "key=value" strings
    Array(Vec<String>),
    /// Map of key to value
    Map(Mapping),
}

impl Labels {
    /// Read a `labels` value
    pub fn from_value(service: &str, value: Value) -> Result<Self> {
        match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| PeerError::invalid_field(service, "labels", "entries must be scalars"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Labels::Array),
            Value::Mapping(map) => Ok(Labels::Map(map)),
            Value::Null => Ok(Labels::Array(Vec::new())),
            other => Err(PeerError::invalid_field(
                service,
                "labels",
                format!("expected a list or a mapping, found {}", describe(&other)),
            )),
        }
    }

    /// Whether a label with this key is declared
    ///
    /// Array entries match on the part before `=`, so both `key` and
    /// `key=value` count.
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Labels::Array(entries) => entries
                .iter()
                .any(|entry| entry.split_once('=').map_or(entry.as_str(), |(k, _)| k).trim() == key),
            Labels::Map(map) => map.contains_key(key),
        }
    }
}

/// One service of a compose document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ServiceDefinition(Mapping);

impl ServiceDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether a field is set to a non-null value
    pub fn has(&self, field: &str) -> bool {
        !matches!(self.0.get(field), None | Some(Value::Null))
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(Value::String(field.to_string()), value.into())
    }

    /// Remove a field, keeping the order of the others
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Image name, when set as a string
    pub fn image(&self) -> Option<&str> {
        self.0.get("image").and_then(Value::as_str)
    }

    /// Declared command, if any
    pub fn command(&self, service: &str) -> Result<Option<Command>> {
        match self.0.get("command") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Command::from_value(service, value).map(Some),
        }
    }

    /// Read a field that must be a list of scalars
    ///
    /// Absent and null fields read as an empty list.
    pub fn string_list(&self, service: &str, field: &str) -> Result<Vec<String>> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item).ok_or_else(|| {
                        PeerError::invalid_field(service, field, "entries must be scalars")
                    })
                })
                .collect(),
            Some(other) => Err(PeerError::invalid_field(
                service,
                field,
                format!("expected a list, found {}", describe(other)),
            )),
        }
    }

    /// Read `environment` in its list form
    ///
    /// The mapping form is flattened to `KEY=value` entries in declaration
    /// order; a null value yields a bare `KEY`.
    pub fn environment(&self, service: &str) -> Result<Vec<String>> {
        match self.0.get("environment") {
            Some(Value::Mapping(map)) => map
                .iter()
                .map(|(key, value)| {
                    let key = scalar_to_string(key).ok_or_else(|| {
                        PeerError::invalid_field(service, "environment", "keys must be scalars")
                    })?;
                    match value {
                        Value::Null => Ok(key),
                        other => scalar_to_string(other)
                            .map(|v| format!("{}={}", key, v))
                            .ok_or_else(|| {
                                PeerError::invalid_field(
                                    service,
                                    "environment",
                                    format!("value of '{}' must be a scalar", key),
                                )
                            }),
                    }
                })
                .collect(),
            _ => self.string_list(service, "environment"),
        }
    }

    /// Read `depends_on` in either list or condition-mapping form
    pub fn depends_on(&self, service: &str) -> Result<Vec<String>> {
        match self.0.get("depends_on") {
            Some(Value::Mapping(map)) => map
                .keys()
                .map(|key| {
                    scalar_to_string(key).ok_or_else(|| {
                        PeerError::invalid_field(service, "depends_on", "keys must be scalars")
                    })
                })
                .collect(),
            _ => self.string_list(service, "depends_on"),
        }
    }

    /// Replace a field with a list of strings
    pub fn set_string_list(&mut self, field: &str, items: Vec<String>) {
        let sequence = items.into_iter().map(Value::String).collect::<Vec<_>>();
        self.insert(field, Value::Sequence(sequence));
    }

    /// Borrow the underlying mapping
    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }
}

impl From<Mapping> for ServiceDefinition {
    fn from(mapping: Mapping) -> Self {
        Self(mapping)
    }
}

/// Render a scalar YAML value as a string
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(yaml: &str) -> ServiceDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_role_for_service() {
        assert_eq!(Role::for_service("app"), Role::Primary);
        assert_eq!(Role::for_service("worker"), Role::Secondary);
        assert!(!Role::for_service("application").is_primary());
    }

    #[test]
    fn test_command_shapes() {
        let def = service("command: npm start");
        assert_eq!(
            def.command("app").unwrap(),
            Some(Command::Shell("npm start".to_string()))
        );

        let def = service("command: [npm, start]");
        assert_eq!(
            def.command("app").unwrap(),
            Some(Command::Exec(vec!["npm".to_string(), "start".to_string()]))
        );

        let def = service("image: nginx");
        assert_eq!(def.command("app").unwrap(), None);
    }

    #[test]
    fn test_command_rejects_other_shapes() {
        let def = service("command: 42");
        let err = def.command("worker").unwrap_err();
        assert!(err.to_string().contains("worker"));

        let def = service("command: {run: start}");
        assert!(matches!(
            def.command("worker"),
            Err(PeerError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_environment_mapping_form() {
        let def = service("environment:\n  RAILS_ENV: production\n  PORT: 3000\n  EMPTY:\n");
        assert_eq!(
            def.environment("app").unwrap(),
            vec!["RAILS_ENV=production", "PORT=3000", "EMPTY"]
        );
    }

    #[test]
    fn test_depends_on_mapping_form() {
        let def = service("depends_on:\n  db:\n    condition: service_healthy\n  redis:\n    condition: service_started\n");
        assert_eq!(def.depends_on("app").unwrap(), vec!["db", "redis"]);
    }

    #[test]
    fn test_labels_contains_key() {
        let labels = Labels::Array(vec!["peer.discovery".to_string(), "a=b".to_string()]);
        assert!(labels.contains_key("peer.discovery"));
        assert!(labels.contains_key("a"));
        assert!(!labels.contains_key("b"));

        let def = service("labels:\n  peer.discovery: \"true\"\n");
        let labels = Labels::from_value("app", def.get("labels").unwrap().clone()).unwrap();
        assert!(labels.contains_key("peer.discovery"));
    }

    #[test]
    fn test_string_list_rejects_mapping() {
        let def = service("links:\n  db: x\n");
        assert!(matches!(
            def.string_list("app", "links"),
            Err(PeerError::InvalidField { .. })
        ));
    }
}
