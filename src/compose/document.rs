//! Docker Compose document loading and saving

use super::service::ServiceDefinition;
use crate::error::{PeerError, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Default compose file names, in lookup order
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yaml",
    "compose.yml",
];

/// Default name of the rewritten compose file
pub const DEFAULT_OUTPUT_FILE: &str = "docker-compose-ecs.yml";

/// A compose document
///
/// Top-level keys other than `services` are carried through verbatim and in
/// their original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeDocument {
    root: Mapping,
}

impl ComposeDocument {
    /// Find a compose file in a directory
    pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_COMPOSE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Parse a compose file from path
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PeerError::ComposeParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse a compose document from a string
    pub fn parse_str(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| PeerError::ComposeParse(format!("Failed to parse YAML: {}", e)))?;

        match value {
            Value::Mapping(root) => {
                let document = Self { root };
                // Surface shape problems before any service is touched
                document.services()?;
                Ok(document)
            }
            _ => Err(PeerError::ComposeParse(
                "top level must be a mapping".to_string(),
            )),
        }
    }

    /// Services in document order
    pub fn services(&self) -> Result<Vec<(String, ServiceDefinition)>> {
        let services = match self.root.get("services") {
            Some(Value::Mapping(services)) => services,
            Some(Value::Null) | None => return Err(PeerError::MissingServices),
            Some(_) => {
                return Err(PeerError::ComposeParse(
                    "'services' must be a mapping".to_string(),
                ))
            }
        };

        services
            .iter()
            .map(|(name, definition)| {
                let name = name.as_str().ok_or_else(|| {
                    PeerError::ComposeParse("service names must be strings".to_string())
                })?;
                let definition = match definition {
                    Value::Mapping(map) => ServiceDefinition::from(map.clone()),
                    Value::Null => ServiceDefinition::new(),
                    _ => {
                        return Err(PeerError::ComposeParse(format!(
                            "service '{}' must be a mapping",
                            name
                        )))
                    }
                };
                Ok((name.to_string(), definition))
            })
            .collect()
    }

    /// Replace every service, keeping `services` at its original position
    pub fn set_services(&mut self, services: Vec<(String, ServiceDefinition)>) {
        let mapping = services
            .into_iter()
            .map(|(name, definition)| {
                (
                    Value::String(name),
                    Value::Mapping(definition.as_mapping().clone()),
                )
            })
            .collect::<Mapping>();

        self.root
            .insert(Value::String("services".to_string()), Value::Mapping(mapping));
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Write the document to a file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_compose() {
        let yaml = r#"
version: "3.8"
services:
  web:
    image: nginx:latest
    ports:
      - "80:80"
  db:
    image: postgres:13
    environment:
      POSTGRES_PASSWORD: secret
"#;

        let document = ComposeDocument::parse_str(yaml).unwrap();
        let services = document.services().unwrap();
        let names: Vec<&str> = services.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);
    }

    #[test]
    fn test_missing_services() {
        let document = ComposeDocument::parse_str("version: '2'\n");
        assert!(matches!(document, Err(PeerError::MissingServices)));
    }

    #[test]
    fn test_service_must_be_mapping() {
        let document = ComposeDocument::parse_str("services:\n  web: nginx\n");
        assert!(matches!(document, Err(PeerError::ComposeParse(_))));
    }

    #[test]
    fn test_set_services_keeps_other_keys() {
        let yaml = "version: '2'\nservices:\n  web:\n    image: nginx\nvolumes:\n  data: {}\n";
        let mut document = ComposeDocument::parse_str(yaml).unwrap();

        let mut services = document.services().unwrap();
        services[0].1.insert("mem_reservation", "256m");
        document.set_services(services);

        let output = document.to_yaml_string().unwrap();
        let version = output.find("version").unwrap();
        let services = output.find("services").unwrap();
        let volumes = output.find("volumes").unwrap();
        assert!(version < services && services < volumes);
        assert!(output.contains("mem_reservation: 256m"));
    }

    #[test]
    fn test_write_and_find_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ComposeDocument::find_compose_file(dir.path()).is_none());

        let document = ComposeDocument::parse_str("services:\n  app:\n    build: .\n").unwrap();
        let path = dir.path().join("docker-compose.yml");
        document.write_file(&path).unwrap();

        assert_eq!(ComposeDocument::find_compose_file(dir.path()), Some(path.clone()));
        assert_eq!(ComposeDocument::parse_file(&path).unwrap(), document);
    }
}
