//! Default command discovery
//!
//! The enrichment core never inspects the filesystem. When the primary
//! service declares no command, the orchestrator asks a [`CommandResolver`]
//! for the image's default command and hands the result to the core.

use crate::compose::service::{Command, ServiceDefinition};
use crate::error::Result;
use regex::Regex;
use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Default build file name
pub const DEFAULT_BUILD_FILE: &str = "Dockerfile";

static CMD_INSTRUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^CMD\s+(.+)$").expect("valid CMD pattern"));

/// Source of a service's default command
pub trait CommandResolver {
    /// Discover the default command for a service, if it has one
    fn resolve(&self, service: &str, definition: &ServiceDefinition) -> Result<Option<Command>>;
}

/// Resolver that never finds a command
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscovery;

impl CommandResolver for NoDiscovery {
    fn resolve(&self, _service: &str, _definition: &ServiceDefinition) -> Result<Option<Command>> {
        Ok(None)
    }
}

/// Resolver returning a fixed, already known command
#[derive(Debug, Clone, Default)]
pub struct StaticCommand(pub Option<Command>);

impl CommandResolver for StaticCommand {
    fn resolve(&self, _service: &str, _definition: &ServiceDefinition) -> Result<Option<Command>> {
        Ok(self.0.clone())
    }
}

/// Resolver reading the last `CMD` instruction of the service's Dockerfile
#[derive(Debug, Clone)]
pub struct DockerfileResolver {
    /// Directory build contexts are relative to
    base_dir: PathBuf,
    /// Explicit Dockerfile, overriding the build configuration
    dockerfile: Option<PathBuf>,
}

impl DockerfileResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dockerfile: None,
        }
    }

    /// Always read this Dockerfile
    pub fn dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }

    /// Dockerfile location for a service
    ///
    /// Follows `build: <context>` and `build: {context, dockerfile}`; anything
    /// else falls back to the base directory.
    fn dockerfile_path(&self, definition: &ServiceDefinition) -> PathBuf {
        if let Some(path) = &self.dockerfile {
            return path.clone();
        }

        let (context, file) = match definition.get("build") {
            Some(Value::String(context)) => (Some(context.as_str()), None),
            Some(Value::Mapping(build)) => (
                build.get("context").and_then(Value::as_str),
                build.get("dockerfile").and_then(Value::as_str),
            ),
            _ => (None, None),
        };

        let context_dir = self.base_dir.join(context.unwrap_or("."));
        context_dir.join(file.unwrap_or(DEFAULT_BUILD_FILE))
    }
}

impl CommandResolver for DockerfileResolver {
    fn resolve(&self, service: &str, definition: &ServiceDefinition) -> Result<Option<Command>> {
        let path = self.dockerfile_path(definition);
        if !path.exists() {
            tracing::debug!("No build file at {} for service {}", path.display(), service);
            return Ok(None);
        }

        let command = parse_default_command(&std::fs::read_to_string(&path)?);
        match &command {
            Some(cmd) => tracing::debug!("Discovered default command {:?} in {}", cmd, path.display()),
            None => tracing::debug!("No CMD instruction in {}", path.display()),
        }

        Ok(command)
    }
}

/// Read the last `CMD` instruction of a build file
pub fn parse_default_command(content: &str) -> Option<Command> {
    logical_lines(content)
        .iter()
        .filter_map(|line| CMD_INSTRUCTION.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| parse_cmd(m.as_str().trim())))
        .last()
}

/// Join continued lines and drop blanks and comments
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut continued_line = String::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(line_without_backslash) = line.strip_suffix('\\') {
            continued_line.push_str(line_without_backslash);
            continued_line.push(' ');
            continue;
        }

        continued_line.push_str(line);
        lines.push(std::mem::take(&mut continued_line));
    }

    if !continued_line.is_empty() {
        lines.push(continued_line);
    }

    lines
}

fn parse_cmd(args: &str) -> Command {
    if args.starts_with('[') {
        if let Ok(command) = serde_json::from_str::<Vec<String>>(args) {
            return Command::Exec(command);
        }
    }
    Command::Shell(args.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_form_cmd() {
        let content = r#"
FROM ruby:3.2
WORKDIR /app
CMD ["bundle", "exec", "puma"]
"#;
        assert_eq!(
            parse_default_command(content),
            Some(Command::Exec(vec![
                "bundle".to_string(),
                "exec".to_string(),
                "puma".to_string()
            ]))
        );
    }

    #[test]
    fn test_shell_form_and_last_wins() {
        let content = r#"
FROM node:20 AS build
CMD ["node", "build.js"]

FROM node:20-slim
# final command
cmd npm run \
    start
"#;
        assert_eq!(
            parse_default_command(content),
            Some(Command::Shell("npm run  start".to_string()))
        );
    }

    #[test]
    fn test_no_cmd() {
        assert_eq!(parse_default_command("FROM alpine\nRUN true\n"), None);
    }

    #[test]
    fn test_dockerfile_resolver_follows_build_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("api")).unwrap();
        std::fs::write(
            dir.path().join("api").join("Dockerfile.prod"),
            "FROM alpine\nCMD ./serve\n",
        )
        .unwrap();

        let definition: ServiceDefinition =
            serde_yaml::from_str("build:\n  context: api\n  dockerfile: Dockerfile.prod\n").unwrap();
        let resolver = DockerfileResolver::new(dir.path());
        assert_eq!(
            resolver.resolve("app", &definition).unwrap(),
            Some(Command::Shell("./serve".to_string()))
        );
    }

    #[test]
    fn test_dockerfile_resolver_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let definition: ServiceDefinition = serde_yaml::from_str("build: .\n").unwrap();
        let resolver = DockerfileResolver::new(dir.path());
        assert_eq!(resolver.resolve("app", &definition).unwrap(), None);
    }

    #[test]
    fn test_explicit_dockerfile_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Custom");
        std::fs::write(&path, "FROM alpine\nCMD [\"run\"]\n").unwrap();

        let resolver = DockerfileResolver::new("/nonexistent").dockerfile(&path);
        assert_eq!(
            resolver.resolve("app", &ServiceDefinition::new()).unwrap(),
            Some(Command::Exec(vec!["run".to_string()]))
        );
    }
}
