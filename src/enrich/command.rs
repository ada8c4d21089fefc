//! Start command resolution and composition

use crate::compose::service::{Command, Role, ServiceDefinition};
use crate::error::{PeerError, Result};

/// Shell that runs the composed command
pub const SHELL: &str = "bash";

/// Step preparing the primary service before it starts
pub const PREPARE_STEP: &str = "make pr-prepare";

/// Step blocking until linked backing services accept connections
pub const WAIT_STEP: &str = "make pr-wait";

/// Links that require waiting for a backing service, matched exactly
pub const DEPENDENCY_SERVICES: &[&str] = &[
    "db",
    "database",
    "mysql",
    "mariadb",
    "postgres",
    "postgresql",
    "redis",
    "memcached",
    "mongo",
    "mongodb",
    "elasticsearch",
    "opensearch",
];

/// Effective start command of a service
///
/// The declared command wins; the primary service falls back to the
/// discovered default. Empty commands count as unresolved.
pub fn resolve_command(
    service: &str,
    definition: &ServiceDefinition,
    role: Role,
    discovered: Option<&Command>,
) -> Result<Option<Command>> {
    let command = match definition.command(service)? {
        Some(command) => Some(command),
        None if role.is_primary() => discovered.cloned(),
        None => None,
    };

    Ok(command.map(expand_serialized).filter(|command| match command {
        Command::Shell(s) => !s.trim().is_empty(),
        Command::Exec(args) => !args.is_empty(),
    }))
}

/// Turn a string holding a JSON array into its arguments
fn expand_serialized(command: Command) -> Command {
    match command {
        Command::Shell(s) if s.trim_start().starts_with('[') => {
            match serde_json::from_str::<Vec<String>>(s.trim()) {
                Ok(args) => Command::Exec(args),
                Err(_) => Command::Shell(s),
            }
        }
        other => other,
    }
}

/// Whether any link names a backing service worth waiting for
pub fn needs_dependency_wait(links: &[String]) -> bool {
    links.iter().any(|link| {
        let service = link.split_once(':').map_or(link.as_str(), |(name, _)| name);
        DEPENDENCY_SERVICES.contains(&service)
    })
}

/// Characters that let a shell string escape an `&&` chain
const CONTROL_CHARS: &[char] = &[';', '&', '|', '\n', '#'];

/// Render a command as one shell step
///
/// A shell string that could end or branch the chain it is appended to is
/// wrapped in a brace group, so a failing earlier step still stops it.
fn command_step(command: &Command, chained: bool) -> Result<String> {
    match command {
        Command::Shell(s) if chained && s.contains(CONTROL_CHARS) => Ok(format!("{{ {}\n}}", s)),
        Command::Shell(s) => Ok(s.clone()),
        Command::Exec(args) => shlex::try_join(args.iter().map(String::as_str))
            .map_err(|e| PeerError::Quote(e.to_string())),
    }
}

/// Wrap a command with the injected steps as a single shell invocation
pub fn compose_command(command: &Command, role: Role, links: &[String]) -> Result<Vec<String>> {
    let mut steps = Vec::new();

    if needs_dependency_wait(links) {
        steps.push(WAIT_STEP.to_string());
    }
    if role.is_primary() {
        steps.push(PREPARE_STEP.to_string());
    }
    let chained = !steps.is_empty();
    steps.push(command_step(command, chained)?);

    Ok(vec![SHELL.to_string(), "-c".to_string(), steps.join(" && ")])
}
