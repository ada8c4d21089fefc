//! Whole-document transform

use super::document::ComposeDocument;
use super::service::Role;
use crate::config::{GlobalParameters, PeerConfig};
use crate::discovery::CommandResolver;
use crate::enrich::ServiceEnricher;
use crate::error::Result;

/// Rewrites every service of a compose document for the peer environment
pub struct PeerTransform<'a> {
    enricher: ServiceEnricher<'a>,
    resolver: &'a dyn CommandResolver,
}

impl<'a> PeerTransform<'a> {
    /// Create a transform
    pub fn new(
        params: &'a GlobalParameters,
        config: &'a PeerConfig,
        resolver: &'a dyn CommandResolver,
    ) -> Self {
        Self {
            enricher: ServiceEnricher::new(params, config),
            resolver,
        }
    }

    /// Enrich all services in document order
    ///
    /// The document is only updated once every service succeeded.
    pub fn apply(&self, document: &mut ComposeDocument) -> Result<()> {
        let services = document.services()?;
        tracing::info!("Rewriting {} services", services.len());

        let mut enriched = Vec::with_capacity(services.len());
        for (name, definition) in services {
            let discovered = match Role::for_service(&name) {
                Role::Primary if definition.command(&name)?.is_none() => {
                    self.resolver.resolve(&name, &definition)?
                }
                _ => None,
            };

            let definition = self
                .enricher
                .enrich(&name, &definition, discovered.as_ref())?;
            tracing::info!("Enriched service {}", name);
            enriched.push((name, definition));
        }

        document.set_services(enriched);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::service::Command;
    use crate::discovery::{NoDiscovery, StaticCommand};
    use crate::error::PeerError;
    use serde_yaml::Value;

    fn default_params() -> GlobalParameters {
        GlobalParameters::new("img:tag", "pr-42-app", None, None)
    }

    #[test]
    fn test_end_to_end_primary_without_command() {
        let params = default_params();
        let config = PeerConfig::parse_str(r#"{"peer": {"env": ["FOO=1"]}}"#).unwrap();
        let transform = PeerTransform::new(&params, &config, &NoDiscovery);

        let mut document = ComposeDocument::parse_str("services:\n  app:\n    build: .\n").unwrap();
        transform.apply(&mut document).unwrap();

        let services = document.services().unwrap();
        let (name, app) = &services[0];
        assert_eq!(name, "app");
        assert_eq!(app.image(), Some("img:tag"));
        assert!(app.get("build").is_none());
        assert_eq!(app.get("mem_reservation"), Some(&Value::from("256m")));
        assert!(app.get("command").is_none());
        assert_eq!(app.get("links"), Some(&Value::Sequence(Vec::new())));
        assert_eq!(app.get("volumes"), Some(&Value::Sequence(Vec::new())));

        let env = app.string_list("app", "environment").unwrap();
        assert_eq!(
            env,
            vec![
                "FOO=1",
                "APP_NAME=pr-42",
                "APP_ENV=peer-pr-42-app",
                "VAULT_ADDR=http://vault.priv",
                "CONSUL_ADDR=consul.priv:8500",
                "PEER_HOST=pr-42-app.peer.articulate.zone",
                "PEER_DEPLOYMENT=peer-pr-42-app",
            ]
        );
    }

    #[test]
    fn test_discovered_command_only_for_primary() {
        let params = default_params();
        let config = PeerConfig::default();
        let resolver = StaticCommand(Some(Command::Shell("bin/start".to_string())));
        let transform = PeerTransform::new(&params, &config, &resolver);

        let yaml = "services:\n  app:\n    build: .\n  worker:\n    image: pr42_app\n";
        let mut document = ComposeDocument::parse_str(yaml).unwrap();
        transform.apply(&mut document).unwrap();

        let services = document.services().unwrap();
        assert_eq!(
            services[0].1.string_list("app", "command").unwrap(),
            vec!["bash", "-c", "make pr-prepare && bin/start"]
        );
        assert!(services[1].1.get("command").is_none());
        assert_eq!(services[1].1.image(), Some("img:tag"));
    }

    #[test]
    fn test_failure_leaves_document_unchanged() {
        let params = default_params();
        let config = PeerConfig::default();
        let transform = PeerTransform::new(&params, &config, &NoDiscovery);

        let yaml = "services:\n  web:\n    image: nginx\n  bad:\n    image: x\n    command: {a: b}\n";
        let mut document = ComposeDocument::parse_str(yaml).unwrap();
        let before = document.clone();

        let err = transform.apply(&mut document).unwrap_err();
        match err {
            PeerError::InvalidCommand { service, .. } => assert_eq!(service, "bad"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(document, before);
    }
}
