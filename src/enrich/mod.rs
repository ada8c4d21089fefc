//! Per-service enrichment
//!
//! This module turns one local-development service definition into its
//! deployment-ready form. It performs no I/O: everything it needs, including
//! the discovered default command of the primary service, is passed in.

pub mod command;
pub mod env;
pub mod steps;

use crate::compose::service::{Command, Labels, Role, ServiceDefinition};
use crate::config::{GlobalParameters, PeerConfig};
use crate::error::Result;

pub use steps::{Step, PIPELINE};

/// Read-only inputs shared by every step
#[derive(Debug, Clone, Copy)]
pub struct EnrichContext<'a> {
    pub params: &'a GlobalParameters,
    pub config: &'a PeerConfig,
    /// Default command discovered for the service, if any
    pub default_command: Option<&'a Command>,
}

impl<'a> EnrichContext<'a> {
    pub fn new(
        params: &'a GlobalParameters,
        config: &'a PeerConfig,
        default_command: Option<&'a Command>,
    ) -> Self {
        Self {
            params,
            config,
            default_command,
        }
    }
}

/// Snapshot of a service as it moves through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub name: String,
    pub role: Role,
    pub definition: ServiceDefinition,
    /// Labels captured before they are stripped from the definition
    pub labels: Option<Labels>,
    /// Whether `mem_reservation` holds the default rather than a declared value
    pub reservation_defaulted: bool,
}

impl ServiceRecord {
    pub fn new(name: &str, definition: ServiceDefinition) -> Self {
        Self {
            name: name.to_string(),
            role: Role::for_service(name),
            definition,
            labels: None,
            reservation_defaulted: false,
        }
    }
}

/// Applies the enrichment pipeline to single services
#[derive(Debug, Clone, Copy)]
pub struct ServiceEnricher<'a> {
    params: &'a GlobalParameters,
    config: &'a PeerConfig,
}

impl<'a> ServiceEnricher<'a> {
    pub fn new(params: &'a GlobalParameters, config: &'a PeerConfig) -> Self {
        Self { params, config }
    }

    /// Enrich one service
    ///
    /// The input definition is left untouched; on error nothing of the
    /// partially enriched copy escapes.
    pub fn enrich(
        &self,
        name: &str,
        definition: &ServiceDefinition,
        default_command: Option<&Command>,
    ) -> Result<ServiceDefinition> {
        let ctx = EnrichContext::new(self.params, self.config, default_command);
        let mut record = ServiceRecord::new(name, definition.clone());

        tracing::debug!("Enriching service {} as {:?}", name, record.role);

        for (step_name, step) in PIPELINE {
            tracing::trace!("Service {}: {}", name, step_name);
            record = step(record, &ctx)?;
        }

        Ok(record.definition)
    }
}
