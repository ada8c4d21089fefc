//! peer-compose - rewrite a local docker-compose file for peer deployments
//!
//! Takes the compose file developers run locally and produces the variant the
//! ECS-based peer environment runs, injecting:
//!
//! - Centralized syslog logging
//! - Default memory reservations
//! - Identity, address and service discovery environment
//! - Links derived from `depends_on`
//! - Start commands wrapped with preparation and dependency-wait steps
//! - Deployment-scoped volume mounts

pub mod compose;
pub mod config;
pub mod discovery;
pub mod enrich;
pub mod error;

pub use error::{PeerError, Result};
