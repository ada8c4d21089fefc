//! Docker Compose documents
//!
//! Loading, saving and the document-wide rewrite for the peer environment.

pub mod document;
pub mod orchestrator;
pub mod service;

pub use document::ComposeDocument;
pub use orchestrator::PeerTransform;
pub use service::{Command, Labels, Role, ServiceDefinition};
