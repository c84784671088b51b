//! Optional JSON Schema validation of command payloads.
//!
//! Schemas are keyed by command name. Endpoints holding a registry drop
//! inbound messages whose payload does not match before any handler runs.

pub mod config;
pub mod error;
mod loader;
pub mod registry;
mod strict;
mod validator;

pub use config::{DirectoryLimits, RegistryConfig};
pub use error::{Result, SchemaError};
pub use registry::{SchemaRegistry, SchemaSource};
