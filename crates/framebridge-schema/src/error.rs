/// Errors raised while loading schemas or validating payloads.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema directory or file could not be read.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// Schema rejected by the JSON Schema compiler.
    #[error("failed to compile schema for command '{command}': {message}")]
    CompileFailed { command: String, message: String },

    /// Schema registered under an empty or reserved command name.
    #[error("cannot register a schema for command '{0}'")]
    InvalidCommand(String),

    /// Payload does not match the command's schema.
    #[error("validation failed for command '{command}': {message}")]
    ValidationFailed { command: String, message: String },

    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No schema for the command and the registry requires one.
    #[error("no schema registered for command '{0}'")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
