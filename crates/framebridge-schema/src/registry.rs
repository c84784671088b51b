use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use framebridge_envelope::is_reserved;
use jsonschema::Validator;
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::loader::read_schema_dir;
use crate::strict::close_objects;
use crate::validator::validate_payload;

/// Where a registered schema came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// Registered at runtime from a string or value.
    Inline,
    /// Compiled into the binary.
    Embedded,
    /// Loaded from a schema directory.
    File(PathBuf),
}

struct CommandSchema {
    validator: Validator,
    source: SchemaSource,
}

/// Command-keyed registry of compiled JSON Schema validators.
///
/// The handshake command carries the manifest, not an application payload,
/// so it can never have a schema.
pub struct SchemaRegistry {
    schemas: BTreeMap<String, CommandSchema>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            schemas: BTreeMap::new(),
            config,
        }
    }

    /// Register a schema for `command` from JSON text.
    pub fn register(&mut self, command: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.insert(command, schema, SchemaSource::Inline)
    }

    /// Register a schema for `command`. Replaces any earlier schema.
    pub fn register_value(&mut self, command: &str, schema: &Value) -> Result<()> {
        self.insert(command, schema.clone(), SchemaSource::Inline)
    }

    /// Load every `<command>.schema.json` in `dir`.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        Self::from_directory_with_config(dir, RegistryConfig::default())
    }

    pub fn from_directory_with_config(dir: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        for file in read_schema_dir(dir, &registry.config.directory_limits)? {
            let schema: Value = serde_json::from_str(&file.source)?;
            registry.insert(&file.command, schema, SchemaSource::File(file.path))?;
            tracing::debug!(command = %file.command, "schema loaded");
        }
        Ok(registry)
    }

    /// Build from `(command, schema_json)` pairs compiled into the binary.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (command, schema_json) in schemas {
            let schema: Value = serde_json::from_str(schema_json)?;
            registry.insert(command, schema, SchemaSource::Embedded)?;
        }
        Ok(registry)
    }

    /// Validate `payload` against the schema registered for `command`.
    ///
    /// Commands without a schema pass unless the registry requires one.
    pub fn validate(&self, command: &str, payload: &Value) -> Result<()> {
        match self.schemas.get(command) {
            Some(schema) => validate_payload(command, payload, &schema.validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(command.to_string()))
            }
            None => Ok(()),
        }
    }

    pub fn has_schema(&self, command: &str) -> bool {
        self.schemas.contains_key(command)
    }

    /// Where the schema for `command` came from.
    pub fn source(&self, command: &str) -> Option<&SchemaSource> {
        self.schemas.get(command).map(|schema| &schema.source)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn insert(&mut self, command: &str, mut schema: Value, source: SchemaSource) -> Result<()> {
        if command.is_empty() || is_reserved(command) {
            return Err(SchemaError::InvalidCommand(command.to_string()));
        }
        if self.config.strict_mode {
            close_objects(&mut schema);
        }
        let validator =
            jsonschema::validator_for(&schema).map_err(|err| SchemaError::CompileFailed {
                command: command.to_string(),
                message: err.to_string(),
            })?;
        self.schemas
            .insert(command.to_string(), CommandSchema { validator, source });
        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("commands", &self.commands())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::config::DirectoryLimits;

    const INCREMENT: &str = r#"{
        "type": "object",
        "properties": { "by": { "type": "integer", "minimum": 1 } },
        "required": ["by"]
    }"#;

    const CLICKED: &str = r#"{
        "type": "object",
        "properties": {
            "x": { "type": "number" },
            "y": { "type": "number" },
            "target": { "properties": { "id": { "type": "string" } } }
        },
        "required": ["x", "y"]
    }"#;

    #[test]
    fn payloads_are_checked_per_command() {
        let registry =
            SchemaRegistry::from_embedded(&[("increment", INCREMENT), ("clicked", CLICKED)]).unwrap();

        assert!(registry.validate("increment", &json!({"by": 2})).is_ok());
        assert!(registry.validate("clicked", &json!({"x": 1, "y": 2.5})).is_ok());
        assert!(matches!(
            registry.validate("increment", &json!({"by": 0})),
            Err(SchemaError::ValidationFailed { ref command, .. }) if command == "increment"
        ));
        assert!(registry.validate("clicked", &json!({"by": 2})).is_err());
        assert_eq!(registry.commands(), vec!["clicked", "increment"]);
        assert_eq!(registry.source("clicked"), Some(&SchemaSource::Embedded));
    }

    #[test]
    fn unknown_commands_pass_unless_required() {
        let permissive = SchemaRegistry::new();
        assert!(permissive.validate("reset", &Value::Null).is_ok());

        let required = SchemaRegistry::with_config(RegistryConfig::default().require_schemas());
        assert!(matches!(
            required.validate("reset", &Value::Null),
            Err(SchemaError::NoSchema(ref command)) if command == "reset"
        ));
    }

    #[test]
    fn strict_registry_closes_nested_objects() {
        let mut strict = SchemaRegistry::with_config(RegistryConfig::default().strict());
        strict.register("clicked", CLICKED).unwrap();
        let mut loose = SchemaRegistry::new();
        loose.register("clicked", CLICKED).unwrap();

        let extra_top = json!({"x": 1, "y": 1, "button": "left"});
        let extra_nested = json!({"x": 1, "y": 1, "target": {"id": "a", "tag": "div"}});
        assert!(loose.validate("clicked", &extra_top).is_ok());
        assert!(loose.validate("clicked", &extra_nested).is_ok());
        assert!(strict.validate("clicked", &extra_top).is_err());
        assert!(strict.validate("clicked", &extra_nested).is_err());
        assert!(strict
            .validate("clicked", &json!({"x": 1, "y": 1, "target": {"id": "a"}}))
            .is_ok());
    }

    #[test]
    fn register_value_replaces_earlier_schema() {
        let mut registry = SchemaRegistry::new();
        registry.register("increment", INCREMENT).unwrap();
        registry
            .register_value("increment", &json!({"type": "integer"}))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.validate("increment", &json!(3)).is_ok());
        assert_eq!(registry.source("increment"), Some(&SchemaSource::Inline));
    }

    #[test]
    fn broken_schemas_are_reported() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register("increment", r#"{"type":"definitely-not-a-type"}"#),
            Err(SchemaError::CompileFailed { ref command, .. }) if command == "increment"
        ));
        assert!(matches!(
            registry.register("increment", "{not json"),
            Err(SchemaError::InvalidJson(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn handshake_and_empty_names_cannot_carry_schemas() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register("ready", INCREMENT),
            Err(SchemaError::InvalidCommand(ref command)) if command == "ready"
        ));
        assert!(matches!(
            registry.register("", INCREMENT),
            Err(SchemaError::InvalidCommand(_))
        ));
    }

    #[test]
    fn directory_schemas_are_loaded_with_their_path() {
        let dir = temp_dir("load");
        std::fs::write(dir.join("increment.schema.json"), INCREMENT).unwrap();
        std::fs::write(dir.join("clicked.schema.json"), CLICKED).unwrap();
        std::fs::write(dir.join("README.md"), "not a schema").unwrap();

        let registry = SchemaRegistry::from_directory(&dir).unwrap();
        assert_eq!(registry.commands(), vec!["clicked", "increment"]);
        assert_eq!(
            registry.source("increment"),
            Some(&SchemaSource::File(dir.join("increment.schema.json")))
        );
        assert!(registry.validate("increment", &json!({"by": 5})).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_with_handshake_schema_is_rejected() {
        let dir = temp_dir("reserved");
        std::fs::write(dir.join("ready.schema.json"), INCREMENT).unwrap();

        assert!(matches!(
            SchemaRegistry::from_directory(&dir),
            Err(SchemaError::InvalidCommand(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_limits_are_enforced() {
        let dir = temp_dir("limits");
        std::fs::write(dir.join("increment.schema.json"), INCREMENT).unwrap();
        std::fs::write(dir.join("clicked.schema.json"), CLICKED).unwrap();

        let one_file = RegistryConfig::default().with_directory_limits(DirectoryLimits {
            max_files: 1,
            ..DirectoryLimits::default()
        });
        assert!(matches!(
            SchemaRegistry::from_directory_with_config(&dir, one_file),
            Err(SchemaError::LoadFailed(_))
        ));

        let tiny = RegistryConfig::default().with_directory_limits(DirectoryLimits {
            max_file_bytes: 8,
            ..DirectoryLimits::default()
        });
        assert!(matches!(
            SchemaRegistry::from_directory_with_config(&dir, tiny),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_refused() {
        let dir = temp_dir("symlink");
        let target = dir.join("elsewhere.json");
        std::fs::write(&target, INCREMENT).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("increment.schema.json")).unwrap();

        assert!(matches!(
            SchemaRegistry::from_directory(&dir),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_a_load_failure() {
        let dir = temp_dir("missing").join("absent");
        assert!(matches!(
            SchemaRegistry::from_directory(&dir),
            Err(SchemaError::LoadFailed(_))
        ));
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framebridge-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
