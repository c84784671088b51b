/// Bounds applied when loading schemas from a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryLimits {
    /// Most `<command>.schema.json` files accepted from one directory.
    pub max_files: usize,
    /// Largest accepted schema file, in bytes.
    pub max_file_bytes: usize,
}

impl Default for DirectoryLimits {
    fn default() -> Self {
        Self {
            max_files: 256,
            max_file_bytes: 256 * 1024,
        }
    }
}

/// Validation policy of a [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Close every object schema that does not set `additionalProperties`.
    pub strict_mode: bool,
    /// Reject payloads for commands that have no schema.
    pub fail_on_missing_schema: bool,
    pub directory_limits: DirectoryLimits,
}

impl RegistryConfig {
    /// Enable strict mode.
    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Require a schema for every validated command.
    pub fn require_schemas(mut self) -> Self {
        self.fail_on_missing_schema = true;
        self
    }

    pub fn with_directory_limits(mut self, limits: DirectoryLimits) -> Self {
        self.directory_limits = limits;
        self
    }
}
