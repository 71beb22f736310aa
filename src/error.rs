//! Error types and handling for chunkschema

/// Result type alias for chunkschema operations
pub type Result<T> = std::result::Result<T, ChunkSchemaError>;

/// Every failure the core can report.
///
/// All variants are fail-fast: the operation that detects one aborts
/// immediately and nothing is downgraded to a default value.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSchemaError {
    /// Null/dangling reference where a value is required, bad counts or sizes
    #[error("Invalid argument: {parameter} - {message}")]
    InvalidArgument { parameter: String, message: String },

    /// Decode ran out of input
    #[error("Truncated stream: needed {needed} bytes, {remaining} remaining")]
    TruncatedStream { needed: usize, remaining: usize },

    /// Bootstrap was attempted a second time in this process
    #[error("Type registry already initialized")]
    AlreadyInitialized,

    /// Operation on an unregistered or removed chunk, schema or type
    #[error("Unknown handle: {handle}")]
    UnknownHandle { handle: String },

    /// A schema cannot be given the requested representation
    #[error("Schema violation in {schema}: {message}")]
    SchemaViolation { schema: String, message: String },

    /// I/O related errors of the backing arena (file operations, mmap)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Memory mapping or platform failures of the backing arena
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// The backing arena has no room for the allocation
    #[error("Insufficient space: requested {requested}, available {available}")]
    InsufficientSpace { requested: usize, available: usize },

    /// Poisoned locks in the local chunk service
    #[error("Concurrency error: {message}")]
    Concurrency { message: String },
}

impl ChunkSchemaError {
    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a truncated stream error
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Self::TruncatedStream { needed, remaining }
    }

    /// Create an unknown handle error
    pub fn unknown_handle(handle: impl std::fmt::Display) -> Self {
        Self::UnknownHandle {
            handle: handle.to_string(),
        }
    }

    /// Create a schema violation error
    pub fn schema_violation(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an insufficient space error
    pub fn insufficient_space(requested: usize, available: usize) -> Self {
        Self::InsufficientSpace {
            requested,
            available,
        }
    }

    /// Create a concurrency error
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// True for the taxonomy a caller must treat as a programming or schema error
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::TruncatedStream { .. }
                | Self::AlreadyInitialized
                | Self::UnknownHandle { .. }
                | Self::SchemaViolation { .. }
        )
    }
}

impl From<std::io::Error> for ChunkSchemaError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChunkSchemaError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::concurrency(format!("lock poisoned: {}", err))
    }
}
