//! Configuration of the memory arena behind the local chunk service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ChunkSchemaError, Result};

/// Types of arena backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackingType {
    /// Private anonymous mapping, gone with the process
    #[default]
    Anonymous,
    /// File-backed mapping
    FileBacked,
    /// Anonymous memory file descriptor (Linux-specific)
    #[cfg(target_os = "linux")]
    MemFd,
}

impl BackingType {
    /// Check if this backing type is supported on the current platform
    pub fn is_supported(&self) -> bool {
        match self {
            BackingType::Anonymous | BackingType::FileBacked => true,
            #[cfg(target_os = "linux")]
            BackingType::MemFd => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackingType::Anonymous => "anonymous",
            BackingType::FileBacked => "file-backed",
            #[cfg(target_os = "linux")]
            BackingType::MemFd => "memfd",
        }
    }
}

/// Configuration for the local chunk store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the arena (memfd name, default file name)
    pub name: String,
    /// Total arena size in bytes
    pub capacity: usize,
    pub backing_type: BackingType,
    /// File path for file-backed arenas
    pub file_path: Option<PathBuf>,
    /// Create (and size) the backing file if it doesn't exist
    pub create: bool,
    /// Unix permissions of a created backing file
    pub permissions: u32,
    /// Start alignment of every chunk, a power of two
    pub alignment: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "chunkschema".to_string(),
            capacity: crate::config::DEFAULT_ARENA_CAPACITY,
            backing_type: BackingType::default(),
            file_path: None,
            create: true,
            permissions: 0o644,
            alignment: crate::config::DEFAULT_ALIGNMENT,
        }
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            ..Default::default()
        }
    }

    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Set the file path; implies file backing
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self.backing_type = BackingType::FileBacked;
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ChunkSchemaError::invalid_argument(
                "name",
                "Arena name cannot be empty",
            ));
        }

        if self.capacity == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "capacity",
                "Arena capacity must be greater than 0",
            ));
        }

        if !self.alignment.is_power_of_two() {
            return Err(ChunkSchemaError::invalid_argument(
                "alignment",
                format!("Alignment {} is not a power of two", self.alignment),
            ));
        }

        if !self.backing_type.is_supported() {
            return Err(ChunkSchemaError::invalid_argument(
                "backing_type",
                format!(
                    "Backing type {} is not supported on this platform",
                    self.backing_type.name()
                ),
            ));
        }

        if self.backing_type == BackingType::FileBacked && !self.create && self.file_path.is_none() {
            return Err(ChunkSchemaError::invalid_argument(
                "file_path",
                "File path must be specified for existing file-backed arenas",
            ));
        }

        Ok(())
    }

    /// Path of the backing file for file-backed arenas
    pub fn default_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("chunkschema_{}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_validate() {
        let config = StoreConfig::new("arena", 4096)
            .with_alignment(16)
            .with_permissions(0o600);
        assert!(config.validate().is_ok());
        assert_eq!(config.backing_type, BackingType::Anonymous);

        let file = StoreConfig::new("arena", 4096).with_file_path("/tmp/x");
        assert_eq!(file.backing_type, BackingType::FileBacked);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(StoreConfig::new("", 4096).validate().is_err());
        assert!(StoreConfig::new("a", 0).validate().is_err());
        assert!(StoreConfig::new("a", 4096).with_alignment(3).validate().is_err());
        assert!(StoreConfig::new("a", 4096)
            .with_backing_type(BackingType::FileBacked)
            .with_create(false)
            .validate()
            .is_err());
    }
}
