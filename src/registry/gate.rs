//! One-time bootstrap gate

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chunk::{ChunkService, NodeId};
use crate::error::{ChunkSchemaError, Result};

/// Lets exactly one bootstrap through
///
/// Detects both sequential and concurrent re-entry.
#[derive(Debug, Default)]
pub struct InitGate {
    passed: AtomicBool,
}

impl InitGate {
    pub const fn new() -> Self {
        Self {
            passed: AtomicBool::new(false),
        }
    }

    /// Pass the gate; every call after the first fails
    pub fn enter(&self) -> Result<()> {
        self.passed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ChunkSchemaError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.passed.load(Ordering::Acquire)
    }
}

/// Gate guarding [`TypeRegistry::init`](super::TypeRegistry::init)
pub(crate) static PROCESS_GATE: InitGate = InitGate::new();

/// Capabilities handed to the registry once, at process start
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub node_id: NodeId,
    pub service: Arc<dyn ChunkService>,
}

impl Bootstrap {
    pub fn new(node_id: NodeId, service: Arc<dyn ChunkService>) -> Self {
        Self { node_id, service }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_opens_once() {
        let gate = InitGate::new();
        assert!(!gate.is_initialized());
        gate.enter().unwrap();
        assert!(gate.is_initialized());
        assert!(matches!(gate.enter(), Err(ChunkSchemaError::AlreadyInitialized)));
    }

    #[test]
    fn test_concurrent_entry_lets_one_through() {
        let gate = Arc::new(InitGate::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.enter().is_ok())
            })
            .collect();
        let passed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(passed, 1);
    }
}
