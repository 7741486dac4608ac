//! Engine error types
//!
//! Only recoverable conditions live here. Broken programming contracts go
//! through [`contract_violation!`](crate::contract_violation) and abort, and a
//! rejected post is reported as `false` rather than as an error.

use std::io;

/// Errors produced while validating or parsing configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A feature name that the engine does not know about
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// Initial capacity larger than the maximum number of threads
    #[error("Initial capacity {initial} exceeds max threads {max}")]
    InvalidCapacity {
        /// Requested initial capacity
        initial: usize,
        /// Requested maximum number of threads
        max: usize,
    },

    /// A pool needs at least one thread
    #[error("Thread pool needs at least one thread")]
    ZeroThreads,
}

/// Errors produced by the engine at runtime
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The OS refused to create a thread
    #[error("Failed to spawn thread: {0}")]
    WorkerSpawn(#[source] io::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
