//! Lock-free time-series sample router
//!
//! Moves timestamped sample vectors from source nodes to destination nodes
//! through per-path threads, lock-free queues and preallocated pools.

pub mod core;
pub mod engine;
pub mod hooks;
pub mod hot_path;
pub mod infrastructure;
pub mod nodes;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use engine::Engine;
pub use infrastructure::config::{Config, ConfigError};

use thiserror::Error;

/// Main error type of the router
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Queue error: {0}")]
    Queue(#[from] core::QueueError),

    #[error(transparent)]
    Node(#[from] nodes::NodeError),

    #[error(transparent)]
    Hook(#[from] hot_path::HookError),

    #[error(transparent)]
    Path(#[from] hot_path::PathError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RouteError>;
