//! Node abstraction
//!
//! A node is anything samples can be read from or written to. The path
//! engine only ever talks to nodes through this trait; transports live
//! behind it.

use crate::core::SampleRef;

/// Node failure
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node '{node}' does not support {op}")]
    Unsupported { node: String, op: &'static str },

    #[error("invalid configuration for node '{node}': {reason}")]
    Config { node: String, reason: String },

    #[error("node '{node}' is not running")]
    NotRunning { node: String },

    #[error("node '{node}' was closed")]
    Closed { node: String },

    #[error("I/O error on node '{node}': {reason}")]
    Io { node: String, reason: String },
}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Initialized,
    Started,
    Stopped,
}

/// Read/write endpoint
///
/// # Design Notes
/// - Methods take `&self`: a node can be the source of one path and the
///   destination of others at the same time, so implementations keep their
///   own interior synchronization.
/// - `read` may block. It should return periodically (a node-specific
///   deadline) or as soon as [`Node::interrupt`] is called, so a stopping
///   path can leave its loop.
/// - `read` fills `smps[..n]` in order and returns `n`. Every slot is a
///   freshly allocated sample with a single holder, so `get_mut` succeeds.
///   Slots past `n` are released by the caller.
/// - `write` returns how many leading samples were accepted. Samples are
///   shared with other destinations and must not be modified.
pub trait Node: Send + Sync {
    /// Unique instance name
    fn name(&self) -> &str;

    /// Node type name
    fn kind(&self) -> &'static str;

    /// Maximum batch size for read/write, 0 = unlimited
    fn vectorize(&self) -> usize {
        1
    }

    /// Number of values per sample this node produces
    fn signal_count(&self) -> usize;

    fn supports_read(&self) -> bool {
        false
    }

    fn supports_write(&self) -> bool {
        false
    }

    fn start(&self) -> Result<(), NodeError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Make a blocked `read` return early
    fn interrupt(&self) {}

    fn read(&self, _smps: &mut [SampleRef]) -> Result<usize, NodeError> {
        Err(NodeError::Unsupported {
            node: self.name().to_string(),
            op: "read",
        })
    }

    fn write(&self, _smps: &[SampleRef]) -> Result<usize, NodeError> {
        Err(NodeError::Unsupported {
            node: self.name().to_string(),
            op: "write",
        })
    }
}
