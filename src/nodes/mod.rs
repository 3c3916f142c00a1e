//! Node implementations
//!
//! Node types are looked up by name through a [`NodeRegistry`] when the
//! configuration is loaded.

pub mod loopback;
pub mod signal;
pub mod traits;

pub use loopback::{LoopbackNode, LoopbackSettings};
pub use signal::{SignalNode, SignalSettings, Waveform};
pub use traits::{Node, NodeError, NodeState};

use std::collections::HashMap;
use std::sync::Arc;

/// Builds a node instance from its name and `[nodes.<name>]` table
pub type NodeFactory = fn(&str, &toml::Table) -> Result<Arc<dyn Node>, NodeError>;

/// Table of known node types
pub struct NodeRegistry {
    factories: HashMap<&'static str, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in node type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("signal", |name, cfg| {
            Ok(Arc::new(SignalNode::from_config(name, cfg)?) as Arc<dyn Node>)
        });
        registry.register("loopback", |name, cfg| {
            Ok(Arc::new(LoopbackNode::from_config(name, cfg)?) as Arc<dyn Node>)
        });
        registry
    }

    /// Add or replace a node type
    pub fn register(&mut self, kind: &'static str, factory: NodeFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate a node of type `kind`
    pub fn create(&self, kind: &str, name: &str, cfg: &toml::Table) -> Result<Arc<dyn Node>, NodeError> {
        let factory = self.factories.get(kind).ok_or_else(|| NodeError::Config {
            node: name.to_string(),
            reason: format!("unknown node type '{kind}'"),
        })?;
        factory(name, cfg)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
