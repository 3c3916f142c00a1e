//! Core Application Engine
//!
//! Owns every node and path of a configuration and drives their lifecycle.
//! Nodes start before the paths that use them and stop after them.

use crate::hot_path::{HookRegistry, Path};
use crate::infrastructure::config::{type_of, Config};
use crate::nodes::{Node, NodeRegistry};
use crate::{Result, RouteError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;

/// Main engine managing nodes and paths
pub struct Engine {
    nodes: BTreeMap<String, Arc<dyn Node>>,
    paths: Vec<Path>,
    running: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            paths: Vec::new(),
            running: false,
        }
    }

    /// Build nodes and paths from a validated configuration
    ///
    /// Paths with `enabled = false` are skipped. Their nodes are still
    /// created.
    pub fn from_config(config: &Config, nodes: &NodeRegistry, hooks: &HookRegistry) -> Result<Self> {
        config.validate(nodes, hooks)?;

        let mut engine = Self::new();

        for (name, table) in &config.nodes {
            let kind = type_of(table).unwrap_or_default();
            let node = nodes.create(kind, name, table)?;
            crate::log_node!(Level::DEBUG, node = %name, kind, "Node created");
            engine.add_node(node)?;
        }

        for section in &config.paths {
            let path_config = section.path_config();
            if !path_config.enabled {
                tracing::info!(target: "path", source = %section.input, "Path disabled, skipping");
                continue;
            }

            let source = engine.lookup(&section.input)?;
            let mut path = Path::new(source, path_config);
            for out in &section.out {
                path.add_destination(engine.lookup(out)?)?;
            }
            for table in &section.hooks {
                let kind = type_of(table).unwrap_or_default();
                path.add_hook(hooks.create(kind, table)?)?;
            }
            path.attach_builtins(hooks)?;
            path.check()?;

            engine.add_path(path);
        }

        tracing::info!(
            target: "engine",
            nodes = engine.nodes.len(),
            paths = engine.paths.len(),
            "Engine configured"
        );

        Ok(engine)
    }

    /// Register a node under its own name
    pub fn add_node(&mut self, node: Arc<dyn Node>) -> Result<()> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(RouteError::Engine(format!("duplicate node '{name}'")));
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    pub fn add_path(&mut self, path: Path) {
        self.paths.push(path);
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Node>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| RouteError::Engine(format!("unknown node '{name}'")))
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    /// Path by its display name, `"src => dst1 dst2"`
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.paths.iter().find(|p| p.name() == name)
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start every node, then every path
    ///
    /// On failure everything started so far is stopped again.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }

        crate::log_engine!(Level::INFO, "Starting engine with {} nodes and {} paths", self.nodes.len(), self.paths.len());

        let mut started = Vec::new();
        for (name, node) in &self.nodes {
            if let Err(e) = node.start() {
                crate::log_node!(Level::ERROR, node = %name, "Failed to start node: {}", e);
                stop_nodes(&started);
                return Err(e.into());
            }
            crate::log_node!(Level::DEBUG, node = %name, "Node started");
            started.push(Arc::clone(node));
        }

        for i in 0..self.paths.len() {
            if let Err(e) = self.paths[i].start() {
                tracing::error!(target: "path", path = %self.paths[i].name(), "Failed to start path: {}", e);
                for path in &mut self.paths[..i] {
                    if let Err(e) = path.stop() {
                        tracing::warn!(target: "path", path = %path.name(), "Failed to stop path: {}", e);
                    }
                }
                stop_nodes(&started);
                return Err(e.into());
            }
        }

        self.running = true;
        Ok(())
    }

    /// Run the periodic callbacks of every path's hooks
    pub fn periodic(&self) {
        for path in &self.paths {
            path.periodic();
        }
    }

    /// Stop every path, then every node
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        let mut first_err: Option<RouteError> = None;
        for path in &mut self.paths {
            if let Err(e) = path.stop() {
                tracing::warn!(target: "path", path = %path.name(), "Failed to stop path: {}", e);
                first_err.get_or_insert(e.into());
            }
        }
        for (name, node) in &self.nodes {
            if let Err(e) = node.stop() {
                crate::log_node!(Level::WARN, node = %name, "Failed to stop node: {}", e);
                first_err.get_or_insert(e.into());
            }
        }

        self.running = false;
        crate::log_engine!(Level::INFO, "Engine stopped");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(target: "engine", "Failed to stop engine: {}", e);
        }
    }
}

fn stop_nodes(nodes: &[Arc<dyn Node>]) {
    for node in nodes {
        if let Err(e) = node.stop() {
            crate::log_node!(Level::WARN, node = %node.name(), "Failed to stop node: {}", e);
        }
    }
}
