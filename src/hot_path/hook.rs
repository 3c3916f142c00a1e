//! Hook abstraction
//!
//! A hook is one stage of a path's processing pipeline. Every callback is
//! optional; the default implementations do nothing. Hooks are created by
//! name through a [`HookRegistry`] and wrapped in a [`HookInstance`] that
//! enforces the lifecycle:
//!
//! ```text
//! destroyed -> initialized -> parsed -> started -> stopped -> destroyed
//! ```

use crate::core::{Sample, SampleRef, SampleTimestamps};
use crate::infrastructure::metrics::PathStats;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Hook failure
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("unknown hook type '{0}'")]
    Unknown(String),

    #[error("invalid configuration for hook '{hook}': {reason}")]
    Config { hook: &'static str, reason: String },

    #[error("hook '{hook}' failed: {reason}")]
    Failed { hook: &'static str, reason: String },
}

/// Deserialize a hook's settings from its configuration table
///
/// Unknown keys (`type`, `priority`, ...) are ignored.
pub fn parse_settings<T: DeserializeOwned>(hook: &'static str, cfg: &toml::Table) -> Result<T, HookError> {
    toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| HookError::Config {
            hook,
            reason: e.message().to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Destroyed,
    Initialized,
    Parsed,
    Started,
    Stopped,
}

/// Copy of the fields of a sample a hook remembers between batches
///
/// Hooks keep these instead of sample handles so that remembering a sample
/// never makes it shared (and read-only) for later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleMeta {
    pub sequence: u64,
    pub ts: SampleTimestamps,
}

impl From<&Sample> for SampleMeta {
    #[inline]
    fn from(smp: &Sample) -> Self {
        Self {
            sequence: smp.sequence,
            ts: smp.ts,
        }
    }
}

/// Per-call context handed to hooks by the owning path
pub struct HookContext<'a> {
    path: &'a str,
    stats: &'a PathStats,
    /// Restarts requested by the current hook
    restarts: usize,
    /// Batch index of the last requested restart, if known
    restart_at: Option<usize>,
}

impl<'a> HookContext<'a> {
    pub fn new(path: &'a str, stats: &'a PathStats) -> Self {
        Self {
            path,
            stats,
            restarts: 0,
            restart_at: None,
        }
    }

    /// Name of the owning path
    #[inline]
    pub fn path(&self) -> &str {
        self.path
    }

    #[inline]
    pub fn stats(&self) -> &PathStats {
        self.stats
    }

    /// Ask the path to restart every hook once the current hook returns
    ///
    /// Every request triggers one restart. Path counters are cleared.
    #[inline]
    pub fn request_restart(&mut self) {
        self.restarts += 1;
    }

    /// Like [`HookContext::request_restart`], for a source that started
    /// over at `smps[idx]`
    ///
    /// The samples from `idx` on are counted as received after the restart.
    #[inline]
    pub fn request_restart_at(&mut self, idx: usize) {
        self.restarts += 1;
        self.restart_at = Some(idx);
    }

    #[inline]
    pub fn restart_requested(&self) -> bool {
        self.restarts > 0
    }

    /// Number of pending restarts and the index of the last one
    #[inline]
    pub(crate) fn take_restarts(&mut self) -> (usize, Option<usize>) {
        (std::mem::take(&mut self.restarts), self.restart_at.take())
    }
}

/// Pipeline stage
///
/// `read` runs on every batch received from the path's source, `write` on
/// every batch handed to a destination. Both get the live sample count by
/// reference: a hook may reorder `smps[..*cnt]` in place and lower `*cnt`
/// to drop the tail. Samples seen by `write` are shared between
/// destinations, so `get_mut` on them fails.
pub trait Hook: Send {
    fn name(&self) -> &'static str;

    fn init(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn parse(&mut self, _cfg: &toml::Table) -> Result<(), HookError> {
        Ok(())
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn stop(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn periodic(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn read(&mut self, _smps: &mut [SampleRef], _cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn write(&mut self, _smps: &mut [SampleRef], _cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Collected statistics for queries, if the hook keeps any
    fn stats_json(&self) -> Option<serde_json::Value> {
        None
    }
}

/// A hook together with its priority and lifecycle state
pub struct HookInstance {
    hook: Box<dyn Hook>,
    priority: i32,
    builtin: bool,
    state: HookState,
    order: usize,
}

impl HookInstance {
    pub fn new(hook: Box<dyn Hook>, priority: i32) -> Self {
        Self {
            hook,
            priority,
            builtin: false,
            state: HookState::Destroyed,
            order: 0,
        }
    }

    pub fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.hook.name()
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    #[inline]
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    #[inline]
    pub fn state(&self) -> HookState {
        self.state
    }

    /// Registration order inside the owning list
    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        self.order = order;
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.state == HookState::Started
    }

    pub fn hook(&self) -> &dyn Hook {
        self.hook.as_ref()
    }

    pub fn stats_json(&self) -> Option<serde_json::Value> {
        self.hook.stats_json()
    }

    pub fn init(&mut self) -> Result<(), HookError> {
        debug_assert_eq!(self.state, HookState::Destroyed);
        self.hook.init()?;
        self.state = HookState::Initialized;
        Ok(())
    }

    pub fn parse(&mut self, cfg: &toml::Table) -> Result<(), HookError> {
        debug_assert!(matches!(self.state, HookState::Initialized | HookState::Parsed));
        self.hook.parse(cfg)?;
        self.state = HookState::Parsed;
        Ok(())
    }

    pub fn start(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        debug_assert!(matches!(
            self.state,
            HookState::Initialized | HookState::Parsed | HookState::Stopped
        ));
        self.hook.start(ctx)?;
        self.state = HookState::Started;
        Ok(())
    }

    pub fn stop(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        if self.state != HookState::Started {
            return Ok(());
        }
        self.state = HookState::Stopped;
        self.hook.stop(ctx)
    }

    pub fn destroy(&mut self) -> Result<(), HookError> {
        if self.state == HookState::Destroyed {
            return Ok(());
        }
        self.state = HookState::Destroyed;
        self.hook.destroy()
    }

    #[inline]
    pub fn periodic(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        if !self.is_started() {
            return Ok(());
        }
        self.hook.periodic(ctx)
    }

    #[inline]
    pub fn restart(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        if !self.is_started() {
            return Ok(());
        }
        self.hook.restart(ctx)
    }

    #[inline]
    pub fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        if !self.is_started() {
            return Ok(());
        }
        self.hook.read(smps, cnt, ctx)?;
        debug_assert!(*cnt <= smps.len());
        Ok(())
    }

    #[inline]
    pub fn write(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        if !self.is_started() {
            return Ok(());
        }
        self.hook.write(smps, cnt, ctx)?;
        debug_assert!(*cnt <= smps.len());
        Ok(())
    }
}

impl std::fmt::Debug for HookInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookInstance")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("builtin", &self.builtin)
            .field("state", &self.state)
            .finish()
    }
}

/// Registered hook type
#[derive(Clone, Copy)]
pub struct HookPlugin {
    pub name: &'static str,
    pub description: &'static str,
    /// Default priority, lower runs first
    pub priority: i32,
    /// Attached to every path that keeps built-ins enabled
    pub builtin: bool,
    pub create: fn() -> Box<dyn Hook>,
}

/// Table of known hook types
pub struct HookRegistry {
    plugins: HashMap<&'static str, HookPlugin>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Registry with every hook type shipped with the crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::hooks::register_defaults(&mut registry);
        registry
    }

    pub fn register(&mut self, plugin: HookPlugin) {
        self.plugins.insert(plugin.name, plugin);
    }

    pub fn lookup(&self, name: &str) -> Option<&HookPlugin> {
        self.plugins.get(name)
    }

    /// Built-in hook types, by priority
    pub fn builtins(&self) -> Vec<&HookPlugin> {
        let mut builtins: Vec<_> = self.plugins.values().filter(|p| p.builtin).collect();
        builtins.sort_by_key(|p| (p.priority, p.name));
        builtins
    }

    /// All hook types, by name
    pub fn plugins(&self) -> Vec<&HookPlugin> {
        let mut plugins: Vec<_> = self.plugins.values().collect();
        plugins.sort_by_key(|p| p.name);
        plugins
    }

    /// Create, initialize and configure a hook from a `hooks` table entry
    ///
    /// An integer `priority` key overrides the type's default priority.
    pub fn create(&self, name: &str, cfg: &toml::Table) -> Result<HookInstance, HookError> {
        let plugin = self
            .lookup(name)
            .ok_or_else(|| HookError::Unknown(name.to_string()))?;

        let priority = match cfg.get("priority") {
            None => plugin.priority,
            Some(v) => v
                .as_integer()
                .and_then(|p| i32::try_from(p).ok())
                .ok_or_else(|| HookError::Config {
                    hook: plugin.name,
                    reason: format!("invalid priority {v}"),
                })?,
        };

        let mut instance = HookInstance::new((plugin.create)(), priority);
        instance.init()?;
        instance.parse(cfg)?;
        Ok(instance)
    }

    /// Instantiate every built-in hook with default settings
    pub fn create_builtins(&self) -> Result<Vec<HookInstance>, HookError> {
        let empty = toml::Table::new();
        self.builtins()
            .into_iter()
            .map(|plugin| {
                let mut instance = HookInstance::new((plugin.create)(), plugin.priority).builtin();
                instance.init()?;
                instance.parse(&empty)?;
                Ok(instance)
            })
            .collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
