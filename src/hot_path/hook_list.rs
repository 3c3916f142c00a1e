//! Ordered hook chain of a path
//!
//! Hooks are sorted once by ascending priority when the path starts. The
//! sort is stable, so equal priorities keep their registration order.
//! Running the chain never allocates.

use crate::core::SampleRef;
use crate::hot_path::hook::{HookContext, HookError, HookInstance};

#[derive(Debug, Default)]
pub struct HookList {
    hooks: Vec<HookInstance>,
    next_order: usize,
}

impl HookList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook, remembering its registration order
    pub fn add(&mut self, mut hook: HookInstance) {
        hook.set_order(self.next_order);
        self.next_order += 1;
        self.hooks.push(hook);
    }

    /// Sort by priority, ties by registration order
    pub fn prepare(&mut self) {
        self.hooks.sort_by_key(|h| (h.priority(), h.order()));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HookInstance> {
        self.hooks.iter()
    }

    /// First hook of the given type
    pub fn find(&self, name: &str) -> Option<&HookInstance> {
        self.hooks.iter().find(|h| h.name() == name)
    }

    /// Start every hook, stopping at the first failure
    pub fn start(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        for hook in &mut self.hooks {
            hook.start(ctx)?;
            tracing::debug!(target: "hook", path = ctx.path(), hook = hook.name(), priority = hook.priority(), "Hook started");
        }
        Ok(())
    }

    pub fn stop(&mut self, ctx: &HookContext<'_>) {
        for hook in &mut self.hooks {
            if let Err(e) = hook.stop(ctx) {
                tracing::warn!(target: "hook", path = ctx.path(), hook = hook.name(), "Failed to stop hook: {}", e);
            }
        }
    }

    pub fn destroy(&mut self) {
        for hook in &mut self.hooks {
            if let Err(e) = hook.destroy() {
                tracing::warn!(target: "hook", hook = hook.name(), "Failed to destroy hook: {}", e);
            }
        }
    }

    pub fn periodic(&mut self, ctx: &HookContext<'_>) {
        for hook in &mut self.hooks {
            if let Err(e) = hook.periodic(ctx) {
                tracing::warn!(target: "hook", path = ctx.path(), hook = hook.name(), "Periodic callback failed: {}", e);
            }
        }
    }

    /// Call `restart` on every started hook
    pub fn restart(&mut self, ctx: &HookContext<'_>) {
        for hook in &mut self.hooks {
            if let Err(e) = hook.restart(ctx) {
                tracing::warn!(target: "hook", path = ctx.path(), hook = hook.name(), "Restart callback failed: {}", e);
            }
        }
    }

    /// Handle the restarts requested by hook `i`
    ///
    /// Each request resets the path counters and restarts every hook once.
    /// With a known reset position the samples from there to the end of the
    /// batch count as received.
    fn apply_restarts(&mut self, i: usize, cnt: usize, ctx: &mut HookContext<'_>) {
        let (restarts, at) = ctx.take_restarts();
        for _ in 0..restarts {
            crate::log_hook!(tracing::Level::INFO, path = ctx.path(), hook = self.hooks[i].name(), "Restart requested");
            ctx.stats().restart();
            self.restart(ctx);
        }
        if let Some(idx) = at {
            ctx.stats().record_received(cnt.saturating_sub(idx));
        }
    }

    /// Run the read chain over `smps[..cnt]`
    ///
    /// Returns the number of samples left at the front of `smps`. A failing
    /// hook drops the whole batch. When a hook requests restarts, every
    /// hook is restarted once per request and the path counters are reset
    /// before the next hook runs.
    pub fn read(&mut self, smps: &mut [SampleRef], cnt: usize, ctx: &mut HookContext<'_>) -> usize {
        let mut cnt = cnt.min(smps.len());

        for i in 0..self.hooks.len() {
            if cnt == 0 {
                break;
            }

            let hook = &mut self.hooks[i];
            if let Err(e) = hook.read(smps, &mut cnt, ctx) {
                tracing::warn!(target: "hook", path = ctx.path(), hook = hook.name(), "Read hook failed, dropping batch: {}", e);
                return 0;
            }

            self.apply_restarts(i, cnt, ctx);
        }

        cnt
    }

    /// Run the write chain over `smps[..cnt]`, see [`HookList::read`]
    pub fn write(&mut self, smps: &mut [SampleRef], cnt: usize, ctx: &mut HookContext<'_>) -> usize {
        let mut cnt = cnt.min(smps.len());

        for i in 0..self.hooks.len() {
            if cnt == 0 {
                break;
            }

            let hook = &mut self.hooks[i];
            if let Err(e) = hook.write(smps, &mut cnt, ctx) {
                tracing::warn!(target: "hook", path = ctx.path(), hook = hook.name(), "Write hook failed, dropping batch: {}", e);
                return 0;
            }

            self.apply_restarts(i, cnt, ctx);
        }

        cnt
    }
}
