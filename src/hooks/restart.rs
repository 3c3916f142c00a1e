//! Detect restarts of the sample source
//!
//! A source that starts over sends sequence number 0 again. When that
//! happens after samples with a non-zero sequence, the hook asks the path
//! to restart every hook and reset its counters. Every reset in a batch is
//! reported with its position.

use crate::core::SampleRef;
use crate::hot_path::hook::{Hook, HookContext, HookError, HookPlugin, SampleMeta};

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "restart",
    description: "Call restart hooks for the current path",
    priority: 1,
    builtin: true,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::<RestartHook>::default()
}

#[derive(Default)]
pub struct RestartHook {
    last: Option<SampleMeta>,
    prev: Option<SampleMeta>,
}

impl Hook for RestartHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.last = None;
        self.prev = None;
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.prev = None;
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        for (i, smp) in smps[..*cnt].iter().enumerate() {
            if let Some(last) = self.last {
                if smp.sequence == 0 && last.sequence != 0 {
                    tracing::warn!(
                        target: "hook",
                        path = ctx.path(),
                        "Source restarted (prev.sequence={}, current.sequence={})",
                        last.sequence,
                        smp.sequence
                    );
                    ctx.request_restart_at(i);
                }
            }

            self.prev = self.last;
            self.last = Some(SampleMeta::from(&**smp));
        }
        Ok(())
    }
}
