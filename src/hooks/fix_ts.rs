//! Fill in missing timestamps
//!
//! Runs first on every path. Samples without a receive timestamp get the
//! current time, samples without an origin timestamp inherit the receive
//! timestamp.

use crate::core::{SampleRef, Timespec};
use crate::hot_path::hook::{Hook, HookContext, HookError, HookPlugin};

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "fix_ts",
    description: "Update timestamps of samples with unset fields",
    priority: 0,
    builtin: true,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::new(FixTsHook)
}

pub struct FixTsHook;

impl Hook for FixTsHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let now = Timespec::now();
        for smp in &mut smps[..*cnt] {
            let Some(s) = smp.get_mut() else {
                continue;
            };
            if s.ts.received.is_unset() {
                s.ts.received = now;
            }
            if s.ts.origin.is_unset() {
                s.ts.origin = s.ts.received;
            }
        }
        Ok(())
    }
}
