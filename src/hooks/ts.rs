//! Overwrite origin timestamps with the receive time

use crate::core::SampleRef;
use crate::hot_path::hook::{Hook, HookContext, HookError, HookPlugin};

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "ts",
    description: "Update timestamp of message with current time",
    priority: 99,
    builtin: false,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::new(TsHook)
}

pub struct TsHook;

impl Hook for TsHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        for smp in &mut smps[..*cnt] {
            if let Some(s) = smp.get_mut() {
                s.ts.origin = s.ts.received;
            }
        }
        Ok(())
    }
}
