//! Downsampling by an integer factor
//!
//! Passes every `ratio`-th sample, starting with the first one.

use crate::core::SampleRef;
use crate::hooks::retain;
use crate::hot_path::hook::{parse_settings, Hook, HookContext, HookError, HookPlugin};
use serde::Deserialize;

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "decimate",
    description: "Downsampling by integer factor",
    priority: 99,
    builtin: false,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::new(DecimateHook::new(1))
}

#[derive(Debug, Deserialize)]
struct DecimateSettings {
    ratio: u64,
}

pub struct DecimateHook {
    ratio: u64,
    counter: u64,
}

impl DecimateHook {
    pub fn new(ratio: u64) -> Self {
        Self { ratio: ratio.max(1), counter: 0 }
    }
}

impl Hook for DecimateHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn parse(&mut self, cfg: &toml::Table) -> Result<(), HookError> {
        let settings: DecimateSettings = parse_settings(PLUGIN.name, cfg)?;
        if settings.ratio == 0 {
            return Err(HookError::Config {
                hook: PLUGIN.name,
                reason: "ratio must be at least 1".into(),
            });
        }
        self.ratio = settings.ratio;
        Ok(())
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.counter = 0;
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.counter = 0;
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let ratio = self.ratio;
        let counter = &mut self.counter;
        retain(smps, cnt, |_| {
            let keep = *counter % ratio == 0;
            *counter += 1;
            keep
        });
        Ok(())
    }
}
