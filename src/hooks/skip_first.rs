//! Skip the first samples after a (re)start
//!
//! Either a number of seconds, measured from the origin timestamp of the
//! first sample seen, or a number of samples, measured by sequence number.
//! Re-armed whenever the path restarts.

use crate::core::{SampleRef, Timespec};
use crate::hooks::retain;
use crate::hot_path::hook::{parse_settings, Hook, HookContext, HookError, HookPlugin};
use serde::Deserialize;

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "skip_first",
    description: "Skip the first samples",
    priority: 99,
    builtin: false,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::new(SkipFirstHook::new(SkipMode::Samples(0)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipMode {
    Seconds(f64),
    Samples(u64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Until {
    /// Waiting for the first sample
    Armed,
    Time(Timespec),
    Sequence(u64),
}

#[derive(Debug, Deserialize)]
struct SkipFirstSettings {
    seconds: Option<f64>,
    samples: Option<u64>,
}

pub struct SkipFirstHook {
    mode: SkipMode,
    until: Until,
}

impl SkipFirstHook {
    pub fn new(mode: SkipMode) -> Self {
        Self { mode, until: Until::Armed }
    }
}

impl Hook for SkipFirstHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn parse(&mut self, cfg: &toml::Table) -> Result<(), HookError> {
        let settings: SkipFirstSettings = parse_settings(PLUGIN.name, cfg)?;
        self.mode = match (settings.seconds, settings.samples) {
            (Some(secs), None) if secs.is_finite() && secs >= 0.0 => SkipMode::Seconds(secs),
            (None, Some(n)) => SkipMode::Samples(n),
            _ => {
                return Err(HookError::Config {
                    hook: PLUGIN.name,
                    reason: "expected either a non-negative 'seconds' or 'samples'".into(),
                })
            }
        };
        Ok(())
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.until = Until::Armed;
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.until = Until::Armed;
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let mode = self.mode;
        let until = &mut self.until;

        retain(smps, cnt, |smp| {
            if *until == Until::Armed {
                *until = match mode {
                    SkipMode::Seconds(secs) => Until::Time(smp.ts.origin.add_secs(secs)),
                    SkipMode::Samples(n) => Until::Sequence(smp.sequence.saturating_add(n)),
                };
            }
            match *until {
                Until::Time(t) => smp.ts.origin >= t,
                Until::Sequence(seq) => smp.sequence >= seq,
                Until::Armed => true,
            }
        });
        Ok(())
    }
}
