//! Drop reordered samples
//!
//! Keeps only samples whose sequence number is larger than that of the last
//! accepted sample. A sequence of 0 always passes: it marks a restart of
//! the source, which the restart hook handles before this one runs.

use crate::core::SampleRef;
use crate::hooks::retain;
use crate::hot_path::hook::{Hook, HookContext, HookError, HookPlugin, SampleMeta};

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "drop",
    description: "Drop messages with reordered sequence numbers",
    priority: 3,
    builtin: true,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::<DropHook>::default()
}

#[derive(Default)]
pub struct DropHook {
    last: Option<SampleMeta>,
}

impl Hook for DropHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.last = None;
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.last = None;
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let path = ctx.path();
        let last = &mut self.last;

        let dropped = retain(smps, cnt, |smp| {
            if let Some(prev) = *last {
                if smp.sequence != 0 && smp.sequence <= prev.sequence {
                    tracing::debug!(
                        target: "hook",
                        path,
                        "Dropping reordered sample: sequence={}, expected > {}",
                        smp.sequence,
                        prev.sequence
                    );
                    return false;
                }
            }
            *last = Some(SampleMeta::from(&**smp));
            true
        });

        if dropped > 0 {
            ctx.stats().record_dropped(dropped);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SamplePool;
    use crate::infrastructure::metrics::PathStats;

    #[test]
    fn test_drops_reordered_and_compacts() {
        let pool = SamplePool::new(8, 1);
        let mut smps: Vec<_> = [1u64, 2, 2, 5, 3, 6]
            .iter()
            .map(|&seq| {
                let mut smp = pool.alloc().unwrap();
                smp.get_mut().unwrap().sequence = seq;
                smp
            })
            .collect();

        let stats = PathStats::new();
        let mut ctx = HookContext::new("p", &stats);
        let mut cnt = smps.len();
        let mut hook = DropHook::default();
        hook.read(&mut smps, &mut cnt, &mut ctx).unwrap();

        assert_eq!(cnt, 4);
        let kept: Vec<_> = smps[..cnt].iter().map(|s| s.sequence).collect();
        assert_eq!(kept, vec![1, 2, 5, 6]);
        assert_eq!(stats.snapshot().dropped, 2);
    }

    #[test]
    fn test_zero_passes_after_restart() {
        let pool = SamplePool::new(4, 1);
        let mut smps: Vec<_> = [41u64, 42, 0]
            .iter()
            .map(|&seq| {
                let mut smp = pool.alloc().unwrap();
                smp.get_mut().unwrap().sequence = seq;
                smp
            })
            .collect();

        let stats = PathStats::new();
        let mut cnt = 3;
        DropHook::default()
            .read(&mut smps, &mut cnt, &mut HookContext::new("p", &stats))
            .unwrap();
        assert_eq!(cnt, 3);
    }
}
