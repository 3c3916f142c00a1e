//! Hook implementations
//!
//! Built-in hooks (attached to every path unless disabled):
//! - `fix_ts` (0): fill in unset timestamps
//! - `restart` (1): detect source restarts
//! - `stats` (2): delay and gap histograms
//! - `drop` (3): drop reordered samples
//!
//! Optional hooks: `print`, `ts`, `decimate`, `skip_first`.

pub mod decimate;
pub mod drop;
pub mod fix_ts;
pub mod print;
pub mod restart;
pub mod skip_first;
pub mod stats;
pub mod ts;

use crate::core::SampleRef;
use crate::hot_path::hook::HookRegistry;

/// Register every hook type shipped with the crate
pub fn register_defaults(registry: &mut HookRegistry) {
    for plugin in [
        fix_ts::PLUGIN,
        restart::PLUGIN,
        stats::PLUGIN,
        drop::PLUGIN,
        print::PLUGIN,
        ts::PLUGIN,
        decimate::PLUGIN,
        skip_first::PLUGIN,
    ] {
        registry.register(plugin);
    }
}

/// Keep the samples of `smps[..*cnt]` for which `keep` returns true,
/// moving them to the front in their original order.
///
/// Returns the number of removed samples.
pub(crate) fn retain(smps: &mut [SampleRef], cnt: &mut usize, mut keep: impl FnMut(&SampleRef) -> bool) -> usize {
    let mut kept = 0;
    for i in 0..*cnt {
        if keep(&smps[i]) {
            smps.swap(kept, i);
            kept += 1;
        }
    }
    let removed = *cnt - kept;
    *cnt = kept;
    removed
}
