//! Collect path statistics
//!
//! Histograms per path:
//! - `owd`: one-way delay, origin to receive timestamp
//! - `gap_sample`: distance between origin timestamps of consecutive samples
//! - `gap_received`: distance between receive timestamps
//! - `reordered`: sequence distance whenever it is not 1
//! - `time`: receive to send, measured on the write side. Write hooks run
//!   once per destination, so a path with N destinations records every
//!   sample N times.
//!
//! Histograms are reset when the source restarts.

use crate::core::{SampleRef, Timespec};
use crate::hot_path::hook::{parse_settings, Hook, HookContext, HookError, HookPlugin, SampleMeta};
use crate::infrastructure::hist::Histogram;
use serde::Deserialize;

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "stats",
    description: "Collect statistics for the current path",
    priority: 2,
    builtin: true,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::new(StatsHook::new(StatsSettings::default()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsSettings {
    #[serde(default = "default_warmup")]
    pub warmup: u64,
    #[serde(default = "default_buckets")]
    pub buckets: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_format")]
    pub format: StatsFormat,
}

fn default_warmup() -> u64 {
    500
}
fn default_buckets() -> usize {
    20
}
fn default_format() -> StatsFormat {
    StatsFormat::Human
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            warmup: default_warmup(),
            buckets: default_buckets(),
            verbose: false,
            format: default_format(),
        }
    }
}

struct Histograms {
    owd: Histogram,
    gap_sample: Histogram,
    gap_received: Histogram,
    reordered: Histogram,
    time: Histogram,
}

impl Histograms {
    fn new(settings: &StatsSettings) -> Self {
        let h = || Histogram::new(settings.buckets, settings.warmup);
        Self {
            owd: h(),
            gap_sample: h(),
            gap_received: h(),
            reordered: h(),
            time: h(),
        }
    }

    fn reset(&mut self) {
        self.owd.reset();
        self.gap_sample.reset();
        self.gap_received.reset();
        self.reordered.reset();
        self.time.reset();
    }
}

pub struct StatsHook {
    settings: StatsSettings,
    hist: Histograms,
    last: Option<SampleMeta>,
}

impl StatsHook {
    pub fn new(settings: StatsSettings) -> Self {
        let hist = Histograms::new(&settings);
        Self {
            settings,
            hist,
            last: None,
        }
    }

    pub fn owd(&self) -> &Histogram {
        &self.hist.owd
    }

    pub fn reordered(&self) -> &Histogram {
        &self.hist.reordered
    }

    pub fn time(&self) -> &Histogram {
        &self.hist.time
    }

    fn log_row(&self, ctx: &HookContext<'_>) {
        let s = ctx.stats().snapshot();
        match self.settings.format {
            StatsFormat::Human => tracing::info!(
                target: "stats",
                "{:<24} recv={:<8} sent={:<8} drop={:<6} skip={:<6} overrun={:<6} underrun={:<6} owd={:.6} gap={:.6} rate={:.1}/s",
                ctx.path(),
                s.received,
                s.sent,
                s.dropped,
                s.skipped,
                s.overrun,
                s.underrun,
                self.hist.owd.mean(),
                self.hist.gap_sample.mean(),
                s.rate,
            ),
            StatsFormat::Json => {
                if let Some(json) = self.stats_json() {
                    tracing::info!(target: "stats", path = ctx.path(), "{}", json);
                }
            }
        }
    }
}

impl Hook for StatsHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn parse(&mut self, cfg: &toml::Table) -> Result<(), HookError> {
        let settings: StatsSettings = parse_settings(PLUGIN.name, cfg)?;
        if settings.buckets == 0 {
            return Err(HookError::Config {
                hook: PLUGIN.name,
                reason: "buckets must be at least 1".into(),
            });
        }
        *self = Self::new(settings);
        Ok(())
    }

    fn start(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.hist.reset();
        self.last = None;
        Ok(())
    }

    fn stop(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        let s = ctx.stats().snapshot();
        tracing::info!(
            target: "stats",
            path = ctx.path(),
            received = s.received,
            sent = s.sent,
            dropped = s.dropped,
            skipped = s.skipped,
            overrun = s.overrun,
            underrun = s.underrun,
            restarts = s.restarts,
            "Path statistics"
        );

        if self.settings.verbose {
            for (name, hist) in [
                ("owd", &self.hist.owd),
                ("gap_sample", &self.hist.gap_sample),
                ("gap_received", &self.hist.gap_received),
                ("reordered", &self.hist.reordered),
                ("time", &self.hist.time),
            ] {
                tracing::info!(
                    target: "stats",
                    path = ctx.path(),
                    "{:<14} total={} mean={:.6} stddev={:.6} lowest={:.6} highest={:.6}",
                    name,
                    hist.total(),
                    hist.mean(),
                    hist.stddev(),
                    hist.snapshot().lowest,
                    hist.snapshot().highest,
                );
            }
        }
        Ok(())
    }

    fn periodic(&mut self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.log_row(ctx);
        Ok(())
    }

    fn restart(&mut self, _ctx: &HookContext<'_>) -> Result<(), HookError> {
        self.hist.reset();
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        for smp in &smps[..*cnt] {
            if let Some(prev) = self.last {
                self.hist.gap_received.put(prev.ts.received.delta(&smp.ts.received));
                self.hist.gap_sample.put(prev.ts.origin.delta(&smp.ts.origin));
                self.hist.owd.put(smp.ts.origin.delta(&smp.ts.received));

                let dist = smp.sequence as i64 - prev.sequence as i64;
                if dist != 1 {
                    self.hist.reordered.put(dist as f64);
                }
            }
            self.last = Some(SampleMeta::from(&**smp));
        }
        Ok(())
    }

    /// One `time` entry per sample and destination
    fn write(&mut self, smps: &mut [SampleRef], cnt: &mut usize, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let now = Timespec::now();
        for smp in &smps[..*cnt] {
            self.hist.time.put(smp.ts.received.delta(&now));
        }
        Ok(())
    }

    fn stats_json(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "owd": self.hist.owd.snapshot(),
            "gap_sample": self.hist.gap_sample.snapshot(),
            "gap_received": self.hist.gap_received.snapshot(),
            "reordered": self.hist.reordered.snapshot(),
            "time": self.hist.time.snapshot(),
        }))
    }
}
