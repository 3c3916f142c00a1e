//! Path engine
//!
//! A path moves samples from one source node to one or more destination
//! nodes on a dedicated thread. Each cycle:
//!
//! 1. Allocate up to `vectorize(source)` samples from the path's pool
//! 2. Read from the source into them, releasing unused slots
//! 3. Run the read hooks
//! 4. Push the surviving samples into every destination queue
//! 5. Release the source's handles (samples nobody took go back to the pool)
//! 6. Drain every destination queue: write hooks, then `node.write`
//!
//! Backpressure is lossy. When a destination queue is full the samples that
//! do not fit are counted as overrun and released. When the pool is empty
//! the cycle is counted as underrun.
//!
//! # Performance
//! - No allocation inside the loop: scratch vectors are reserved at start
//! - Queue operations never block, the only blocking call is `node.read`

use crate::core::{Queue, SamplePool, SampleRef};
use crate::hot_path::hook::{HookContext, HookError, HookInstance, HookRegistry, HookState};
use crate::hot_path::hook_list::HookList;
use crate::infrastructure::metrics::{DestinationStats, DestinationStatsSnapshot, PathStats, PathStatsSnapshot};
use crate::nodes::{Node, NodeError};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::Level;

/// Default length of every destination queue
pub const DEFAULT_QUEUELEN: usize = 1024;

/// Path failure
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path '{path}' has no destinations")]
    NoDestinations { path: String },

    #[error("node '{node}' cannot be used as {role} of path '{path}'")]
    Capability {
        path: String,
        node: String,
        role: &'static str,
    },

    #[error("invalid configuration for path '{path}': {reason}")]
    Config { path: String, reason: String },

    #[error("path '{path}' is {state:?}, expected {expected}")]
    InvalidState {
        path: String,
        state: PathState,
        expected: &'static str,
    },

    #[error("failed to spawn thread for path '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathState {
    Destroyed,
    Initialized,
    Checked,
    Started,
    Stopped,
}

/// Per-path settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathConfig {
    /// Length of each destination queue
    #[serde(default = "default_queuelen")]
    pub queuelen: usize,
    /// Number of samples in the path's pool, derived from the queues if unset
    #[serde(default)]
    pub pool_size: Option<usize>,
    /// Attach the built-in hooks
    #[serde(default = "default_true")]
    pub builtin: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_queuelen() -> usize {
    DEFAULT_QUEUELEN
}

fn default_true() -> bool {
    true
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            queuelen: DEFAULT_QUEUELEN,
            pool_size: None,
            builtin: true,
            enabled: true,
        }
    }
}

/// Cooperative stop signal for a path thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A destination node with its counters
struct DestinationSpec {
    node: Arc<dyn Node>,
    stats: Arc<DestinationStats>,
}

/// Runtime side of a destination, owned by the path thread
struct Destination {
    node: Arc<dyn Node>,
    stats: Arc<DestinationStats>,
    queue: Queue,
    vectorize: usize,
    /// Samples that passed the write hooks but were not accepted yet
    pending: Vec<SampleRef>,
    /// Batch fresh from the queue, before the write hooks
    batch: Vec<SampleRef>,
    /// Set while writes keep failing, to log only the first error
    failing: bool,
    overrunning: bool,
}

/// Effective batch size of a node, `0` meaning "as much as `limit`"
#[inline]
fn effective_vectorize(node: &dyn Node, limit: usize) -> usize {
    match node.vectorize() {
        0 => limit.max(1),
        v => v,
    }
}

pub struct Path {
    name: String,
    config: PathConfig,
    state: PathState,
    source: Arc<dyn Node>,
    destinations: Vec<DestinationSpec>,
    hooks: Arc<Mutex<HookList>>,
    stats: Arc<PathStats>,
    pool: Option<Arc<SamplePool>>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl Path {
    pub fn new(source: Arc<dyn Node>, config: PathConfig) -> Self {
        let mut path = Self {
            name: String::new(),
            config,
            state: PathState::Initialized,
            source,
            destinations: Vec::new(),
            hooks: Arc::new(Mutex::new(HookList::new())),
            stats: Arc::new(PathStats::new()),
            pool: None,
            cancel: CancelToken::new(),
            thread: None,
        };
        path.update_name();
        path
    }

    /// `"src => dst1 dst2"`
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> PathState {
        self.state
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn Node> {
        &self.source
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Arc<dyn Node>> {
        self.destinations.iter().map(|d| &d.node)
    }

    fn update_name(&mut self) {
        self.name.clear();
        self.name.push_str(self.source.name());
        self.name.push_str(" =>");
        for dest in &self.destinations {
            self.name.push(' ');
            self.name.push_str(dest.node.name());
        }
    }

    fn expect_state(&self, ok: bool, expected: &'static str) -> Result<(), PathError> {
        if ok {
            Ok(())
        } else {
            Err(PathError::InvalidState {
                path: self.name.clone(),
                state: self.state,
                expected,
            })
        }
    }

    pub fn add_destination(&mut self, node: Arc<dyn Node>) -> Result<(), PathError> {
        self.expect_state(
            matches!(self.state, PathState::Initialized | PathState::Checked),
            "initialized",
        )?;
        self.destinations.push(DestinationSpec {
            node,
            stats: Arc::new(DestinationStats::new()),
        });
        self.state = PathState::Initialized;
        self.update_name();
        Ok(())
    }

    pub fn add_hook(&mut self, hook: HookInstance) -> Result<(), PathError> {
        self.expect_state(
            matches!(self.state, PathState::Initialized | PathState::Checked),
            "initialized",
        )?;
        self.hooks.lock().add(hook);
        Ok(())
    }

    /// Attach every built-in hook of `registry` unless the path disabled them
    pub fn attach_builtins(&mut self, registry: &HookRegistry) -> Result<(), PathError> {
        if !self.config.builtin {
            return Ok(());
        }
        for hook in registry.create_builtins()? {
            self.add_hook(hook)?;
        }
        Ok(())
    }

    /// Validate the path before starting it
    pub fn check(&mut self) -> Result<(), PathError> {
        self.expect_state(
            matches!(self.state, PathState::Initialized | PathState::Checked),
            "initialized",
        )?;

        if !self.source.supports_read() {
            return Err(PathError::Capability {
                path: self.name.clone(),
                node: self.source.name().to_string(),
                role: "source",
            });
        }
        if self.destinations.is_empty() {
            return Err(PathError::NoDestinations { path: self.name.clone() });
        }
        if let Some(dest) = self.destinations.iter().find(|d| !d.node.supports_write()) {
            return Err(PathError::Capability {
                path: self.name.clone(),
                node: dest.node.name().to_string(),
                role: "destination",
            });
        }
        if self.config.queuelen == 0 {
            return Err(PathError::Config {
                path: self.name.clone(),
                reason: "queuelen must be at least 1".into(),
            });
        }
        if self.config.pool_size == Some(0) {
            return Err(PathError::Config {
                path: self.name.clone(),
                reason: "pool_size must be at least 1".into(),
            });
        }

        self.state = PathState::Checked;
        Ok(())
    }

    /// Queue capacity after rounding to a power of two
    #[inline]
    fn queue_capacity(&self) -> usize {
        self.config.queuelen.next_power_of_two()
    }

    /// Pool size that covers every queue full, a batch in flight per
    /// destination, two source batches and one sample per hook
    pub fn default_pool_size(&self) -> usize {
        let cap = self.queue_capacity();
        let dests: usize = self
            .destinations
            .iter()
            .map(|d| cap + effective_vectorize(d.node.as_ref(), cap))
            .sum();
        dests + 2 * effective_vectorize(self.source.as_ref(), cap) + self.hooks.lock().len()
    }

    pub fn start(&mut self) -> Result<(), PathError> {
        if self.state == PathState::Initialized {
            self.check()?;
        }
        self.expect_state(
            matches!(self.state, PathState::Checked | PathState::Stopped),
            "checked or stopped",
        )?;

        let cap = self.queue_capacity();
        let pool_size = self.config.pool_size.unwrap_or_else(|| self.default_pool_size());
        let pool = SamplePool::new(pool_size, self.source.signal_count().max(1));

        {
            let mut hooks = self.hooks.lock();
            let ctx = HookContext::new(&self.name, &self.stats);
            hooks.prepare();
            if let Err(e) = hooks.start(&ctx) {
                hooks.stop(&ctx);
                return Err(e.into());
            }
        }

        let destinations: Vec<Destination> = self
            .destinations
            .iter()
            .map(|spec| {
                let vectorize = effective_vectorize(spec.node.as_ref(), cap);
                Destination {
                    node: Arc::clone(&spec.node),
                    stats: Arc::clone(&spec.stats),
                    queue: Queue::new(self.config.queuelen),
                    vectorize,
                    pending: Vec::with_capacity(vectorize),
                    batch: Vec::with_capacity(vectorize),
                    failing: false,
                    overrunning: false,
                }
            })
            .collect();

        let vectorize = effective_vectorize(self.source.as_ref(), cap);
        let scratch = destinations.iter().map(|d| d.vectorize).fold(vectorize, usize::max);
        let mut worker = Worker {
            name: self.name.clone(),
            source: Arc::clone(&self.source),
            pool: Arc::clone(&pool),
            destinations,
            hooks: Arc::clone(&self.hooks),
            stats: Arc::clone(&self.stats),
            cancel: CancelToken::new(),
            vectorize,
            smps: Vec::with_capacity(vectorize),
            offs: Vec::with_capacity(scratch),
            underrun: false,
            read_failing: false,
        };
        self.cancel = worker.cancel.clone();

        let thread = thread::Builder::new()
            .name(format!("path:{}", self.source.name()))
            .spawn(move || worker.run());

        let thread = match thread {
            Ok(t) => t,
            Err(source) => {
                self.hooks.lock().stop(&HookContext::new(&self.name, &self.stats));
                return Err(PathError::Spawn {
                    path: self.name.clone(),
                    source,
                });
            }
        };

        tracing::info!(
            target: "path",
            path = %self.name,
            pool_size,
            queuelen = cap,
            vectorize,
            hooks = self.hooks.lock().len(),
            "Path started"
        );

        self.pool = Some(pool);
        self.thread = Some(thread);
        self.state = PathState::Started;
        Ok(())
    }

    /// Cancel the path thread, wait for it, then stop the hooks
    pub fn stop(&mut self) -> Result<(), PathError> {
        if self.state != PathState::Started {
            return Ok(());
        }

        self.cancel.cancel();
        self.source.interrupt();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                crate::log_path!(Level::ERROR, path = %self.name, "Path thread panicked");
            }
        }

        self.hooks.lock().stop(&HookContext::new(&self.name, &self.stats));
        self.state = PathState::Stopped;
        crate::log_path!(Level::INFO, path = %self.name, "Path stopped");
        Ok(())
    }

    /// Run the periodic callback of every hook
    pub fn periodic(&self) {
        if self.state != PathState::Started {
            return;
        }
        self.hooks.lock().periodic(&HookContext::new(&self.name, &self.stats));
    }

    pub fn stats(&self) -> PathStatsSnapshot {
        self.stats.snapshot()
    }

    /// Counters of every destination, in the order they were added
    pub fn destination_stats(&self) -> Vec<(String, DestinationStatsSnapshot)> {
        self.destinations
            .iter()
            .map(|d| (d.node.name().to_string(), d.stats.snapshot()))
            .collect()
    }

    /// Lock the hook list for queries
    pub fn hooks(&self) -> MutexGuard<'_, HookList> {
        self.hooks.lock()
    }

    /// Statistics exported by the path's hooks, keyed by hook name
    pub fn hook_stats(&self) -> serde_json::Value {
        let hooks = self.hooks.lock();
        let map = hooks
            .iter()
            .filter_map(|h| h.stats_json().map(|v| (h.name().to_string(), v)))
            .collect();
        serde_json::Value::Object(map)
    }

    /// The sample pool of the current (or last) run
    pub fn pool(&self) -> Option<&Arc<SamplePool>> {
        self.pool.as_ref()
    }
}

impl Drop for Path {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            crate::log_path!(Level::ERROR, path = %self.name, "Failed to stop path: {}", e);
        }
        let mut hooks = self.hooks.lock();
        if hooks.iter().any(|h| h.state() != HookState::Destroyed) {
            hooks.destroy();
        }
    }
}

/// State moved into the path thread
struct Worker {
    name: String,
    source: Arc<dyn Node>,
    pool: Arc<SamplePool>,
    destinations: Vec<Destination>,
    hooks: Arc<Mutex<HookList>>,
    stats: Arc<PathStats>,
    cancel: CancelToken,
    vectorize: usize,
    /// Source batch
    smps: Vec<SampleRef>,
    /// Offsets in transit to and from destination queues
    offs: Vec<usize>,
    underrun: bool,
    read_failing: bool,
}

impl Worker {
    fn run(mut self) {
        while !self.cancel.is_cancelled() {
            self.cycle();
        }
        self.shutdown();
    }

    fn cycle(&mut self) {
        let got = self.pool.alloc_many(&mut self.smps, self.vectorize);
        if got < self.vectorize {
            self.stats.record_underrun();
            if !self.underrun {
                tracing::warn!(
                    target: "pool",
                    path = %self.name,
                    "Pool underrun: got only {} of {} samples",
                    got,
                    self.vectorize
                );
                self.underrun = true;
            }
        } else {
            self.underrun = false;
        }

        if got > 0 && !self.cancel.is_cancelled() {
            let recv = self.read();
            if recv > 0 {
                let enqueue = self.run_read_hooks(recv);
                self.enqueue(enqueue);
            }
        }
        self.smps.clear();

        self.drain();

        if got == 0 {
            thread::yield_now();
        }
    }

    /// Read from the source, keeping only the filled slots
    fn read(&mut self) -> usize {
        match self.source.read(&mut self.smps) {
            Ok(n) => {
                let n = n.min(self.smps.len());
                self.smps.truncate(n);
                self.read_failing = false;
                if n > 0 {
                    self.stats.record_received(n);
                }
                n
            }
            Err(e) => {
                self.smps.clear();
                if !self.read_failing {
                    tracing::warn!(target: "path", path = %self.name, "Failed to read from node: {}", e);
                    self.read_failing = true;
                }
                thread::yield_now();
                0
            }
        }
    }

    fn run_read_hooks(&mut self, recv: usize) -> usize {
        let mut hooks = self.hooks.lock();
        let mut ctx = HookContext::new(&self.name, &self.stats);
        let enqueue = hooks.read(&mut self.smps, recv, &mut ctx);
        if enqueue < recv {
            tracing::trace!(target: "path", path = %self.name, "Hooks skipped {} out of {} samples", recv - enqueue, recv);
            self.stats.record_skipped(recv - enqueue);
        }
        enqueue
    }

    /// Hand the first `cnt` samples to every destination queue
    fn enqueue(&mut self, cnt: usize) {
        for dest in &mut self.destinations {
            self.offs.clear();
            self.offs
                .extend(self.smps[..cnt].iter().map(|smp| smp.clone().into_raw()));

            let pushed = dest.queue.push_many(&self.offs).unwrap_or(0);

            for &off in &self.offs[pushed..] {
                // SAFETY: offsets that did not make it into the queue are still ours
                drop(unsafe { SampleRef::from_raw(&self.pool, off) });
            }

            dest.stats.record_enqueued(pushed);
            let overrun = cnt - pushed;
            if overrun > 0 {
                dest.stats.record_overrun(overrun);
                self.stats.record_overrun(overrun);
                if !dest.overrunning {
                    tracing::warn!(
                        target: "path",
                        path = %self.name,
                        node = dest.node.name(),
                        "Queue overrun: {} samples not enqueued",
                        overrun
                    );
                    dest.overrunning = true;
                }
            } else {
                dest.overrunning = false;
            }
        }
    }

    /// Write out everything queued for each destination
    fn drain(&mut self) {
        for dest in &mut self.destinations {
            loop {
                let want = dest.vectorize - dest.pending.len();
                if want > 0 {
                    self.offs.clear();
                    self.offs.resize(want, 0);
                    let got = dest.queue.pull_many(&mut self.offs).unwrap_or(0);
                    for &off in &self.offs[..got] {
                        // SAFETY: every queued offset was produced by `into_raw` in `enqueue`
                        dest.batch.push(unsafe { SampleRef::from_raw(&self.pool, off) });
                    }

                    if got > 0 {
                        let mut hooks = self.hooks.lock();
                        let mut ctx = HookContext::new(&self.name, &self.stats);
                        let n = hooks.write(&mut dest.batch, got, &mut ctx);
                        dest.batch.truncate(n);
                        dest.pending.append(&mut dest.batch);
                    }
                }

                if dest.pending.is_empty() {
                    break;
                }

                match dest.node.write(&dest.pending) {
                    Ok(n) => {
                        let n = n.min(dest.pending.len());
                        dest.pending.drain(..n);
                        dest.stats.record_sent(n);
                        self.stats.record_sent(n);
                        dest.failing = false;
                        if !dest.pending.is_empty() {
                            // Partial write, retry next cycle
                            break;
                        }
                    }
                    Err(e) => {
                        dest.stats.record_write_error();
                        if !dest.failing {
                            tracing::warn!(
                                target: "path",
                                path = %self.name,
                                node = dest.node.name(),
                                "Failed to write to node: {}",
                                e
                            );
                            dest.failing = true;
                        }
                        break;
                    }
                }
            }
        }
    }

    /// Release everything still queued or pending
    fn shutdown(&mut self) {
        self.smps.clear();
        for dest in &mut self.destinations {
            dest.pending.clear();
            dest.batch.clear();
            dest.queue.close();
            while let Ok(off) = dest.queue.pull() {
                // SAFETY: see `drain`
                drop(unsafe { SampleRef::from_raw(&self.pool, off) });
            }
        }
        crate::log_path!(Level::DEBUG, path = %self.name, "Path thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingSink, RecordingSink, ScriptedSource};
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_name_format() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..0));
        let mut path = Path::new(src, PathConfig::default());
        path.add_destination(Arc::new(RecordingSink::new("a", 1))).unwrap();
        path.add_destination(Arc::new(RecordingSink::new("b", 1))).unwrap();
        assert_eq!(path.name(), "src => a b");
    }

    #[test]
    fn test_check_rejects_bad_paths() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..0));
        let mut path = Path::new(src.clone(), PathConfig::default());
        assert!(matches!(path.check(), Err(PathError::NoDestinations { .. })));

        let mut path = Path::new(Arc::new(RecordingSink::new("sink", 1)), PathConfig::default());
        path.add_destination(Arc::new(RecordingSink::new("a", 1))).unwrap();
        assert!(matches!(path.check(), Err(PathError::Capability { role: "source", .. })));

        let mut path = Path::new(src.clone(), PathConfig::default());
        path.add_destination(src).unwrap();
        assert!(matches!(path.check(), Err(PathError::Capability { role: "destination", .. })));
    }

    #[test]
    fn test_default_pool_size() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..0));
        let mut path = Path::new(
            src,
            PathConfig {
                queuelen: 8,
                builtin: false,
                ..Default::default()
            },
        );
        path.add_destination(Arc::new(RecordingSink::new("a", 4))).unwrap();
        path.add_destination(Arc::new(RecordingSink::new("b", 2))).unwrap();
        assert_eq!(path.default_pool_size(), (8 + 4) + (8 + 2) + 2 * 4);
    }

    #[test]
    fn test_fan_out_with_failing_destination() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..100));
        let good = Arc::new(RecordingSink::new("a", 4));
        let bad = Arc::new(FailingSink::new("b", 4));

        let mut path = Path::new(
            src.clone(),
            PathConfig {
                queuelen: 8,
                ..Default::default()
            },
        );
        path.add_destination(good.clone()).unwrap();
        path.add_destination(bad.clone()).unwrap();
        path.attach_builtins(&HookRegistry::with_defaults()).unwrap();
        path.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || good.sequences().len() == 100));
        assert!(wait_until(Duration::from_secs(1), || src.exhausted()));
        path.stop().unwrap();

        assert_eq!(good.sequences(), (0..100).collect::<Vec<u64>>());
        assert!(bad.attempts() > 0);

        let stats = path.stats();
        assert_eq!(stats.underrun, 0);
        assert_eq!(stats.received, 100);

        let dests = path.destination_stats();
        assert_eq!(dests[0].1.sent, 100);
        assert_eq!(dests[0].1.overrun, 0);
        // 8 queued plus one pending batch of 4 are held by the failing sink
        assert_eq!(dests[1].1.enqueued, 12);
        assert_eq!(dests[1].1.overrun, 88);
        assert_eq!(dests[1].1.sent, 0);
        assert_eq!(stats.overrun, 88);

        let pool = path.pool().unwrap();
        assert_eq!(pool.available(), pool.len());
    }

    #[test]
    fn test_short_reads_release_unused_slots() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..10).with_chunk(3));
        let sink = Arc::new(RecordingSink::new("a", 4));

        let mut path = Path::new(src.clone(), PathConfig::default());
        path.add_destination(sink.clone()).unwrap();
        path.attach_builtins(&HookRegistry::with_defaults()).unwrap();
        path.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || sink.sequences().len() == 10));
        path.stop().unwrap();

        assert_eq!(sink.sequences(), (0..10).collect::<Vec<u64>>());
        let stats = path.stats();
        assert_eq!(stats.received, 10);
        assert_eq!(stats.underrun, 0);

        let pool = path.pool().unwrap();
        assert_eq!(pool.available(), pool.len());
    }

    #[test]
    fn test_read_errors_do_not_stop_path() {
        let src = Arc::new(ScriptedSource::new("src", 2, 0..10).failing_every_other());
        let sink = Arc::new(RecordingSink::new("a", 2));

        let mut path = Path::new(src.clone(), PathConfig::default());
        path.add_destination(sink.clone()).unwrap();
        path.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || sink.sequences().len() == 10));
        path.stop().unwrap();

        assert!(src.failures() >= 4);
        assert_eq!(sink.sequences(), (0..10).collect::<Vec<u64>>());
        assert_eq!(path.stats().received, 10);

        let pool = path.pool().unwrap();
        assert_eq!(pool.available(), pool.len());
    }

    #[test]
    fn test_restart_resets_counters() {
        let seqs = vec![41u64, 42, 0, 1, 2];
        let src = Arc::new(ScriptedSource::from_sequences("src", 1, seqs));
        let sink = Arc::new(RecordingSink::new("a", 1));

        let mut path = Path::new(src.clone(), PathConfig::default());
        path.add_destination(sink.clone()).unwrap();
        path.attach_builtins(&HookRegistry::with_defaults()).unwrap();
        path.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || sink.sequences().len() == 5));
        path.stop().unwrap();

        assert_eq!(sink.sequences(), vec![41, 42, 0, 1, 2]);
        let stats = path.stats();
        assert_eq!(stats.restarts, 1);
        // Counted from the reset on: 0, 1 and 2
        assert_eq!(stats.received, 3);
    }

    #[test]
    fn test_restart_inside_batch() {
        let seqs = vec![41u64, 42, 0, 1, 2];
        let src = Arc::new(ScriptedSource::from_sequences("src", 5, seqs));
        let sink = Arc::new(RecordingSink::new("a", 5));

        let mut path = Path::new(src.clone(), PathConfig::default());
        path.add_destination(sink.clone()).unwrap();
        path.attach_builtins(&HookRegistry::with_defaults()).unwrap();
        path.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || sink.sequences().len() == 5));
        path.stop().unwrap();

        assert_eq!(sink.sequences(), vec![41, 42, 0, 1, 2]);
        let stats = path.stats();
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.received, 3);
    }

    #[test]
    fn test_hook_order_and_skip() {
        let src = Arc::new(ScriptedSource::new("src", 4, 0..20));
        let sink = Arc::new(RecordingSink::new("a", 4));

        let registry = HookRegistry::with_defaults();
        let mut path = Path::new(src, PathConfig::default());
        path.add_destination(sink.clone()).unwrap();
        let cfg: toml::Table = toml::from_str("ratio = 2").unwrap();
        path.add_hook(registry.create("decimate", &cfg).unwrap()).unwrap();
        path.attach_builtins(&registry).unwrap();
        path.start().unwrap();

        let names: Vec<_> = path.hooks().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["fix_ts", "restart", "stats", "drop", "decimate"]);

        assert!(wait_until(Duration::from_secs(5), || sink.sequences().len() == 10));
        path.stop().unwrap();

        assert_eq!(sink.sequences(), (0..20).step_by(2).collect::<Vec<u64>>());
        assert_eq!(path.stats().skipped, 10);
        assert!(path.hook_stats().get("stats").is_some());
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let src = Arc::new(ScriptedSource::new("src", 1, 0..0));
        let sink = Arc::new(RecordingSink::new("a", 1));
        let mut path = Path::new(src, PathConfig::default());
        path.add_destination(sink).unwrap();

        path.start().unwrap();
        assert_eq!(path.state(), PathState::Started);
        assert!(matches!(path.start(), Err(PathError::InvalidState { .. })));

        path.stop().unwrap();
        path.stop().unwrap();
        assert_eq!(path.state(), PathState::Stopped);

        path.start().unwrap();
        path.stop().unwrap();
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
