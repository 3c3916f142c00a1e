//! Test nodes for path and engine tests
//!
//! - `ScriptedSource`: replays a fixed list of sequence numbers, optionally
//!   in short reads or with failing reads in between
//! - `RecordingSink`: remembers the sequence of every sample written
//! - `FailingSink`: rejects every write

use crate::core::{SampleRef, SignalData, Timespec};
use crate::nodes::{Node, NodeError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Pause of an exhausted source, so idle paths do not spin
const IDLE: Duration = Duration::from_millis(1);

pub struct ScriptedSource {
    name: String,
    vectorize: usize,
    sequences: Vec<u64>,
    next: AtomicUsize,
    /// Most samples handed out per read
    chunk: usize,
    fail_every_other: bool,
    reads: AtomicUsize,
    failures: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str, vectorize: usize, range: std::ops::Range<u64>) -> Self {
        Self::from_sequences(name, vectorize, range.collect())
    }

    pub fn from_sequences(name: &str, vectorize: usize, sequences: Vec<u64>) -> Self {
        Self {
            name: name.to_string(),
            vectorize,
            sequences,
            next: AtomicUsize::new(0),
            chunk: usize::MAX,
            fail_every_other: false,
            reads: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Fill at most `chunk` slots per read
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Fail every second read with an I/O error
    pub fn failing_every_other(mut self) -> Self {
        self.fail_every_other = true;
        self
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> bool {
        self.next.load(Ordering::Acquire) >= self.sequences.len()
    }
}

impl Node for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn vectorize(&self) -> usize {
        self.vectorize
    }

    fn signal_count(&self) -> usize {
        1
    }

    fn supports_read(&self) -> bool {
        true
    }

    fn read(&self, smps: &mut [SampleRef]) -> Result<usize, NodeError> {
        let call = self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_every_other && call % 2 == 1 {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(NodeError::Io {
                node: self.name.clone(),
                reason: "read timed out".into(),
            });
        }

        let start = self.next.load(Ordering::Acquire);
        let n = smps
            .len()
            .min(self.chunk)
            .min(self.sequences.len().saturating_sub(start));
        if n == 0 {
            thread::sleep(IDLE);
            return Ok(0);
        }

        let now = Timespec::now();
        for (smp, &seq) in smps.iter_mut().zip(&self.sequences[start..start + n]) {
            let s = smp.get_mut().ok_or_else(|| NodeError::Io {
                node: self.name.clone(),
                reason: "sample slot is shared".into(),
            })?;
            s.sequence = seq;
            s.ts.origin = now;
            s.ts.received = Timespec::INVALID;
            s.set_values(&[SignalData::Integer(seq as i64)]);
        }

        self.next.store(start + n, Ordering::Release);
        Ok(n)
    }
}

pub struct RecordingSink {
    name: String,
    vectorize: usize,
    received: Mutex<Vec<u64>>,
}

impl RecordingSink {
    pub fn new(name: &str, vectorize: usize) -> Self {
        Self {
            name: name.to_string(),
            vectorize,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.received.lock().clone()
    }
}

impl Node for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "recording"
    }

    fn vectorize(&self) -> usize {
        self.vectorize
    }

    fn signal_count(&self) -> usize {
        1
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn write(&self, smps: &[SampleRef]) -> Result<usize, NodeError> {
        self.received.lock().extend(smps.iter().map(|s| s.sequence));
        Ok(smps.len())
    }
}

pub struct FailingSink {
    name: String,
    vectorize: usize,
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn new(name: &str, vectorize: usize) -> Self {
        Self {
            name: name.to_string(),
            vectorize,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Node for FailingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "failing"
    }

    fn vectorize(&self) -> usize {
        self.vectorize
    }

    fn signal_count(&self) -> usize {
        1
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn write(&self, _smps: &[SampleRef]) -> Result<usize, NodeError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(NodeError::Io {
            node: self.name.clone(),
            reason: "connection refused".into(),
        })
    }
}
