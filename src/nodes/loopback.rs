//! In-process loopback node
//!
//! Everything written to the node can be read back from it. Written
//! samples are copied into the node's own pool so the writer's blocks are
//! released immediately. Chains paths together without a transport:
//!
//! ```toml
//! [nodes.lo]
//! type = "loopback"
//! queuelen = 1024
//! values = 64
//! ```

use crate::core::{SamplePool, SampleRef, SignalledQueue};
use crate::nodes::traits::{Node, NodeError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Maximum samples moved per read call
const READ_CHUNK: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct LoopbackSettings {
    #[serde(default = "default_queuelen")]
    pub queuelen: usize,
    /// Values per sample
    #[serde(default = "default_values")]
    pub values: usize,
    #[serde(default = "default_vectorize")]
    pub vectorize: usize,
    /// Longest time a read blocks without data
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_queuelen() -> usize {
    1024
}
fn default_values() -> usize {
    64
}
fn default_vectorize() -> usize {
    1
}
fn default_poll_ms() -> u64 {
    100
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            queuelen: default_queuelen(),
            values: default_values(),
            vectorize: default_vectorize(),
            poll_ms: default_poll_ms(),
        }
    }
}

pub struct LoopbackNode {
    name: String,
    settings: LoopbackSettings,
    pool: Arc<SamplePool>,
    queue: SignalledQueue,
}

impl LoopbackNode {
    pub fn new(name: impl Into<String>, settings: LoopbackSettings) -> Result<Self, NodeError> {
        let name = name.into();
        if settings.queuelen == 0 || settings.values == 0 {
            return Err(NodeError::Config {
                node: name,
                reason: "queuelen and values must be at least 1".into(),
            });
        }

        let queue = SignalledQueue::new(settings.queuelen);
        // Queued samples plus headroom for copies in flight
        let pool = SamplePool::new(queue.capacity() + READ_CHUNK, settings.values);

        Ok(Self {
            name,
            settings,
            pool,
            queue,
        })
    }

    pub fn from_config(name: &str, cfg: &toml::Table) -> Result<Self, NodeError> {
        let settings: LoopbackSettings = toml::Value::Table(cfg.clone())
            .try_into()
            .map_err(|e: toml::de::Error| NodeError::Config {
                node: name.to_string(),
                reason: e.message().to_string(),
            })?;
        Self::new(name, settings)
    }

    /// Samples waiting to be read
    pub fn pending(&self) -> usize {
        self.queue.available()
    }

    fn closed(&self) -> NodeError {
        NodeError::Closed {
            node: self.name.clone(),
        }
    }
}

impl Node for LoopbackNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "loopback"
    }

    fn vectorize(&self) -> usize {
        self.settings.vectorize
    }

    fn signal_count(&self) -> usize {
        self.settings.values
    }

    fn supports_read(&self) -> bool {
        true
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn stop(&self) -> Result<(), NodeError> {
        self.queue.close();
        Ok(())
    }

    fn interrupt(&self) {
        self.queue.wake_all();
    }

    fn read(&self, smps: &mut [SampleRef]) -> Result<usize, NodeError> {
        let mut offs = [0usize; READ_CHUNK];
        let want = smps.len().min(READ_CHUNK);
        let timeout = Duration::from_millis(self.settings.poll_ms);

        let got = self
            .queue
            .pull_wait(&mut offs[..want], Some(timeout))
            .map_err(|_| self.closed())?;

        for (dst, &off) in smps.iter_mut().zip(&offs[..got]) {
            // SAFETY: only offsets pushed by `write` from our own pool are queued
            let src = unsafe { SampleRef::from_raw(&self.pool, off) };
            if let Some(d) = dst.get_mut() {
                d.copy_from(&src);
            }
        }

        Ok(got)
    }

    fn write(&self, smps: &[SampleRef]) -> Result<usize, NodeError> {
        if self.queue.is_closed() {
            return Err(self.closed());
        }

        let mut written = 0;
        for smp in smps {
            let Some(mut copy) = self.pool.alloc() else {
                break;
            };
            if let Some(c) = copy.get_mut() {
                c.copy_from(smp);
            }

            let off = copy.into_raw();
            if self.queue.push(off).is_err() {
                // SAFETY: the push failed, so `off` is still ours to reclaim
                drop(unsafe { SampleRef::from_raw(&self.pool, off) });
                break;
            }
            written += 1;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SignalData, Timespec};
    use std::thread;
    use std::time::Instant;

    fn sample(pool: &Arc<SamplePool>, seq: u64) -> SampleRef {
        let mut smp = pool.alloc().unwrap();
        let s = smp.get_mut().unwrap();
        s.sequence = seq;
        s.ts.origin = Timespec::new(1, 0);
        s.set_values(&[SignalData::Integer(seq as i64)]);
        smp
    }

    fn settings(queuelen: usize) -> LoopbackSettings {
        LoopbackSettings {
            queuelen,
            values: 4,
            poll_ms: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_write_then_read() {
        let node = LoopbackNode::new("lo", settings(8)).unwrap();
        let pool = SamplePool::new(8, 4);

        let out: Vec<_> = (0..3).map(|i| sample(&pool, i)).collect();
        assert_eq!(node.write(&out).unwrap(), 3);
        drop(out);
        assert_eq!(pool.available(), 8);
        assert_eq!(node.pending(), 3);

        let mut inp = Vec::with_capacity(4);
        pool.alloc_many(&mut inp, 4);
        assert_eq!(node.read(&mut inp).unwrap(), 3);
        for (i, smp) in inp.iter().take(3).enumerate() {
            assert_eq!(smp.sequence, i as u64);
            assert_eq!(smp.values(), &[SignalData::Integer(i as i64)]);
        }
    }

    #[test]
    fn test_write_stops_when_full() {
        let node = LoopbackNode::new("lo", settings(2)).unwrap();
        let pool = SamplePool::new(4, 4);
        let out: Vec<_> = (0..4).map(|i| sample(&pool, i)).collect();

        assert_eq!(node.write(&out).unwrap(), 2);
        assert_eq!(node.pending(), 2);
    }

    #[test]
    fn test_read_times_out_empty() {
        let node = LoopbackNode::new("lo", settings(2)).unwrap();
        let pool = SamplePool::new(1, 4);
        let mut inp = vec![pool.alloc().unwrap()];

        let start = Instant::now();
        assert_eq!(node.read(&mut inp).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_stop_closes() {
        let node = Arc::new(LoopbackNode::new("lo", settings(4)).unwrap());
        let reader = {
            let node = Arc::clone(&node);
            thread::spawn(move || {
                let pool = SamplePool::new(1, 4);
                let mut inp = vec![pool.alloc().unwrap()];
                loop {
                    match node.read(&mut inp) {
                        Ok(_) => continue,
                        Err(e) => return e,
                    }
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        node.stop().unwrap();
        assert!(matches!(reader.join().unwrap(), NodeError::Closed { .. }));

        let pool = SamplePool::new(1, 4);
        assert!(node.write(&[sample(&pool, 0)]).is_err());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(LoopbackNode::new("lo", settings(0)).is_err());
    }
}
