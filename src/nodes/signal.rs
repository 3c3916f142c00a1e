//! Signal generator node
//!
//! Produces synthetic waveforms at a fixed rate. Used for testing paths
//! without any external transport.
//!
//! # Configuration
//! ```toml
//! [nodes.gen]
//! type = "signal"
//! signal = "sine"     # sine | square | triangle | ramp | counter | constant
//! values = 4
//! rate = 100.0        # samples per second, 0 = as fast as possible
//! frequency = 1.0
//! amplitude = 1.0
//! offset = 0.0
//! limit = 1000        # stop producing after this many samples
//! vectorize = 1
//! ```

use crate::core::{SampleRef, SignalData, Timespec};
use crate::nodes::traits::{Node, NodeError, NodeState};
use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

/// How long a read blocks once `limit` samples were produced
const EXHAUSTED_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Ramp,
    Counter,
    Constant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalSettings {
    #[serde(default = "default_waveform")]
    pub signal: Waveform,
    #[serde(default = "default_values")]
    pub values: usize,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_one")]
    pub frequency: f64,
    #[serde(default = "default_one")]
    pub amplitude: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default = "default_vectorize")]
    pub vectorize: usize,
}

fn default_waveform() -> Waveform {
    Waveform::Sine
}
fn default_values() -> usize {
    1
}
fn default_rate() -> f64 {
    10.0
}
fn default_one() -> f64 {
    1.0
}
fn default_vectorize() -> usize {
    1
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            signal: default_waveform(),
            values: default_values(),
            rate: default_rate(),
            frequency: default_one(),
            amplitude: default_one(),
            offset: 0.0,
            limit: None,
            vectorize: default_vectorize(),
        }
    }
}

impl SignalSettings {
    /// Value of the waveform at time `t` for sample number `counter`
    pub fn value_at(&self, t: f64, counter: u64) -> f64 {
        let phase = 2.0 * PI * self.frequency * t;
        let unit = match self.signal {
            Waveform::Sine => phase.sin(),
            Waveform::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => (2.0 / PI) * phase.sin().asin(),
            Waveform::Ramp => (self.frequency * t).fract(),
            Waveform::Counter => return self.offset + counter as f64,
            Waveform::Constant => 1.0,
        };
        self.offset + self.amplitude * unit
    }
}

struct Generator {
    state: NodeState,
    counter: u64,
    deadline: Instant,
}

pub struct SignalNode {
    name: String,
    settings: SignalSettings,
    inner: Mutex<Generator>,
    wakeup: Condvar,
}

impl SignalNode {
    pub fn new(name: impl Into<String>, settings: SignalSettings) -> Result<Self, NodeError> {
        let name = name.into();
        if settings.values == 0 {
            return Err(NodeError::Config {
                node: name,
                reason: "values must be at least 1".into(),
            });
        }
        if !settings.rate.is_finite() || settings.rate < 0.0 {
            return Err(NodeError::Config {
                node: name,
                reason: format!("invalid rate {}", settings.rate),
            });
        }

        Ok(Self {
            name,
            settings,
            inner: Mutex::new(Generator {
                state: NodeState::Initialized,
                counter: 0,
                deadline: Instant::now(),
            }),
            wakeup: Condvar::new(),
        })
    }

    /// Build from a `[nodes.<name>]` table
    pub fn from_config(name: &str, cfg: &toml::Table) -> Result<Self, NodeError> {
        let settings: SignalSettings = toml::Value::Table(cfg.clone())
            .try_into()
            .map_err(|e: toml::de::Error| NodeError::Config {
                node: name.to_string(),
                reason: e.message().to_string(),
            })?;
        Self::new(name, settings)
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    /// Samples generated so far
    pub fn generated(&self) -> u64 {
        self.inner.lock().counter
    }

    #[inline]
    fn period(&self) -> Option<Duration> {
        (self.settings.rate > 0.0).then(|| Duration::from_secs_f64(1.0 / self.settings.rate))
    }
}

impl Node for SignalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "signal"
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

    fn start(&self) -> Result<(), NodeError> {
        let mut inner = self.inner.lock();
        inner.state = NodeState::Started;
        inner.counter = 0;
        inner.deadline = Instant::now() + self.period().unwrap_or_default();
        tracing::debug!(target: "node", node = %self.name, waveform = ?self.settings.signal, "Signal generator started");
        Ok(())
    }

    fn stop(&self) -> Result<(), NodeError> {
        self.inner.lock().state = NodeState::Stopped;
        self.wakeup.notify_all();
        Ok(())
    }

    fn interrupt(&self) {
        self.wakeup.notify_all();
    }

    /// Wait for the next tick and emit every sample that became due since
    /// the last read (at most `smps.len()`).
    fn read(&self, smps: &mut [SampleRef]) -> Result<usize, NodeError> {
        let mut inner = self.inner.lock();
        if inner.state != NodeState::Started {
            return Err(NodeError::NotRunning {
                node: self.name.clone(),
            });
        }

        let mut due = smps.len() as u64;
        if let Some(period) = self.period() {
            let deadline = inner.deadline;
            if Instant::now() < deadline {
                self.wakeup.wait_until(&mut inner, deadline);
            }
            let now = Instant::now();
            if now < inner.deadline || inner.state != NodeState::Started {
                // interrupted
                return Ok(0);
            }

            let behind = now.duration_since(inner.deadline).as_secs_f64() / period.as_secs_f64();
            let steps = behind as u64 + 1;
            inner.deadline += period.mul_f64(steps as f64);
            due = due.min(steps);
        }

        if let Some(limit) = self.settings.limit {
            if inner.counter >= limit {
                self.wakeup.wait_for(&mut inner, EXHAUSTED_WAIT);
                return Ok(0);
            }
            due = due.min(limit - inner.counter);
        }

        let now = Timespec::now();
        let mut n = 0;
        for smp in smps.iter_mut().take(due as usize) {
            let Some(s) = smp.get_mut() else {
                break;
            };
            let counter = inner.counter;
            let t = match self.period() {
                Some(period) => counter as f64 * period.as_secs_f64(),
                None => counter as f64,
            };

            s.sequence = counter;
            s.ts.origin = now;
            s.ts.received = Timespec::INVALID;
            s.ts.sent = Timespec::INVALID;
            s.set_len(0);
            let value = self.settings.value_at(t, counter);
            for _ in 0..self.settings.values {
                if !s.push(SignalData::Float(value)) {
                    break;
                }
            }

            inner.counter += 1;
            n += 1;
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SamplePool;

    fn settings(signal: Waveform) -> SignalSettings {
        SignalSettings {
            signal,
            rate: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_waveform_values() {
        let sine = settings(Waveform::Sine);
        assert!(sine.value_at(0.0, 0).abs() < 1e-12);
        assert!((sine.value_at(0.25, 0) - 1.0).abs() < 1e-12);

        let square = settings(Waveform::Square);
        assert_eq!(square.value_at(0.25, 0), 1.0);
        assert_eq!(square.value_at(0.75, 0), -1.0);

        let tri = settings(Waveform::Triangle);
        assert!((tri.value_at(0.25, 0) - 1.0).abs() < 1e-9);

        let ramp = settings(Waveform::Ramp);
        assert!((ramp.value_at(1.5, 0) - 0.5).abs() < 1e-12);

        let counter = SignalSettings {
            offset: 10.0,
            ..settings(Waveform::Counter)
        };
        assert_eq!(counter.value_at(99.0, 7), 17.0);

        let constant = SignalSettings {
            amplitude: 3.0,
            ..settings(Waveform::Constant)
        };
        assert_eq!(constant.value_at(5.0, 5), 3.0);
    }

    #[test]
    fn test_read_unthrottled_with_limit() {
        let node = SignalNode::new(
            "gen",
            SignalSettings {
                values: 3,
                limit: Some(5),
                ..settings(Waveform::Counter)
            },
        )
        .unwrap();
        node.start().unwrap();

        let pool = SamplePool::new(8, 3);
        let mut smps = Vec::with_capacity(4);
        pool.alloc_many(&mut smps, 4);

        assert_eq!(node.read(&mut smps).unwrap(), 4);
        assert_eq!(smps[3].sequence, 3);
        assert_eq!(smps[3].values(), &[SignalData::Float(3.0); 3]);
        assert!(!smps[0].ts.origin.is_unset());

        assert_eq!(node.read(&mut smps).unwrap(), 1);
        assert_eq!(smps[0].sequence, 4);
        assert_eq!(node.read(&mut smps).unwrap(), 0);
        assert_eq!(node.generated(), 5);
    }

    #[test]
    fn test_read_before_start_fails() {
        let node = SignalNode::new("gen", SignalSettings::default()).unwrap();
        let pool = SamplePool::new(1, 1);
        let mut smps = vec![pool.alloc().unwrap()];
        assert!(matches!(node.read(&mut smps), Err(NodeError::NotRunning { .. })));
    }

    #[test]
    fn test_rate_paces_reads() {
        let node = SignalNode::new(
            "gen",
            SignalSettings {
                rate: 100.0,
                ..Default::default()
            },
        )
        .unwrap();
        node.start().unwrap();

        let pool = SamplePool::new(2, 1);
        let mut smps = vec![pool.alloc().unwrap()];
        let start = Instant::now();
        let mut total = 0;
        while total < 5 {
            total += node.read(&mut smps).unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_from_config() {
        let cfg: toml::Table = toml::from_str(
            r#"
            type = "signal"
            signal = "square"
            values = 2
            rate = 50.0
            "#,
        )
        .unwrap();
        let node = SignalNode::from_config("sq", &cfg).unwrap();
        assert_eq!(node.settings().signal, Waveform::Square);
        assert_eq!(node.signal_count(), 2);
        assert_eq!(node.vectorize(), 1);

        let bad: toml::Table = toml::from_str("signal = \"noise\"").unwrap();
        assert!(matches!(SignalNode::from_config("x", &bad), Err(NodeError::Config { .. })));

        let zero: toml::Table = toml::from_str("values = 0").unwrap();
        assert!(SignalNode::from_config("x", &zero).is_err());
    }
}
