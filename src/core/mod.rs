//! Core data-plane types
//!
//! This module contains the fundamental building blocks used by every path:
//! - Queue: lock-free bounded MPMC ring of offsets
//! - SignalledQueue: the same ring with sleeping consumers
//! - Pool: fixed-block allocator backed by a Queue
//! - Sample: pool-allocated timestamped value vectors
//! - Timespec: realtime timestamps

pub mod pool;
pub mod queue;
pub mod queue_signalled;
pub mod sample;
pub mod timestamp;

pub use pool::Pool;
pub use queue::{Queue, QueueError};
pub use queue_signalled::SignalledQueue;
pub use sample::{Sample, SamplePool, SampleRef, SampleTimestamps, SignalData, SignalType};
pub use timestamp::Timespec;
