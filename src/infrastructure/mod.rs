//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Logging and metrics
//! - Histograms for the stats hook
//! - Configuration management

pub mod config;
pub mod hist;
pub mod logging;
pub mod metrics;

pub use config::{Config, ConfigError, GlobalConfig, PathSection};
pub use hist::{Histogram, HistogramSnapshot};
pub use metrics::{DestinationStats, DestinationStatsSnapshot, PathStats, PathStatsSnapshot};
