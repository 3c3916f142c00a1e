//! Hot path - per-path processing loop
//!
//! This module contains latency-critical code:
//! - Hook trait and lifecycle
//! - Ordered hook chain
//! - Path engine (read, hooks, fan-out, drain)

pub mod hook;
pub mod hook_list;
pub mod path;

pub use hook::{Hook, HookContext, HookError, HookInstance, HookPlugin, HookRegistry, HookState, SampleMeta};
pub use hook_list::HookList;
pub use path::{CancelToken, Path, PathConfig, PathError, PathState};
