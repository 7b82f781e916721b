//! mce core
//!
//! Ambient pieces shared by the mce streaming crates: logging bootstrap,
//! profiling hooks and the hash collections used by every registry.

pub mod alloc;
pub mod logging;
pub mod profiling;
