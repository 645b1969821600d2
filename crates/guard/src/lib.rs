#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![allow(unsafe_code)] // Thread-stack discovery and chain walking require unsafe
//! # Aegis Guard
//!
//! Runtime safety guards for the Aegis server ecosystem.
//!
//! This crate provides three small, independent leaf components:
//! - Stack-overflow detection for deep recursion ([`stack`]): discovers the
//!   calling thread's stack region and reports when the configured reserved
//!   margin is breached, early enough to fail gracefully instead of
//!   faulting.
//! - A thread-local diagnostic context chain ([`diagnostic`]): nested
//!   scopes publish extra state for a fatal-error handler to print.
//! - A fixed-capacity phase timer ([`timer`]): per-phase wall-clock deltas
//!   for human-readable diagnostics.
//!
//! All of it is allocation-free, lock-free and thread-local in effect —
//! safe to call on paths that are already running out of stack.
//!
//! ## Example
//!
//! ```rust
//! use aegis_guard::prelude::*;
//!
//! fn plan(depth: usize) -> GuardResult<usize> {
//!     // The single call every deep-recursion function makes at entry.
//!     check_stack_overflow()?;
//!     if depth == 0 { Ok(0) } else { plan(depth - 1) }
//! }
//!
//! fn main() -> GuardResult<()> {
//!     aegis_guard::init()?;
//!     let mut timer = PhaseTimer::start();
//!     plan(256)?;
//!     timer.mark_as("plan");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging on the cold paths via
//!   `tracing`. The hot-path check never logs.

pub mod diagnostic;
pub mod error;
pub mod stack;
pub mod timer;
pub mod utils;

// Re-export the working set for convenience
pub use error::{GuardError, GuardResult};
pub use stack::check_stack_overflow;

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and functions.

    pub use crate::diagnostic::{DiagnosticContext, render_contexts, visit_contexts, with_context};
    pub use crate::error::{GuardError, GuardResult, Result};
    pub use crate::stack::{
        StackBounds, StackHeadroom, StackProbe, check_stack_overflow, probe_stack,
        reserved_stack_size, set_reserved_stack_size, set_stack_bounds, stack_bounds,
        stack_headroom,
    };
    pub use crate::timer::{MAX_CLICKS, PhaseTimer, monotonic_micros};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Warm the calling thread's stack-bounds cache.
///
/// Call once at startup (and optionally at the top of each long-lived
/// worker thread) to move the one-time platform query off the first
/// hot-path check.
///
/// # Errors
///
/// Propagates [`GuardError::PlatformQuery`] when discovery fails. Non-fatal
/// by contract: the overflow check fails open without bounds, so a caller
/// may log and continue.
pub fn init() -> GuardResult<()> {
    #[cfg(feature = "logging")]
    debug!("initializing aegis-guard");

    let bounds = stack::stack_bounds()?;

    #[cfg(feature = "logging")]
    info!(
        base = bounds.low(),
        size = bounds.size,
        "thread stack bounds discovered"
    );
    #[cfg(not(feature = "logging"))]
    let _ = bounds;

    Ok(())
}
