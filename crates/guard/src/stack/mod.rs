//! Stack bounds tracking and overflow detection
//!
//! A function at risk of deep recursion calls [`check_stack_overflow`] at
//! entry and propagates the error instead of descending further:
//!
//! ```rust
//! use aegis_guard::error::GuardResult;
//! use aegis_guard::stack::check_stack_overflow;
//!
//! fn walk(depth: usize) -> GuardResult<usize> {
//!     check_stack_overflow()?;
//!     if depth == 0 { Ok(0) } else { walk(depth - 1) }
//! }
//! # assert_eq!(walk(100).unwrap(), 0);
//! ```
//!
//! The check is O(1) and allocation-, lock- and recursion-free: it compares
//! the current stack pointer against the thread's cached stack region. The
//! region is discovered from the platform once per thread (see
//! [`stack_bounds`]) and can be overridden for threads running on custom
//! stacks (see [`set_stack_bounds`]).

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{GuardError, GuardResult};
use crate::utils::format_bytes;

mod platform;

/// Default reserved margin: 1 MiB of headroom must remain unused.
pub const DEFAULT_RESERVED_STACK_SIZE: usize = 1024 * 1024;

/// Call stacks grow downward on every supported target. A port to an
/// upward-growing architecture flips this constant and nothing else.
const STACK_GROWS_DOWNWARD: bool = true;

/// Process-wide reserved margin. Relaxed is enough: this is configured once
/// at startup and only read afterwards (see [`set_reserved_stack_size`]).
static RESERVED_STACK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_RESERVED_STACK_SIZE);

/// Current process-wide reserved stack margin in bytes.
#[inline]
pub fn reserved_stack_size() -> usize {
    RESERVED_STACK_SIZE.load(Ordering::Relaxed)
}

/// Set the process-wide reserved stack margin.
///
/// Intended as a startup-time-only mutation: configure it before spawning
/// worker threads and leave it alone afterwards. Concurrent readers see
/// either the old or the new value, never a torn one.
pub fn set_reserved_stack_size(bytes: usize) {
    RESERVED_STACK_SIZE.store(bytes, Ordering::Relaxed);
}

/// A thread's stack memory region. `base` is the LOW address of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBounds {
    /// Lowest address of the stack region
    pub base: usize,
    /// Region size in bytes
    pub size: usize,
}

impl StackBounds {
    /// Create bounds from a base (low) address and a size.
    #[must_use]
    pub fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Lowest address of the region
    #[inline]
    #[must_use]
    pub fn low(&self) -> usize {
        self.base
    }

    /// One past the highest address of the region
    #[inline]
    #[must_use]
    pub fn high(&self) -> usize {
        self.base + self.size
    }

    /// Whether `addr` falls inside the region
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.low() && addr < self.high()
    }
}

impl fmt::Display for StackBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x} ({})", self.low(), self.high(), format_bytes(self.size as u64))
    }
}

/// Per-thread bounds cache. Discovery runs at most once per thread; a
/// failed query is cached too, so a broken platform costs one syscall per
/// thread rather than one per check.
#[derive(Clone, Copy)]
enum BoundsCache {
    Unqueried,
    Known(StackBounds),
    Failed {
        operation: &'static str,
        errno: Option<i32>,
    },
}

thread_local! {
    static BOUNDS: Cell<BoundsCache> = const { Cell::new(BoundsCache::Unqueried) };
}

/// The calling thread's stack region, discovered from the platform on first
/// use and cached for the lifetime of the thread.
///
/// # Errors
///
/// [`GuardError::PlatformQuery`] when the platform cannot report the stack
/// attributes for this thread. Treat as non-fatal: skip the overflow check
/// or install bounds manually via [`set_stack_bounds`].
pub fn stack_bounds() -> GuardResult<StackBounds> {
    BOUNDS.with(|cell| match cell.get() {
        BoundsCache::Known(bounds) => Ok(bounds),
        BoundsCache::Failed { operation, errno } => {
            // Replay the cached failure without logging it again.
            Err(GuardError::PlatformQuery { operation, errno })
        }
        BoundsCache::Unqueried => match platform::thread_stack_region() {
            Ok(bounds) => {
                cell.set(BoundsCache::Known(bounds));
                Ok(bounds)
            }
            Err(err) => {
                let (operation, errno) = match &err {
                    GuardError::PlatformQuery { operation, errno } => (*operation, *errno),
                    _ => ("thread stack attributes", None),
                };
                cell.set(BoundsCache::Failed { operation, errno });
                Err(err)
            }
        },
    })
}

/// Install explicit stack bounds for the calling thread.
///
/// For threads whose stack did not come from the platform default: fiber
/// and coroutine stacks, or pool workers running on a custom allocation.
/// Once set, no platform discovery happens on this thread; a later call
/// replaces the previous override.
pub fn set_stack_bounds(bounds: StackBounds) {
    BOUNDS.with(|cell| cell.set(BoundsCache::Known(bounds)));
}

/// Approximate current stack pointer: the address of a fresh local.
#[inline(always)]
#[must_use]
pub fn current_stack_pointer() -> usize {
    let marker = 0u8;
    (&raw const marker) as usize
}

/// Result of a detailed headroom check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackHeadroom {
    /// Bytes consumed between the stack's far end and the current pointer
    pub used: usize,
    /// Bytes left before the stack's near (overflow) end
    pub remaining: usize,
    /// Margin the check was performed against
    pub reserved: usize,
}

impl StackHeadroom {
    /// The margin is a strict lower bound: `remaining == reserved` is safe.
    #[inline]
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.remaining < self.reserved
    }
}

impl fmt::Display for StackHeadroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used {} / remaining {} (reserved {})",
            format_bytes(self.used as u64),
            format_bytes(self.remaining as u64),
            format_bytes(self.reserved as u64)
        )
    }
}

/// Tri-state overflow probe: unlike a boolean check, "bounds unknown" is
/// distinguishable from both outcomes instead of being silently conflated
/// with one of them.
#[derive(Debug, Clone)]
pub enum StackProbe {
    /// The reserved margin is intact
    Safe(StackHeadroom),
    /// The reserved margin has been breached
    Overflow(StackHeadroom),
    /// Bounds discovery failed; the overflow state is indeterminate
    Unknown(GuardError),
}

impl StackProbe {
    /// Whether this probe definitely detected an overflow
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow(_))
    }

    /// Headroom details, when bounds were known
    #[must_use]
    pub fn headroom(&self) -> Option<StackHeadroom> {
        match self {
            Self::Safe(h) | Self::Overflow(h) => Some(*h),
            Self::Unknown(_) => None,
        }
    }
}

fn headroom_at(bounds: StackBounds, sp: usize, reserved: usize) -> StackHeadroom {
    let (used, remaining) = if STACK_GROWS_DOWNWARD {
        (bounds.high().saturating_sub(sp), sp.saturating_sub(bounds.low()))
    } else {
        (sp.saturating_sub(bounds.low()), bounds.high().saturating_sub(sp))
    };
    StackHeadroom {
        used,
        remaining,
        reserved,
    }
}

/// Detailed headroom check against `reserved` bytes of margin, or the
/// process-wide margin when `None`. The margin is read at call time, so a
/// startup-time [`set_reserved_stack_size`] is always honored.
///
/// # Errors
///
/// Propagates [`GuardError::PlatformQuery`] when bounds discovery failed.
pub fn stack_headroom(reserved: Option<usize>) -> GuardResult<StackHeadroom> {
    let bounds = stack_bounds()?;
    let reserved = reserved.unwrap_or_else(reserved_stack_size);
    Ok(headroom_at(bounds, current_stack_pointer(), reserved))
}

/// Tri-state form of [`stack_headroom`]: never errors, reports "unknown"
/// as its own outcome.
pub fn probe_stack(reserved: Option<usize>) -> StackProbe {
    match stack_headroom(reserved) {
        Ok(h) if h.is_overflow() => StackProbe::Overflow(h),
        Ok(h) => StackProbe::Safe(h),
        Err(err) => StackProbe::Unknown(err),
    }
}

/// Hot-path overflow check: the single call every deep-recursion function
/// makes at entry.
///
/// Fail-open: when bounds discovery failed the recursion proceeds — the
/// guard is a diagnostic optimization, not an availability gate. Use
/// [`probe_stack`] where "unknown" must be visible.
///
/// # Errors
///
/// [`GuardError::StackOverflow`] when the reserved margin is breached. The
/// caller must stop descending and propagate the error; there is no retry.
#[inline]
pub fn check_stack_overflow() -> GuardResult<()> {
    match stack_headroom(None) {
        Ok(h) if h.is_overflow() => {
            Err(GuardError::stack_overflow(h.used, h.remaining, h.reserved))
        }
        _ => Ok(()),
    }
}
