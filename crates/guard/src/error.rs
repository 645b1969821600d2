//! Standalone error types for aegis-guard
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::warn;

/// Guard errors
///
/// Only two kinds surface from this crate: the recursion-abort signal
/// ([`GuardError::StackOverflow`]) and the non-fatal platform discovery
/// failure ([`GuardError::PlatformQuery`]). Diagnostic-chain and timer
/// operations never fail.
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The reserved stack margin has been breached. The caller must abort
    /// the recursive descent and propagate failure upward; continuing past
    /// this error risks a real stack fault.
    #[error("stack size overflow: {used} bytes used, {remaining} bytes remaining (reserved {reserved})")]
    StackOverflow {
        /// Bytes of stack consumed at the time of the check
        used: usize,
        /// Bytes left before the stack's overflow end
        remaining: usize,
        /// Margin the check was performed against
        reserved: usize,
    },

    /// Thread stack attributes could not be queried from the platform.
    /// Non-fatal: callers should skip the overflow check or fall back to a
    /// conservative margin.
    #[error("platform stack query failed: {operation}{}", errno.map(|e| format!(" (errno {e})")).unwrap_or_default())]
    PlatformQuery {
        /// The platform call that failed
        operation: &'static str,
        /// Error code reported by the platform, when it reported one
        errno: Option<i32>,
    },
}

impl GuardError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::StackOverflow { .. } => "GUARD:STACK:OVERFLOW",
            Self::PlatformQuery { .. } => "GUARD:PLATFORM:QUERY",
        }
    }

    /// Check if this is the recursion-abort signal
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::StackOverflow { .. })
    }

    /// Check if this error is non-fatal for the caller
    ///
    /// A failed platform query leaves the overflow state indeterminate;
    /// callers are expected to log and carry on without the check.
    #[must_use]
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Self::PlatformQuery { .. })
    }

    /// Create a stack overflow error
    pub fn stack_overflow(used: usize, remaining: usize, reserved: usize) -> Self {
        Self::StackOverflow {
            used,
            remaining,
            reserved,
        }
    }

    /// Create a platform query error, naming the failing call
    pub fn platform_query(operation: &'static str, errno: Option<i32>) -> Self {
        #[cfg(feature = "logging")]
        warn!(operation, errno, "thread stack attribute query failed");

        Self::PlatformQuery { operation, errno }
    }
}

/// Result type for guard operations
pub type GuardResult<T> = core::result::Result<T, GuardError>;

/// Generic result type alias
pub type Result<T> = GuardResult<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_overflow_display() {
        let error = GuardError::stack_overflow(7 * 1024 * 1024, 512 * 1024, 1024 * 1024);
        let text = error.to_string();
        assert!(text.contains("stack size overflow"));
        assert!(text.contains("524288"));
    }

    #[test]
    fn test_platform_query_display() {
        let error = GuardError::platform_query("pthread_getattr_np", Some(22));
        let text = error.to_string();
        assert!(text.contains("pthread_getattr_np"));
        assert!(text.contains("errno 22"));

        let bare = GuardError::platform_query("thread stack attributes", None);
        assert!(!bare.to_string().contains("errno"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GuardError::stack_overflow(0, 0, 0).code(),
            "GUARD:STACK:OVERFLOW"
        );
        assert_eq!(
            GuardError::platform_query("x", None).code(),
            "GUARD:PLATFORM:QUERY"
        );
    }

    #[test]
    fn test_fatality_split() {
        assert!(GuardError::stack_overflow(0, 0, 0).is_overflow());
        assert!(!GuardError::stack_overflow(0, 0, 0).is_non_fatal());
        assert!(GuardError::platform_query("x", None).is_non_fatal());
    }
}
