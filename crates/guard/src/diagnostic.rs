//! Thread-local diagnostic context chain
//!
//! Nested scopes publish "extra state to print if a fatal error fires while
//! I'm active" without locks or heap allocation. Each [`with_context`] call
//! links an intrusive node onto the calling thread's chain for the duration
//! of the closure; a fatal-error handler walks the chain with
//! [`visit_contexts`] or dumps it with [`render_contexts`], most recent
//! scope first.
//!
//! The chain is strictly LIFO and strictly per-thread. Because nodes live
//! in the `with_context` call frame and the previous head is restored by a
//! drop guard, out-of-order teardown is impossible by construction — the
//! guard runs on normal return and on unwind alike.

use core::cell::Cell;
use core::fmt::Write as _;
use core::ptr;

use crate::utils::SliceWriter;

/// Capability interface for one piece of diagnostic state.
///
/// A fatal-error handler calls [`render`](Self::render) without knowing the
/// concrete type. Implementations must write at most `buf.len()` bytes and
/// return the count actually written; [`SliceWriter`] does the bookkeeping:
///
/// ```rust
/// use core::fmt::Write as _;
/// use aegis_guard::diagnostic::DiagnosticContext;
/// use aegis_guard::utils::SliceWriter;
///
/// struct TxnState { txn_id: u64 }
///
/// impl DiagnosticContext for TxnState {
///     fn render(&self, buf: &mut [u8]) -> usize {
///         let mut out = SliceWriter::new(buf);
///         let _ = write!(out, "txn={}", self.txn_id);
///         out.written()
///     }
/// }
/// ```
pub trait DiagnosticContext {
    /// Render this context's state into `buf`, returning bytes written.
    fn render(&self, buf: &mut [u8]) -> usize;
}

/// Borrowed free-text context, the smallest useful implementor.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a>(pub &'a str);

impl DiagnosticContext for MessageContext<'_> {
    fn render(&self, buf: &mut [u8]) -> usize {
        let mut out = SliceWriter::new(buf);
        let _ = out.write_str(self.0);
        out.written()
    }
}

/// Intrusive chain node. Lives in a `with_context` call frame, never on the
/// heap; `prev` restores the chain on scope exit and doubles as the walk
/// link for [`visit_contexts`].
struct ChainNode<'a> {
    ctx: &'a dyn DiagnosticContext,
    prev: *const ChainNode<'static>,
}

thread_local! {
    static CHAIN_HEAD: Cell<*const ChainNode<'static>> = const { Cell::new(ptr::null()) };
}

/// Restores the captured head on drop, so the chain unwinds correctly on
/// early return and panic as well as normal exit.
struct RestoreHead {
    prev: *const ChainNode<'static>,
}

impl Drop for RestoreHead {
    fn drop(&mut self) {
        CHAIN_HEAD.with(|head| head.set(self.prev));
    }
}

/// Run `f` with `ctx` linked at the head of this thread's diagnostic chain.
///
/// Scopes nest: the innermost active context is walked first. The link is
/// a single thread-local pointer store each way; nothing is allocated and
/// nothing synchronizes.
pub fn with_context<R>(ctx: &dyn DiagnosticContext, f: impl FnOnce() -> R) -> R {
    let prev = CHAIN_HEAD.with(Cell::get);
    let node = ChainNode { ctx, prev };
    // Erase the borrow lifetime; the node never outlives this frame and the
    // head is restored before the frame is torn down.
    let raw = (&raw const node).cast::<ChainNode<'static>>();
    CHAIN_HEAD.with(|head| head.set(raw));
    let _restore = RestoreHead { prev };
    f()
}

/// Walk this thread's active diagnostic contexts, most recent first.
///
/// This is the fatal-error handler's entry point; on a thread with no
/// active contexts the visitor is never called.
pub fn visit_contexts(mut visitor: impl FnMut(&dyn DiagnosticContext)) {
    let mut cursor = CHAIN_HEAD.with(Cell::get);
    while !cursor.is_null() {
        // SAFETY: every node on the chain lives in a `with_context` frame
        // further down this thread's call stack, and each frame restores
        // the head before unwinding past its node.
        let node = unsafe { &*cursor };
        visitor(node.ctx);
        cursor = node.prev;
    }
}

/// Whether the calling thread has any active diagnostic context.
#[must_use]
pub fn has_context() -> bool {
    !CHAIN_HEAD.with(Cell::get).is_null()
}

/// Number of active diagnostic contexts on the calling thread.
#[must_use]
pub fn context_depth() -> usize {
    let mut depth = 0;
    visit_contexts(|_| depth += 1);
    depth
}

/// Render every active context into `buf`, `"; "`-separated, most recent
/// first. Truncates when the buffer runs out; returns bytes written.
pub fn render_contexts(buf: &mut [u8]) -> usize {
    let mut written = 0;
    visit_contexts(|ctx| {
        if written > 0 && written < buf.len() {
            let sep = b"; ";
            let n = sep.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&sep[..n]);
            written += n;
        }
        if written < buf.len() {
            written += ctx.render(&mut buf[written..]);
        }
    });
    written
}

#[cfg(test)]
mod tests {
    use core::fmt::Write as _;

    use super::*;

    struct Labeled(&'static str);

    impl DiagnosticContext for Labeled {
        fn render(&self, buf: &mut [u8]) -> usize {
            let mut out = SliceWriter::new(buf);
            let _ = out.write_str(self.0);
            out.written()
        }
    }

    fn collected() -> Vec<String> {
        let mut seen = Vec::new();
        visit_contexts(|ctx| {
            let mut buf = [0u8; 64];
            let n = ctx.render(&mut buf);
            seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        });
        seen
    }

    #[test]
    fn test_nested_scopes_are_lifo_and_unlink() {
        assert!(!has_context());

        with_context(&Labeled("outer"), || {
            assert_eq!(collected(), ["outer"]);

            with_context(&Labeled("inner"), || {
                assert_eq!(context_depth(), 2);
                assert_eq!(collected(), ["inner", "outer"]);
            });

            assert_eq!(collected(), ["outer"]);
        });

        assert!(!has_context());
        assert_eq!(context_depth(), 0);
    }

    #[test]
    fn test_head_restored_on_panic() {
        let unwound = std::panic::catch_unwind(|| {
            with_context(&Labeled("doomed"), || panic!("boom"));
        });
        assert!(unwound.is_err());
        assert!(!has_context());
    }

    #[test]
    fn test_render_contexts_joins_and_truncates() {
        with_context(&Labeled("alpha"), || {
            with_context(&Labeled("beta"), || {
                let mut buf = [0u8; 64];
                let n = render_contexts(&mut buf);
                assert_eq!(&buf[..n], b"beta; alpha");

                // Not enough room for the separator and second entry.
                let mut tiny = [0u8; 6];
                let n = render_contexts(&mut tiny);
                assert_eq!(n, tiny.len());
                assert_eq!(&tiny, b"beta; ");
            });
        });
    }

    #[test]
    fn test_message_context_renders_itself() {
        let ctx = MessageContext("plan stage 3");
        let mut buf = [0u8; 32];
        let n = ctx.render(&mut buf);
        assert_eq!(&buf[..n], b"plan stage 3");
    }
}
