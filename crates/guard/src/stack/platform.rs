//! Platform-level thread stack attribute queries
//!
//! The one place OS-specific code lives. Each target answers a single
//! question: what memory region holds the calling thread's stack?

use super::StackBounds;
use crate::error::{GuardError, GuardResult};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(super) fn thread_stack_region() -> GuardResult<StackBounds> {
    use core::mem::MaybeUninit;

    // SAFETY: pthread_getattr_np fills `attr` for the calling thread; the
    // attr object is destroyed before returning on every path past init.
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        let rc = libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr());
        if rc != 0 {
            return Err(GuardError::platform_query("pthread_getattr_np", Some(rc)));
        }
        let mut attr = attr.assume_init();

        let mut base: *mut libc::c_void = core::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &raw mut base, &raw mut size);
        let _ = libc::pthread_attr_destroy(&mut attr);
        if rc != 0 {
            return Err(GuardError::platform_query("pthread_attr_getstack", Some(rc)));
        }
        if base.is_null() || size == 0 {
            return Err(GuardError::platform_query("pthread_attr_getstack", None));
        }

        // pthread reports the LOW address of the region.
        Ok(StackBounds::new(base as usize, size))
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub(super) fn thread_stack_region() -> GuardResult<StackBounds> {
    // SAFETY: both calls only read attributes of the calling thread.
    unsafe {
        let thread = libc::pthread_self();
        // Apple reports the HIGH end of the stack, not the base.
        let high = libc::pthread_get_stackaddr_np(thread) as usize;
        let size = libc::pthread_get_stacksize_np(thread);
        if high == 0 || size == 0 || size > high {
            return Err(GuardError::platform_query("pthread_get_stackaddr_np", None));
        }
        Ok(StackBounds::new(high - size, size))
    }
}

#[cfg(windows)]
pub(super) fn thread_stack_region() -> GuardResult<StackBounds> {
    use winapi::shared::basetsd::ULONG_PTR;
    use winapi::um::processthreadsapi::GetCurrentThreadStackLimits;

    let mut low: ULONG_PTR = 0;
    let mut high: ULONG_PTR = 0;
    // SAFETY: plain out-parameter query for the calling thread; cannot fail.
    unsafe {
        GetCurrentThreadStackLimits(&raw mut low, &raw mut high);
    }
    if high <= low {
        return Err(GuardError::platform_query(
            "GetCurrentThreadStackLimits",
            None,
        ));
    }
    // ULONG_PTR is usize on every windows target.
    Ok(StackBounds::new(low, high - low))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    windows
)))]
pub(super) fn thread_stack_region() -> GuardResult<StackBounds> {
    Err(GuardError::platform_query("thread stack attributes", None))
}
