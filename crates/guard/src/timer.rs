//! Phase timing for sequential steps of one operation
//!
//! [`PhaseTimer`] is cheap manual instrumentation: construct it at the top
//! of a multi-step operation, [`mark`](PhaseTimer::mark) between steps, and
//! render the recorded phases into a caller-supplied buffer for diagnostic
//! output. Everything is inline, fixed-capacity and allocation-free, so it
//! stays usable on paths already under stack pressure.

use core::fmt::Write as _;
use core::time::Duration;
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::utils::SliceWriter;

/// Anchor for the monotonic microsecond clock. Readings are relative to
/// first use, which is all the deltas below ever need.
static CLOCK_ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic microseconds since the process clock anchor. Non-blocking.
#[inline]
#[must_use]
pub fn monotonic_micros() -> u64 {
    CLOCK_ANCHOR.elapsed().as_micros() as u64
}

/// Maximum number of recorded clicks per timer; later marks are dropped.
pub const MAX_CLICKS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Click<'a> {
    label: Option<&'a str>,
    micros: u64,
}

const EMPTY_CLICK: Click<'static> = Click {
    label: None,
    micros: 0,
};

/// Fixed-capacity recorder of per-phase wall-clock durations.
///
/// Labels are borrowed, not copied — the timer holds them only as long as
/// the caller's text lives, which the `'a` lifetime enforces.
///
/// ```rust
/// use aegis_guard::timer::PhaseTimer;
///
/// let mut timer = PhaseTimer::start();
/// // ... parse ...
/// timer.mark_as("parse");
/// // ... execute ...
/// timer.mark_as("execute");
///
/// let mut buf = [0u8; 128];
/// let n = timer.render(&mut buf);
/// // e.g. "parse=142µs, execute=87µs"
/// # assert!(n > 0);
/// ```
#[derive(Debug, Clone)]
pub struct PhaseTimer<'a> {
    start_us: u64,
    last_us: u64,
    count: usize,
    clicks: [Click<'a>; MAX_CLICKS],
}

impl<'a> PhaseTimer<'a> {
    /// Start timing: records the current instant as both the operation
    /// start and the previous-click timestamp.
    #[must_use]
    pub fn start() -> Self {
        let now = monotonic_micros();
        Self {
            start_us: now,
            last_us: now,
            count: 0,
            clicks: [EMPTY_CLICK; MAX_CLICKS],
        }
    }

    /// Record an unlabeled click: the duration since the previous click.
    pub fn mark(&mut self) {
        self.record(None);
    }

    /// Record a labeled click. The label must outlive the timer.
    pub fn mark_as(&mut self, label: &'a str) {
        self.record(Some(label));
    }

    fn record(&mut self, label: Option<&'a str>) {
        let now = monotonic_micros();
        if self.count < MAX_CLICKS {
            self.clicks[self.count] = Click {
                label,
                micros: now - self.last_us,
            };
            self.count += 1;
            self.last_us = now;
        }
        // Past capacity the click is dropped entirely; not an error.
    }

    /// Number of recorded clicks, at most [`MAX_CLICKS`].
    #[must_use]
    pub fn click_count(&self) -> usize {
        self.count
    }

    /// Start timestamp on the [`monotonic_micros`] clock.
    #[must_use]
    pub fn start_micros(&self) -> u64 {
        self.start_us
    }

    /// Wall-clock time since [`start`](Self::start). Does not consume a
    /// click slot and may be called at any time.
    #[must_use]
    pub fn elapsed_since_start(&self) -> Duration {
        Duration::from_micros(monotonic_micros().saturating_sub(self.start_us))
    }

    /// Recorded clicks in call order: `(label, duration since previous)`.
    pub fn clicks(&self) -> impl Iterator<Item = (Option<&'a str>, Duration)> + '_ {
        self.clicks[..self.count]
            .iter()
            .map(|click| (click.label, Duration::from_micros(click.micros)))
    }

    /// Format all recorded clicks into `buf` in call order, truncating when
    /// the buffer runs out. Returns bytes written; never writes past
    /// `buf.len()`. Unlabeled clicks render under their index.
    pub fn render(&self, buf: &mut [u8]) -> usize {
        let mut out = SliceWriter::new(buf);
        for (index, click) in self.clicks[..self.count].iter().enumerate() {
            if index > 0 {
                let _ = out.write_str(", ");
            }
            let _ = match click.label {
                Some(label) => write!(out, "{label}={}µs", click.micros),
                None => write!(out, "#{index}={}µs", click.micros),
            };
        }
        out.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_micros_non_decreasing() {
        let a = monotonic_micros();
        let b = monotonic_micros();
        assert!(b >= a);
    }

    #[test]
    fn test_clicks_recorded_in_order() {
        let mut timer = PhaseTimer::start();
        timer.mark_as("alpha");
        timer.mark_as("beta");
        timer.mark();
        assert_eq!(timer.click_count(), 3);

        let labels: Vec<_> = timer.clicks().map(|(label, _)| label).collect();
        assert_eq!(labels, [Some("alpha"), Some("beta"), None]);

        let mut buf = [0u8; 256];
        let n = timer.render(&mut buf);
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert_eq!(text.matches("µs").count(), 3);
        let alpha = text.find("alpha=").unwrap();
        let beta = text.find("beta=").unwrap();
        let unnamed = text.find("#2=").unwrap();
        assert!(alpha < beta && beta < unnamed);
    }

    #[test]
    fn test_capacity_is_silently_enforced() {
        let mut timer = PhaseTimer::start();
        for _ in 0..MAX_CLICKS {
            timer.mark();
        }
        assert_eq!(timer.click_count(), MAX_CLICKS);

        let mut buf = [0u8; 512];
        let before = timer.render(&mut buf);

        // The 17th mark has no observable effect.
        timer.mark_as("overflowing");
        assert_eq!(timer.click_count(), MAX_CLICKS);
        let after = timer.render(&mut buf);
        assert_eq!(before, after);
        assert!(!core::str::from_utf8(&buf[..after]).unwrap().contains("overflowing"));
    }

    #[test]
    fn test_elapsed_since_start_monotone() {
        let timer = PhaseTimer::start();
        let first = timer.elapsed_since_start();
        let second = timer.elapsed_since_start();
        assert!(second >= first);
    }

    #[test]
    fn test_render_respects_capacity() {
        let mut timer = PhaseTimer::start();
        timer.mark_as("first_phase");
        timer.mark_as("second_phase");

        let mut full = [0u8; 256];
        let full_len = timer.render(&mut full);

        let mut tiny = [0u8; 10];
        let tiny_len = timer.render(&mut tiny);
        assert!(tiny_len <= tiny.len());
        assert!(tiny_len < full_len);

        // The written prefix matches the untruncated rendering.
        assert_eq!(&full[..tiny_len], &tiny[..tiny_len]);
    }
}
