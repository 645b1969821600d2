use core::fmt::Write as _;

use aegis_guard::prelude::*;
use aegis_guard::utils::SliceWriter;

/// A planner frame a fatal-error handler would want to see.
struct PlanFrame {
    rule: &'static str,
    depth: usize,
}

impl DiagnosticContext for PlanFrame {
    fn render(&self, buf: &mut [u8]) -> usize {
        let mut out = SliceWriter::new(buf);
        let _ = write!(out, "rule={} depth={}", self.rule, self.depth);
        out.written()
    }
}

fn rewrite(depth: usize) -> GuardResult<usize> {
    check_stack_overflow()?;
    if depth == 0 {
        return Ok(0);
    }
    let frame = PlanFrame { rule: "fold-constants", depth };
    with_context(&frame, || rewrite(depth - 1).map(|n| n + 1))
}

fn main() -> GuardResult<()> {
    aegis_guard::init()?;

    let bounds = stack_bounds()?;
    println!("stack region : {bounds}");
    println!("reserved     : {} bytes", reserved_stack_size());

    let mut timer = PhaseTimer::start();

    let rewritten = rewrite(512)?;
    timer.mark_as("rewrite");

    let headroom = stack_headroom(None)?;
    timer.mark_as("headroom");

    println!("rewrote {rewritten} nodes, {headroom}");

    let mut buf = [0u8; 256];
    let n = timer.render(&mut buf);
    println!("phases       : {}", core::str::from_utf8(&buf[..n]).unwrap_or_default());

    Ok(())
}
