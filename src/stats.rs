//! Runtime diagnostics: cheap, allocation-free checks a caller can run
//! after `process` to catch a runaway graph, surfaced through `tracing`
//! rather than the `println!` debugging the teacher used.

use tracing::warn;

use crate::container::Container;
use crate::proc::Proc;

/// A snapshot of one container's health after a `process` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphStats {
    pub proc_count: usize,
    pub buffer_count: usize,
    pub nan_or_inf_outputs: usize,
}

/// Walks every op's output buffers looking for non-finite samples. Meant
/// to be called occasionally from a non-audio thread against a snapshot,
/// not from inside `process` itself — the scan itself is O(buffers) and
/// not part of the real-time budget.
pub fn collect_stats(container: &Container) -> GraphStats {
    let mut stats = GraphStats {
        proc_count: container.insertion_order().len(),
        buffer_count: container.buffer_pool.len(),
        nan_or_inf_outputs: 0,
    };
    for id in container.insertion_order() {
        let Some(proc) = container.get_proc(*id) else {
            continue;
        };
        for out_idx in 0..proc.io().num_outputs() {
            if let Some(buf) = proc.io().output(out_idx) {
                if buf.borrow().as_slice().iter().any(|s| !s.is_finite()) {
                    stats.nan_or_inf_outputs += 1;
                    warn!(
                        proc = proc.instance_name(),
                        output = out_idx,
                        "non-finite sample detected"
                    );
                }
            }
        }
    }
    stats
}
