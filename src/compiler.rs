//! The compiler: turns a container's procs and pipes into an ordered op
//! list plus a packed set of shared buffers, ready for `process` to be
//! called directly.
//!
//! The packing step is the hard part: every signal (a proc's output slot)
//! is alive for the half-open range of op positions from where it's
//! produced to the last position that reads it, and buffers are assigned
//! first-fit over those intervals — the same algorithm linear-scan register
//! allocators use to pack live ranges into a fixed set of registers.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::cell::RefCell;

use crate::buffer::{Rate, SignalBuffer};
use crate::container::Container;
use crate::error::{GraphError, GraphResult};
use crate::id::ProcId;
use crate::proc::{BufferHandle, Proc};

/// Tuning knobs for one compilation pass. See spec.md §4.2.1's resolution
/// of the linearisation Open Question.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// When false (the default), ops run in the order their procs were
    /// added — the simplest, most predictable behavior, and sufficient as
    /// long as procs are added downstream-after-upstream. When true, a
    /// Kahn's-algorithm topological sort is used instead, and a cycle in
    /// the pipe graph becomes [`GraphError::CyclicGraph`] rather than an
    /// incorrect execution order.
    pub topological_sort: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            topological_sort: false,
        }
    }
}

struct PoolSlot {
    end: usize,
    handle: BufferHandle,
}

/// Compiles `container` and, recursively, every container nested inside it,
/// using the default (insertion-order) linearisation.
pub fn compile(container: &mut Container) -> GraphResult<()> {
    compile_with(container, CompileOptions::default())
}

/// Compiles `container` and every nested container with explicit options.
pub fn compile_with(container: &mut Container, options: CompileOptions) -> GraphResult<()> {
    let order = compute_order(container, &options)?;

    for id in &order {
        if let Some(proc) = container.get_proc_mut(*id) {
            if let Some(child) = proc.as_any_mut().downcast_mut::<Container>() {
                compile_with(child, options)?;
            }
        }
    }

    let vector_size = container.vector_size;
    let sample_rate = container.sample_rate;

    container.io_mut().clear_wiring();
    for i in 0..container.published_inputs_len() {
        let handle: BufferHandle = Rc::new(RefCell::new(SignalBuffer::new(
            vector_size,
            1,
            Rate::Audio(sample_rate),
        )));
        container.io_mut().set_input(i, handle)?;
    }
    for i in 0..container.published_outputs_len() {
        // Placeholder; overwritten below once the source signal's packed
        // buffer is known. A container with zero ops but published outputs
        // still needs something wired, hence the placeholder.
        let handle: BufferHandle = Rc::new(RefCell::new(SignalBuffer::new(
            vector_size,
            1,
            Rate::Audio(sample_rate),
        )));
        container.io_mut().set_output(i, handle)?;
    }

    let position: HashMap<ProcId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut starts: HashMap<(ProcId, usize), usize> = HashMap::new();
    let mut ends: HashMap<(ProcId, usize), usize> = HashMap::new();
    let mut frame_sizes: HashMap<(ProcId, usize), usize> = HashMap::new();
    for (pos, id) in order.iter().enumerate() {
        let proc = container.get_proc(*id).expect("op in order exists");
        for out_idx in 0..proc.io().num_outputs() {
            starts.insert((*id, out_idx), pos);
            ends.insert((*id, out_idx), pos);
            frame_sizes.insert((*id, out_idx), proc.io().output_frame_size(out_idx));
        }
    }

    let pipes: Vec<_> = container.pipes().to_vec();
    for pipe in &pipes {
        if let Some(&dest_pos) = position.get(&pipe.dest_proc) {
            let key = (pipe.src_proc, pipe.src_index);
            let e = ends.entry(key).or_insert(dest_pos);
            if dest_pos > *e {
                *e = dest_pos;
            }
        }
    }
    for i in 0..container.published_outputs_len() {
        if let Some((name, idx)) = container.published_output_source(i) {
            let name = name.to_string();
            if let Some(id) = container.id_for_name(&name) {
                let key = (id, idx);
                let e = ends.entry(key).or_insert(order.len());
                if order.len() > *e {
                    *e = order.len();
                }
            }
        }
    }

    let mut signals: Vec<(ProcId, usize)> = starts.keys().copied().collect();
    signals.sort_by_key(|k| starts[k]);

    let mut pool: Vec<PoolSlot> = Vec::new();
    let mut non_shared: Vec<BufferHandle> = Vec::new();
    let mut assigned: HashMap<(ProcId, usize), BufferHandle> = HashMap::new();
    for key in signals {
        let start = starts[&key];
        let end = ends[&key];
        let frame_size = frame_sizes[&key];
        if frame_size > 1 {
            // Non-shareable (open question #2): a genuinely multi-channel
            // signal never goes back into the reuse pool, since the
            // compiler has no way to confirm a later slot with a matching
            // interval is actually the same width.
            let handle: BufferHandle = Rc::new(RefCell::new(SignalBuffer::new(
                vector_size,
                frame_size,
                Rate::Audio(sample_rate),
            )));
            non_shared.push(handle.clone());
            assigned.insert(key, handle);
            continue;
        }
        if let Some(slot) = pool.iter_mut().find(|s| s.end < start) {
            slot.end = end;
            assigned.insert(key, slot.handle.clone());
        } else {
            let handle: BufferHandle = Rc::new(RefCell::new(SignalBuffer::new(
                vector_size,
                1,
                Rate::Audio(sample_rate),
            )));
            pool.push(PoolSlot {
                end,
                handle: handle.clone(),
            });
            assigned.insert(key, handle);
        }
    }
    container.buffer_pool = pool
        .into_iter()
        .map(|s| s.handle)
        .chain(non_shared)
        .collect();

    for id in &order {
        if let Some(proc) = container.get_proc_mut(*id) {
            proc.io_mut().clear_wiring();
        }
    }

    for id in &order {
        if let Some(proc) = container.get_proc_mut(*id) {
            let n = proc.io().num_outputs();
            for out_idx in 0..n {
                if let Some(handle) = assigned.get(&(*id, out_idx)) {
                    proc.set_output(out_idx, handle.clone())?;
                }
            }
        }
    }

    for pipe in &pipes {
        if let Some(handle) = assigned.get(&(pipe.src_proc, pipe.src_index)).cloned() {
            if let Some(proc) = container.get_proc_mut(pipe.dest_proc) {
                proc.set_input(pipe.dest_index, handle)?;
            }
        }
    }

    for i in 0..container.published_inputs_len() {
        if let Some((name, idx)) = container.published_input_target(i) {
            let name = name.to_string();
            let boundary = container.io().input(i).cloned();
            if let (Some(handle), Some(id)) = (boundary, container.id_for_name(&name)) {
                if let Some(proc) = container.get_proc_mut(id) {
                    proc.set_input(idx, handle)?;
                }
            }
        }
    }

    for i in 0..container.published_outputs_len() {
        if let Some((name, idx)) = container.published_output_source(i) {
            let name = name.to_string();
            if let Some(id) = container.id_for_name(&name) {
                if let Some(handle) = assigned.get(&(id, idx)).cloned() {
                    container.io_mut().set_output(i, handle)?;
                }
            }
        }
    }

    container.compiled_order = order;
    Ok(())
}

fn compute_order(container: &Container, options: &CompileOptions) -> GraphResult<Vec<ProcId>> {
    let ids: Vec<ProcId> = container.insertion_order().to_vec();
    if !options.topological_sort {
        return Ok(ids);
    }

    let mut in_degree: HashMap<ProcId, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut adj: HashMap<ProcId, Vec<ProcId>> = ids.iter().map(|id| (*id, Vec::new())).collect();
    for pipe in container.pipes() {
        adj.get_mut(&pipe.src_proc)
            .expect("pipe endpoints belong to this container")
            .push(pipe.dest_proc);
        *in_degree
            .get_mut(&pipe.dest_proc)
            .expect("pipe endpoints belong to this container") += 1;
    }

    let mut queue: VecDeque<ProcId> = ids
        .iter()
        .filter(|id| in_degree[*id] == 0)
        .copied()
        .collect();
    let mut order = Vec::with_capacity(ids.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for succ in adj[&id].clone() {
            let deg = in_degree.get_mut(&succ).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(succ);
            }
        }
    }

    if order.len() != ids.len() {
        return Err(GraphError::CyclicGraph);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_procs::{AddProc, ConstantProc, GainProc, WideProc};

    #[test]
    fn linear_chain_needs_two_buffers_for_overlapping_lifespans() {
        // const -> gain -> gain: a's output ([0,1]) and b's output ([1,2])
        // overlap at op index 1 (b's process reads a while writing its own
        // slot), so first-fit can't share them; d's slot reuses a's once a
        // is dead at op 2. Two buffers, not one.
        let mut c = Container::new("root", 64);
        let a = c
            .add_proc(Box::new(ConstantProc::new("a", 1.0)))
            .unwrap();
        let b = c.add_proc(Box::new(GainProc::new("b", 2.0))).unwrap();
        let d = c.add_proc(Box::new(GainProc::new("d", 3.0))).unwrap();
        c.connect(a, 0, b, 0).unwrap();
        c.connect(b, 0, d, 0).unwrap();

        compile(&mut c).unwrap();
        assert_eq!(c.buffer_pool.len(), 2);
        assert_eq!(c.compiled_order, vec![a, b, d]);
    }

    #[test]
    fn sibling_chains_need_two_live_buffers() {
        // a and b both feed into d at the same time, so their outputs must
        // be simultaneously live: two buffers, not one.
        let mut c = Container::new("root", 64);
        let a = c
            .add_proc(Box::new(ConstantProc::new("a", 1.0)))
            .unwrap();
        let b = c
            .add_proc(Box::new(ConstantProc::new("b", 2.0)))
            .unwrap();
        let d = c.add_proc(Box::new(AddProc::new("d"))).unwrap();
        c.connect(a, 0, d, 0).unwrap();
        c.connect(b, 0, d, 1).unwrap();

        compile(&mut c).unwrap();
        assert_eq!(c.buffer_pool.len(), 2);
    }

    #[test]
    fn process_after_compile_propagates_values() {
        let mut c = Container::new("root", 64);
        let a = c
            .add_proc(Box::new(ConstantProc::new("a", 2.0)))
            .unwrap();
        let b = c.add_proc(Box::new(GainProc::new("b", 3.0))).unwrap();
        c.connect(a, 0, b, 0).unwrap();
        c.publish_output("out", "b", 0);

        compile(&mut c).unwrap();
        c.process();

        let out = c.io().output(0).unwrap();
        assert!(out.borrow().as_slice().iter().all(|&s| s == 6.0));
    }

    #[test]
    fn topological_sort_detects_cycles() {
        let mut c = Container::new("root", 64);
        let a = c.add_proc(Box::new(GainProc::new("a", 1.0))).unwrap();
        let b = c.add_proc(Box::new(GainProc::new("b", 1.0))).unwrap();
        c.connect(a, 0, b, 0).unwrap();
        c.connect(b, 0, a, 0).unwrap();

        let err = compile_with(
            &mut c,
            CompileOptions {
                topological_sort: true,
            },
        )
        .unwrap_err();
        assert_eq!(err, GraphError::CyclicGraph);
    }

    #[test]
    fn topological_sort_reorders_out_of_order_insertion() {
        let mut c = Container::new("root", 64);
        // inserted downstream-first; insertion order alone would run the
        // consumer before its producer.
        let consumer = c.add_proc(Box::new(GainProc::new("consumer", 1.0))).unwrap();
        let producer = c
            .add_proc(Box::new(ConstantProc::new("producer", 1.0)))
            .unwrap();
        c.connect(producer, 0, consumer, 0).unwrap();

        compile_with(
            &mut c,
            CompileOptions {
                topological_sort: true,
            },
        )
        .unwrap();
        let pos_producer = c
            .compiled_order
            .iter()
            .position(|id| *id == producer)
            .unwrap();
        let pos_consumer = c
            .compiled_order
            .iter()
            .position(|id| *id == consumer)
            .unwrap();
        assert!(pos_producer < pos_consumer);
    }

    #[test]
    fn wide_signals_never_share_a_buffer() {
        // Two wide (frame_size > 1) producers back-to-back would, by
        // interval alone, qualify for first-fit reuse — but the
        // non-shareable rule must keep them in distinct buffers regardless.
        let mut c = Container::new("root", 64);
        let a = c.add_proc(Box::new(WideProc::new("a", 4))).unwrap();
        let b = c.add_proc(Box::new(WideProc::new("b", 4))).unwrap();
        let consumer = c.add_proc(Box::new(GainProc::new("consumer", 1.0))).unwrap();
        c.connect(a, 0, consumer, 0).unwrap();
        let _ = b;

        compile(&mut c).unwrap();
        assert_eq!(c.buffer_pool.len(), 3);
    }
}
