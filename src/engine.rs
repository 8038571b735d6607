//! The engine: the host-callback adapter. Owns the root container, drives
//! one `process` call per host callback, and carries audio in/out plus
//! control events across the non-audio/audio thread boundary without ever
//! locking or allocating on the audio side.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};

use crate::compiler::{self, CompileOptions};
use crate::container::Container;
use crate::error::GraphResult;
use crate::event::NoteEvent;
use crate::proc::{PrepareContext, Proc};

/// Construction-time engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub vector_size: usize,
    /// Capacity of the audio-in ring buffer, in samples.
    pub audio_in_capacity: usize,
    /// Capacity of the audio-out ring buffer, in samples.
    pub audio_out_capacity: usize,
    /// Capacity of the control-event queue.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 48_000,
            vector_size: crate::buffer::DEFAULT_VECTOR_SIZE,
            audio_in_capacity: 4096,
            audio_out_capacity: 4096,
            event_capacity: 256,
        }
    }
}

/// The non-audio-thread handle: construct a graph into `root`, then push
/// audio and events through the returned producer ends.
pub struct EngineHandle {
    pub audio_in: HeapProd<f32>,
    pub audio_out: HeapCons<f32>,
    pub event_tx: spmcq::Writer<NoteEvent>,
}

/// The audio-thread side, invoked once per host callback.
pub struct Engine {
    root: Container,
    config: EngineConfig,
    audio_in: HeapCons<f32>,
    audio_out: HeapProd<f32>,
    event_rx: spmcq::Reader<NoteEvent>,
    scratch_in: Vec<f32>,
    scratch_out: Vec<f32>,
    prepared: bool,
}

impl Engine {
    /// Builds the ring buffers, wraps `root` as the compiled graph owner,
    /// and returns both the audio-thread `Engine` and the construction-side
    /// `EngineHandle` used to feed it. Audio in/out use `ringbuf`'s exact
    /// single-producer/single-consumer queues; control events use `spmcq`,
    /// whose reader is happy to drop stale events rather than ever block.
    pub fn new(root: Container, config: EngineConfig) -> (Engine, EngineHandle) {
        let (audio_in_prod, audio_in_cons) = HeapRb::<f32>::new(config.audio_in_capacity).split();
        let (audio_out_prod, audio_out_cons) = HeapRb::<f32>::new(config.audio_out_capacity).split();
        let (event_rx, event_tx) = spmcq::ring_buffer::<NoteEvent>(config.event_capacity);

        let engine = Engine {
            root,
            config,
            audio_in: audio_in_cons,
            audio_out: audio_out_prod,
            event_rx,
            scratch_in: vec![0.0; config.vector_size],
            scratch_out: vec![0.0; config.vector_size],
            prepared: false,
        };
        let handle = EngineHandle {
            audio_in: audio_in_prod,
            audio_out: audio_out_cons,
            event_tx,
        };
        (engine, handle)
    }

    /// Compiles the root container and runs `prepare_to_process` over the
    /// whole tree. Must run once, off the audio thread, before the first
    /// `process_one_vector` call.
    pub fn prepare(&mut self, options: CompileOptions) -> GraphResult<()> {
        crate::globals::apply_denormal_flush_policy();
        self.root.set_sample_rate(self.config.sample_rate);
        compiler::compile_with(&mut self.root, options)?;
        self.root.prepare_to_process(PrepareContext {
            sample_rate: self.config.sample_rate,
            vector_size: self.config.vector_size,
        })?;
        self.prepared = true;
        debug!(
            ops = self.root.insertion_order().len(),
            buffers = self.root.buffer_pool.len(),
            "engine prepared"
        );
        Ok(())
    }

    /// Drains every pending control event to `on_event`, then runs one
    /// `process` vector over `root` and ships the result to the audio-out
    /// ring buffer. Called once per host callback; allocates nothing.
    ///
    /// Events arrive from `spmcq` untimestamped; a caller that wires an
    /// [`crate::event::EventRouter`] into `root` is responsible for turning
    /// each event into a `(sample_offset, event)` pair (offset 0 if the host
    /// doesn't report finer timing) and queuing it with
    /// [`crate::event::EventRouter::push_events`] before this call, so the
    /// router renders it into this vector rather than the next one.
    pub fn process_one_vector<F>(&mut self, mut on_event: F)
    where
        F: FnMut(NoteEvent),
    {
        while let Some(event) = self.event_rx.read().value() {
            on_event(event);
        }

        let n = self.config.vector_size;
        let filled = self.audio_in.pop_slice(&mut self.scratch_in[..n]);
        if filled < n {
            self.scratch_in[filled..n].fill(0.0);
        }
        if let Some(input) = self.root.io().input(0) {
            input.borrow_mut().as_mut_slice().copy_from_slice(&self.scratch_in[..n]);
        }

        self.root.process();

        if let Some(output) = self.root.io().output(0) {
            self.scratch_out[..n].copy_from_slice(output.borrow().as_slice());
        } else {
            self.scratch_out[..n].fill(0.0);
        }

        if self.audio_out.vacant_len() < n {
            warn!("engine output ring buffer backpressure, dropping a vector");
            return;
        }
        self.audio_out.push_slice(&self.scratch_out[..n]);
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn root(&self) -> &Container {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Container {
        &mut self.root
    }
}
