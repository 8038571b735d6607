//! A real-time audio DSP graph engine: procs connected by pipes inside
//! nestable containers, compiled into a flat op list with packed shared
//! buffers, driven by a host-callback-shaped engine, and voiced through a
//! multiplier and event router for polyphony.
//!
//! Concrete DSP operators (oscillators, filters, delays), a UI, and a host
//! audio backend are external collaborators; this crate owns the graph
//! construction, compilation, and execution model only.

pub mod buffer;
pub mod compiler;
pub mod container;
pub mod engine;
pub mod error;
pub mod event;
pub mod factory;
pub mod globals;
pub mod id;
pub mod param;
pub mod pipe;
pub mod proc;
pub mod scale;
pub mod stats;
pub mod voice;

pub use buffer::{Rate, SignalBuffer, DEFAULT_VECTOR_SIZE};
pub use compiler::{compile, compile_with, CompileOptions};
pub use container::Container;
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::{GraphError, GraphResult};
pub use event::{DriftGenerator, EventRouter, NoteEvent, StealFallback, VoiceAllocationMode, VoiceChange};
pub use factory::{register_builtin_procs, ProcFactory};
pub use globals::{
    apply_denormal_flush_policy, denormals_flushed, global_factory, process_seed,
    set_flush_denormals, set_process_seed,
};
pub use id::{PipeId, ProcId, PublishedParamId, UniqueId, VoiceId};
pub use param::{AtomicParam, ParamAddress, ParamRange, ParamValue, PublishedParam, Warp};
pub use pipe::Pipe;
pub use proc::{BufferHandle, PrepareContext, Proc, ProcIo, K_FLOATS_PER_DSP_VECTOR};
pub use scale::{EqualTemperament, Scale};
pub use stats::{collect_stats, GraphStats};
pub use voice::VoiceMultiplier;
