//! The `Proc` contract: one processing node, its typed inputs/outputs/
//! parameters, and the `process` step.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::SignalBuffer;
use crate::error::{GraphError, GraphResult};
use crate::id::ProcId;
use crate::param::ParamValue;

/// Number of samples a `process` call produces per output, fixed once a
/// graph is compiled.
pub const K_FLOATS_PER_DSP_VECTOR: usize = crate::buffer::DEFAULT_VECTOR_SIZE;

/// A buffer shared between exactly the ops that read or write it. Cloning a
/// handle clones the `Rc`, not the data.
pub type BufferHandle = Rc<RefCell<SignalBuffer>>;

/// Context handed to `Proc::prepare_to_process` once rates/sizes are known.
#[derive(Debug, Clone, Copy)]
pub struct PrepareContext {
    pub sample_rate: u32,
    pub vector_size: usize,
}

/// One input or output slot: a name and the buffer it currently points to,
/// if wired. `None` on an input slot means it is bound to the shared null
/// input (orphan inputs are silently bound there, per spec).
struct Slot {
    name: String,
    buffer: Option<BufferHandle>,
    /// Samples per frame this slot produces/consumes. 1 for ordinary
    /// single-channel signals. A value greater than 1 marks the signal as
    /// non-shareable during buffer packing (open question #2): the
    /// compiler cannot tell a genuinely multi-channel signal apart from one
    /// that merely looks wide, so it never hands such a buffer back to the
    /// reuse pool.
    frame_size: usize,
}

/// Ordered, named input and output slots owned by a proc. A proc
/// implementation embeds one of these and forwards the `Proc` trait's
/// wiring methods to it.
pub struct ProcIo {
    inputs: Vec<Slot>,
    outputs: Vec<Slot>,
    variable_inputs: bool,
    variable_outputs: bool,
}

impl ProcIo {
    pub fn fixed(input_names: &[&str], output_names: &[&str]) -> Self {
        ProcIo {
            inputs: input_names
                .iter()
                .map(|n| Slot {
                    name: n.to_string(),
                    buffer: None,
                    frame_size: 1,
                })
                .collect(),
            outputs: output_names
                .iter()
                .map(|n| Slot {
                    name: n.to_string(),
                    buffer: None,
                    frame_size: 1,
                })
                .collect(),
            variable_inputs: false,
            variable_outputs: false,
        }
    }

    pub fn variable() -> Self {
        ProcIo {
            inputs: Vec::new(),
            outputs: Vec::new(),
            variable_inputs: true,
            variable_outputs: true,
        }
    }

    pub fn is_variable_input(&self) -> bool {
        self.variable_inputs
    }

    pub fn is_variable_output(&self) -> bool {
        self.variable_outputs
    }

    /// Grows a variable-input proc by one slot, named by ordinal symbol
    /// (`in1`, `in2`, ...). Returns the new slot's index.
    pub fn add_input(&mut self) -> usize {
        let idx = self.inputs.len();
        self.inputs.push(Slot {
            name: format!("in{}", idx + 1),
            buffer: None,
            frame_size: 1,
        });
        idx
    }

    pub fn add_output(&mut self) -> usize {
        let idx = self.outputs.len();
        self.outputs.push(Slot {
            name: format!("out{}", idx + 1),
            buffer: None,
            frame_size: 1,
        });
        idx
    }

    /// Adds an input slot under an explicit name rather than an ordinal
    /// symbol — used for a container's published inputs, which have
    /// caller-chosen names.
    pub fn add_named_input(&mut self, name: impl Into<String>) -> usize {
        let idx = self.inputs.len();
        self.inputs.push(Slot {
            name: name.into(),
            buffer: None,
            frame_size: 1,
        });
        idx
    }

    pub fn add_named_output(&mut self, name: impl Into<String>) -> usize {
        let idx = self.outputs.len();
        self.outputs.push(Slot {
            name: name.into(),
            buffer: None,
            frame_size: 1,
        });
        idx
    }

    /// Samples per frame produced by output slot `index`. 1 unless the proc
    /// has called [`Self::set_output_frame_size`].
    pub fn output_frame_size(&self, index: usize) -> usize {
        self.outputs.get(index).map_or(1, |s| s.frame_size)
    }

    /// Declares that output slot `index` produces `frame_size` samples per
    /// frame rather than one. Used by multi-channel procs (an external
    /// collaborator, per spec.md §1) to opt their outputs out of buffer
    /// sharing during compilation.
    pub fn set_output_frame_size(&mut self, index: usize, frame_size: usize) {
        if let Some(s) = self.outputs.get_mut(index) {
            s.frame_size = frame_size;
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_name(&self, index: usize) -> Option<&str> {
        self.inputs.get(index).map(|s| s.name.as_str())
    }

    pub fn output_name(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).map(|s| s.name.as_str())
    }

    pub fn input_index_by_name(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn output_index_by_name(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    pub fn input(&self, index: usize) -> Option<&BufferHandle> {
        self.inputs.get(index).and_then(|s| s.buffer.as_ref())
    }

    pub fn output(&self, index: usize) -> Option<&BufferHandle> {
        self.outputs.get(index).and_then(|s| s.buffer.as_ref())
    }

    /// Wires an input slot to a source buffer. Fails with `InputOccupiedErr`
    /// if the slot already holds a signal other than the null input.
    pub fn set_input(&mut self, index: usize, buffer: BufferHandle) -> GraphResult<()> {
        let count = self.inputs.len();
        let slot = self
            .inputs
            .get_mut(index)
            .ok_or(GraphError::InputBoundsErr { index, count })?;
        if slot.buffer.is_some() {
            return Err(GraphError::InputOccupiedErr { index });
        }
        slot.buffer = Some(buffer);
        Ok(())
    }

    pub fn set_output(&mut self, index: usize, buffer: BufferHandle) -> GraphResult<()> {
        let count = self.outputs.len();
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or(GraphError::InputBoundsErr { index, count })?;
        slot.buffer = Some(buffer);
        Ok(())
    }

    /// Resets every slot to unwired, ready for a fresh compilation pass.
    pub fn clear_wiring(&mut self) {
        for s in &mut self.inputs {
            s.buffer = None;
        }
        for s in &mut self.outputs {
            s.buffer = None;
        }
    }
}

/// Every processing node in the graph. Implemented by leaf DSP procs and by
/// [`crate::container::Container`] itself (whose `process` step is the
/// ordered execution of its child op list) and
/// [`crate::voice::VoiceMultiplier`] (whose `process` step sums enabled
/// copies).
///
/// `process` must never allocate, never block, and must leave every output
/// slot fully initialised — the real-time discipline in spec.md §5.
pub trait Proc: Any {
    fn id(&self) -> ProcId;

    fn class_name(&self) -> &'static str;

    fn instance_name(&self) -> &str;

    fn io(&self) -> &ProcIo;

    fn io_mut(&mut self) -> &mut ProcIo;

    /// Called once after compilation, before the first `process` call, in
    /// depth-first order over the compiled op list. Allocations for
    /// history/state belong here, not in `process`.
    fn prepare_to_process(&mut self, _ctx: PrepareContext) -> GraphResult<()> {
        Ok(())
    }

    /// Computes one vector of output samples from the current vector of
    /// input samples. Must not allocate.
    fn process(&mut self);

    /// Resets history to an initial quiescent state.
    fn clear(&mut self) {}

    /// Requests a parameter change; the proc samples it at the top of its
    /// next `process` call rather than applying it immediately.
    fn set_param(&mut self, _name: &str, _value: ParamValue) {}

    /// Whether this proc's (and, if it is a container, its subtree's)
    /// `process` step should run at all. Containers override the getter and
    /// setter; leaf procs are always enabled.
    fn enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn set_input(&mut self, index: usize, buffer: BufferHandle) -> GraphResult<()> {
        self.io_mut().set_input(index, buffer)
    }

    fn set_output(&mut self, index: usize, buffer: BufferHandle) -> GraphResult<()> {
        self.io_mut().set_output(index, buffer)
    }
}
