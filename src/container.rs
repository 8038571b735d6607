//! The container: a named, nestable owner of procs, pipes, and published
//! input/output/parameter surfaces. A container is itself a [`Proc`] whose
//! `process` step is the ordered execution of its compiled child op list —
//! this is how containers nest to arbitrary depth.

use std::any::Any;
use std::collections::HashMap;

use crate::error::{GraphError, GraphResult};
use crate::id::{PipeId, ProcId};
use crate::param::{ParamValue, PublishedParam};
use crate::pipe::Pipe;
use crate::proc::{BufferHandle, PrepareContext, Proc, ProcIo};

/// One container-external input or output: an index in `io`, plus the
/// internal (proc name, slot index) it is wired to once a graph is
/// compiled.
#[derive(Debug, Clone)]
struct PublishedIo {
    dest_proc: String,
    dest_index: usize,
}

pub struct Container {
    id: ProcId,
    name: String,
    io: ProcIo,
    enabled: bool,

    procs: HashMap<ProcId, Box<dyn Proc>>,
    name_to_id: HashMap<String, ProcId>,
    /// Preserves the order procs were added in — the default linearisation
    /// basis the compiler falls back to when topological sort isn't
    /// requested (spec.md §4.2.1).
    insertion_order: Vec<ProcId>,
    pipes: Vec<Pipe>,

    published_inputs: Vec<PublishedIo>,
    published_outputs: Vec<PublishedIo>,
    published_params: Vec<PublishedParam>,

    /// The compiled op order, empty until [`crate::compiler`] fills it in.
    /// Any topology edit clears it, requiring recompilation before the next
    /// `process` call is meaningful.
    pub(crate) compiled_order: Vec<ProcId>,
    /// The buffer pool materialised by the compiler, retained across
    /// `process` calls and reused (first-fit) on recompilation.
    pub(crate) buffer_pool: Vec<BufferHandle>,
    pub(crate) vector_size: usize,
    pub(crate) sample_rate: u32,
}

impl Container {
    pub fn new(name: impl Into<String>, vector_size: usize) -> Self {
        Container {
            id: ProcId::new_unique(),
            name: name.into(),
            io: ProcIo::variable(),
            enabled: true,
            procs: HashMap::new(),
            name_to_id: HashMap::new(),
            insertion_order: Vec::new(),
            pipes: Vec::new(),
            published_inputs: Vec::new(),
            published_outputs: Vec::new(),
            published_params: Vec::new(),
            compiled_order: Vec::new(),
            buffer_pool: Vec::new(),
            vector_size,
            sample_rate: 48_000,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.invalidate_compilation();
    }

    fn invalidate_compilation(&mut self) {
        self.compiled_order.clear();
    }

    pub fn is_compiled(&self) -> bool {
        !self.compiled_order.is_empty() || self.procs.is_empty()
    }

    pub fn insertion_order(&self) -> &[ProcId] {
        &self.insertion_order
    }

    pub fn proc_ids(&self) -> impl Iterator<Item = &ProcId> {
        self.insertion_order.iter()
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn get_proc(&self, id: ProcId) -> Option<&dyn Proc> {
        self.procs.get(&id).map(|b| b.as_ref())
    }

    pub fn get_proc_mut(&mut self, id: ProcId) -> Option<&mut Box<dyn Proc>> {
        self.procs.get_mut(&id)
    }

    pub fn id_for_name(&self, name: &str) -> Option<ProcId> {
        self.name_to_id.get(name).copied()
    }

    /// Adds a proc, taking ownership. Fails with `NameInUseErr` if the
    /// proc's instance name already names something in this container.
    pub fn add_proc(&mut self, proc: Box<dyn Proc>) -> GraphResult<ProcId> {
        let name = proc.instance_name().to_string();
        if self.name_to_id.contains_key(&name) {
            return Err(GraphError::NameInUseErr { name });
        }
        let id = proc.id();
        self.procs.insert(id, proc);
        self.name_to_id.insert(name, id);
        self.insertion_order.push(id);
        self.invalidate_compilation();
        Ok(id)
    }

    /// Removes a proc and every pipe touching it.
    pub fn remove_proc(&mut self, name: &str) -> GraphResult<()> {
        let id = self
            .name_to_id
            .remove(name)
            .ok_or_else(|| GraphError::NameNotFoundErr {
                name: name.to_string(),
            })?;
        self.procs.remove(&id);
        self.insertion_order.retain(|pid| *pid != id);
        self.pipes
            .retain(|p| p.src_proc != id && p.dest_proc != id);
        self.invalidate_compilation();
        Ok(())
    }

    /// Connects `src_proc`'s output `src_index` to `dest_proc`'s input
    /// `dest_index`. Both procs must already belong to this container —
    /// `ConnectScopeErr` otherwise, which is how cross-container pipes are
    /// rejected.
    pub fn connect(
        &mut self,
        src_proc: ProcId,
        src_index: usize,
        dest_proc: ProcId,
        dest_index: usize,
    ) -> GraphResult<PipeId> {
        if !self.procs.contains_key(&src_proc) || !self.procs.contains_key(&dest_proc) {
            return Err(GraphError::ConnectScopeErr);
        }
        {
            let src = self.procs.get(&src_proc).unwrap();
            if src_index >= src.io().num_outputs() {
                return Err(GraphError::InputBoundsErr {
                    index: src_index,
                    count: src.io().num_outputs(),
                });
            }
        }
        {
            let dest = self.procs.get(&dest_proc).unwrap();
            if dest_index >= dest.io().num_inputs() {
                return Err(GraphError::InputBoundsErr {
                    index: dest_index,
                    count: dest.io().num_inputs(),
                });
            }
        }
        let pipe = Pipe::new(src_proc, src_index, dest_proc, dest_index);
        let id = pipe.id;
        self.pipes.push(pipe);
        self.invalidate_compilation();
        Ok(id)
    }

    pub fn disconnect(&mut self, pipe_id: PipeId) {
        self.pipes.retain(|p| p.id != pipe_id);
        self.invalidate_compilation();
    }

    /// Looks up a proc by dotted path, descending into child containers.
    /// Fails with `HeadNotContainerErr` if a non-terminal path segment
    /// names something that isn't a container.
    pub fn resolve_mut(&mut self, path: &str) -> GraphResult<&mut dyn Proc> {
        let mut parts = path.splitn(2, '.');
        let head = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GraphError::NameNotFoundErr {
                name: path.to_string(),
            })?;
        let id = *self
            .name_to_id
            .get(head)
            .ok_or_else(|| GraphError::NameNotFoundErr {
                name: head.to_string(),
            })?;
        let rest = parts.next();
        let proc = self.procs.get_mut(&id).unwrap();
        match rest {
            None => Ok(proc.as_mut()),
            Some(rest) => {
                let child = proc
                    .as_any_mut()
                    .downcast_mut::<Container>()
                    .ok_or_else(|| GraphError::HeadNotContainerErr {
                        name: head.to_string(),
                    })?;
                child.resolve_mut(rest)
            }
        }
    }

    /// Declares a new published input, named `name`, that routes to
    /// `dest_proc`'s input slot `dest_index` once compiled.
    pub fn publish_input(
        &mut self,
        name: impl Into<String>,
        dest_proc: impl Into<String>,
        dest_index: usize,
    ) -> usize {
        let idx = self.io.add_named_input(name);
        self.published_inputs.push(PublishedIo {
            dest_proc: dest_proc.into(),
            dest_index,
        });
        idx
    }

    pub fn publish_output(
        &mut self,
        name: impl Into<String>,
        src_proc: impl Into<String>,
        src_index: usize,
    ) -> usize {
        let idx = self.io.add_named_output(name);
        self.published_outputs.push(PublishedIo {
            dest_proc: src_proc.into(),
            dest_index: src_index,
        });
        idx
    }

    pub fn publish_param(&mut self, param: PublishedParam) {
        self.published_params.push(param);
    }

    pub fn published_params(&self) -> &[PublishedParam] {
        &self.published_params
    }

    pub fn published_inputs_len(&self) -> usize {
        self.published_inputs.len()
    }

    pub fn published_outputs_len(&self) -> usize {
        self.published_outputs.len()
    }

    pub(crate) fn published_input_target(&self, index: usize) -> Option<(&str, usize)> {
        self.published_inputs
            .get(index)
            .map(|p| (p.dest_proc.as_str(), p.dest_index))
    }

    pub(crate) fn published_output_source(&self, index: usize) -> Option<(&str, usize)> {
        self.published_outputs
            .get(index)
            .map(|p| (p.dest_proc.as_str(), p.dest_index))
    }

    /// Sets a published parameter by name, clamping/quantizing into its
    /// declared range and fanning the resulting value out to every
    /// registered internal address.
    pub fn set_published_param(&mut self, name: &str, value: f32) -> GraphResult<()> {
        let (range, addresses) = {
            let p = self
                .published_params
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| GraphError::NameNotFoundErr {
                    name: name.to_string(),
                })?;
            (p.range, p.addresses.clone())
        };
        let clamped = range.clamp_and_quantize(value);
        for addr in addresses {
            if let Ok(proc) = self.resolve_mut(&addr.proc_path) {
                proc.set_param(&addr.param_name, ParamValue::Float(clamped));
            }
        }
        Ok(())
    }
}

impl Proc for Container {
    fn id(&self) -> ProcId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        "container"
    }

    fn instance_name(&self) -> &str {
        &self.name
    }

    fn io(&self) -> &ProcIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ProcIo {
        &mut self.io
    }

    fn prepare_to_process(&mut self, ctx: PrepareContext) -> GraphResult<()> {
        for id in &self.compiled_order {
            if let Some(proc) = self.procs.get_mut(id) {
                proc.prepare_to_process(ctx)?;
            }
        }
        Ok(())
    }

    /// Executes the compiled op list in order. A disabled container is a
    /// complete no-op, which is the mechanism idle voices use to avoid CPU
    /// cost — a disabled container's children are never visited, regardless
    /// of their own enabled flags.
    fn process(&mut self) {
        if !self.enabled {
            return;
        }
        for id in &self.compiled_order {
            if let Some(proc) = self.procs.get_mut(id) {
                if !proc.enabled() {
                    continue;
                }
                for out_idx in 0..proc.io().num_outputs() {
                    if let Some(buf) = proc.io().output(out_idx) {
                        buf.borrow_mut().clear_constant_flag();
                    }
                }
                proc.process();
            }
        }
    }

    fn clear(&mut self) {
        for proc in self.procs.values_mut() {
            proc.clear();
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        if let ParamValue::Float(v) = value {
            let _ = self.set_published_param(name, v);
        }
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
