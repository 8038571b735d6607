//! The voice multiplier: N independently-compiled copies of the same
//! container, processed in lockstep and summed into one output — how this
//! crate implements polyphony without the graph author writing any
//! per-voice wiring.

use std::any::Any;

use crate::compiler;
use crate::container::Container;
use crate::error::GraphResult;
use crate::id::ProcId;
use crate::param::ParamValue;
use crate::proc::{PrepareContext, Proc, ProcIo};

/// Wraps `voice_count` copies of a container built by `builder`. Each copy
/// is compiled independently the first time `prepare_to_process` runs.
/// Inputs are broadcast identically to every copy; outputs are summed.
/// Disabled copies are skipped entirely — an idle voice costs nothing
/// beyond the broadcast/sum bookkeeping.
pub struct VoiceMultiplier {
    id: ProcId,
    name: String,
    io: ProcIo,
    voices: Vec<Container>,
    copy_enabled: Vec<bool>,
}

impl VoiceMultiplier {
    pub fn new(
        name: impl Into<String>,
        voice_count: usize,
        mut builder: impl FnMut(usize) -> Container,
    ) -> Self {
        let voices: Vec<Container> = (0..voice_count).map(&mut builder).collect();
        let mut vm = VoiceMultiplier {
            id: ProcId::new_unique(),
            name: name.into(),
            io: ProcIo::variable(),
            voices,
            copy_enabled: vec![true; voice_count],
        };
        vm.mirror_io();
        vm
    }

    /// Published inputs/outputs are mirrored from the first copy — every
    /// copy must declare the same published surface, since they share one
    /// set of external slots.
    fn mirror_io(&mut self) {
        let Some(first) = self.voices.first() else {
            return;
        };
        for i in 0..first.published_inputs_len() {
            self.io.add_named_input(format!("in{i}"));
        }
        for i in 0..first.published_outputs_len() {
            self.io.add_named_output(format!("out{i}"));
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, index: usize) -> Option<&Container> {
        self.voices.get(index)
    }

    pub fn voice_mut(&mut self, index: usize) -> Option<&mut Container> {
        self.voices.get_mut(index)
    }

    pub fn is_copy_enabled(&self, index: usize) -> bool {
        self.copy_enabled.get(index).copied().unwrap_or(false)
    }

    /// Enables or disables one copy. A disabled copy is skipped by
    /// `process` and contributes nothing to the summed output — this is
    /// the mechanism the event router uses to start and stop voices.
    pub fn set_copy_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(e) = self.copy_enabled.get_mut(index) {
            *e = enabled;
        }
        if let Some(voice) = self.voices.get_mut(index) {
            voice.set_enabled(enabled);
        }
    }

    /// (Re)compiles every copy. Called from `prepare_to_process`, and
    /// available directly for callers that want to force recompilation
    /// after editing a copy's topology.
    pub fn compile_voices(&mut self) -> GraphResult<()> {
        for voice in &mut self.voices {
            compiler::compile(voice)?;
        }
        Ok(())
    }
}

impl Proc for VoiceMultiplier {
    fn id(&self) -> ProcId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        "voice_multiplier"
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
        self.compile_voices()?;
        for voice in &mut self.voices {
            voice.prepare_to_process(ctx)?;
        }
        Ok(())
    }

    fn process(&mut self) {
        for i in 0..self.io.num_inputs() {
            let Some(src) = self.io.input(i).cloned() else {
                continue;
            };
            for voice in &mut self.voices {
                if let Some(dst) = voice.io().input(i).cloned() {
                    dst.borrow_mut().copy_from(&src.borrow());
                }
            }
        }

        for (voice, enabled) in self.voices.iter_mut().zip(self.copy_enabled.iter()) {
            if *enabled {
                voice.process();
            }
        }

        for i in 0..self.io.num_outputs() {
            let Some(out) = self.io.output(i).cloned() else {
                continue;
            };
            let mut out = out.borrow_mut();
            out.silence();
            for (voice, enabled) in self.voices.iter().zip(self.copy_enabled.iter()) {
                if *enabled {
                    if let Some(src) = voice.io().output(i) {
                        out.add_from(&src.borrow());
                    }
                }
            }
        }
    }

    fn clear(&mut self) {
        for voice in &mut self.voices {
            voice.clear();
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        if let ParamValue::Float(v) = value {
            for voice in &mut self.voices {
                let _ = voice.set_published_param(name, v);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_procs::ConstantProc;

    fn make_voice(value: f32) -> Container {
        let mut c = Container::new("voice", 64);
        let id = c.add_proc(Box::new(ConstantProc::new("osc", value))).unwrap();
        c.publish_output("out0", "osc", 0);
        let _ = id;
        c
    }

    #[test]
    fn disabled_copies_do_not_contribute_to_sum() {
        let mut vm = VoiceMultiplier::new("poly", 4, |_| make_voice(1.0));
        vm.prepare_to_process(PrepareContext {
            sample_rate: 48_000,
            vector_size: 64,
        })
        .unwrap();
        vm.set_copy_enabled(0, true);
        vm.set_copy_enabled(1, true);
        vm.set_copy_enabled(2, false);
        vm.set_copy_enabled(3, false);

        let out = std::rc::Rc::new(std::cell::RefCell::new(crate::buffer::SignalBuffer::new(
            64,
            1,
            crate::buffer::Rate::Audio(48_000),
        )));
        vm.set_output(0, out.clone()).unwrap();
        vm.process();
        assert!(out.borrow().as_slice().iter().all(|&s| s == 2.0));
    }

    #[test]
    fn all_copies_enabled_sums_every_voice() {
        let mut vm = VoiceMultiplier::new("poly", 3, |_| make_voice(1.0));
        vm.prepare_to_process(PrepareContext {
            sample_rate: 48_000,
            vector_size: 64,
        })
        .unwrap();
        let out = std::rc::Rc::new(std::cell::RefCell::new(crate::buffer::SignalBuffer::new(
            64,
            1,
            crate::buffer::Rate::Audio(48_000),
        )));
        vm.set_output(0, out.clone()).unwrap();
        vm.process();
        assert!(out.borrow().as_slice().iter().all(|&s| s == 3.0));
    }
}
