//! Minimal fixture procs shared by the integration tests. Concrete DSP
//! operators are an external collaborator and not part of this crate.

use std::any::Any;

use dspgraph::{Proc, ProcId, ProcIo};

pub struct Constant {
    id: ProcId,
    name: String,
    io: ProcIo,
    pub value: f32,
}

impl Constant {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Constant {
            id: ProcId::new_unique(),
            name: name.into(),
            io: ProcIo::fixed(&[], &["out"]),
            value,
        }
    }
}

impl Proc for Constant {
    fn id(&self) -> ProcId {
        self.id
    }
    fn class_name(&self) -> &'static str {
        "constant"
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
    fn process(&mut self) {
        if let Some(out) = self.io.output(0) {
            out.borrow_mut().as_mut_slice().fill(self.value);
        }
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct Gain {
    id: ProcId,
    name: String,
    io: ProcIo,
    pub gain: f32,
}

impl Gain {
    pub fn new(name: impl Into<String>, gain: f32) -> Self {
        Gain {
            id: ProcId::new_unique(),
            name: name.into(),
            io: ProcIo::fixed(&["in"], &["out"]),
            gain,
        }
    }
}

impl Proc for Gain {
    fn id(&self) -> ProcId {
        self.id
    }
    fn class_name(&self) -> &'static str {
        "gain"
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
    fn process(&mut self) {
        let input = self.io.input(0).cloned();
        if let Some(out) = self.io.output(0) {
            let mut out = out.borrow_mut();
            match &input {
                Some(inp) => {
                    out.copy_from(&inp.borrow());
                    slicemath::mul_scalar_inplace(out.as_mut_slice(), self.gain);
                }
                None => out.as_mut_slice().fill(0.0),
            }
        }
    }
    fn set_param(&mut self, name: &str, value: dspgraph::ParamValue) {
        if name == "gain" {
            if let Some(v) = value.as_float() {
                self.gain = v;
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

pub struct Add {
    id: ProcId,
    name: String,
    io: ProcIo,
}

impl Add {
    pub fn new(name: impl Into<String>) -> Self {
        Add {
            id: ProcId::new_unique(),
            name: name.into(),
            io: ProcIo::fixed(&["a", "b"], &["out"]),
        }
    }
}

impl Proc for Add {
    fn id(&self) -> ProcId {
        self.id
    }
    fn class_name(&self) -> &'static str {
        "add"
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
    fn process(&mut self) {
        let a = self.io.input(0).cloned();
        let b = self.io.input(1).cloned();
        if let Some(out) = self.io.output(0) {
            let mut out = out.borrow_mut();
            out.as_mut_slice().fill(0.0);
            if let Some(a) = &a {
                out.add_from(&a.borrow());
            }
            if let Some(b) = &b {
                out.add_from(&b.borrow());
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
