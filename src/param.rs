//! Parameters: the scalar/text/signal control surface on a proc, and the
//! published parameters a container exposes to the outside world.

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

/// A parameter value as stored on a proc. Signal-valued parameters carry a
/// `ProcId`-relative signal name rather than data, since the actual value
/// lives in a shared buffer once compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Text(String),
    Signal(String),
}

impl ParamValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// How a published parameter's externally-facing 0..1-ish control value
/// maps onto its internal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warp {
    Linear,
    Exponential,
    BipolarExponential,
}

/// The declared range and warp of a published float parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub lo: f32,
    pub hi: f32,
    /// Step size for quantization; 0.0 means continuous.
    pub interval: f32,
    /// Values whose absolute magnitude falls below this are snapped to
    /// exactly zero before warping — avoids asymptotic blowup for
    /// exponential warps.
    pub zero_threshold: f32,
    pub offset: f32,
    pub warp: Warp,
}

impl ParamRange {
    pub fn linear(lo: f32, hi: f32) -> Self {
        ParamRange {
            lo,
            hi,
            interval: 0.0,
            zero_threshold: 0.0,
            offset: 0.0,
            warp: Warp::Linear,
        }
    }

    /// Clamps `value` into range and applies quantization. Published
    /// parameter writes are silently clamped per the error-handling design:
    /// out-of-range values never produce an error.
    pub fn clamp_and_quantize(&self, value: f32) -> f32 {
        let mut v = value.clamp(self.lo.min(self.hi), self.lo.max(self.hi));
        if self.interval > 0.0 {
            v = (v / self.interval).round() * self.interval;
        }
        if v.abs() < self.zero_threshold {
            v = 0.0;
        }
        v
    }
}

/// A lock-free atomic store for a float parameter, sampled by a proc at the
/// top of its `process` step. Construction-side writers may come from any
/// thread; only one audio thread ever reads.
#[derive(Debug)]
pub struct AtomicParam {
    value: AtomicF32,
}

impl AtomicParam {
    pub fn new(initial: f32) -> Self {
        AtomicParam {
            value: AtomicF32::new(initial),
        }
    }

    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }
}

/// One internal destination a published parameter routes to: a (proc path,
/// parameter name) pair rather than a pointer, so that it survives
/// recompilation (Design Notes, spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAddress {
    pub proc_path: String,
    pub param_name: String,
}

/// A container's external control surface: one declared published
/// parameter fans out to one or more internal addresses.
#[derive(Debug, Clone)]
pub struct PublishedParam {
    pub name: String,
    pub range: ParamRange,
    pub default: f32,
    pub addresses: Vec<ParamAddress>,
}

impl PublishedParam {
    pub fn new(name: impl Into<String>, range: ParamRange, default: f32) -> Self {
        PublishedParam {
            name: name.into(),
            range,
            default,
            addresses: Vec::new(),
        }
    }

    pub fn add_address(&mut self, proc_path: impl Into<String>, param_name: impl Into<String>) {
        self.addresses.push(ParamAddress {
            proc_path: proc_path.into(),
            param_name: param_name.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_and_quantize_clamps_out_of_range() {
        let r = ParamRange::linear(0.0, 1.0);
        assert_eq!(r.clamp_and_quantize(2.0), 1.0);
        assert_eq!(r.clamp_and_quantize(-2.0), 0.0);
    }

    #[test]
    fn clamp_and_quantize_snaps_to_interval() {
        let mut r = ParamRange::linear(0.0, 1.0);
        r.interval = 0.25;
        assert_eq!(r.clamp_and_quantize(0.37), 0.25);
    }

    #[test]
    fn atomic_param_round_trips() {
        let p = AtomicParam::new(1.0);
        assert_eq!(p.get(), 1.0);
        p.set(2.5);
        assert_eq!(p.get(), 2.5);
    }
}
