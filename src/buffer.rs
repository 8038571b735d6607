//! The signal buffer: the carrier on every wire in a compiled graph.

/// Number of samples processed per output, per op, per vector. Fixed for the
/// lifetime of one compiled graph; changing it requires recompilation.
pub const DEFAULT_VECTOR_SIZE: usize = 64;

/// A signal's sample rate, or one of the two sentinels the compiler needs:
/// `Timeless` for values that are constant for the whole lifetime of the
/// graph (e.g. a published scalar parameter), and `Free` for a pool entry
/// that currently hosts no signal and is available for reuse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Audio(u32),
    Timeless,
    Free,
}

impl Rate {
    pub fn is_free(&self) -> bool {
        matches!(self, Rate::Free)
    }
}

/// A fixed-size block of floating point samples, the unit of data that
/// flows along every pipe once a graph is compiled.
///
/// Invariant: `data.len() == vector_size * frame_size`. A buffer's contents
/// are valid only for the duration of one processing vector unless the proc
/// that owns it is explicitly a delay line that carries history across
/// vectors in its own private state (not in the shared buffer).
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    data: Vec<f32>,
    rate: Rate,
    frame_size: usize,
    vector_size: usize,
    /// True if every element of `data` is known to equal `data[0]`. Procs
    /// are free to set this when it is true; consumers must not rely on it
    /// being set even when the content happens to be constant.
    constant: bool,
}

impl SignalBuffer {
    pub fn new(vector_size: usize, frame_size: usize, rate: Rate) -> Self {
        SignalBuffer {
            data: vec![0.0; vector_size * frame_size.max(1)],
            rate,
            frame_size: frame_size.max(1),
            vector_size,
            constant: false,
        }
    }

    /// A buffer representing the free/unconstructed state held by pool
    /// entries awaiting reuse. Zero-sized; never wired to a slot.
    pub fn free(vector_size: usize) -> Self {
        SignalBuffer {
            data: Vec::new(),
            rate: Rate::Free,
            frame_size: 1,
            vector_size,
            constant: false,
        }
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn set_rate(&mut self, rate: Rate) {
        self.rate = rate;
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn set_constant(&mut self, constant: bool) {
        self.constant = constant;
    }

    /// Clears the constant flag. Called by the container at the top of
    /// every op's turn so that each proc is free to (re-)assert it.
    pub fn clear_constant_flag(&mut self) {
        self.constant = false;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Re-sizes the buffer in place to host a signal of the given frame
    /// size, zeroing its contents. Used when a pooled buffer is
    /// materialised for a signal whose frame size differs from whatever it
    /// held last time around.
    pub fn reshape(&mut self, vector_size: usize, frame_size: usize) {
        let frame_size = frame_size.max(1);
        let len = vector_size * frame_size;
        if self.data.len() != len {
            self.data.clear();
            self.data.resize(len, 0.0);
        } else {
            self.data.fill(0.0);
        }
        self.vector_size = vector_size;
        self.frame_size = frame_size;
        self.constant = false;
    }

    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    pub fn copy_from(&mut self, other: &SignalBuffer) {
        debug_assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
        self.constant = other.constant;
    }

    /// Adds `other` into `self` elementwise (the voice multiplier's summing
    /// mix). Both buffers must share a vector/frame size.
    pub fn add_from(&mut self, other: &SignalBuffer) {
        debug_assert_eq!(self.data.len(), other.data.len());
        slicemath::add_inplace(&mut self.data, &other.data);
        self.constant = false;
    }
}
