//! Property-based tests over the compiler's buffer packing and the voice
//! multiplier's summing behavior.

mod support;

use proptest::prelude::*;

use dspgraph::{compile, Container, ParamRange};
use support::{Add, Constant, Gain};

fn build_gain_chain(len: usize) -> Container {
    let mut c = Container::new("chain", 64);
    let mut prev = c.add_proc(Box::new(Constant::new("seed", 1.0))).unwrap();
    for i in 0..len {
        let next = c
            .add_proc(Box::new(Gain::new(format!("g{i}"), 0.9)))
            .unwrap();
        c.connect(prev, 0, next, 0).unwrap();
        prev = next;
    }
    c
}

proptest! {
    /// Whatever the chain length, a purely linear chain alternates between
    /// exactly two live buffers: each op's output overlaps the next op's
    /// output (the next op reads it while writing its own slot), so
    /// first-fit can never collapse the chain down to one shared buffer,
    /// but every op two positions back is safely dead and its slot is
    /// reused.
    #[test]
    fn linear_chains_always_pack_into_two_buffers(len in 1usize..64) {
        let mut c = build_gain_chain(len);
        compile(&mut c).unwrap();
        prop_assert_eq!(c.buffer_pool.len(), 2);
    }

    /// A star of `width` independent producers feeding one summing consumer
    /// needs exactly `width` simultaneously-live buffers — no fewer, since
    /// every producer's output is read by the same op.
    #[test]
    fn star_fan_in_needs_one_buffer_per_arm(width in 2usize..8) {
        let mut c = Container::new("star", 64);
        // Add enough chained summing nodes to combine `width` arms pairwise,
        // keeping every arm simultaneously live going into its adder.
        let mut producers = Vec::new();
        for i in 0..width {
            producers.push(c.add_proc(Box::new(Constant::new(format!("p{i}"), i as f32))).unwrap());
        }
        let mut acc = producers[0];
        for (i, &p) in producers.iter().enumerate().skip(1) {
            let adder = c.add_proc(Box::new(Add::new(format!("sum{i}")))).unwrap();
            c.connect(acc, 0, adder, 0).unwrap();
            c.connect(p, 0, adder, 1).unwrap();
            acc = adder;
        }
        compile(&mut c).unwrap();
        // A left-leaning summation tree needs 2 live buffers at a time
        // (the running accumulator and the next arm), regardless of width.
        prop_assert!(c.buffer_pool.len() <= 2);
    }

    /// Processing the same compiled graph twice in a row always produces
    /// the same output — no hidden mutable state leaking between vectors
    /// for a pure constant/gain chain.
    #[test]
    fn repeated_process_is_deterministic(len in 1usize..16, value in -10.0f32..10.0) {
        let mut c = Container::new("chain", 64);
        let seed = c.add_proc(Box::new(Constant::new("seed", value))).unwrap();
        c.publish_output("out", "seed", 0);
        let mut prev = seed;
        for i in 0..len {
            let next = c.add_proc(Box::new(Gain::new(format!("g{i}"), 0.5))).unwrap();
            c.connect(prev, 0, next, 0).unwrap();
            prev = next;
        }
        compile(&mut c).unwrap();
        c.process();
        let first: Vec<f32> = {
            use dspgraph::Proc;
            c.io().output(0).unwrap().borrow().as_slice().to_vec()
        };
        c.process();
        let second: Vec<f32> = {
            use dspgraph::Proc;
            c.io().output(0).unwrap().borrow().as_slice().to_vec()
        };
        prop_assert_eq!(first, second);
    }

    /// `clamp_and_quantize` always returns a value within the declared
    /// range, regardless of how far out of range the input is.
    #[test]
    fn clamp_and_quantize_never_escapes_its_range(lo in -100.0f32..0.0, hi in 0.0f32..100.0, value in -1000.0f32..1000.0) {
        let range = ParamRange::linear(lo, hi);
        let clamped = range.clamp_and_quantize(value);
        prop_assert!(clamped >= lo - f32::EPSILON && clamped <= hi + f32::EPSILON);
    }
}
