//! Process-wide singletons.
//!
//! The graph model otherwise avoids global state entirely — containers,
//! procs, and factories are all explicit values owned by the caller. Three
//! things are deliberately process-wide instead, because per-instance
//! plumbing for them would leak into call sites that have no business
//! caring: the random seed backing voice drift, the denormal-flushing
//! policy, and the default class factory. All three are read-mostly and
//! touched only off the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::factory::{register_builtin_procs, ProcFactory};

static PROCESS_SEED: AtomicU64 = AtomicU64::new(0xD512_u64);
static FLUSH_DENORMALS: AtomicBool = AtomicBool::new(true);
static GLOBAL_FACTORY: OnceLock<ProcFactory> = OnceLock::new();

/// Sets the seed used to derive per-voice drift RNGs. Only takes effect for
/// `EventRouter`s constructed afterward — call before building any graph.
pub fn set_process_seed(seed: u64) {
    PROCESS_SEED.store(seed, Ordering::Relaxed);
}

pub fn process_seed() -> u64 {
    PROCESS_SEED.load(Ordering::Relaxed)
}

/// Enables or disables flush-to-zero/denormals-are-zero at the next
/// [`apply_denormal_flush_policy`] call. Defaults to enabled, since letting
/// denormals reach a feedback filter is the classic way to turn a quiet
/// tail into a CPU spike.
pub fn set_flush_denormals(enabled: bool) {
    FLUSH_DENORMALS.store(enabled, Ordering::Relaxed);
}

pub fn denormals_flushed() -> bool {
    FLUSH_DENORMALS.load(Ordering::Relaxed)
}

/// Applies the current denormal-flushing policy to this thread's FPU state.
/// Meant to be called once, from `Engine::prepare`, on the thread that will
/// go on to call `process`. A no-op on targets without the x86 FTZ/DAZ
/// control bits.
pub fn apply_denormal_flush_policy() {
    if !denormals_flushed() {
        return;
    }
    #[cfg(target_arch = "x86_64")]
    {
        // Safety: reads/writes only the calling thread's MXCSR register.
        #[allow(unsafe_code)]
        unsafe {
            use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
            const FLUSH_TO_ZERO: u32 = 1 << 15;
            const DENORMALS_ARE_ZERO: u32 = 1 << 6;
            let csr = _mm_getcsr();
            _mm_setcsr(csr | FLUSH_TO_ZERO | DENORMALS_ARE_ZERO);
        }
    }
}

/// The default proc factory, built once on first use with every built-in
/// class already registered. Call sites that need a distinct registry
/// (tests, plugin hosts with extra classes) should build their own
/// [`ProcFactory`] instead of reaching for this one.
pub fn global_factory() -> &'static ProcFactory {
    GLOBAL_FACTORY.get_or_init(|| {
        let factory = ProcFactory::new();
        register_builtin_procs(&factory);
        factory
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_round_trips() {
        set_process_seed(42);
        assert_eq!(process_seed(), 42);
        set_process_seed(0xD512);
    }

    #[test]
    fn global_factory_is_reachable_and_stable() {
        let a = global_factory() as *const ProcFactory;
        let b = global_factory() as *const ProcFactory;
        assert_eq!(a, b);
    }
}
