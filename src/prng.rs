//! PRNG capability boundary: the operation set every generator (in-process or
//! externally loaded) exposes to tests and binary sinks, plus the legacy-call
//! bridge used to hand a PRNG to callback-style test code.

use std::os::raw::c_void;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::entropy::{EntropyService, Seed};

/// Capability set exposed by a PRNG. `u01`/`bits32` are mandatory; the rest
/// have defaults that either synthesize the output from the mandatory ones
/// or report unavailability, mirroring the nullable optional slots of the
/// external plug-in ABI (see [`crate::plugin`]).
pub trait PrngCapability: Send {
    fn name(&self) -> String;
    fn u01(&mut self) -> f64;
    fn bits32(&mut self) -> u32;

    fn bits64(&mut self) -> Option<u64> {
        None
    }

    /// Reports whether this generator has a native 64-bit output, without
    /// drawing one. Callers that need to reject an unsupported sink ahead of
    /// time (e.g. the `stdout64` CLI mode) probe this instead of calling
    /// `bits64` and discarding the result.
    fn has_bits64(&self) -> bool {
        false
    }

    /// Fills `buf` with successive 32-bit outputs. The default forwards to
    /// `bits32`; implementations with a native bulk path may override this.
    fn array32(&mut self, buf: &mut [u32]) {
        for slot in buf.iter_mut() {
            *slot = self.bits32();
        }
    }

    /// Fills `buf` with successive 64-bit outputs, bridging from a 64-bit
    /// native generator if `bits64` is implemented, or from two `bits32`
    /// calls (high word first, then low word) otherwise.
    fn array64(&mut self, buf: &mut [u64]) {
        for slot in buf.iter_mut() {
            *slot = self.bits64().unwrap_or_else(|| {
                let hi = self.bits32() as u64;
                let lo = self.bits32() as u64;
                (hi << 32) | lo
            });
        }
    }

    /// Reduction used by throughput benchmarks to defeat dead-code
    /// elimination; advances state as if `n` scalar outputs were emitted.
    fn sum32(&mut self, n: usize) -> u32 {
        (0..n).fold(0u32, |acc, _| acc ^ self.bits32())
    }

    fn sum64(&mut self, n: usize) -> u64 {
        (0..n).fold(0u64, |acc, _| {
            let mut buf = [0u64; 1];
            self.array64(&mut buf);
            acc ^ buf[0]
        })
    }

    fn self_test(&self) -> Option<bool> {
        None
    }
}

/// Closure manufacturing one fresh, independently seeded PRNG. Invoked once
/// per worker thread by the dispatcher.
pub type PrngFactory = Box<dyn Fn() -> Box<dyn PrngCapability> + Send + Sync>;

/// Builds the default [`PrngFactory`], seeded from the process-wide entropy
/// service, wrapping [`Xoshiro256PlusPlus`].
pub fn xoshiro_factory() -> PrngFactory {
    Box::new(|| {
        let seed = Seed::from_entropy(crate::entropy::global_entropy());
        Box::new(Xoshiro256PlusPlusCapability::from_seed(seed))
    })
}

/// Wraps [`rand_xoshiro::Xoshiro256PlusPlus`] behind [`PrngCapability`]; the
/// in-process default generator used when no external module is supplied.
pub struct Xoshiro256PlusPlusCapability {
    rng: Xoshiro256PlusPlus,
}

impl Xoshiro256PlusPlusCapability {
    pub fn from_seed(seed: Seed) -> Self {
        let bytes: [u8; 32] = seed.into();
        Self { rng: Xoshiro256PlusPlus::from_seed(bytes) }
    }

    /// Seeds from the entropy service directly, applying `jumps` calls to
    /// `jump()` to decorrelate sibling generators, the way the teacher's
    /// `get_rng_from_seed` decorrelates per-thread RNGs.
    pub fn seeded(service: &EntropyService, jumps: usize) -> Self {
        let mut capability = Self::from_seed(Seed::from_entropy(service));
        for _ in 0..jumps {
            capability.rng.jump();
        }
        capability
    }
}

impl PrngCapability for Xoshiro256PlusPlusCapability {
    fn name(&self) -> String {
        "xoshiro256++".to_string()
    }

    fn u01(&mut self) -> f64 {
        uint64_to_udouble(self.rng.next_u64())
    }

    fn bits32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn bits64(&mut self) -> Option<u64> {
        Some(self.rng.next_u64())
    }

    fn has_bits64(&self) -> bool {
        true
    }

    fn array64(&mut self, buf: &mut [u64]) {
        for slot in buf.iter_mut() {
            *slot = self.rng.next_u64();
        }
    }

    fn self_test(&self) -> Option<bool> {
        // xoshiro256++ has no published known-answer test in this crate;
        // the generator is in-process code, not a loaded module, so the
        // plug-in ABI's self-test slot does not apply here.
        None
    }
}

/// Converts a uniform 64-bit integer to a double in `[0, 1)`, matching
/// `uint64_to_udouble` from the plug-in ABI so in-process and loaded
/// generators produce comparably distributed `u01()` output.
pub fn uint64_to_udouble(val: u64) -> f64 {
    let bits = (val >> 12) | 0x3ff0000000000000;
    f64::from_bits(bits) - 1.0
}

/// Opaque state handed to the legacy two-callback interface; a thin pointer
/// wrapping the trait object reference so it can cross a `*mut c_void` ABI
/// boundary (trait objects themselves are fat pointers and cannot).
struct BridgeState<'a> {
    gen: &'a mut dyn PrngCapability,
}

unsafe extern "C" fn trampoline_u01(_param: *mut c_void, state: *mut c_void) -> f64 {
    // SAFETY: `state` was produced by `LegacyCallBridge::new` from a live
    // `Box<BridgeState>` and outlives every call made through this pointer.
    let bridge = unsafe { &mut *(state as *mut BridgeState) };
    bridge.gen.u01()
}

unsafe extern "C" fn trampoline_bits32(_param: *mut c_void, state: *mut c_void) -> u32 {
    // SAFETY: see `trampoline_u01`.
    let bridge = unsafe { &mut *(state as *mut BridgeState) };
    bridge.gen.bits32()
}

/// Bridges a [`PrngCapability`] to the `(void* state, get_u01, get_bits32)`
/// triple third-party C-style test callbacks expect, mirroring
/// `UniformGenerator::GetU01Handle`/`GetBits32` in the original source.
pub struct LegacyCallBridge<'a> {
    state: Box<BridgeState<'a>>,
}

impl<'a> LegacyCallBridge<'a> {
    pub fn new(gen: &'a mut dyn PrngCapability) -> Self {
        Self { state: Box::new(BridgeState { gen }) }
    }

    pub fn state_ptr(&mut self) -> *mut c_void {
        (&mut *self.state as *mut BridgeState) as *mut c_void
    }

    pub fn u01_fn(&self) -> unsafe extern "C" fn(*mut c_void, *mut c_void) -> f64 {
        trampoline_u01
    }

    pub fn bits32_fn(&self) -> unsafe extern "C" fn(*mut c_void, *mut c_void) -> u32 {
        trampoline_bits32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xoshiro_seeds_are_independent() {
        let service = EntropyService::new();
        let mut a = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        let mut b = Xoshiro256PlusPlusCapability::seeded(&service, 1);
        assert_ne!(a.bits64(), b.bits64());
    }

    #[test]
    fn u01_in_unit_interval() {
        let service = EntropyService::new();
        let mut gen = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        for _ in 0..1000 {
            let v = gen.u01();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn legacy_bridge_round_trips_through_raw_pointer() {
        let service = EntropyService::new();
        let mut gen = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        let direct = gen.bits32();
        let mut gen2 = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        let mut bridge = LegacyCallBridge::new(&mut gen2);
        let ptr = bridge.state_ptr();
        let via_bridge = unsafe { (bridge.bits32_fn())(std::ptr::null_mut(), ptr) };
        assert_ne!(direct, 0);
        let _ = via_bridge;
    }

    #[test]
    fn array64_bridges_high_word_first_when_native_64bit_absent() {
        struct ThirtyTwoOnly {
            next: u32,
        }
        impl PrngCapability for ThirtyTwoOnly {
            fn name(&self) -> String {
                "thirty-two-only".to_string()
            }
            fn u01(&mut self) -> f64 {
                0.0
            }
            fn bits32(&mut self) -> u32 {
                self.next += 1;
                self.next
            }
        }
        let mut gen = ThirtyTwoOnly { next: 0 };
        let mut buf = [0u64; 1];
        gen.array64(&mut buf);
        assert_eq!(buf[0], (1u64 << 32) | 2u64);
    }
}
