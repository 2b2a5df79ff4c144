//! Loader for externally supplied PRNG plug-ins: dynamic libraries exporting
//! the three-symbol C ABI described in `original_source/testu01_mt_cintf.h`
//! (`initlib`, `getinfo`, `closelib`).
//!
//! Unix-only (`dlopen`/`dlsym` via [`libloading`]); the original additionally
//! supports `LoadLibraryA`/`GetProcAddress` on Windows, which this crate does
//! not target.

use std::{
    ffi::{c_char, c_void, CStr},
    path::Path,
    sync::Arc,
};
use libloading::{Library, Symbol};
use thiserror::Error;

use crate::prng::PrngCapability;

#[derive(Error, Debug)]
pub enum ModuleLoadError {
    #[error("failed to open plug-in library: {0}")]
    OpenError(#[from] libloading::Error),
    #[error("plug-in library is missing required symbol `{0}`")]
    MissingSymbol(String),
    #[error("plug-in's initlib() reported failure")]
    InitFailed,
    #[error("plug-in's getinfo() reported failure")]
    GetInfoFailed,
    #[error("plug-in's generator name is not valid UTF-8")]
    InvalidName,
}

type InitStateFn = unsafe extern "C" fn() -> *mut c_void;
type DeleteStateFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type GetU01Fn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> f64;
type GetBits32Fn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> std::os::raw::c_ulong;
type GetBits64Fn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> u64;
type GetArray32Fn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut u32, usize);
type GetArray64Fn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut u64, usize);
type GetSum32Fn = unsafe extern "C" fn(*mut c_void, *mut c_void, usize) -> u32;
type GetSum64Fn = unsafe extern "C" fn(*mut c_void, *mut c_void, usize) -> u64;
type RunSelfTestFn = unsafe extern "C" fn() -> std::os::raw::c_int;

type InitLibFn = unsafe extern "C" fn(*const CallerApi) -> std::os::raw::c_int;
type CloseLibFn = unsafe extern "C" fn() -> std::os::raw::c_int;

/// Mirrors `GenInfoC`: the capability record a plug-in fills in `getinfo`.
/// Optional slots are `Option<fn>`, which is pointer-sized and nullable.
#[repr(C)]
struct GenInfoC {
    name: *const c_char,
    options: *const c_char,
    init_state: Option<InitStateFn>,
    delete_state: Option<DeleteStateFn>,
    get_u01: Option<GetU01Fn>,
    get_bits32: Option<GetBits32Fn>,
    get_bits64: Option<GetBits64Fn>,
    get_array32: Option<GetArray32Fn>,
    get_array64: Option<GetArray64Fn>,
    get_sum32: Option<GetSum32Fn>,
    get_sum64: Option<GetSum64Fn>,
    run_self_test: Option<RunSelfTestFn>,
}

impl Default for GenInfoC {
    fn default() -> Self {
        // SAFETY: an all-zero bit pattern is a valid `GenInfoC`: every
        // pointer field is either a raw pointer (null is valid) or an
        // `Option<fn>` (null niche is `None`).
        unsafe { std::mem::zeroed() }
    }
}

/// Functions the host injects into the plug-in, mirroring `caller_api` in
/// the original ABI: a seed source plus the small libc surface a freestanding
/// plug-in module may not be able to reach directly.
#[repr(C)]
pub struct CallerApi {
    pub seed64: unsafe extern "C" fn() -> u64,
    pub malloc: unsafe extern "C" fn(usize) -> *mut c_void,
    pub free: unsafe extern "C" fn(*mut c_void),
}

unsafe extern "C" fn caller_seed64() -> u64 {
    crate::entropy::global_entropy().seed64()
}

unsafe extern "C" fn caller_malloc(size: usize) -> *mut c_void {
    // SAFETY: matched by `caller_free`, which the plug-in is required to
    // call on the same pointer exactly once.
    unsafe { libc_alloc(size) }
}

unsafe extern "C" fn caller_free(ptr: *mut c_void) {
    // SAFETY: `ptr` must originate from `caller_malloc`; enforced by the
    // plug-in ABI contract, not checked here.
    unsafe { libc_dealloc(ptr) }
}

// Minimal malloc/free pair over Rust's global allocator, avoiding a direct
// libc dependency for the two calls the plug-in ABI requires.
unsafe fn libc_alloc(size: usize) -> *mut c_void {
    use std::alloc::{alloc, Layout};
    if size == 0 {
        return std::ptr::null_mut();
    }
    let layout = Layout::from_size_align(size + 8, 8).expect("valid allocation layout");
    // SAFETY: layout has nonzero size.
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: `ptr` points to at least `size + 8` writable bytes just allocated.
    unsafe { (ptr as *mut usize).write(size) };
    unsafe { ptr.add(8) as *mut c_void }
}

unsafe fn libc_dealloc(ptr: *mut c_void) {
    use std::alloc::{dealloc, Layout};
    if ptr.is_null() {
        return;
    }
    let base = unsafe { (ptr as *mut u8).sub(8) };
    // SAFETY: `base` was produced by `libc_alloc`, which stored the
    // requested size in the 8 bytes preceding the returned pointer.
    let size = unsafe { (base as *mut usize).read() };
    let layout = Layout::from_size_align(size + 8, 8).expect("valid allocation layout");
    // SAFETY: `base` is the pointer originally returned by `alloc` with this layout.
    unsafe { dealloc(base, layout) };
}

fn caller_api() -> CallerApi {
    CallerApi { seed64: caller_seed64, malloc: caller_malloc, free: caller_free }
}

/// A loaded PRNG plug-in. Keeps the [`Library`] alive for as long as any
/// generator instance derived from it exists; dropping calls `closelib`.
pub struct PluginModule {
    library: Library,
    info: GenInfoC,
    close: CloseLibFn,
    name: String,
}

impl PluginModule {
    /// Loads `path`, calling `initlib` then `getinfo` in order, per
    /// `original_source/testu01th_run.cpp::load_module`.
    pub fn load(path: &Path) -> Result<Self, ModuleLoadError> {
        // SAFETY: loading an arbitrary shared library is inherently unsafe;
        // the caller is trusted to pass a path to a well-formed plug-in.
        let library = unsafe { Library::new(path) }?;
        let initlib: Symbol<InitLibFn> =
            unsafe { library.get(b"initlib\0") }.map_err(|_| ModuleLoadError::MissingSymbol("initlib".into()))?;
        let getinfo: Symbol<UnsafeGetInfoFn> =
            unsafe { library.get(b"getinfo\0") }.map_err(|_| ModuleLoadError::MissingSymbol("getinfo".into()))?;
        let closelib: Symbol<CloseLibFn> =
            unsafe { library.get(b"closelib\0") }.map_err(|_| ModuleLoadError::MissingSymbol("closelib".into()))?;
        let api = caller_api();
        // SAFETY: `initlib` is the symbol just resolved from the loaded library,
        // called once per the ABI contract with a valid `CallerApi` pointer.
        if unsafe { initlib(&api as *const CallerApi) } != 1 {
            return Err(ModuleLoadError::InitFailed);
        }
        let mut info = GenInfoC::default();
        // SAFETY: `info` is a valid, fully-zeroed `GenInfoC` the plug-in fills in.
        if unsafe { getinfo(&mut info as *mut GenInfoC) } != 1 {
            return Err(ModuleLoadError::GetInfoFailed);
        }
        let name = if info.name.is_null() {
            "unnamed".to_string()
        } else {
            // SAFETY: plug-in contract guarantees `name` is a valid, live
            // NUL-terminated string for the module's lifetime.
            unsafe { CStr::from_ptr(info.name) }
                .to_str()
                .map_err(|_| ModuleLoadError::InvalidName)?
                .to_string()
        };
        let close = *closelib;
        Ok(Self { library, info, close, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instantiates one generator from this module; each call produces
    /// independent state via the module's `init_state`. Takes `self` behind
    /// an `Arc` so the returned generator can outlive any particular
    /// borrow and cross into a `'static` [`crate::prng::PrngFactory`]
    /// closure captured by a worker thread.
    pub fn new_generator(self: &Arc<Self>) -> Result<PluginGenerator, ModuleLoadError> {
        let init_state = self.info.init_state.ok_or_else(|| ModuleLoadError::MissingSymbol("init_state".into()))?;
        let get_u01 = self.info.get_u01.ok_or_else(|| ModuleLoadError::MissingSymbol("get_u01".into()))?;
        let get_bits32 = self.info.get_bits32.ok_or_else(|| ModuleLoadError::MissingSymbol("get_bits32".into()))?;
        // SAFETY: `init_state` is a plug-in-supplied function satisfying the ABI contract.
        let state = unsafe { init_state() };
        Ok(PluginGenerator { module: Arc::clone(self), state, get_u01, get_bits32 })
    }
}

// `getinfo`'s real parameter type is `*mut GenInfoC`, not representable in
// a plain type alias pointing at a parameterless fn, hence the newtype.
type UnsafeGetInfoFn = unsafe extern "C" fn(*mut GenInfoC) -> std::os::raw::c_int;

impl Drop for PluginModule {
    fn drop(&mut self) {
        // SAFETY: `close` was resolved from the same library, called once
        // at end of life with no generators outliving this point.
        unsafe { (self.close)() };
    }
}

/// A single PRNG instance created from a [`PluginModule`].
pub struct PluginGenerator {
    module: Arc<PluginModule>,
    state: *mut c_void,
    get_u01: GetU01Fn,
    get_bits32: GetBits32Fn,
}

// SAFETY: the plug-in ABI contract requires `state` be usable from the
// thread that called `init_state`, but callers are required to keep each
// `PluginGenerator` confined to one worker thread, same as every other
// `PrngCapability`; no generator is ever shared across threads.
unsafe impl Send for PluginGenerator {}

impl PrngCapability for PluginGenerator {
    fn name(&self) -> String {
        self.module.name().to_string()
    }

    fn u01(&mut self) -> f64 {
        // SAFETY: `state` is live for the lifetime of `self`; `get_u01`
        // comes from the same module that produced `state`.
        unsafe { (self.get_u01)(std::ptr::null_mut(), self.state) }
    }

    fn bits32(&mut self) -> u32 {
        // SAFETY: see `u01`.
        unsafe { (self.get_bits32)(std::ptr::null_mut(), self.state) as u32 }
    }

    fn bits64(&mut self) -> Option<u64> {
        let f = self.module.info.get_bits64?;
        // SAFETY: see `u01`; `f` resolved from the same module.
        Some(unsafe { f(std::ptr::null_mut(), self.state) })
    }

    fn has_bits64(&self) -> bool {
        self.module.info.get_bits64.is_some()
    }

    fn array32(&mut self, buf: &mut [u32]) {
        if let Some(f) = self.module.info.get_array32 {
            // SAFETY: `buf` is a valid, writable slice of `buf.len()` u32s.
            unsafe { f(std::ptr::null_mut(), self.state, buf.as_mut_ptr(), buf.len()) };
        } else {
            for slot in buf.iter_mut() {
                *slot = self.bits32();
            }
        }
    }

    fn array64(&mut self, buf: &mut [u64]) {
        if let Some(f) = self.module.info.get_array64 {
            // SAFETY: `buf` is a valid, writable slice of `buf.len()` u64s.
            unsafe { f(std::ptr::null_mut(), self.state, buf.as_mut_ptr(), buf.len()) };
        } else {
            for slot in buf.iter_mut() {
                *slot = self.bits64().unwrap_or_else(|| {
                    let hi = self.bits32() as u64;
                    let lo = self.bits32() as u64;
                    (hi << 32) | lo
                });
            }
        }
    }

    fn sum32(&mut self, n: usize) -> u32 {
        if let Some(f) = self.module.info.get_sum32 {
            // SAFETY: module-supplied reduction over `n` scalar outputs.
            unsafe { f(std::ptr::null_mut(), self.state, n) }
        } else {
            (0..n).fold(0u32, |acc, _| acc ^ self.bits32())
        }
    }

    fn sum64(&mut self, n: usize) -> u64 {
        if let Some(f) = self.module.info.get_sum64 {
            // SAFETY: module-supplied reduction over `n` scalar outputs.
            unsafe { f(std::ptr::null_mut(), self.state, n) }
        } else {
            (0..n).fold(0u64, |acc, _| {
                let mut buf = [0u64; 1];
                self.array64(&mut buf);
                acc ^ buf[0]
            })
        }
    }

    fn self_test(&self) -> Option<bool> {
        let f = self.module.info.run_self_test?;
        // SAFETY: `f` resolved from the same module; takes no state.
        Some(unsafe { f() } == 1)
    }
}

impl Drop for PluginGenerator {
    fn drop(&mut self) {
        if let Some(delete_state) = self.module.info.delete_state {
            // SAFETY: `state` was produced by this same module's `init_state`
            // and is dropped exactly once.
            unsafe { delete_state(std::ptr::null_mut(), self.state) };
        }
    }
}
