#![forbid(unsafe_code)]
//! PractRand-compatible binary stdout sinks. Grounded on
//! `original_source/testu01_mt.h`'s `prng_bits32_to_file`/`prng_array32_to_file`/
//! `prng_bits64_to_file`/`prng_array64_to_file` and `testu01th_run.cpp`'s
//! `set_bin_stdout`.

use std::io::{self, BufWriter, ErrorKind, Write};

use crate::prng::PrngCapability;

const SCALAR_BLOCK_WORDS: usize = 256;
const VECTOR_BLOCK_WORDS: usize = 1024;

/// On the Windows target the original switches stdout to binary mode
/// before emitting raw words; on Unix targets stdout has no such
/// text/binary distinction, so this is a documented no-op kept for
/// interface parity.
pub fn set_bin_stdout() {}

fn is_broken_pipe(err: &io::Error) -> bool {
    err.kind() == ErrorKind::BrokenPipe
}

/// Streams scalar 32-bit words in blocks of [`SCALAR_BLOCK_WORDS`] until the
/// downstream reader closes its end of the pipe.
pub fn prng_bits32_to_stdout(mut gen: Box<dyn PrngCapability>) -> io::Result<()> {
    set_bin_stdout();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut block = [0u32; SCALAR_BLOCK_WORDS];
    loop {
        for slot in block.iter_mut() {
            *slot = gen.bits32();
        }
        let bytes: Vec<u8> = block.iter().flat_map(|w| w.to_ne_bytes()).collect();
        if let Err(e) = out.write_all(&bytes) {
            return if is_broken_pipe(&e) { Ok(()) } else { Err(e) };
        }
    }
}

/// Streams scalar 64-bit words, one [`SCALAR_BLOCK_WORDS`]-word block at a
/// time. Errors with [`crate::error::RuntimeError::UnsupportedOutput`] at the
/// CLI boundary if the generator does not implement `bits64`.
pub fn prng_bits64_to_stdout(mut gen: Box<dyn PrngCapability>) -> io::Result<()> {
    set_bin_stdout();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut block = [0u64; SCALAR_BLOCK_WORDS];
    loop {
        for slot in block.iter_mut() {
            *slot = gen.bits64().expect("caller must check bits64 support before streaming");
        }
        let bytes: Vec<u8> = block.iter().flat_map(|w| w.to_ne_bytes()).collect();
        if let Err(e) = out.write_all(&bytes) {
            return if is_broken_pipe(&e) { Ok(()) } else { Err(e) };
        }
    }
}

/// Vectorized 32-bit sink: draws [`VECTOR_BLOCK_WORDS`] words per call to
/// `array32`, letting SIMD-friendly implementations batch internally.
pub fn prng_array32_to_stdout(mut gen: Box<dyn PrngCapability>) -> io::Result<()> {
    set_bin_stdout();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut block = [0u32; VECTOR_BLOCK_WORDS];
    loop {
        gen.array32(&mut block);
        let bytes: Vec<u8> = block.iter().flat_map(|w| w.to_ne_bytes()).collect();
        if let Err(e) = out.write_all(&bytes) {
            return if is_broken_pipe(&e) { Ok(()) } else { Err(e) };
        }
    }
}

/// Vectorized 64-bit sink, analogous to [`prng_array32_to_stdout`].
pub fn prng_array64_to_stdout(mut gen: Box<dyn PrngCapability>) -> io::Result<()> {
    set_bin_stdout();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut block = [0u64; VECTOR_BLOCK_WORDS];
    loop {
        gen.array64(&mut block);
        let bytes: Vec<u8> = block.iter().flat_map(|w| w.to_ne_bytes()).collect();
        if let Err(e) = out.write_all(&bytes) {
            return if is_broken_pipe(&e) { Ok(()) } else { Err(e) };
        }
    }
}
