#![forbid(unsafe_code)]
//! Test-callback factories and the in-repo stand-in test library.
//!
//! The real TestU01 test bodies (`smarsa_*`, `sknuth_*`, `sstring_*`, ...)
//! are out of scope (see SPEC_FULL.md §1/§4.5); these three are original,
//! simplified statistics exercising the same factory/closure shape
//! `original_source/testu01_mt.h` declares (`smarsa_BirthdaySpacings_cb`
//! and friends), so the dispatcher and report machinery have something
//! real to run end to end.

use std::f64::consts::SQRT_2;

use crate::dispatcher::TestDescr;
use crate::report::BatteryIO;

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

fn erfc(x: f64) -> f64 {
    1.0 - erf(x)
}

fn normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / SQRT_2)
}

/// Wilson-Hilferty normal approximation to the chi-square survival function.
fn chi_square_sf(x: f64, df: f64) -> f64 {
    let z = ((x / df).powf(1.0 / 3.0) - (1.0 - 2.0 / (9.0 * df))) / (2.0 / (9.0 * df)).sqrt();
    normal_sf(z)
}

/// Monobit frequency test: counts set bits across `n_words` 32-bit draws
/// and compares the observed count to the expected N(n/2, n/4) under the
/// null hypothesis of a fair bitstream.
pub fn monobit_frequency_cb(n_words: usize) -> impl Fn(&TestDescr, &mut BatteryIO) + Send + Sync + 'static {
    move |td, io| {
        let gen = io.gen_mut();
        let mut ones: i64 = 0;
        for _ in 0..n_words {
            ones += gen.bits32().count_ones() as i64;
        }
        let n_bits = (n_words * 32) as f64;
        let s_obs = ((2.0 * ones as f64 - n_bits) / n_bits.sqrt()).abs();
        let pvalue = erfc(s_obs / SQRT_2);
        io.add(td.id, td.name.clone(), pvalue);
    }
}

/// Serial chi-square test over byte frequencies: bins `n_bytes` output
/// bytes into 256 buckets and compares against a uniform null.
pub fn serial_chi_square_cb(n_bytes: usize) -> impl Fn(&TestDescr, &mut BatteryIO) + Send + Sync + 'static {
    move |td, io| {
        let gen = io.gen_mut();
        let mut counts = [0u64; 256];
        let mut remaining = n_bytes;
        while remaining > 0 {
            let word = gen.bits32();
            for b in word.to_le_bytes() {
                if remaining == 0 {
                    break;
                }
                counts[b as usize] += 1;
                remaining -= 1;
            }
        }
        let expected = n_bytes as f64 / 256.0;
        let chi_sq: f64 = counts.iter().map(|&c| { let d = c as f64 - expected; d * d / expected }).sum();
        let pvalue = chi_square_sf(chi_sq, 255.0);
        io.add(td.id, td.name.clone(), pvalue);
    }
}

/// Birthday-spacings style collision count: draws `n_draws` values into
/// `2^log2_buckets` buckets and compares the observed collision count to
/// its Poisson-approximated expectation.
pub fn birthday_spacings_collision_cb(
    n_draws: usize,
    log2_buckets: u32,
) -> impl Fn(&TestDescr, &mut BatteryIO) + Send + Sync + 'static {
    move |td, io| {
        let gen = io.gen_mut();
        let buckets = 1u64 << log2_buckets;
        let mut seen = std::collections::HashSet::with_capacity(n_draws);
        let mut collisions: u64 = 0;
        for _ in 0..n_draws {
            let v = (gen.bits32() as u64) % buckets;
            if !seen.insert(v) {
                collisions += 1;
            }
        }
        let expected = (n_draws as f64).powi(2) / (2.0 * buckets as f64);
        let z = (collisions as f64 - expected) / expected.sqrt().max(1e-12);
        let pvalue = normal_sf(z);
        io.add(td.id, td.name.clone(), pvalue);
    }
}
