#![forbid(unsafe_code)]
//! P-value records, the battery-wide result sink, and the text report
//! renderer. Grounded on `original_source/testu01_mt.h`'s `PValueRecord`,
//! `BatteryIO`, `BatteryResults` and `src/testu01_mt.cpp`'s `WritePValue`/
//! `WriteReport`.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::prng::PrngCapability;

pub const DEFAULT_SUSPECT_EPS: f64 = 0.001;

/// p-values below this (in absolute value) are reported as `eps` rather
/// than in scientific notation; mirrors `gofw_Epsilonp`.
const EPS_LOWER: f64 = 1e-300;
/// `1 - p` below this is reported as `1 - eps1`; mirrors `gofw_Epsilonp1`.
const EPS_UPPER: f64 = 1e-10;

/// One test's reported p-value. Several tests may share an `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PValueRecord {
    pub id: i32,
    pub name: String,
    pub pvalue: f64,
}

impl PValueRecord {
    pub fn new(id: i32, name: impl Into<String>, pvalue: f64) -> Self {
        Self { id, name: name.into(), pvalue }
    }
}

impl PartialOrd for PValueRecord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.id.cmp(&other.id))
    }
}

/// Thread-local result sink: one private PRNG plus an append-only sequence
/// of p-values. Never shared across threads.
pub struct BatteryIO {
    gen: Box<dyn PrngCapability>,
    results: Vec<PValueRecord>,
}

impl BatteryIO {
    pub fn new(gen: Box<dyn PrngCapability>) -> Self {
        Self { gen, results: Vec::new() }
    }

    pub fn add(&mut self, id: i32, name: impl Into<String>, pvalue: f64) {
        self.results.push(PValueRecord::new(id, name, pvalue));
    }

    pub fn gen_mut(&mut self) -> &mut dyn PrngCapability {
        &mut *self.gen
    }

    pub fn gen_name(&self) -> String {
        self.gen.name()
    }

    pub fn results(&self) -> &[PValueRecord] {
        &self.results
    }

    pub fn into_results(self) -> Vec<PValueRecord> {
        self.results
    }
}

/// Per-thread p-value collections plus the rendered text report.
pub struct BatteryResults {
    pub pvalues: Vec<Vec<PValueRecord>>,
    pub report: String,
}

impl BatteryResults {
    /// Flattens and stable-sorts every thread's records by `id`, restoring
    /// deterministic order regardless of scheduling.
    pub fn merged_sorted(&self) -> Vec<PValueRecord> {
        let mut merged: Vec<PValueRecord> = self.pvalues.iter().flatten().cloned().collect();
        merged.sort_by_key(|r| r.id);
        merged
    }
}

/// Formats one p-value following the branching rules in
/// `original_source/src/testu01_mt.cpp::p0_tostring`/`WritePValue`.
pub fn format_pvalue(p: f64) -> String {
    if p < EPS_LOWER {
        "   eps  ".to_string()
    } else if p < 0.01 {
        sci2(p)
    } else if p <= 0.99 {
        format!("{:8.2}", p)
    } else if 1.0 - p < EPS_UPPER {
        " 1 - eps1".to_string()
    } else if p > 0.9999 {
        format!(" 1 - {}", sci2(1.0 - p))
    } else {
        format!("{:8.4}", p)
    }
}

/// Two-significant-figure scientific notation, e.g. `1.0e-03`.
fn sci2(p: f64) -> String {
    if p == 0.0 {
        return "0.0e+00".to_string();
    }
    let exponent = p.abs().log10().floor() as i32;
    let mantissa = p / 10f64.powi(exponent);
    format!("{:.1}e{:+03}", mantissa, exponent)
}

fn format_hms_cc(d: Duration) -> String {
    let total_centis = d.as_millis() / 10;
    let (h, rem) = (total_centis / 360000, total_centis % 360000);
    let (m, rem) = (rem / 6000, rem % 6000);
    let (s, cc) = (rem / 100, rem % 100);
    format!("{:02}:{:02}:{:02}.{:02}", h, m, s, cc)
}

fn format_hms_millis(d: Duration) -> String {
    let total_millis = d.as_millis();
    let (h, rem) = (total_millis / 3600000, total_millis % 3600000);
    let (m, rem) = (rem / 60000, rem % 60000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// Renders the battery summary: header, then either "All tests were
/// passed." or the sorted list of p-values falling outside the suspicious
/// band `(suspect_eps, 1 - suspect_eps)`.
pub fn write_report(
    battery_name: &str,
    gen_name: &str,
    records: &[PValueRecord],
    cpu_time: Duration,
    wall_time: Duration,
    suspect_eps: f64,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} battery, generator: {}\n", battery_name, gen_name));
    out.push_str(&format!("Version: {}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("Number of statistics: {}\n", records.len()));
    out.push_str(&format!("Total CPU time: {}\n", format_hms_cc(cpu_time)));
    out.push_str(&format!("Total wall-clock time: {}\n", format_hms_millis(wall_time)));
    out.push('\n');
    let mut suspicious: Vec<&PValueRecord> = records
        .iter()
        .filter(|r| r.pvalue < suspect_eps || r.pvalue > 1.0 - suspect_eps)
        .collect();
    suspicious.sort_by_key(|r| r.id);
    if suspicious.is_empty() {
        out.push_str("All tests were passed.\n");
    } else {
        out.push_str(&format!("Suspicious p-values outside [{}, {}]:\n", suspect_eps, 1.0 - suspect_eps));
        for r in &suspicious {
            out.push_str(&format!("{:>4} {:<30} {}\n", r.id, r.name, format_pvalue(r.pvalue)));
        }
        out.push_str("All other tests were passed.\n");
    }
    out
}

/// One entry of the persisted seeds-allocator table: which thread drew
/// which seed, and in what order.
#[derive(Clone, Copy, Debug)]
pub struct SeedLogEntry {
    pub thread_id: usize,
    pub index: usize,
    pub seed: u64,
}

/// Renders the "Seeds allocator report" section appended to the persisted
/// protocol file: a tab-separated `(thread, index, decimal, hex)` table.
pub fn format_seed_table(entries: &[SeedLogEntry]) -> String {
    let mut out = String::from("Seeds allocator report\n");
    for e in entries {
        out.push_str(&format!("{}\t{}\t{}\t{:016x}\n", e.thread_id, e.index, e.seed, e.seed));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_pvalue_midrange() {
        assert_eq!(format_pvalue(0.5), "    0.50");
    }

    #[test]
    fn format_pvalue_near_one_eps1() {
        assert_eq!(format_pvalue(1.0 - 1e-16), " 1 - eps1");
    }

    #[test]
    fn format_pvalue_tiny_is_eps() {
        assert_eq!(format_pvalue(1e-310), "   eps  ");
    }

    #[test]
    fn format_pvalue_high_four_digit() {
        assert_eq!(format_pvalue(0.999), "  0.9990");
    }

    #[test]
    fn format_pvalue_small_is_scientific() {
        let s = format_pvalue(0.001);
        assert!(s.contains("e-03"), "got {s}");
    }

    #[test]
    fn empty_battery_reports_all_passed() {
        let report = write_report("empty", "gen", &[], Duration::ZERO, Duration::ZERO, DEFAULT_SUSPECT_EPS);
        assert!(report.contains("Number of statistics: 0"));
        assert!(report.contains("All tests were passed."));
    }

    #[test]
    fn single_pass_is_not_suspicious() {
        let records = vec![PValueRecord::new(1, "always-pass", 0.5)];
        let report = write_report("b", "gen", &records, Duration::ZERO, Duration::ZERO, DEFAULT_SUSPECT_EPS);
        assert!(report.contains("All tests were passed."));
    }

    #[test]
    fn single_fail_is_reported() {
        let records = vec![PValueRecord::new(1, "always-fail", 1e-20)];
        let report = write_report("b", "gen", &records, Duration::ZERO, Duration::ZERO, DEFAULT_SUSPECT_EPS);
        assert!(report.contains("always-fail"));
        assert!(!report.contains("All tests were passed."));
    }

    #[test]
    fn merged_sorted_restores_id_order() {
        let results = BatteryResults {
            pvalues: vec![
                vec![PValueRecord::new(3, "c", 0.5), PValueRecord::new(1, "a", 0.5)],
                vec![PValueRecord::new(2, "b", 0.5)],
            ],
            report: String::new(),
        };
        let merged = results.merged_sorted();
        let ids: Vec<i32> = merged.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
