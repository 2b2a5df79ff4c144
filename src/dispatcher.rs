#![forbid(unsafe_code)]
//! Parallel test dispatcher: pulls tests off a shared shuffled cursor across
//! a pool of worker threads, each with a private PRNG, and merges the
//! results. Grounded on `original_source/testu01_mt.h`'s `TestsPull`/
//! `TestDescr` and the teacher's `cli.rs::run_cli` multi-threaded branch
//! (plain `std::thread::spawn` + channel fan-in, chosen over `parallel.rs`'s
//! rayon iterator because the pull-cursor's per-test granularity is coarse).

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};
use crossbeam_channel::unbounded;
use rand::seq::SliceRandom;

use crate::{
    error::RuntimeError,
    prng::PrngFactory,
    report::{BatteryIO, BatteryResults, PValueRecord, SeedLogEntry},
};

/// One statistical test: a stable id, a display name, and a closure that
/// runs the test against the `BatteryIO`'s PRNG and records p-values.
pub struct TestDescr {
    pub id: i32,
    pub name: String,
    run: Box<dyn Fn(&TestDescr, &mut BatteryIO) + Send + Sync>,
}

impl TestDescr {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        run: impl Fn(&TestDescr, &mut BatteryIO) + Send + Sync + 'static,
    ) -> Self {
        Self { id, name: name.into(), run: Box::new(run) }
    }

    pub fn run(&self, io: &mut BatteryIO) {
        (self.run)(self, io)
    }
}

/// Shared, mutex-guarded cursor over a pre-shuffled test list. Each test is
/// handed out to exactly one worker.
pub struct TestsPull {
    tests: Mutex<VecDeque<TestDescr>>,
}

impl TestsPull {
    pub fn new(mut tests: Vec<TestDescr>) -> Self {
        tests.shuffle(&mut rand::thread_rng());
        Self { tests: Mutex::new(tests.into()) }
    }

    pub fn get(&self) -> Option<TestDescr> {
        self.tests.lock().expect("tests pull mutex poisoned").pop_front()
    }
}

/// Picks the worker count: start from `override_count` or the number of
/// logical cores, then halve while it exceeds the test count, minimum 1.
pub fn select_thread_count(test_count: usize, override_count: Option<usize>) -> usize {
    let mut count = override_count.unwrap_or_else(num_cpus::get).max(1);
    while count > test_count && count > 1 {
        count /= 2;
    }
    count.max(1)
}

/// Extracts a human-readable message from a caught panic payload, falling
/// back to a generic description for payloads that are neither `&str` nor
/// `String` (the two types `panic!`/`.expect()` actually produce).
fn panic_message(payload: &(dyn std::any::Any + Send + 'static)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}

/// Runs every test in `tests` across `thread_count` worker threads (chosen
/// via [`select_thread_count`] unless `thread_override` is given), each
/// backed by a fresh PRNG from `factory`. Returns the merged, sorted report
/// plus the seeds drawn during construction of each worker's PRNG.
///
/// A panicking worker is joined via `JoinHandle::join`, whose `Err` is
/// propagated as a fatal [`RuntimeError::WorkerPanicked`] rather than
/// re-panicking in the caller.
pub fn run(
    battery_name: &str,
    gen_label: &str,
    tests: Vec<TestDescr>,
    factory: &PrngFactory,
    thread_override: Option<usize>,
    suspect_eps: f64,
) -> Result<(BatteryResults, Vec<SeedLogEntry>, Duration, Duration), RuntimeError> {
    let wall_start = Instant::now();
    let test_count = tests.len();
    let thread_count = select_thread_count(test_count, thread_override);
    let pull = Arc::new(TestsPull::new(tests));
    let (tx_progress, rx_progress) = unbounded::<(usize, i32)>();

    let mut handles = Vec::with_capacity(thread_count);
    for worker_id in 0..thread_count {
        let pull = Arc::clone(&pull);
        let gen = {
            let before = crate::entropy::global_entropy().seeds_log().len();
            let gen = factory();
            let drawn = crate::entropy::global_entropy().seeds_log()[before..].to_vec();
            (gen, drawn)
        };
        let tx_progress = tx_progress.clone();
        let handle = thread::Builder::new()
            .name(format!("test-worker-{worker_id}"))
            .spawn(move || -> (Vec<PValueRecord>, Duration, Vec<u64>) {
                let (prng, drawn_seeds) = gen;
                let cpu_start = Instant::now();
                let mut io = BatteryIO::new(prng);
                while let Some(test) = pull.get() {
                    log::debug!("worker {worker_id} starting test {} ({})", test.id, test.name);
                    test.run(&mut io);
                    tx_progress.send((worker_id, test.id)).ok();
                    log::info!("worker {worker_id} finished test {} ({})", test.id, test.name);
                }
                (io.into_results(), cpu_start.elapsed(), drawn_seeds)
            })
            .expect("should be able to spawn worker thread");
        handles.push(handle);
    }
    drop(tx_progress);
    // Progress messages are consumed as they arrive purely for their
    // side-effecting log lines above; draining here just lets the channel
    // close once every worker has finished sending.
    for (worker_id, test_id) in rx_progress {
        log::trace!("progress: worker {worker_id} completed test {test_id}");
    }

    let mut pvalues = Vec::with_capacity(thread_count);
    let mut cpu_time = Duration::ZERO;
    let mut seed_entries = Vec::new();
    for (worker_id, handle) in handles.into_iter().enumerate() {
        let (results, thread_cpu, drawn_seeds) = handle.join().map_err(|payload| {
            RuntimeError::WorkerPanicked(format!(
                "worker {worker_id} panicked: {}",
                panic_message(&*payload)
            ))
        })?;
        cpu_time += thread_cpu;
        for (index, seed) in drawn_seeds.into_iter().enumerate() {
            seed_entries.push(SeedLogEntry { thread_id: worker_id, index, seed });
        }
        pvalues.push(results);
    }

    let results = BatteryResults { pvalues, report: String::new() };
    let merged = results.merged_sorted();
    let report = crate::report::write_report(
        battery_name,
        gen_label,
        &merged,
        cpu_time,
        wall_start.elapsed(),
        suspect_eps,
    );
    let wall_time = wall_start.elapsed();
    Ok((BatteryResults { report, ..results }, seed_entries, cpu_time, wall_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::xoshiro_factory;

    #[test]
    fn thread_count_halves_until_it_fits() {
        // 16 -> 8 -> 4 -> 2, stopping as soon as count <= test_count (3).
        assert_eq!(select_thread_count(3, Some(16)), 2);
        assert_eq!(select_thread_count(0, Some(8)), 1);
        assert_eq!(select_thread_count(100, Some(4)), 4);
    }

    #[test]
    fn empty_battery_runs_without_tests() {
        let factory = xoshiro_factory();
        let (results, _seeds, _cpu, _wall) =
            run("empty", "xoshiro256++", Vec::new(), &factory, Some(1), 0.001).unwrap();
        assert!(results.pvalues.iter().all(|v| v.is_empty()));
        assert!(results.report.contains("Number of statistics: 0"));
    }

    #[test]
    fn all_test_ids_survive_merge_in_order() {
        let factory = xoshiro_factory();
        let tests = vec![
            TestDescr::new(3, "third", |td, io| io.add(td.id, td.name.clone(), 0.5)),
            TestDescr::new(1, "first", |td, io| io.add(td.id, td.name.clone(), 0.5)),
            TestDescr::new(2, "second", |td, io| io.add(td.id, td.name.clone(), 0.5)),
        ];
        let (results, _seeds, _cpu, _wall) =
            run("three", "xoshiro256++", tests, &factory, Some(2), 0.001).unwrap();
        let merged = results.merged_sorted();
        let ids: Vec<i32> = merged.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn worker_prngs_draw_independent_seeds() {
        let factory = xoshiro_factory();
        let tests: Vec<TestDescr> = (1..=4)
            .map(|id| TestDescr::new(id, format!("test-{id}"), |td, io| io.add(td.id, td.name.clone(), 0.5)))
            .collect();
        let (_results, seed_entries, _cpu, _wall) =
            run("four", "xoshiro256++", tests, &factory, Some(2), 0.001).unwrap();
        assert!(!seed_entries.is_empty());
        let thread0: Vec<u64> = seed_entries.iter().filter(|e| e.thread_id == 0).map(|e| e.seed).collect();
        let thread1: Vec<u64> = seed_entries.iter().filter(|e| e.thread_id == 1).map(|e| e.seed).collect();
        assert_ne!(thread0, thread1);
    }

    #[test]
    fn panicking_worker_is_reported_as_a_runtime_error_not_a_repanic() {
        let factory = xoshiro_factory();
        let tests = vec![TestDescr::new(1, "boom", |_td, _io| panic!("deliberate test panic"))];
        let err = run("panics", "xoshiro256++", tests, &factory, Some(1), 0.001).unwrap_err();
        assert!(matches!(err, RuntimeError::WorkerPanicked(_)));
    }
}
