use testu01_threads::{battery::Battery, dispatcher, prng::xoshiro_factory};

#[test]
fn small_crush_runs_end_to_end_and_reports_all_tests() {
    let battery = Battery::small_crush(xoshiro_factory());
    let expected_tests = battery.tests.len();
    let (results, seed_entries, _cpu, _wall) = dispatcher::run(
        &battery.name,
        "xoshiro256++",
        battery.tests,
        &battery.factory,
        Some(2),
        0.001,
    )
    .unwrap();
    let merged = results.merged_sorted();
    assert_eq!(merged.len(), expected_tests);
    assert!(!seed_entries.is_empty());
    assert!(results.report.contains("SmallCrush battery"));
}

#[test]
fn single_threaded_run_matches_multi_threaded_test_count() {
    let serial = Battery::small_crush(xoshiro_factory());
    let serial_count = serial.tests.len();
    let (serial_results, ..) =
        dispatcher::run(&serial.name, "xoshiro256++", serial.tests, &serial.factory, Some(1), 0.001)
            .unwrap();

    let parallel = Battery::small_crush(xoshiro_factory());
    let (parallel_results, ..) = dispatcher::run(
        &parallel.name,
        "xoshiro256++",
        parallel.tests,
        &parallel.factory,
        Some(4),
        0.001,
    )
    .unwrap();

    assert_eq!(serial_results.merged_sorted().len(), serial_count);
    assert_eq!(parallel_results.merged_sorted().len(), serial_count);
}

#[test]
fn worker_seeds_are_distinct_256_bit_draws() {
    let battery = Battery::crush(xoshiro_factory());
    let (_results, seed_entries, _cpu, _wall) = dispatcher::run(
        &battery.name,
        "xoshiro256++",
        battery.tests,
        &battery.factory,
        Some(3),
        0.001,
    )
    .unwrap();
    // Each worker draws one 256-bit seed (four `seed64()` words), so the
    // seed log grows by a multiple of four per worker.
    assert!(seed_entries.len() % 4 == 0);
    let seeds: std::collections::HashSet<u64> = seed_entries.iter().map(|e| e.seed).collect();
    assert_eq!(seeds.len(), seed_entries.len());
}
