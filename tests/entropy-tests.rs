use testu01_threads::entropy::{EntropyService, Seed};

#[test]
fn self_test_passes_against_reference_vectors() {
    assert!(EntropyService::self_test());
}

#[test]
fn seed256_draws_are_logged_in_groups_of_four() {
    let service = EntropyService::new();
    let _seed = Seed::from_entropy(&service);
    assert_eq!(service.seeds_log().len(), 4);
}

#[test]
fn two_services_started_moments_apart_diverge() {
    let a = EntropyService::new();
    let b = EntropyService::new();
    assert_ne!(a.seed64(), b.seed64());
}

#[test]
fn seed_display_and_try_from_round_trip() {
    let service = EntropyService::new();
    let seed = Seed::from_entropy(&service);
    let round_tripped = Seed::try_from(seed.to_string()).unwrap();
    assert_eq!(seed, round_tripped);
}
