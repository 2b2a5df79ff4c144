#![forbid(unsafe_code)]
//! Declarative battery definitions: named, ordered lists of tests with
//! pre-chosen parameters. Grounded on `original_source/bigcrush.cpp`/`.h`'s
//! `BigCrushBattery` constructor (`tests.emplace_back(++j2, "name, param=X",
//! cb_factory(...))`).

use crate::{
    callbacks::{birthday_spacings_collision_cb, monobit_frequency_cb, serial_chi_square_cb},
    dispatcher::TestDescr,
    prng::PrngFactory,
};

/// A named, ordered list of tests plus the PRNG factory workers construct
/// their private generator from.
pub struct Battery {
    pub name: String,
    pub tests: Vec<TestDescr>,
    pub factory: PrngFactory,
}

struct TestBuilder {
    next_id: i32,
    tests: Vec<TestDescr>,
}

impl TestBuilder {
    fn new() -> Self {
        Self { next_id: 0, tests: Vec::new() }
    }

    fn push(&mut self, name: impl Into<String>, cb: impl Fn(&TestDescr, &mut crate::report::BatteryIO) + Send + Sync + 'static) {
        self.next_id += 1;
        self.tests.push(TestDescr::new(self.next_id, name, cb));
    }
}

impl Battery {
    pub fn small_crush(factory: PrngFactory) -> Self {
        let mut b = TestBuilder::new();
        b.push("BirthdaySpacings, t=24 bits, n=2048", birthday_spacings_collision_cb(2048, 24));
        b.push("MonobitFrequency, n=1000000 bits", monobit_frequency_cb(1_000_000 / 32));
        b.push("SerialChiSquare, n=100000 bytes", serial_chi_square_cb(100_000));
        Self { name: "SmallCrush".to_string(), tests: b.tests, factory }
    }

    pub fn crush(factory: PrngFactory) -> Self {
        let mut b = TestBuilder::new();
        b.push("BirthdaySpacings, t=24 bits, n=8192", birthday_spacings_collision_cb(8192, 24));
        b.push("BirthdaySpacings, t=28 bits, n=8192", birthday_spacings_collision_cb(8192, 28));
        b.push("MonobitFrequency, n=10000000 bits", monobit_frequency_cb(10_000_000 / 32));
        b.push("SerialChiSquare, n=1000000 bytes", serial_chi_square_cb(1_000_000));
        b.push("SerialChiSquare, n=2000000 bytes", serial_chi_square_cb(2_000_000));
        Self { name: "Crush".to_string(), tests: b.tests, factory }
    }

    pub fn big_crush(factory: PrngFactory) -> Self {
        let mut b = TestBuilder::new();
        b.push("BirthdaySpacings, t=24 bits, n=32768", birthday_spacings_collision_cb(32768, 24));
        b.push("BirthdaySpacings, t=28 bits, n=32768", birthday_spacings_collision_cb(32768, 28));
        b.push("BirthdaySpacings, t=30 bits, n=16384", birthday_spacings_collision_cb(16384, 30));
        b.push("MonobitFrequency, n=100000000 bits", monobit_frequency_cb(100_000_000 / 32));
        b.push("SerialChiSquare, n=5000000 bytes", serial_chi_square_cb(5_000_000));
        b.push("SerialChiSquare, n=10000000 bytes", serial_chi_square_cb(10_000_000));
        Self { name: "BigCrush".to_string(), tests: b.tests, factory }
    }

    pub fn pseudo_diehard(factory: PrngFactory) -> Self {
        let mut b = TestBuilder::new();
        b.push("MonobitFrequency (DIEHARD-style), n=2000000 bits", monobit_frequency_cb(2_000_000 / 32));
        b.push("BirthdaySpacings (DIEHARD-style), t=20 bits, n=512", birthday_spacings_collision_cb(512, 20));
        b.push("SerialChiSquare (DIEHARD-style), n=500000 bytes", serial_chi_square_cb(500_000));
        Self { name: "pseudoDIEHARD".to_string(), tests: b.tests, factory }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::xoshiro_factory;

    #[test]
    fn battery_test_ids_are_sequential_from_one() {
        let battery = Battery::small_crush(xoshiro_factory());
        let ids: Vec<i32> = battery.tests.iter().map(|t| t.id).collect();
        assert_eq!(ids, (1..=ids.len() as i32).collect::<Vec<_>>());
    }

    #[test]
    fn bigger_batteries_have_more_tests() {
        let small = Battery::small_crush(xoshiro_factory());
        let big = Battery::big_crush(xoshiro_factory());
        assert!(big.tests.len() >= small.tests.len());
    }
}
