use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use testu01_threads::{
    battery::Battery,
    dispatcher,
    entropy::{EntropyService, Seed},
    prng::{xoshiro_factory, PrngCapability, Xoshiro256PlusPlusCapability},
};

pub fn entropy_benchmarks(c: &mut Criterion) {
    c.bench_function("EntropyService::seed64", |b| {
        let service = EntropyService::new();
        b.iter(|| black_box(service.seed64()))
    });
    c.bench_function("Seed::from_entropy", |b| {
        let service = EntropyService::new();
        b.iter(|| black_box(Seed::from_entropy(&service)))
    });
}

pub fn prng_benchmarks(c: &mut Criterion) {
    c.bench_function("xoshiro256pp::bits32", |b| {
        let service = EntropyService::new();
        let mut gen = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        b.iter(|| black_box(gen.bits32()))
    });
    c.bench_function("xoshiro256pp::u01", |b| {
        let service = EntropyService::new();
        let mut gen = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        b.iter(|| black_box(gen.u01()))
    });
    c.bench_function("xoshiro256pp::array64_1024", |b| {
        let service = EntropyService::new();
        let mut gen = Xoshiro256PlusPlusCapability::seeded(&service, 0);
        b.iter_batched_ref(
            || [0u64; 1024],
            |buf| black_box(gen.array64(buf)),
            BatchSize::SmallInput,
        )
    });
}

pub fn dispatcher_benchmarks(c: &mut Criterion) {
    c.bench_function("dispatcher::run SmallCrush", |b| {
        b.iter_batched(
            || Battery::small_crush(xoshiro_factory()),
            |battery| {
                black_box(dispatcher::run(
                    &battery.name,
                    "xoshiro256++",
                    battery.tests,
                    &battery.factory,
                    Some(1),
                    0.001,
                ))
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, entropy_benchmarks, prng_benchmarks, dispatcher_benchmarks);
criterion_main!(benches);
