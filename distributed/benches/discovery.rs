//! Benchmarks module discovery and segmentation on a protocol made of many
//! columns tied together by random global constraints.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use distributed::discoverer::Discovery;
use distributed::testing_utils::init_logger;
use distributed::{DiscoveryConfig, DistributedWizard};
use plonky2::field::types::Field;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wizard::column::{Column, ColumnId};
use wizard::expression::Expr;
use wizard::field::F;
use wizard::iop::CompiledIop;
use wizard::query::Query;

const NB_COLUMNS: usize = 256;
const NB_QUERIES: usize = 160;
const SIZE: usize = 1 << 10;

fn random_protocol(rng: &mut ChaCha8Rng) -> (CompiledIop, Vec<ColumnId>) {
    let mut comp = CompiledIop::new();
    let cols = (0..NB_COLUMNS)
        .map(|i| comp.insert_commit(format!("C_{i}"), SIZE))
        .collect::<Vec<_>>();
    for q in 0..NB_QUERIES {
        let a = cols[rng.gen_range(0..NB_COLUMNS)];
        let b = cols[rng.gen_range(0..NB_COLUMNS)];
        comp.insert_query(
            format!("Q_{q}"),
            0,
            Query::Global(Expr::from(Column::Natural(a)) * Expr::from(Column::Natural(b))),
        );
    }
    (comp, cols)
}

fn criterion_benchmark(c: &mut Criterion) {
    init_logger();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let (comp, cols) = random_protocol(&mut rng);
    let config = DiscoveryConfig {
        target_weight: 1 << 14,
        advices: Vec::new(),
    };

    let mut group = c.benchmark_group("discovery");
    group.sample_size(10);
    group.bench_function(BenchmarkId::from_parameter(NB_COLUMNS), |b| {
        b.iter(|| Discovery::analyze(&comp, &config))
    });

    let dw = DistributedWizard::distribute(comp.clone(), &config);
    group.bench_function(BenchmarkId::new("segment", NB_COLUMNS), |b| {
        b.iter_batched(
            || {
                dw.runtime(|rt| {
                    for &c in &cols {
                        let active = rng.gen_range(1..=SIZE);
                        let mut values = vec![F::ZERO; SIZE];
                        values[..active].fill(F::ONE);
                        rt.assign_column(c, values);
                    }
                })
            },
            |rt| dw.segment(&rt),
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
