//! Benchmarks for the Voronoi geometry oracle
//!
//! Measures performance of:
//! - Cell construction
//! - Enclosing-neighbor queries
//! - Boundary checks against an AOI circle

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use von_geometry::{GeometryOracle, Position, SiteId, Voronoi};

/// Seeded scatter over a 1000x1000 square.
fn scatter(count: u64) -> Voronoi {
    let mut rng = StdRng::seed_from_u64(0x2545_f491);
    Voronoi::from_sites((0..count).map(|id| {
        let pos = Position::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0));
        (SiteId(id), pos)
    }))
}

/// Benchmark cell construction at neighbor-table sizes a peer actually sees
fn bench_cell(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell");

    for &count in &[8u64, 16, 32, 64, 128] {
        let diagram = scatter(count);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &diagram, |b, d| {
            b.iter(|| d.cell(black_box(SiteId(0))))
        });
    }
    group.finish();
}

/// Benchmark the enclosing-neighbor query used by every consistency check
fn bench_enclosing_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("enclosing_neighbors");

    for &count in &[8u64, 32, 128] {
        let diagram = scatter(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &diagram, |b, d| {
            b.iter(|| {
                for id in 0..count {
                    black_box(d.enclosing_neighbors(SiteId(id)));
                }
            })
        });
    }
    group.finish();
}

/// Benchmark boundary classification as done on every move
fn bench_is_boundary(c: &mut Criterion) {
    let diagram = scatter(32);
    let center = Position::new(500.0, 500.0);

    c.bench_function("is_boundary_32", |b| {
        b.iter(|| {
            for id in 0..32 {
                black_box(diagram.is_boundary(SiteId(id), center, black_box(200.0)));
            }
        })
    });
}

criterion_group!(benches, bench_cell, bench_enclosing_neighbors, bench_is_boundary);
criterion_main!(benches);
