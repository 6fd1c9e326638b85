//! Kernel and MKL fit benchmarks
//!
//! Gram matrix evaluation dominates the cost of a fit on raw samples; the
//! second group measures whole fits over precomputed matrices.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rmkl::api::MKLClassifier;
use rmkl::kernel::{LinearKernel, RBFKernel};
use rmkl::provider::gram_matrix;
use rmkl::{GramMatrix, KernelName, Kernels, SparseVector};
use std::hint::black_box;

/// Two interleaved clusters with a few zero features for sparsity
fn make_samples(n: usize, dim: usize) -> (Vec<SparseVector>, Vec<f64>) {
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let label = if i % 2 == 0 { 1.0 } else { -1.0 };
        let dense: Vec<f64> = (0..dim)
            .map(|j| {
                if (i + j) % 5 == 0 {
                    0.0
                } else {
                    label + ((i * 31 + j * 17) % 97) as f64 / 97.0 - 0.5
                }
            })
            .collect();
        x.push(SparseVector::from_dense(&dense));
        y.push(label);
    }
    (x, y)
}

fn bench_gram_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("gram_matrix");

    for n in [50, 200, 500] {
        let (x, _) = make_samples(n, 20);
        group.throughput(Throughput::Elements((n * (n + 1) / 2) as u64));

        group.bench_with_input(BenchmarkId::new("linear", n), &x, |b, x| {
            let kernel = LinearKernel::new();
            b.iter(|| black_box(gram_matrix(&kernel, x)));
        });
        group.bench_with_input(BenchmarkId::new("rbf", n), &x, |b, x| {
            let kernel = RBFKernel::new(0.05);
            b.iter(|| black_box(gram_matrix(&kernel, x)));
        });
    }

    group.finish();
}

fn bench_mkl_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("mkl_fit");
    group.sample_size(20);

    for n in [50, 150] {
        let (x, y) = make_samples(n, 10);
        let grams: Vec<GramMatrix> = [0.01, 0.1, 1.0]
            .iter()
            .map(|&gamma| gram_matrix(&RBFKernel::new(gamma), &x))
            .collect();

        group.bench_with_input(BenchmarkId::new("precomputed_3", n), &grams, |b, grams| {
            b.iter(|| {
                let mut clf = MKLClassifier::new().with_max_iter(20).with_random_state(0);
                clf.fit(grams, &y).expect("fit");
                black_box(clf.weights().map(<[f64]>::to_vec))
            });
        });

        group.bench_with_input(BenchmarkId::new("named_uncached", n), &x, |b, x| {
            b.iter(|| {
                let mut clf = MKLClassifier::new()
                    .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
                    .with_precompute_kernels(false)
                    .with_max_iter(20);
                clf.fit(x, &y).expect("fit");
                black_box(clf.n_iter())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gram_matrix, bench_mkl_fit);
criterion_main!(benches);
