//! Integration tests for the rmkl library
//!
//! These tests run the estimators end to end over precomputed and named
//! kernels and check the properties every fit must satisfy.

use approx::assert_relative_eq;
use rmkl::api::{MKLClassifier, MKLRegressor, OneClassMKL, BINARY_EPSILON, MULTICLASS_EPSILON};
use rmkl::config::{Algorithm, EstimatorConfig};
use rmkl::optimizer::{ConvergenceReason, ConvergenceStatus};
use rmkl::solver::{SvcParams, SvrParams};
use rmkl::{GramMatrix, KernelName, KernelParams, Kernels, LibSVMDataset, MKLError, SparseVector};
use rmkl::Dataset;
use std::io::Write;
use tempfile::NamedTempFile;

fn outer(v: &[f64]) -> GramMatrix {
    GramMatrix::from_rows(
        v.iter()
            .map(|&a| v.iter().map(|&b| a * b).collect())
            .collect(),
    )
    .expect("square matrix")
}

/// One kernel that separates the classes and one that carries noise
fn informative_and_noise() -> (Vec<GramMatrix>, Vec<f64>) {
    let informative = outer(&[2.0, 1.8, 2.2, 1.5, -2.0, -1.8, -2.2, -1.5]);
    let noise = outer(&[0.3, -0.7, 0.1, 0.9, -0.2, 0.6, -0.5, 0.8]);
    let y = vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];
    (vec![informative, noise], y)
}

fn two_clusters() -> (Vec<SparseVector>, Vec<f64>) {
    let x = vec![
        SparseVector::from_dense(&[2.0, 1.0]),
        SparseVector::from_dense(&[1.8, 1.1]),
        SparseVector::from_dense(&[2.2, 0.9]),
        SparseVector::from_dense(&[1.5, 1.4]),
        SparseVector::from_dense(&[-2.0, -1.0]),
        SparseVector::from_dense(&[-1.8, -1.1]),
        SparseVector::from_dense(&[-2.2, -0.9]),
        SparseVector::from_dense(&[-1.5, -1.4]),
    ];
    (x, vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0])
}

fn assert_on_simplex(weights: &[f64]) {
    assert!(weights.iter().all(|&w| w >= 0.0), "negative weight in {weights:?}");
    assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_informative_kernel_dominates_on_precomputed_input() {
    let (grams, y) = informative_and_noise();
    let mut clf = MKLClassifier::new().with_max_iter(100);
    clf.fit(&grams, &y).expect("fit should succeed");

    let weights = clf.weights().expect("fitted");
    assert_on_simplex(weights);
    assert!(
        weights[0] > 0.9,
        "informative kernel should carry nearly all the weight, got {weights:?}"
    );
    assert!(weights[1] < 0.1, "noise kernel kept {weights:?}");
    assert!(clf.status().expect("fitted").is_converged());
    assert_eq!(clf.fitted_epsilon(), Some(BINARY_EPSILON));

    // Training Gram doubles as the cross matrix on the training set
    assert_eq!(clf.predict(&grams).expect("predict"), y);
    assert_eq!(clf.score(&grams, &y).expect("score"), 1.0);
}

#[test]
fn test_history_is_monotone() {
    let (grams, y) = informative_and_noise();
    let mut clf = MKLClassifier::new().with_max_iter(100);
    clf.fit(&grams, &y).unwrap();

    let history = clf.history();
    assert_eq!(history.len(), clf.n_iter().unwrap());
    for pair in history.windows(2) {
        assert!(
            pair[1].objective <= pair[0].objective,
            "objective increased: {} -> {}",
            pair[0].objective,
            pair[1].objective
        );
    }
}

#[test]
fn test_single_kernel_gets_full_weight() {
    let (grams, y) = informative_and_noise();
    let single = vec![grams[0].clone()];
    let mut clf = MKLClassifier::new();
    clf.fit(&single, &y).unwrap();

    assert_eq!(clf.weights().unwrap(), &[1.0]);
    assert_eq!(clf.n_iter(), Some(1));
    assert_eq!(
        clf.status(),
        Some(ConvergenceStatus::Converged(ConvergenceReason::Stationary))
    );
}

#[test]
fn test_max_iter_shortfall_is_reported() {
    let (grams, y) = informative_and_noise();
    let mut clf = MKLClassifier::new().with_max_iter(1);
    clf.fit(&grams, &y).unwrap();

    assert_eq!(clf.status(), Some(ConvergenceStatus::MaxIterReached));
    assert_eq!(clf.n_iter(), Some(1));
    // A usable model is still produced
    assert_on_simplex(clf.weights().unwrap());
    assert_eq!(clf.predict(&grams).unwrap().len(), y.len());
}

#[test]
fn test_average_algorithm_keeps_uniform_weights() {
    let (x, y) = two_clusters();
    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf, KernelName::Poly]))
        .with_algo(Algorithm::Average);
    clf.fit(&x, &y).unwrap();

    for &w in clf.weights().unwrap() {
        assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-15);
    }
    assert_eq!(
        clf.status(),
        Some(ConvergenceStatus::Converged(ConvergenceReason::FixedWeights))
    );
    assert_eq!(clf.predict(&x).unwrap(), y);
}

#[test]
fn test_seeded_fits_are_deterministic() {
    let (x, y) = two_clusters();
    let build = || {
        MKLClassifier::new()
            .with_kernels(Kernels::named([KernelName::Rbf]))
            .with_kernels_params(vec![
                ("narrow".into(), KernelParams::gamma(2.0)),
                ("wide".into(), KernelParams::gamma(0.05)),
            ])
            .with_max_iter(30)
            .with_random_state(7)
    };

    let mut first = build();
    let mut second = build();
    first.fit(&x, &y).unwrap();
    second.fit(&x, &y).unwrap();

    assert_eq!(first.weights(), second.weights());
    assert_eq!(first.dual_solution(), second.dual_solution());
    assert_eq!(
        first.decision_function(&x).unwrap(),
        second.decision_function(&x).unwrap()
    );
}

#[test]
fn test_predict_is_idempotent() {
    let (x, y) = two_clusters();
    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
        .with_max_iter(20);
    clf.fit(&x, &y).unwrap();

    let weights = clf.weights().unwrap().to_vec();
    let first = clf.predict(&x).unwrap();
    let second = clf.predict(&x).unwrap();
    assert_eq!(first, second);
    assert_eq!(clf.weights().unwrap(), weights.as_slice());
}

#[test]
fn test_invalid_options_fail_before_kernel_evaluation() {
    let (x, y) = two_clusters();

    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
        .with_tol(0.0);
    assert!(matches!(clf.fit(&x, &y), Err(MKLError::Configuration(_))));
    assert_eq!(clf.cache_stats().misses, 0);

    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear]))
        .with_max_iter(0);
    assert!(matches!(clf.fit(&x, &y), Err(MKLError::Configuration(_))));
    assert_eq!(clf.cache_stats().misses, 0);

    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear]))
        .with_svm(SvcParams::default().with_c(-1.0));
    assert!(matches!(clf.fit(&x, &y), Err(MKLError::Configuration(_))));
    assert_eq!(clf.cache_stats().misses, 0);
    assert!(!clf.is_fitted());
}

#[test]
fn test_mismatched_gram_shapes_are_rejected() {
    let (grams, y) = informative_and_noise();
    let mut clf = MKLClassifier::new();
    assert!(matches!(
        clf.fit(&grams, &y[..7]),
        Err(MKLError::Configuration(_))
    ));

    let ragged = vec![grams[0].clone(), GramMatrix::zeros(7, 7)];
    assert!(matches!(clf.fit(&ragged, &y), Err(MKLError::Configuration(_))));
    assert!(!clf.is_fitted());
}

#[test]
fn test_multiclass_one_vs_one() {
    let centers = [(0.0, 0.0), (6.0, 6.0), (12.0, 0.0)];
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (label, &(cx, cy)) in centers.iter().enumerate() {
        for &(dx, dy) in &[(0.3, 0.1), (-0.2, 0.4), (0.1, -0.3), (-0.4, -0.2)] {
            x.push(SparseVector::from_dense(&[cx + dx, cy + dy]));
            y.push(label as f64 + 1.0);
        }
    }

    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
        .with_max_iter(30)
        .with_svm(SvcParams::default().with_c(10.0));
    clf.fit(&x, &y).unwrap();

    assert_eq!(clf.classes().unwrap(), &[1.0, 2.0, 3.0]);
    // No epsilon configured: more than two classes use the coarser threshold
    assert_eq!(clf.mkl_params().epsilon, None);
    assert_eq!(clf.fitted_epsilon(), Some(MULTICLASS_EPSILON));
    assert_on_simplex(clf.weights().unwrap());
    // Three pairwise machines
    assert_eq!(clf.decision_function(&x).unwrap()[0].len(), 3);
    assert_eq!(clf.predict(&x).unwrap(), y);
}

#[test]
fn test_regressor_fits_linear_trend() {
    let x: Vec<SparseVector> = (0..11)
        .map(|i| SparseVector::from_dense(&[-1.0 + 0.2 * i as f64]))
        .collect();
    let y: Vec<f64> = (0..11).map(|i| 2.0 * (-1.0 + 0.2 * i as f64)).collect();

    let mut reg = MKLRegressor::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
        .with_max_iter(30)
        .with_svm(SvrParams::default().with_c(10.0));
    reg.fit(&x, &y).unwrap();

    assert_on_simplex(reg.weights().unwrap());
    let r2 = reg.score(&x, &y).unwrap();
    assert!(r2 > 0.9, "R^2 too low: {r2}");
}

#[test]
fn test_one_class_flags_distant_points() {
    let x = vec![
        SparseVector::from_dense(&[0.0, 0.1]),
        SparseVector::from_dense(&[0.2, -0.1]),
        SparseVector::from_dense(&[-0.1, 0.0]),
        SparseVector::from_dense(&[0.1, 0.2]),
        SparseVector::from_dense(&[-0.2, -0.2]),
        SparseVector::from_dense(&[0.05, -0.15]),
    ];
    let mut oc = OneClassMKL::new()
        .with_kernels(Kernels::named([KernelName::Rbf]))
        .with_kernels_params(vec![
            ("rbf-1".into(), KernelParams::gamma(1.0)),
            ("rbf-5".into(), KernelParams::gamma(5.0)),
        ])
        .with_max_iter(20);
    oc.fit(&x).unwrap();
    assert_on_simplex(oc.weights().unwrap());

    let far = vec![SparseVector::from_dense(&[50.0, 50.0])];
    assert_eq!(oc.predict(&far).unwrap(), vec![-1.0]);
    assert!(oc.decision_function(&far).unwrap()[0] < 0.0);

    let offset = oc.offset().unwrap();
    let decisions = oc.decision_function(&x).unwrap();
    let scores = oc.score_samples(&x).unwrap();
    for (d, s) in decisions.iter().zip(&scores) {
        assert_relative_eq!(d + offset, *s, epsilon = 1e-12);
    }
    for p in oc.predict(&x).unwrap() {
        assert!(p == 1.0 || p == -1.0);
    }
}

#[test]
fn test_config_document_drives_estimator() {
    let config = EstimatorConfig::from_json(
        r#"{"mkl": {"max_iter": 15, "random_state": 3}, "svm": {"C": 5.0, "tol": 1e-4}}"#,
    )
    .unwrap();
    let clf = MKLClassifier::from_config(&config).unwrap();
    assert_eq!(clf.mkl_params().max_iter, Some(15));
    assert_eq!(clf.mkl_params().random_state, Some(3));
    assert_eq!(clf.svm_params().c, 5.0);

    let reg = MKLRegressor::from_config(&config).unwrap();
    assert_eq!(reg.mkl_params().epsilon, Some(1e-2));
}

#[test]
fn test_reserved_svm_keys_are_rejected() {
    for key in ["kernel", "random_state"] {
        let text = format!(r#"{{"svm": {{"{key}": 1}}}}"#);
        match EstimatorConfig::from_json(&text) {
            Err(MKLError::Configuration(msg)) => assert!(msg.contains(key), "{msg}"),
            other => panic!("expected configuration error for {key}, got {other:?}"),
        }
    }
}

#[test]
fn test_libsvm_file_to_model_and_back() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "+1 1:2.0 2:1.0").unwrap();
    writeln!(file, "+1 1:1.8 2:1.1").unwrap();
    writeln!(file, "+1 1:2.2 2:0.9").unwrap();
    writeln!(file, "-1 1:-2.0 2:-1.0").unwrap();
    writeln!(file, "-1 1:-1.8 2:-1.1").unwrap();
    writeln!(file, "-1 1:-2.2 2:-0.9").unwrap();
    file.flush().unwrap();

    let dataset = LibSVMDataset::from_file(file.path()).expect("Failed to load dataset");
    let x = dataset.features();
    let y = dataset.get_labels();

    let mut clf = MKLClassifier::new()
        .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
        .with_max_iter(20);
    clf.fit(&x, &y).unwrap();

    let model_file = NamedTempFile::new().unwrap();
    clf.save(model_file.path()).unwrap();
    let model = rmkl::SavedModel::load_from_file(model_file.path()).unwrap();
    assert_eq!(model.predict(&x).unwrap(), y);
    assert_eq!(model.metadata.n_support_vectors, model.support_vectors.len());
}
