//! rmkl Command Line Interface
//!
//! Train multiple kernel models on LibSVM or CSV data, predict with stored
//! models and inspect them.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info};
use rmkl::api::{MKLClassifier, MKLRegressor, OneClassMKL};
use rmkl::config::{Algorithm, EstimatorConfig};
use rmkl::core::{MKLError, Result};
use rmkl::data::{load_dataset, DataFormat};
use rmkl::kernel::{KernelChoice, KernelName, KernelParams, Kernels};
use rmkl::optimizer::ConvergenceStatus;
use rmkl::persistence::SavedModel;
use rmkl::solver::Variant;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "rmkl")]
#[command(about = "Multiple kernel learning for SVC, SVR and one-class SVM")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn kernel weights and a model from training data
    Train(TrainArgs),
    /// Make predictions using a trained model
    Predict(PredictArgs),
    /// Evaluate a model on labelled data
    Evaluate(EvaluateArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Task {
    /// C-SVC, one-vs-one for more than two classes
    Classify,
    /// Epsilon-SVR
    Regress,
    /// Nu one-class SVM
    #[value(name = "one-class")]
    OneClass,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliFormat {
    Auto,
    Libsvm,
    Csv,
}

impl CliFormat {
    fn resolve(self) -> Option<DataFormat> {
        match self {
            CliFormat::Auto => None,
            CliFormat::Libsvm => Some(DataFormat::LibSVM),
            CliFormat::Csv => Some(DataFormat::CSV),
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Training data file (LibSVM or CSV format)
    #[arg(long)]
    data: PathBuf,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    /// Data format
    #[arg(short, long, value_enum, default_value = "auto")]
    format: CliFormat,

    /// Learning task
    #[arg(short, long, value_enum, default_value = "classify")]
    task: Task,

    /// Kernel as NAME or NAME:key=value,... (repeat for several kernels)
    #[arg(short, long = "kernel", value_name = "SPEC")]
    kernels: Vec<String>,

    /// JSON configuration with "mkl" and "svm" sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// MKL algorithm
    #[arg(long)]
    algo: Option<Algorithm>,

    /// Weight-stability and duality-gap threshold
    #[arg(long)]
    epsilon: Option<f64>,

    /// Minimum objective improvement per step
    #[arg(long)]
    tol: Option<f64>,

    /// Maximum number of MKL iterations
    #[arg(long)]
    max_iter: Option<usize>,

    /// Seed for the sub-solver
    #[arg(long)]
    seed: Option<u64>,

    /// Regularization parameter C (classify, regress)
    #[arg(short = 'C', long)]
    c: Option<f64>,

    /// Width of the insensitive tube (regress)
    #[arg(long)]
    svr_epsilon: Option<f64>,

    /// Outlier fraction bound nu (one-class)
    #[arg(long)]
    nu: Option<f64>,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Data format
    #[arg(short, long, value_enum, default_value = "auto")]
    format: CliFormat,

    /// Also print the decision values
    #[arg(long)]
    decision: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Test data file
    #[arg(long)]
    data: PathBuf,

    /// Data format
    #[arg(short, long, value_enum, default_value = "auto")]
    format: CliFormat,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Train(args) => train_command(args, cli.verbose || cli.debug),
        Commands::Predict(args) => predict_command(args),
        Commands::Evaluate(args) => evaluate_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Parse `rbf:gamma=0.5` style kernel arguments.
///
/// Parameter sets are only passed on when at least one kernel carries some,
/// in which case every kernel is labelled by its argument.
fn parse_kernels(args: &[String]) -> Result<(Kernels, Option<Vec<(String, KernelParams)>>)> {
    let defaults = ["linear".to_string(), "rbf".to_string()];
    let args = if args.is_empty() { &defaults[..] } else { args };

    let mut choices = Vec::with_capacity(args.len());
    let mut params = Vec::with_capacity(args.len());
    for arg in args {
        let (name, rest) = arg.split_once(':').unwrap_or((arg.as_str(), ""));
        choices.push(KernelChoice::Named(name.parse::<KernelName>()?));
        params.push((arg.clone(), KernelParams::parse(rest)?));
    }

    let params = if params.iter().all(|(_, p)| p.is_empty()) {
        None
    } else {
        Some(params)
    };
    Ok((Kernels::List(choices), params))
}

/// Apply the shared builder options to an estimator
macro_rules! configure {
    ($estimator:expr, $args:expr, $kernels:expr, $params:expr, $verbose:expr) => {{
        let mut estimator = $estimator.with_kernels($kernels);
        if let Some(params) = $params {
            estimator = estimator.with_kernels_params(params);
        }
        if let Some(algo) = $args.algo {
            estimator = estimator.with_algo(algo);
        }
        if let Some(epsilon) = $args.epsilon {
            estimator = estimator.with_epsilon(epsilon);
        }
        if let Some(tol) = $args.tol {
            estimator = estimator.with_tol(tol);
        }
        if let Some(max_iter) = $args.max_iter {
            estimator = estimator.with_max_iter(max_iter);
        }
        if let Some(seed) = $args.seed {
            estimator = estimator.with_random_state(seed);
        }
        if $verbose {
            estimator = estimator.with_verbose(true);
        }
        estimator
    }};
}

fn train_command(args: TrainArgs, verbose: bool) -> Result<()> {
    info!("Loading training data from: {:?}", args.data);
    let dataset = load_dataset(&args.data, args.format.resolve())?;
    info!(
        "Loaded {} samples with {} dimensions",
        dataset.len(),
        dataset.dim()
    );
    if dataset.len() < 2 {
        return Err(MKLError::InvalidDataset(
            "Dataset must contain at least 2 samples".to_string(),
        ));
    }

    let config = match &args.config {
        Some(path) => EstimatorConfig::from_file(path)?,
        None => EstimatorConfig::default(),
    };
    let (kernels, kernels_params) = parse_kernels(&args.kernels)?;
    let x = dataset.features();
    let y = dataset.get_labels();

    match args.task {
        Task::Classify => {
            let mut svm = config.svc_params()?;
            if let Some(c) = args.c {
                svm.c = c;
            }
            let mut clf = configure!(
                MKLClassifier::from_config(&config)?.with_svm(svm),
                args,
                kernels,
                kernels_params,
                verbose
            );
            clf.fit(&x, &y)?;
            report(clf.weights(), clf.status());
            println!("Training accuracy: {:.2}%", clf.score(&x, &y)? * 100.0);
            clf.save(&args.output)?;
        }
        Task::Regress => {
            let mut svm = config.svr_params()?;
            if let Some(c) = args.c {
                svm.c = c;
            }
            if let Some(epsilon) = args.svr_epsilon {
                svm.epsilon_insensitive = epsilon;
            }
            let mut reg = configure!(
                MKLRegressor::from_config(&config)?.with_svm(svm),
                args,
                kernels,
                kernels_params,
                verbose
            );
            reg.fit(&x, &y)?;
            report(reg.weights(), reg.status());
            println!("Training R^2: {:.4}", reg.score(&x, &y)?);
            reg.save(&args.output)?;
        }
        Task::OneClass => {
            let mut svm = config.one_class_params()?;
            if let Some(nu) = args.nu {
                svm.nu = nu;
            }
            let mut oc = configure!(
                OneClassMKL::from_config(&config)?.with_svm(svm),
                args,
                kernels,
                kernels_params,
                verbose
            );
            oc.fit(&x)?;
            report(oc.weights(), oc.status());
            let predictions = oc.predict(&x)?;
            let inliers = predictions.iter().filter(|&&p| p > 0.0).count();
            println!(
                "Training inliers: {inliers}/{} ({:.2}%)",
                predictions.len(),
                100.0 * inliers as f64 / predictions.len() as f64
            );
            oc.save(&args.output)?;
        }
    }

    info!("Model saved to: {:?}", args.output);
    Ok(())
}

fn report(weights: Option<&[f64]>, status: Option<ConvergenceStatus>) {
    if let Some(status) = status {
        println!("Status: {status}");
    }
    if let Some(weights) = weights {
        let formatted: Vec<String> = weights.iter().map(|w| format!("{w:.6}")).collect();
        println!("Kernel weights: [{}]", formatted.join(", "));
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SavedModel::load_from_file(&args.model)?;

    info!("Loading prediction data from: {:?}", args.data);
    let dataset = load_dataset(&args.data, args.format.resolve())?;
    let x = dataset.features();

    info!(
        "Making predictions using model with {} support vectors",
        model.metadata.n_support_vectors
    );
    let predictions = model.predict(&x)?;
    let decisions = if args.decision {
        Some(model.decision_function(&x)?)
    } else {
        None
    };

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    writeln!(writer, "# Predictions for {} samples", predictions.len())?;
    writeln!(
        writer,
        "# Format: sample_index prediction{}",
        if args.decision { " decision_values..." } else { "" }
    )?;
    for (i, prediction) in predictions.iter().enumerate() {
        write!(writer, "{i} {prediction}")?;
        if let Some(decisions) = &decisions {
            for value in &decisions[i] {
                write!(writer, " {value:.6}")?;
            }
        }
        writeln!(writer)?;
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        info!("Predictions saved to: {path:?}");
    }
    Ok(())
}

fn evaluate_command(args: EvaluateArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SavedModel::load_from_file(&args.model)?;
    let dataset = load_dataset(&args.data, args.format.resolve())?;
    let x = dataset.features();
    let y = dataset.get_labels();
    let predictions = model.predict(&x)?;

    println!("=== Model Evaluation ===");
    print_summary(&model);
    println!("\nTest Results:");
    println!("  Samples: {}", predictions.len());
    match model.variant {
        Variant::Classification | Variant::OneClass => {
            let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
            println!(
                "  Accuracy: {:.2}%",
                100.0 * correct as f64 / predictions.len() as f64
            );
        }
        Variant::Regression => {
            let n = predictions.len() as f64;
            let mean = y.iter().sum::<f64>() / n;
            let ss_res: f64 = predictions.iter().zip(&y).map(|(p, t)| (t - p).powi(2)).sum();
            let ss_tot: f64 = y.iter().map(|t| (t - mean).powi(2)).sum();
            println!("  MSE: {:.6}", ss_res / n);
            if ss_tot > 0.0 {
                println!("  R^2: {:.4}", 1.0 - ss_res / ss_tot);
            }
        }
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SavedModel::load_from_file(&args.model)?;
    print_summary(&model);

    println!("\nKernels:");
    for (kernel, weight) in model.kernels.iter().zip(&model.weights) {
        let params = serde_json::to_string(&kernel.params)?;
        println!("  {:<8} {params:<32} weight {weight:.6}", kernel.name.as_str());
    }

    if model.variant == Variant::Classification {
        println!("\nClasses: {:?}", model.solution.classes);
    }
    for (m, machine) in model.solution.machines.iter().enumerate() {
        let pair = machine
            .classes
            .map(|(pos, neg)| format!(" ({pos} vs {neg})"))
            .unwrap_or_default();
        println!(
            "  Machine {m}{pair}: {} support vectors, bias {:.6}",
            machine.support.len(),
            machine.bias
        );
    }
    Ok(())
}

fn print_summary(model: &SavedModel) {
    let meta = &model.metadata;
    println!("Model Summary:");
    println!("  Task: {}", model.variant);
    println!("  Library version: {}", meta.library_version);
    println!("  Created: {}", meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Status: {} after {} iterations", meta.status, meta.iterations);
    println!("  Support vectors: {}", meta.n_support_vectors);
    println!("  Features: {}", model.n_features);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernels() {
        let (kernels, params) = parse_kernels(&[]).unwrap();
        assert!(matches!(&kernels, Kernels::List(list) if list.len() == 2));
        assert!(params.is_none());

        let args = vec!["rbf:gamma=0.5".to_string(), "poly:degree=2".to_string()];
        let (_, params) = parse_kernels(&args).unwrap();
        let params = params.unwrap();
        assert_eq!(params[0].0, "rbf:gamma=0.5");
        assert_eq!(params[0].1.gamma, Some(0.5));
        assert_eq!(params[1].1.degree, Some(2));

        assert!(parse_kernels(&["precomputed".to_string()]).is_err());
        assert!(parse_kernels(&["rbf:width=1".to_string()]).is_err());
    }
}
