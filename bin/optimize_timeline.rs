use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use graph_slam::core::variable::POSE_DIM;
use graph_slam::error::GraphSlamError;
use graph_slam::io::{SnapshotWriter, load_timeline};
use graph_slam::linalg::LinearSolverType;
use graph_slam::optimizer::{GraphOptimizer, LevenbergMarquardtConfig};
use graph_slam::{BuilderConfig, init_logger_with_level};
use tracing::{Level, info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SolverArg {
    /// Dense LU on the reduced pose system
    Lu,
    /// Sparse Cholesky (faer) on the reduced pose system
    Cholesky,
}

impl From<SolverArg> for LinearSolverType {
    fn from(arg: SolverArg) -> Self {
        match arg {
            SolverArg::Lu => LinearSolverType::DenseLu,
            SolverArg::Cholesky => LinearSolverType::SparseCholesky,
        }
    }
}

#[derive(Parser)]
#[command(name = "optimize_timeline")]
#[command(about = "Build a graph SLAM problem from a JSON event timeline and optimize it")]
struct Args {
    /// Timeline file (.json)
    timeline: PathBuf,

    /// Maximum number of outer Levenberg-Marquardt iterations
    #[arg(short, long, default_value = "1000")]
    max_steps: usize,

    /// Offset added to the x of every initial pose before optimizing
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    perturb_x: f64,

    /// Offset added to the y of every initial pose before optimizing
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    perturb_y: f64,

    /// Linear solver for the reduced pose system
    #[arg(long, value_enum, default_value = "lu")]
    linear_solver: SolverArg,

    /// Optional path to save the optimized snapshot (e.g., output/snapshot.json)
    #[arg(long)]
    save_output: Option<PathBuf>,

    /// Print the per-iteration table
    #[arg(short, long)]
    verbose: bool,
}

fn perturb(optimizer: &mut GraphOptimizer, dx: f64, dy: f64) -> Result<(), GraphSlamError> {
    let mut params = optimizer.all_params();
    for step in 0..optimizer.variables().num_poses() {
        params[POSE_DIM * step] += dx;
        params[POSE_DIM * step + 1] += dy;
    }
    optimizer.set_all_params(&params)?;
    Ok(())
}

fn run(args: &Args) -> Result<bool, GraphSlamError> {
    let timeline = load_timeline(&args.timeline)?;
    let config = LevenbergMarquardtConfig::new().with_linear_solver_type(args.linear_solver.into());
    let mut optimizer = GraphOptimizer::with_config(&timeline, &BuilderConfig::default(), config)?;

    if args.perturb_x != 0.0 || args.perturb_y != 0.0 {
        info!(
            "perturbing initial poses by ({}, {})",
            args.perturb_x, args.perturb_y
        );
        perturb(&mut optimizer, args.perturb_x, args.perturb_y)?;
    }

    let summary = optimizer.optimize_with_summary(args.max_steps);
    info!("{}", summary);

    if let Some(path) = &args.save_output {
        SnapshotWriter::write(&optimizer.snapshot(), path)?;
    }
    Ok(summary.status.is_converged())
}

fn main() {
    let args = Args::parse();
    init_logger_with_level(if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    });

    match run(&args) {
        Ok(true) => {}
        Ok(false) => {
            warn!("optimization did not converge");
            std::process::exit(1);
        }
        Err(e) => {
            warn!("optimization failed: {}", e.chain_compact());
            std::process::exit(2);
        }
    }
}
