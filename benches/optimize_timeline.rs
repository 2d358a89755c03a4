//! Optimization of simulated loop trajectories with landmarks.
//!
//! A robot drives laps of a circle through a ring of landmarks. Commands and landmark
//! measurements are corrupted with seeded uniform noise, so every run optimizes the same
//! problem. Each configuration is benchmarked from construction to convergence, once per
//! linear solver back end.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graph_slam::core::event::{Event, Timeline};
use graph_slam::factors::arc_motion;
use graph_slam::linalg::LinearSolverType;
use graph_slam::manifold::Transform2D;
use graph_slam::optimizer::{GraphOptimizer, LevenbergMarquardtConfig};
use graph_slam::BuilderConfig;
use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHA: [f64; 6] = [0.05, 0.01, 0.01, 0.05, 0.01, 0.01];
const Q: [f64; 4] = [0.05, 0.0, 0.0, 0.05];
const SENSOR_RANGE: f64 = 6.0;

fn simulate(steps: usize, num_landmarks: usize, seed: u64) -> Timeline {
    let mut rng = StdRng::seed_from_u64(seed);
    let landmarks: Vec<Vector2<f64>> = (0..num_landmarks)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / num_landmarks as f64;
            Vector2::new(8.0 * angle.cos(), 8.0 * angle.sin() + 5.0)
        })
        .collect();

    let command = Vector2::new(1.0, 0.2);
    let mut pose = Transform2D::identity();
    let mut frames = Vec::with_capacity(steps);
    for step in 0..steps {
        let mut frame = Vec::new();
        if step == 0 {
            frame.push(Event::init(0.0, 0.0, 0.0));
        } else {
            pose = pose * arc_motion(&command, 1.0);
            frame.push(Event::control(
                command.x + rng.random_range(-0.05..0.05),
                command.y + rng.random_range(-0.01..0.01),
                ALPHA,
            ));
        }

        let inverse = pose.inverse();
        for (id, landmark) in landmarks.iter().enumerate() {
            let local = inverse.transform(landmark);
            if local.norm() > SENSOR_RANGE {
                continue;
            }
            let noisy = [
                local.x + rng.random_range(-0.1..0.1),
                local.y + rng.random_range(-0.1..0.1),
            ];
            frame.push(Event::point(id as u64, noisy, Q));
        }
        frames.push(frame);
    }
    Timeline::new(frames)
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_timeline");
    group.sample_size(10);

    for &(steps, landmarks) in &[(50, 12), (200, 24)] {
        let timeline = simulate(steps, landmarks, 42);
        for solver in [LinearSolverType::DenseLu, LinearSolverType::SparseCholesky] {
            let config = LevenbergMarquardtConfig::new().with_linear_solver_type(solver);
            group.bench_with_input(
                BenchmarkId::new(solver.to_string(), format!("{steps}x{landmarks}")),
                &timeline,
                |b, timeline| {
                    b.iter(|| {
                        let mut optimizer = GraphOptimizer::with_config(
                            timeline,
                            &BuilderConfig::default(),
                            config.clone(),
                        )
                        .expect("simulated timeline is valid");
                        black_box(optimizer.optimize(200));
                        black_box(optimizer.poses().last().copied().unwrap_or_else(Vector3::zeros))
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
