//! burn-shortcut CLI
//!
//! Debugging surface for the target builders: print the step-size schedule
//! a batch would get, or build one target batch against the zero-velocity
//! stand-in and summarize its composition.

use std::collections::BTreeMap;

use anyhow::Result;
use burn::prelude::*;
use burn::tensor::Distribution;
use clap::{Parser, Subcommand};

use burn_shortcut_core::backends::{default_device, DefaultBackend};
use burn_shortcut_core::model::ZeroVelocity;
use burn_shortcut_targets::{
    build_bootstrap_targets, build_naive_targets, StepSchedule, TargetBatch, TargetConfig,
};

#[derive(Parser)]
#[command(name = "burn-shortcut")]
#[command(about = "Inspect shortcut-model training targets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the step-size schedule for a bootstrap sub-batch
    Schedule {
        /// Training batch size
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// One self-distillation sample per this many batch samples
        #[arg(long, default_value = "8")]
        bootstrap_every: usize,

        /// Fine-grid resolution (must be a power of two)
        #[arg(long, default_value = "128")]
        denoise_timesteps: usize,

        /// Pin every step-size exponent (-1 = off)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        force_dt: i64,
    },

    /// Build one target batch against the zero-velocity stand-in
    Targets {
        /// Training batch size
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Image channels
        #[arg(long, default_value = "3")]
        channels: usize,

        /// Image height
        #[arg(long, default_value = "32")]
        height: usize,

        /// Image width
        #[arg(long, default_value = "32")]
        width: usize,

        /// Backend RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// One self-distillation sample per this many batch samples
        #[arg(long, default_value = "8")]
        bootstrap_every: usize,

        /// Fine-grid resolution (must be a power of two)
        #[arg(long, default_value = "128")]
        denoise_timesteps: usize,

        /// Classifier-free-guidance label dropout probability
        #[arg(long, default_value = "1.0")]
        class_dropout_prob: f64,

        /// Number of real classes
        #[arg(long, default_value = "1")]
        num_classes: usize,

        /// Skip the self-distillation sub-batch entirely
        #[arg(long)]
        naive: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Schedule {
            batch_size,
            bootstrap_every,
            denoise_timesteps,
            force_dt,
        } => run_schedule(batch_size, bootstrap_every, denoise_timesteps, force_dt),
        Commands::Targets {
            batch_size,
            channels,
            height,
            width,
            seed,
            bootstrap_every,
            denoise_timesteps,
            class_dropout_prob,
            num_classes,
            naive,
        } => {
            let config = TargetConfig::new()
                .with_bootstrap_every(bootstrap_every)
                .with_denoise_timesteps(denoise_timesteps)
                .with_class_dropout_prob(class_dropout_prob)
                .with_num_classes(num_classes);
            run_targets(batch_size, channels, height, width, seed, config, naive)
        }
    }
}

fn run_schedule(
    batch_size: usize,
    bootstrap_every: usize,
    denoise_timesteps: usize,
    force_dt: i64,
) -> Result<()> {
    let config = TargetConfig::new()
        .with_bootstrap_every(bootstrap_every)
        .with_denoise_timesteps(denoise_timesteps)
        .with_force_dt(force_dt);
    config.validate()?;

    let bootstrap_size = batch_size / config.bootstrap_every;
    let schedule = StepSchedule::new(bootstrap_size, config.log2_sections(), config.force_dt);

    println!(
        "batch size {batch_size}: {bootstrap_size} self-distillation samples, {} flow-matching",
        batch_size - bootstrap_size
    );
    let dt = schedule.dt();
    let half_dt = schedule.half_dt();
    println!("{:>5} {:>9} {:>11} {:>11} {:>6}", "slot", "exponent", "dt", "dt/2", "grid");
    for (i, &e) in schedule.exponents().iter().enumerate() {
        println!(
            "{:>5} {:>9} {:>11.7} {:>11.7} {:>6}",
            i,
            e,
            dt[i],
            half_dt[i],
            1u64 << e
        );
    }
    Ok(())
}

fn run_targets(
    batch_size: usize,
    channels: usize,
    height: usize,
    width: usize,
    seed: Option<u64>,
    config: TargetConfig,
    naive: bool,
) -> Result<()> {
    if let Some(seed) = seed {
        DefaultBackend::seed(seed);
    }
    let device = default_device();

    let images: Tensor<DefaultBackend, 4> = Tensor::random(
        [batch_size, channels, height, width],
        Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let labels = random_labels(batch_size, config.num_classes, &device);

    let batch = if naive {
        build_naive_targets(images, labels, &config, &device)?
    } else {
        let model = ZeroVelocity::new(device.clone());
        build_bootstrap_targets(images, labels, &model, &config)?
    };

    summarize(&batch);
    Ok(())
}

fn random_labels(
    batch_size: usize,
    num_classes: usize,
    device: &<DefaultBackend as Backend>::Device,
) -> Tensor<DefaultBackend, 1, Int> {
    let classes = num_classes.max(1) as f64;
    Tensor::<DefaultBackend, 1>::random(
        [batch_size],
        Distribution::Uniform(0.0, classes),
        device,
    )
    .int()
}

fn summarize(batch: &TargetBatch<DefaultBackend>) {
    println!("samples: {}", batch.len());

    let (t_min, t_max) = min_max1(batch.t.clone());
    println!("t:   [{t_min:.4}, {t_max:.4}]");

    let (x_min, x_max) = min_max4(batch.x_t.clone());
    println!("x_t: [{x_min:.4}, {x_max:.4}]");

    let (v_min, v_max) = min_max4(batch.v_t.clone());
    println!("v_t: [{v_min:.4}, {v_max:.4}]");

    let exponents = batch
        .dt_base
        .clone()
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap();
    let mut counts = BTreeMap::new();
    for e in exponents {
        *counts.entry(e).or_insert(0usize) += 1;
    }
    println!("dt_base composition:");
    for (e, n) in counts {
        println!("  dt = 1/2^{e}: {n} samples");
    }
}

fn min_max1(t: Tensor<DefaultBackend, 1>) -> (f32, f32) {
    (scalar(t.clone().min()), scalar(t.max()))
}

fn min_max4(t: Tensor<DefaultBackend, 4>) -> (f32, f32) {
    (scalar(t.clone().min()), scalar(t.max()))
}

fn scalar(t: Tensor<DefaultBackend, 1>) -> f32 {
    t.into_data().convert::<f32>().to_vec::<f32>().unwrap()[0]
}
