#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::{Autodiff, NdArray};
use burn::nn::{Linear, LinearConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams};
use burn::prelude::*;
use burn::tensor::{ElementConversion, TensorData};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use trainkit::checkpoint::RecordValue;
use trainkit::config::TrainerConfig;
use trainkit::numeric::params_count;
use trainkit::optim::TrackedOptimizer;
use trainkit::scheduler::{LrScheduler, StepLr};
use trainkit::training::{Components, Experiment, RunContext, RunOptions, RunOutcome, Trainer};

type TrainBackend = Autodiff<NdArray<f32>>;
type Optim = TrackedOptimizer<
    OptimizerAdaptor<Adam, Linear<TrainBackend>, TrainBackend>,
    Linear<TrainBackend>,
    TrainBackend,
>;
type Sample = ([f32; 2], f32);

const LOG_EVERY: usize = 10;

/// Fit a noisy linear target with the trainkit epoch loop.
#[derive(Parser)]
#[command(name = "train", about = "Run a checkpointed regression experiment")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "trainkit.toml")]
    config: PathBuf,

    /// Restore the best checkpoint after the last epoch
    #[arg(long)]
    load_best: bool,

    /// Ignore the latest checkpoint and start from scratch
    #[arg(long)]
    retrain: bool,

    /// Keep the log file attached after the run
    #[arg(long)]
    keep_logger: bool,

    /// Override number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of synthetic training samples
    #[arg(long, default_value_t = 512)]
    samples: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 1e-2)]
    lr: f64,
}

struct Regression {
    device: <TrainBackend as Backend>::Device,
    model: Linear<TrainBackend>,
    optim: Optim,
    scheduler: StepLr,
}

impl Regression {
    fn new(lr: f64) -> Self {
        let device: <TrainBackend as Backend>::Device = Default::default();
        Regression {
            model: LinearConfig::new(2, 1).init(&device),
            optim: TrackedOptimizer::new(AdamConfig::new().init(), device),
            scheduler: StepLr::new(lr, 0.5, 5),
            device,
        }
    }

    fn tensors(&self, batch: &[Sample]) -> (Tensor<TrainBackend, 2>, Tensor<TrainBackend, 2>) {
        let n = batch.len();
        let inputs: Vec<f32> = batch.iter().flat_map(|(x, _)| *x).collect();
        let targets: Vec<f32> = batch.iter().map(|(_, y)| *y).collect();
        (
            Tensor::from_data(TensorData::new(inputs, [n, 2]), &self.device),
            Tensor::from_data(TensorData::new(targets, [n, 1]), &self.device),
        )
    }

    fn mse(&self, batch: &[Sample]) -> Tensor<TrainBackend, 1> {
        let (x, y) = self.tensors(batch);
        (self.model.forward(x) - y).powf_scalar(2.0).mean()
    }
}

impl Experiment for Regression {
    type Backend = TrainBackend;
    type Item = Sample;

    fn components(&mut self) -> Components<'_> {
        Components::new()
            .model("regressor", &mut self.model)
            .optimizer("adam", &mut self.optim)
            .scheduler("step_lr", &mut self.scheduler)
    }

    fn train(&mut self, ctx: &mut RunContext<Sample>, epoch: usize) -> Result<f64> {
        let lr = self.scheduler.learning_rate();
        let batches = ctx.batches("train").context("train loader not prepared")?;

        let mut total = 0.0;
        let mut count = 0usize;
        for (step, batch) in batches.enumerate() {
            let loss = self.mse(&batch);
            let value: f64 = loss.clone().into_scalar().elem();
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optim.step(lr, self.model.clone(), grads);

            total += value;
            count += 1;
            if step % LOG_EVERY == 0 {
                ctx.logs.insert("loss".to_string(), value.into());
                ctx.logs.insert("lr".to_string(), lr.into());
                ctx.print_logs(epoch, step);
            }
        }

        let mean = total / count.max(1) as f64;
        ctx.records.insert("train_loss".to_string(), mean.into());
        Ok(mean)
    }

    fn evaluate(&mut self, ctx: &mut RunContext<Sample>, epoch: usize) -> Result<bool> {
        let batches = ctx.batches("test").context("test loader not prepared")?;
        let mut total = 0.0;
        let mut count = 0usize;
        for batch in batches {
            let value: f64 = self.mse(&batch).into_scalar().elem();
            total += value * batch.len() as f64;
            count += batch.len();
        }
        let loss = total / count.max(1) as f64;

        let best = match ctx.records.get("best_loss") {
            Some(RecordValue::Number(best)) => *best,
            _ => f64::INFINITY,
        };
        let is_best = loss < best;
        if is_best {
            ctx.records.insert("best_loss".to_string(), loss.into());
            ctx.records.insert("best_epoch".to_string(), (epoch as f64).into());
        }
        ctx.logs.clear();
        ctx.logs.insert("test_loss".to_string(), loss.into());
        ctx.logs.insert("best".to_string(), is_best.to_string().into());
        ctx.print_logs(epoch, 0);
        Ok(is_best)
    }

    fn scheduler_step(&mut self, _ctx: &mut RunContext<Sample>) {
        self.scheduler.step();
    }
}

/// `y = 3 x0 - 2 x1 + 0.5` plus Gaussian noise.
fn synthetic(n: usize, rng: &mut StdRng) -> Vec<Sample> {
    (0..n)
        .map(|_| {
            let x = [rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)];
            let noise: f32 = rng.sample(StandardNormal);
            (x, 3.0 * x[0] - 2.0 * x[1] + 0.5 + 0.1 * noise)
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TrainerConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let train_set = synthetic(cli.samples, &mut rng);
    let test_set = synthetic(cli.samples / 4, &mut rng);

    let experiment = Regression::new(cli.lr);
    println!("Parameters: {}", params_count(&experiment.model));

    let mut trainer = Trainer::new(config, experiment)?;
    trainer.add_train_set("train", train_set);
    trainer.add_eval_set("test", test_set);
    trainer.prepare_loaders();

    let options = RunOptions {
        load_best: cli.load_best,
        retrain: cli.retrain,
        detach_logger: !cli.keep_logger,
    };
    match trainer.run(options) {
        RunOutcome::Completed { epoch, best_epoch } => {
            println!("Finished at epoch {epoch}");
            if let Some(best) = best_epoch {
                println!("Restored best checkpoint (epoch {best})");
            }
            Ok(())
        }
        RunOutcome::Failed { epoch, error } => {
            Err(anyhow::Error::from(error).context(format!("training failed at epoch {epoch}")))
        }
    }
}
