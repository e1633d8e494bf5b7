use std::error::Error;
use std::path::PathBuf;
use std::process;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use clap::{ArgAction, Parser};

use braille_rl::ml::{Activation, Pooling};
use braille_rl::{
    Algorithm, EnvConfig, KeyboardLayout, LoggerConfig, NetworkParams, RlParams, RunConfig,
    run_experiment,
};

type TrainBackend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(
    about = "Train a braille-reading agent with TD3 or SAC using the Burn framework",
    version,
    author
)]
struct TrainArgs {
    /// Off-policy algorithm to train.
    #[arg(long, value_enum, default_value_t = Algorithm::Td3)]
    algo: Algorithm,
    /// Keyboard layout the agent learns to read.
    #[arg(long, value_enum, default_value_t = KeyboardLayout::Arrows)]
    layout: KeyboardLayout,
    /// Experiment name, defaults to the algorithm name.
    #[arg(long)]
    exp_name: Option<String>,
    /// Root directory for saved models and progress files.
    #[arg(long, default_value = "saved_models")]
    output: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 50)]
    epochs: usize,
    #[arg(long, default_value_t = 1_000)]
    steps_per_epoch: usize,
    #[arg(long, default_value_t = 10_000)]
    replay_size: usize,
    #[arg(long, default_value_t = 0.95)]
    gamma: f32,
    #[arg(long, default_value_t = 0.995)]
    polyak: f32,
    #[arg(long, default_value_t = 1.0e-3)]
    pi_lr: f64,
    #[arg(long, default_value_t = 1.0e-3)]
    q_lr: f64,
    #[arg(long, default_value_t = 64)]
    batch_size: usize,
    /// Steps of uniformly random actions before the policy acts.
    #[arg(long, default_value_t = 1_000)]
    start_steps: usize,
    #[arg(long, default_value_t = 500)]
    update_after: usize,
    #[arg(long, default_value_t = 50)]
    update_every: usize,
    #[arg(long, default_value_t = 25)]
    max_ep_len: usize,
    #[arg(long, default_value_t = 10)]
    num_test_episodes: usize,
    #[arg(long, default_value_t = 1)]
    save_freq: usize,
    /// Do not persist the replay buffer with checkpoints.
    #[arg(long = "no-save-buffer", action = ArgAction::SetTrue)]
    no_save_buffer: bool,
    /// Do not feed the previous action to the networks.
    #[arg(long = "no-prev-action", action = ArgAction::SetTrue)]
    no_prev_action: bool,
    /// TD3 exploration noise, as a fraction of the action scale.
    #[arg(long, default_value_t = 0.1)]
    act_noise: f32,
    #[arg(long, default_value_t = 0.2)]
    target_noise: f32,
    #[arg(long, default_value_t = 0.5)]
    noise_clip: f32,
    #[arg(long, default_value_t = 2)]
    policy_delay: usize,
    /// SAC entropy coefficient (initial value when tuned).
    #[arg(long, default_value_t = 0.2)]
    alpha: f32,
    #[arg(long = "auto-alpha", action = ArgAction::SetTrue)]
    auto_alpha: bool,
    #[arg(long, default_value_t = 1.0e-3)]
    alpha_lr: f32,
    #[arg(long)]
    target_entropy: Option<f32>,
    /// Square tactile image side in pixels.
    #[arg(long, default_value_t = 100)]
    image_size: usize,
    #[arg(long, default_value_t = 0.0)]
    sensor_noise: f32,
    /// Convolution filters per layer, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = vec![8, 16, 32, 32])]
    conv_filters: Vec<usize>,
    /// Dense units per layer, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = vec![512])]
    dense_units: Vec<usize>,
    #[arg(long, default_value_t = 3)]
    kernel_width: usize,
    /// Convolution stride.
    #[arg(long, default_value_t = 1)]
    strides: usize,
    #[arg(long, value_enum, default_value_t = Pooling::Max)]
    pooling: Pooling,
    #[arg(long, default_value_t = 2)]
    pooling_width: usize,
    #[arg(long, default_value_t = 2)]
    pooling_strides: usize,
    #[arg(long, value_enum, default_value_t = Activation::Relu)]
    hidden_activation: Activation,
    /// Activation of the Q network output layer.
    #[arg(long, value_enum, default_value_t = Activation::Linear)]
    output_activation: Activation,
    #[arg(long = "batch-norm", action = ArgAction::SetTrue)]
    batch_norm: bool,
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,
}

fn main() {
    let args = TrainArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: TrainArgs) -> Result<(), Box<dyn Error>> {
    let algo = args.algo;
    let layout = args.layout;
    let config = run_config(args);
    println!(
        "Training {} on the {} layout -> {}",
        algo.name(),
        layout.name(),
        config.logger.output_dir.display()
    );
    let device = Default::default();
    let outcome = run_experiment::<TrainBackend>(algo, config, None, &device)?;
    println!(
        "Finished {} epochs ({} env steps, {} updates)",
        outcome.epoch, outcome.total_steps, outcome.updates
    );
    if let Some(ret) = outcome.value("AverageTestEpRet") {
        println!("  final average test return: {ret:.3}");
    }
    Ok(())
}

fn run_config(args: TrainArgs) -> RunConfig {
    let exp_name = args
        .exp_name
        .clone()
        .unwrap_or_else(|| args.algo.name().to_string());
    let rl = RlParams {
        seed: args.seed,
        epochs: args.epochs,
        steps_per_epoch: args.steps_per_epoch,
        replay_size: args.replay_size,
        gamma: args.gamma,
        polyak: args.polyak,
        pi_lr: args.pi_lr,
        q_lr: args.q_lr,
        batch_size: args.batch_size,
        start_steps: args.start_steps,
        update_after: args.update_after,
        update_every: args.update_every,
        max_ep_len: args.max_ep_len,
        num_test_episodes: args.num_test_episodes,
        save_freq: args.save_freq,
        save_replay_buffer: !args.no_save_buffer,
        use_prev_action: !args.no_prev_action,
        act_noise: args.act_noise,
        target_noise: args.target_noise,
        noise_clip: args.noise_clip,
        policy_delay: args.policy_delay,
        alpha: args.alpha,
        auto_alpha: args.auto_alpha,
        alpha_lr: args.alpha_lr,
        target_entropy: args.target_entropy,
    };
    let network = NetworkParams {
        input_dims: [args.image_size, args.image_size],
        conv_filters: args.conv_filters,
        dense_units: args.dense_units,
        kernel_width: args.kernel_width,
        strides: args.strides,
        pooling: args.pooling,
        pooling_width: args.pooling_width,
        pooling_strides: args.pooling_strides,
        hidden_activation: args.hidden_activation,
        output_activation: args.output_activation,
        batch_norm: args.batch_norm,
        dropout: args.dropout,
    };
    let env = EnvConfig {
        layout: args.layout,
        image_size: [args.image_size, args.image_size],
        sensor_noise: args.sensor_noise,
        seed: args.seed,
        ..EnvConfig::default()
    };
    RunConfig {
        rl,
        network,
        env,
        logger: LoggerConfig::new(&args.output, &exp_name, args.seed),
    }
}
