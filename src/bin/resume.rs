use std::error::Error;
use std::path::PathBuf;
use std::process;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use clap::Parser;

use braille_rl::logger::RESUMED_PROGRESS_FILE;
use braille_rl::{ResumeParams, RunConfig, load_model, run_experiment};

type TrainBackend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(about = "Resume training from a saved model directory", version, author)]
struct ResumeArgs {
    /// Experiment directory holding `checkpoint.bin`.
    model_dir: PathBuf,
    /// Epochs to train on top of the saved run.
    #[arg(long, default_value_t = 10)]
    additional_epochs: usize,
    /// Progress file for the resumed run. Change it when resuming more than
    /// once so earlier logs are kept.
    #[arg(long, default_value = RESUMED_PROGRESS_FILE)]
    progress_file: String,
}

fn main() {
    let args = ResumeArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: ResumeArgs) -> Result<(), Box<dyn Error>> {
    if args.additional_epochs == 0 {
        return Err("additional epochs must be positive".into());
    }
    let saved = load_model(&args.model_dir)?;
    let checkpoint = &saved.checkpoint;
    if checkpoint.resume.progress_file == args.progress_file {
        return Err(format!(
            "the saved run already writes to {}, pick another --progress-file",
            args.progress_file
        )
        .into());
    }
    let algorithm = checkpoint.metadata.algorithm;
    let mut logger = checkpoint
        .logger_config
        .clone()
        .with_output_fname(args.progress_file.clone());
    // The directory may have been moved since it was saved.
    logger.output_dir = args.model_dir.clone();
    let config = RunConfig {
        rl: checkpoint.rl_params.clone(),
        network: checkpoint.network_params.clone(),
        env: checkpoint.env_config.clone(),
        logger,
    };

    println!();
    println!("Resuming Training");
    println!();
    println!("{:#?}", checkpoint.resume);

    let device = Default::default();
    let outcome = run_experiment::<TrainBackend>(
        algorithm,
        config,
        Some(ResumeParams {
            saved,
            additional_epochs: args.additional_epochs,
        }),
        &device,
    )?;
    println!(
        "Resumed run finished at epoch {} ({} env steps)",
        outcome.epoch, outcome.total_steps
    );
    Ok(())
}
