use std::error::Error;
use std::path::PathBuf;
use std::process;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use clap::{ArgAction, Parser};
use rand::SeedableRng;
use rand::rngs::StdRng;

use braille_rl::{
    Algorithm, EnvBuilder, Environment, OffPolicyAgent, SacAgent, SimBrailleEnv, Td3Agent,
    load_model, render_keyboard, render_tactile,
};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(about = "Run deterministic episodes with a saved policy", version, author)]
struct EvaluateArgs {
    /// Experiment directory holding `checkpoint.bin`.
    model_dir: PathBuf,
    #[arg(long, default_value_t = 10)]
    episodes: usize,
    /// Environment seed, defaults to the training seed plus one.
    #[arg(long)]
    seed: Option<u64>,
    /// Step limit per episode, defaults to the training horizon.
    #[arg(long)]
    max_ep_len: Option<usize>,
    /// Print the keyboard state and tactile image after every step.
    #[arg(long, action = ArgAction::SetTrue)]
    render: bool,
}

struct EpisodeSummary {
    ret: f32,
    len: usize,
    success: bool,
}

fn main() {
    let args = EvaluateArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: EvaluateArgs) -> Result<(), Box<dyn Error>> {
    let saved = load_model(&args.model_dir)?;
    let checkpoint = saved.checkpoint;
    let seed = args
        .seed
        .unwrap_or_else(|| checkpoint.metadata.seed.wrapping_add(1));
    let env = EnvBuilder::from_config(checkpoint.env_config.clone())
        .with_seed(seed)
        .build()?;
    let spec = env.spec();
    let max_ep_len = args.max_ep_len.unwrap_or(checkpoint.rl_params.max_ep_len);
    let device = Default::default();

    let summaries = match checkpoint.metadata.algorithm {
        Algorithm::Td3 => {
            let mut agent = Td3Agent::<Backend>::new(
                &checkpoint.rl_params,
                &checkpoint.network_params,
                spec,
                &device,
            )?;
            agent.load_state(checkpoint.agent)?;
            evaluate(&agent, env, &args, max_ep_len)?
        }
        Algorithm::Sac => {
            let mut agent = SacAgent::<Backend>::new(
                &checkpoint.rl_params,
                &checkpoint.network_params,
                spec,
                &device,
            )?;
            agent.load_state(checkpoint.agent)?;
            evaluate(&agent, env, &args, max_ep_len)?
        }
    };

    let episodes = summaries.len().max(1) as f32;
    let successes = summaries.iter().filter(|s| s.success).count();
    let mean_ret = summaries.iter().map(|s| s.ret).sum::<f32>() / episodes;
    let mean_len = summaries.iter().map(|s| s.len as f32).sum::<f32>() / episodes;
    println!(
        "{} episodes: success {}/{} ({:.1}%), mean return {mean_ret:.3}, mean length {mean_len:.1}",
        summaries.len(),
        successes,
        summaries.len(),
        100.0 * successes as f32 / episodes
    );
    Ok(())
}

fn evaluate<A: OffPolicyAgent>(
    agent: &A,
    mut env: SimBrailleEnv,
    args: &EvaluateArgs,
    max_ep_len: usize,
) -> Result<Vec<EpisodeSummary>, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(0);
    let dims = env.spec().image_dims;
    let mut summaries = Vec::with_capacity(args.episodes);
    for episode in 0..args.episodes {
        let mut observation = env.reset();
        let mut summary = EpisodeSummary {
            ret: 0.0,
            len: 0,
            success: false,
        };
        if args.render {
            println!("Episode {}", episode + 1);
            print!("{}", render_keyboard(env.keyboard(), env.position(), env.goal()));
            print!("{}", render_tactile(&observation.tactile, dims));
        }
        while summary.len < max_ep_len {
            let action = agent.act(&observation, true, &mut rng);
            let step = env.step(&action)?;
            summary.ret += step.reward;
            summary.len += 1;
            observation = step.observation;
            if args.render {
                println!(
                    "  step {:>3}: action ({:+.3}, {:+.3}) reward {:+.3}",
                    summary.len, action[0], action[1], step.reward
                );
                print!("{}", render_keyboard(env.keyboard(), env.position(), env.goal()));
                print!("{}", render_tactile(&observation.tactile, dims));
            }
            if step.done {
                summary.success = true;
                break;
            }
        }
        println!(
            "Episode {:>3}: return {:+.3}, length {:>3}, {}",
            episode + 1,
            summary.ret,
            summary.len,
            if summary.success { "reached goal" } else { "timed out" }
        );
        summaries.push(summary);
    }
    Ok(summaries)
}
