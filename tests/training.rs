use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;

use braille_rl::checkpoint::load_checkpoint;
use braille_rl::logger::RESUMED_PROGRESS_FILE;
use braille_rl::{
    Algorithm, EnvConfig, KeyboardLayout, LoggerConfig, NetworkParams, ProgressTable,
    ResumeParams, RlParams, RunConfig, load_model, run_experiment,
};

type Backend = Autodiff<NdArray<f32>>;

fn config(dir: &std::path::Path, exp_name: &str) -> RunConfig {
    RunConfig {
        rl: RlParams {
            seed: 1,
            epochs: 1,
            steps_per_epoch: 30,
            replay_size: 200,
            batch_size: 8,
            start_steps: 10,
            update_after: 10,
            update_every: 10,
            max_ep_len: 10,
            num_test_episodes: 1,
            auto_alpha: true,
            ..RlParams::default()
        },
        network: NetworkParams {
            input_dims: [8, 8],
            conv_filters: vec![2],
            dense_units: vec![16],
            pooling_strides: 1,
            ..NetworkParams::default()
        },
        env: EnvConfig {
            layout: KeyboardLayout::Arrows,
            image_size: [8, 8],
            ..EnvConfig::default()
        },
        logger: LoggerConfig::new(dir, exp_name, 1),
    }
}

#[test]
fn sac_run_can_be_resumed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let device = Default::default();
    let first = run_experiment::<Backend>(Algorithm::Sac, config(dir.path(), "sac"), None, &device)
        .expect("train");
    assert_eq!(first.epoch, 1);
    assert_eq!(first.total_steps, 30);
    assert!(first.value("AverageAlpha").is_some());

    let saved = load_model(&first.output_dir).expect("load");
    assert_eq!(saved.checkpoint.metadata.algorithm, Algorithm::Sac);
    assert_eq!(saved.checkpoint.resume.total_steps, 30);
    assert!(saved.checkpoint.resume.log_alpha.is_some());
    assert_eq!(saved.replay_buffer.as_ref().map(|b| b.len()), Some(30));

    let mut resumed_config = config(dir.path(), "sac");
    resumed_config.logger = resumed_config
        .logger
        .with_output_fname(RESUMED_PROGRESS_FILE);
    let second = run_experiment::<Backend>(
        Algorithm::Sac,
        resumed_config,
        Some(ResumeParams {
            saved,
            additional_epochs: 1,
        }),
        &device,
    )
    .expect("resume");
    assert_eq!(second.epoch, 2);
    assert_eq!(second.total_steps, 60);
    assert_eq!(second.value("Epoch"), Some(2.0));
    assert_eq!(second.value("TotalEnvInteracts"), Some(60.0));

    let original = ProgressTable::read(first.output_dir.join("progress.txt")).expect("progress");
    let resumed =
        ProgressTable::read(first.output_dir.join(RESUMED_PROGRESS_FILE)).expect("resumed");
    assert_eq!(original.column("Epoch"), Some(vec![1.0]));
    assert_eq!(resumed.column("Epoch"), Some(vec![2.0]));

    let checkpoint = load_checkpoint(&first.output_dir).expect("checkpoint");
    assert_eq!(checkpoint.resume.epoch, 2);
    assert_eq!(checkpoint.resume.progress_file, RESUMED_PROGRESS_FILE);
    assert!(checkpoint.resume.updates > 0);
}

#[test]
fn td3_checkpoint_cannot_resume_as_sac() {
    let dir = tempfile::tempdir().expect("tempdir");
    let device = Default::default();
    let mut td3_config = config(dir.path(), "td3");
    td3_config.rl.save_replay_buffer = false;
    let outcome = run_experiment::<Backend>(Algorithm::Td3, td3_config.clone(), None, &device)
        .expect("train");
    let saved = load_model(&outcome.output_dir).expect("load");
    assert!(saved.replay_buffer.is_none());
    assert!(saved.checkpoint.agent.target_actor.is_some());

    let result = run_experiment::<Backend>(
        Algorithm::Sac,
        td3_config,
        Some(ResumeParams {
            saved,
            additional_epochs: 1,
        }),
        &device,
    );
    assert!(result.is_err());
}
