use braille_rl::{EnvBuilder, EnvConfig, Environment, KeyboardLayout};

#[test]
fn same_seed_gives_same_trajectory() {
    let build = || {
        EnvBuilder::new(KeyboardLayout::Alphabet)
            .with_image_size(12, 12)
            .with_sensor_noise(0.05)
            .with_seed(42)
            .build()
            .expect("env")
    };
    let mut a = build();
    let mut b = build();
    assert_eq!(a.reset(), b.reset());
    for _ in 0..10 {
        let action_a = a.sample_action();
        let action_b = b.sample_action();
        assert_eq!(action_a, action_b);
        let step_a = a.step(&action_a).expect("step");
        let step_b = b.step(&action_b).expect("step");
        assert_eq!(step_a.observation, step_b.observation);
        if step_a.done {
            a.reset();
            b.reset();
        }
    }
}

#[test]
fn alphabet_goal_is_one_hot_over_letters() {
    let mut env = EnvBuilder::new(KeyboardLayout::Alphabet)
        .with_image_size(10, 10)
        .build()
        .expect("env");
    let spec = env.spec();
    assert_eq!(spec.goal_dim, 26);
    let obs = env.reset();
    assert_eq!(obs.goal.iter().filter(|v| **v == 1.0).count(), 1);
    assert!(obs.tactile.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn random_walk_eventually_reaches_goal() {
    let mut env = EnvBuilder::new(KeyboardLayout::Arrows)
        .with_image_size(8, 8)
        .with_seed(3)
        .build()
        .expect("env");
    env.reset();
    let mut total_reward = 0.0;
    let mut reached = false;
    for _ in 0..2_000 {
        let action = env.sample_action();
        let step = env.step(&action).expect("step");
        total_reward += step.reward;
        if step.done {
            reached = true;
            break;
        }
    }
    assert!(reached);
    assert!(total_reward <= EnvConfig::default().success_reward);
}

#[test]
fn invalid_config_is_rejected() {
    let config = EnvConfig {
        image_size: [0, 10],
        ..EnvConfig::default()
    };
    assert!(EnvBuilder::from_config(config).build().is_err());
}
