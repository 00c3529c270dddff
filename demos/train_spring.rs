use hamiltonian_nn::dynamics::{
    max_energy_drift, sample_dataset, simulate, HamiltonianSystem, Spring,
};
use hamiltonian_nn::prelude::*;
use hamiltonian_nn::utils::timing::Timer;
use ndarray::arr1;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Noisy samples of a unit mass-spring system
    let spring = Spring::new(1.0, 1.0);
    let data = sample_dataset(&spring, 500, (0.2, 1.0), 0.05, Some(0))?;

    let mut config = HnnConfig::for_spring();
    config.d_hidden = vec![64, 64];
    let mut model = HNNModel::new(config)?.with_training_config(TrainingConfig {
        early_stopping_patience: Some(20),
        ..TrainingConfig::default()
    });

    let metrics = {
        let _timer = Timer::new("training");
        model.fit(&data, 100)?
    };
    println!("{}", metrics.summary());

    // Learned energy should be (up to a constant) proportional to the true one
    let probe = ndarray::arr2(&[[0.0, 0.0], [0.5, 0.0], [0.0, 0.5], [1.0, 0.0]]);
    let learned = model.predict_hamiltonian(probe.view())?;
    for (z, h) in probe.rows().into_iter().zip(learned.iter()) {
        println!(
            "z = {:?}  learned H - H(0) = {:+.4}  true H = {:.4}",
            z.to_vec(),
            h - learned[0],
            spring.energy(z)
        );
    }

    let z0 = arr1(&[1.0, 0.0]);
    let learned_path = model.rollout(z0.view(), 0.1, 200)?;
    let true_path = simulate(&spring, z0.view(), 0.1, 200)?;
    println!(
        "energy drift over 200 steps: learned {:.4}, exact {:.2e}",
        max_energy_drift(&spring, &learned_path),
        max_energy_drift(&spring, &true_path)
    );

    Ok(())
}
