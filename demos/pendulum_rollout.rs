use hamiltonian_nn::dynamics::{max_energy_drift, trajectory_dataset, HamiltonianSystem, Pendulum};
use hamiltonian_nn::prelude::*;
use ndarray::arr1;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pendulum = Pendulum::default();

    // A few swings at different amplitudes
    let mut model = HNNModel::new(HnnConfig::for_pendulum())?.with_training_config(
        TrainingConfig {
            log_every: 25,
            checkpoint_every: Some(50),
            checkpoint_dir: std::env::temp_dir().join("hnn_pendulum"),
            ..TrainingConfig::default()
        },
    );
    for (i, amplitude) in [0.5, 1.0, 1.5, 2.0].into_iter().enumerate() {
        let z0 = arr1(&[amplitude, 0.0]);
        let data = trajectory_dataset(&pendulum, z0.view(), 0.05, 120, 0.02, Some(i as u64))?;
        model.fit(&data, 50)?;
    }

    let z0 = arr1(&[1.2, 0.0]);
    let path = model.rollout(z0.view(), 0.05, 400)?;
    println!(
        "start energy {:.4}, end energy {:.4}, max drift {:.4}",
        pendulum.energy(z0.view()),
        pendulum.energy(path.row(path.nrows() - 1)),
        max_energy_drift(&pendulum, &path)
    );

    let checkpoint = std::env::temp_dir().join("hnn_pendulum").join("final.json");
    model.save_checkpoint(&checkpoint)?;
    let mut restored = HNNModel::load_checkpoint(&checkpoint)?;
    let probe = ndarray::arr2(&[[0.0, 0.0], [1.0, 0.0]]);
    println!("restored energies: {:?}", restored.predict_hamiltonian(probe.view())?);

    Ok(())
}
