//! Reference Hamiltonian systems, numerical integration and synthetic data.
//!
//! These provide ground truth for training and checking a learned
//! Hamiltonian: exact energies and derivatives, RK4 trajectories and
//! `(z, dz/dt)` datasets.

mod datasets;
mod integrate;
mod systems;

pub use datasets::{sample_dataset, trajectory_dataset};
pub use integrate::{integrate, max_energy_drift, rk4_step, simulate};
pub use systems::{HamiltonianSystem, Pendulum, Spring};
