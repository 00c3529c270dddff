//! Core functionality: the learned Hamiltonian and its training wrapper

mod hamiltonian;
mod hnn_model;
mod model_config;
pub mod training;

pub use hamiltonian::{
    evaluate_energy, symplectic_gradient_of, EnergyFunction, HamiltonianModule, Mode,
};
pub use hnn_model::{HNNModel, ModelCheckpoint};
pub use model_config::HnnConfig;
pub use training::{
    fit, DataLoader, Dataset, TrainableModel, TrainingConfig, TrainingMetrics,
};
