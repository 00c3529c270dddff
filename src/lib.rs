//! # hamiltonian-nn: Hamiltonian Neural Networks
//!
//! A Hamiltonian Neural Network learns a scalar energy `H(q, p)` over
//! phase-space coordinates and derives the dynamics from it with Hamilton's
//! equations, `dq/dt = ∂H/∂p` and `dp/dt = -∂H/∂q`. The gradient is taken by
//! automatic differentiation with the graph retained, so the derived vector
//! field can itself be trained against observed time derivatives.
//!
//! ## Features
//!
//! - **Autodiff**: tape-based reverse mode with higher-order gradients
//! - **Neural Networks**: MLP, squared-error loss, Adam/SGD
//! - **Core**: `HamiltonianModule` and the `HNNModel` fit/predict wrapper
//! - **Dynamics**: reference Hamiltonian systems, RK4 rollouts, synthetic data
//!
//! ```
//! use hamiltonian_nn::prelude::*;
//! use ndarray::arr2;
//!
//! let mut model = HNNModel::new(HnnConfig::default()).unwrap();
//! let energies = model.predict_hamiltonian(arr2(&[[0.5f32, -0.3]]).view()).unwrap();
//! assert_eq!(energies.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Reverse-mode automatic differentiation
pub mod autodiff;

/// Neural network layers, losses and optimizers
pub mod nn;

/// Hamiltonian module, training wrapper and training loop
pub mod core;

/// Reference Hamiltonian systems and data generation
pub mod dynamics;

/// Utility functions and helpers
pub mod utils;

// Re-export commonly used types
pub use crate::core::{HNNModel, HamiltonianModule, HnnConfig, Mode};
pub use autodiff::{grad, Graph, Var};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum HnnError {
    /// Phase-space input with the wrong rank or dimension
    #[error("Invalid input shape: {0}")]
    InvalidInputShape(String),

    /// Differentiation cannot be performed on the given input
    #[error("Gradient unavailable: {0}")]
    GradientUnavailable(String),

    /// Invalid hyper-parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Activation name not recognized
    #[error("Unknown activation function: {0}")]
    UnknownActivation(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for the library
pub type Result<T> = std::result::Result<T, HnnError>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        autodiff::{grad, Graph, Var},
        core::{
            EnergyFunction, HNNModel, HamiltonianModule, HnnConfig, Mode, TrainableModel,
            TrainingConfig, TrainingMetrics,
        },
        core::Dataset,
        nn::{Activation, L2Loss, Module},
        HnnError, Result,
    };
}
