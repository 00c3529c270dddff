//! Model configuration for Hamiltonian networks

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::nn::{Activation, OptimizerKind};
use crate::{HnnError, Result};

/// Architecture and optimizer hyper-parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnnConfig {
    /// Phase-space dimension `2k`: `k` positions followed by `k` momenta
    pub d_input: usize,
    /// Hidden layer widths of the energy network
    pub d_hidden: Vec<usize>,
    /// Hidden-layer activation
    pub activation: Activation,
    /// Learning rate
    pub learning_rate: f64,
    /// Batch size
    pub batch_size: usize,
    /// Optimizer
    pub optimizer: OptimizerKind,
    /// Seed for weight initialization; `None` draws from entropy
    pub seed: Option<u64>,
}

impl HnnConfig {
    /// Config for a one-dimensional mass-spring system
    pub fn for_spring() -> Self {
        HnnConfig {
            d_input: 2,
            d_hidden: vec![200, 200],
            activation: Activation::Tanh,
            learning_rate: 1e-3,
            batch_size: 100,
            optimizer: OptimizerKind::Adam,
            seed: Some(42),
        }
    }

    /// Config for an ideal pendulum
    pub fn for_pendulum() -> Self {
        HnnConfig {
            d_input: 2,
            d_hidden: vec![200, 200],
            activation: Activation::Tanh,
            learning_rate: 1e-3,
            batch_size: 100,
            optimizer: OptimizerKind::Adam,
            seed: Some(0),
        }
    }

    /// Config for `n` independent degrees of freedom (`d_input = 2n`)
    pub fn for_degrees_of_freedom(n: usize) -> Self {
        HnnConfig {
            d_input: 2 * n,
            ..Self::default()
        }
    }

    /// Read a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: HnnConfig = crate::utils::load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.d_input == 0 || self.d_input % 2 != 0 {
            return Err(HnnError::InvalidInputShape(format!(
                "phase-space dimension must be even and positive, got {}",
                self.d_input
            )));
        }

        if self.d_hidden.iter().any(|&w| w == 0) {
            return Err(HnnError::InvalidConfig(
                "hidden layer widths must be positive".to_string(),
            ));
        }

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(HnnError::InvalidConfig(
                "learning rate must be positive".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(HnnError::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }

        if let OptimizerKind::Sgd { momentum } = self.optimizer {
            if !(0.0..1.0).contains(&momentum) {
                return Err(HnnError::InvalidConfig(
                    "momentum must be in [0, 1)".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for HnnConfig {
    fn default() -> Self {
        HnnConfig {
            d_input: 2,
            d_hidden: vec![32, 32],
            activation: Activation::Tanh,
            learning_rate: 1e-3,
            batch_size: 100,
            optimizer: OptimizerKind::Adam,
            seed: Some(42),
        }
    }
}
