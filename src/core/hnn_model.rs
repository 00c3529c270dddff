//! Fit/predict wrapper around [`HamiltonianModule`]

use std::fmt;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::autodiff::{Graph, Var};
use crate::core::training::{self, Dataset, TrainableModel, TrainingConfig, TrainingMetrics};
use crate::core::{HamiltonianModule, HnnConfig};
use crate::dynamics::integrate;
use crate::nn::{L2Loss, Optimizer};
use crate::{HnnError, Result};

/// Serialized model state: the configuration plus every parameter tensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    /// Configuration the model was built from
    pub config: HnnConfig,
    /// Parameter values in module order
    pub parameters: Vec<ArrayD<f64>>,
}

/// Hamiltonian Neural Network model.
///
/// Trains a [`HamiltonianModule`] so that its symplectic gradient matches
/// observed time derivatives `dz/dt`, using mean squared error. Prediction
/// returns energies.
pub struct HNNModel {
    module: HamiltonianModule,
    config: HnnConfig,
    training: TrainingConfig,
    loss: L2Loss,
    optimizer: Box<dyn Optimizer>,
}

impl HNNModel {
    /// Build the module, loss and optimizer from a validated configuration
    pub fn new(config: HnnConfig) -> Result<Self> {
        config.validate()?;
        let module = HamiltonianModule::from_config(&config)?;
        let optimizer = config.optimizer.build(config.learning_rate);

        info!(
            d_input = config.d_input,
            hidden = ?config.d_hidden,
            activation = %config.activation,
            parameters = module.num_parameters(),
            "created Hamiltonian model"
        );

        Ok(HNNModel {
            module,
            config,
            training: TrainingConfig::default(),
            loss: L2Loss::new(),
            optimizer,
        })
    }

    /// Replace the training-loop settings used by [`fit`](Self::fit)
    pub fn with_training_config(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// The wrapped module
    pub fn module(&self) -> &HamiltonianModule {
        &self.module
    }

    /// The wrapped module, mutably
    pub fn module_mut(&mut self) -> &mut HamiltonianModule {
        &mut self.module
    }

    /// Model configuration
    pub fn config(&self) -> &HnnConfig {
        &self.config
    }

    /// Training-loop settings
    pub fn training_config(&self) -> &TrainingConfig {
        &self.training
    }

    fn check_columns(&self, what: &str, cols: usize) -> Result<()> {
        if cols != self.config.d_input {
            return Err(HnnError::InvalidInputShape(format!(
                "{} must have {} columns, got {}",
                what, self.config.d_input, cols
            )));
        }
        Ok(())
    }

    /// Train on `(z, dz/dt)` pairs for `nb_epoch` epochs
    pub fn fit(&mut self, dataset: &Dataset, nb_epoch: usize) -> Result<TrainingMetrics> {
        self.check_columns("inputs", dataset.x().ncols())?;
        self.check_columns("targets", dataset.y().ncols())?;

        let config = self.training.clone();
        let batch_size = self.config.batch_size;
        training::fit(self, dataset, nb_epoch, batch_size, &config)
    }

    /// One optimizer step on a batch of phase-space points `x` with observed
    /// derivatives `y`. Returns the batch loss before the update.
    pub fn fit_batch(&mut self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<f64> {
        self.check_columns("inputs", x.ncols())?;
        self.check_columns("targets", y.ncols())?;
        if x.nrows() == 0 || x.nrows() != y.nrows() {
            return Err(HnnError::InvalidInputShape(format!(
                "batch needs matching non-zero row counts, got {} inputs and {} targets",
                x.nrows(),
                y.nrows()
            )));
        }

        self.module.train();
        let graph = Graph::with_parameter_tracking();
        let z = graph.constant(x.to_owned().into_dyn());
        let target = graph.constant(y.to_owned().into_dyn());

        let predicted = self.module.symplectic_gradient(&z)?;
        let loss = self.loss.loss(&predicted, &target)?;
        let value = loss.item();

        let grads = graph.parameter_gradients(&loss)?;
        self.module.zero_grad();
        self.module.assign_gradients(grads);
        let mut params = self.module.parameters_mut();
        self.optimizer.step(&mut params);

        debug!(rows = x.nrows(), loss = value, "fit batch");
        Ok(value)
    }

    /// Mean squared error between predicted and observed derivatives
    pub fn evaluate(&self, dataset: &Dataset) -> Result<f64> {
        self.check_columns("inputs", dataset.x().ncols())?;
        self.check_columns("targets", dataset.y().ncols())?;

        let graph = Graph::new();
        let z = graph.constant(dataset.x().clone().into_dyn());
        let target = graph.constant(dataset.y().clone().into_dyn());
        let predicted = self.module.symplectic_gradient(&z)?;
        Ok(self.loss.loss(&predicted, &target)?.item())
    }

    /// Evaluation-mode output: one energy per row.
    pub fn predict_on_batch(&mut self, x: ArrayView2<f64>) -> Result<ArrayD<f64>> {
        self.check_columns("inputs", x.ncols())?;
        self.module.eval();

        let graph = Graph::new();
        let z = graph.constant(x.to_owned().into_dyn());
        Ok(self.module.hamiltonian(&z)?.value())
    }

    /// Learned energy of each row of `x`.
    ///
    /// Puts the module in evaluation mode, converts `x` to `f64` and returns
    /// plain values detached from any graph.
    pub fn predict_hamiltonian<A: AsPrimitive<f64>>(
        &mut self,
        x: ArrayView2<A>,
    ) -> Result<Array1<f64>> {
        let x: Array2<f64> = x.mapv(|v| v.as_());
        self.predict_on_batch(x.view())?
            .into_dimensionality::<Ix1>()
            .map_err(|e| HnnError::InvalidInputShape(e.to_string()))
    }

    /// Learned time derivative `dz/dt` of each row of `x`
    pub fn predict_dynamics<A: AsPrimitive<f64>>(&self, x: ArrayView2<A>) -> Result<Array2<f64>> {
        self.check_columns("inputs", x.ncols())?;

        let graph = Graph::new();
        let z = graph.constant(x.mapv(|v| -> f64 { v.as_() }).into_dyn());
        self.module
            .symplectic_gradient(&z)?
            .value()
            .into_dimensionality::<Ix2>()
            .map_err(|e| HnnError::InvalidInputShape(e.to_string()))
    }

    /// Symplectic gradient of the wrapped module, on the caller's graph
    pub fn symplectic_gradient(&self, z: &Var) -> Result<Var> {
        self.module.symplectic_gradient(z)
    }

    /// Integrate the learned dynamics from `z0` with RK4.
    ///
    /// Returns `steps + 1` rows, starting with `z0`.
    pub fn rollout(&self, z0: ArrayView1<f64>, dt: f64, steps: usize) -> Result<Array2<f64>> {
        self.check_columns("initial state", z0.len())?;
        integrate(
            |z: ArrayView1<f64>| {
                let dz = self.predict_dynamics(z.insert_axis(Axis(0)))?;
                Ok(dz.row(0).to_owned())
            },
            z0,
            dt,
            steps,
        )
    }

    /// Write configuration and parameters as JSON
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let checkpoint = ModelCheckpoint {
            config: self.config.clone(),
            parameters: self.module.parameter_values(),
        };
        crate::utils::save_json(&checkpoint, path)
    }

    /// Rebuild a model from a checkpoint written by
    /// [`save_checkpoint`](Self::save_checkpoint).
    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        let checkpoint: ModelCheckpoint = crate::utils::load_json(path)?;
        let mut model = HNNModel::new(checkpoint.config)?;
        model.module.load_parameters(checkpoint.parameters)?;
        Ok(model)
    }
}

impl TrainableModel for HNNModel {
    fn train_batch(&mut self, batch: &Dataset) -> Result<f64> {
        self.fit_batch(batch.x().view(), batch.y().view())
    }

    fn evaluate_batch(&self, batch: &Dataset) -> Result<f64> {
        self.evaluate(batch)
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        HNNModel::save_checkpoint(self, path)
    }
}

impl fmt::Debug for HNNModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HNNModel")
            .field("config", &self.config)
            .field("mode", &self.module.mode())
            .field("learning_rate", &self.optimizer.lr())
            .finish()
    }
}
