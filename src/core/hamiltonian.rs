//! Learned Hamiltonian and the dynamics derived from it.
//!
//! Phase-space inputs have shape `(..., 2k)`: the first `k` components of the
//! last axis are positions `q`, the last `k` are momenta `p`. The module maps
//! each point to a scalar energy `H(q, p)` and obtains the time derivative
//! from Hamilton's equations,
//!
//! ```text
//! dq/dt =  ∂H/∂p
//! dp/dt = -∂H/∂q
//! ```

use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::autodiff::{grad, Var};
use crate::core::HnnConfig;
use crate::nn::{Activation, Module, MultilayerPerceptron, Parameter, ParameterId};
use crate::{HnnError, Result};

/// A differentiable scalar energy over phase space.
pub trait EnergyFunction {
    /// Phase-space dimension `2k`
    fn phase_dim(&self) -> usize;

    /// Energies of a batch of points: `(n, 2k) -> (n,)`.
    ///
    /// Must be built from graph operations so it can be differentiated.
    fn energy_rows(&self, z: &Var) -> Var;
}

fn validate_phase_input(z: &Var, d: usize) -> Result<()> {
    let shape = z.shape();
    let Some(&last) = shape.last() else {
        return Err(HnnError::InvalidInputShape(
            "phase-space input must have at least one axis".to_string(),
        ));
    };
    if d == 0 || d % 2 != 0 {
        return Err(HnnError::InvalidInputShape(format!(
            "phase-space dimension must be even and positive, got {}",
            d
        )));
    }
    if last != d {
        return Err(HnnError::InvalidInputShape(format!(
            "expected last axis of length {}, got shape {:?}",
            d, shape
        )));
    }
    Ok(())
}

/// Energy of every point in `z`, shape `(...)` for input `(..., 2k)`.
pub fn evaluate_energy<E: EnergyFunction + ?Sized>(energy: &E, z: &Var) -> Result<Var> {
    let d = energy.phase_dim();
    validate_phase_input(z, d)?;

    let shape = z.shape();
    let leading = &shape[..shape.len() - 1];
    let rows: usize = leading.iter().product();

    let flat = if shape.len() == 2 {
        z.clone()
    } else {
        z.reshape(&[rows, d])
    };
    let h = energy.energy_rows(&flat);
    if leading.len() == 1 {
        Ok(h)
    } else {
        Ok(h.reshape(leading))
    }
}

/// Hamilton's equations for any differentiable energy.
///
/// Differentiates `sum(H(z))` with respect to `z` keeping the graph, so the
/// result can be differentiated again (e.g. by a loss with respect to the
/// energy's parameters). Gradient tracking is switched on for `z` in place
/// if it was off. Returns `concat(∂H/∂p, -∂H/∂q)`, the shape of `z`.
pub fn symplectic_gradient_of<E: EnergyFunction + ?Sized>(energy: &E, z: &Var) -> Result<Var> {
    let d = energy.phase_dim();
    validate_phase_input(z, d)?;

    let z = if z.requires_grad() {
        z.clone()
    } else {
        z.requires_grad_()
    };
    let h = evaluate_energy(energy, &z)?;
    let dh = grad(&h.sum(), &[&z], true)?.remove(0);

    let k = d / 2;
    let dh_dq = dh.slice_last(0, k);
    let dh_dp = dh.slice_last(k, d);
    Ok(dh_dp.concat_last(&-&dh_dq))
}

/// What [`HamiltonianModule::forward`] computes.
///
/// The two modes produce results of different rank: `(..., 2k)` in
/// training, `(...)` in evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// `forward` returns the symplectic gradient
    #[default]
    Training,
    /// `forward` returns the energy
    Evaluation,
}

/// Neural network Hamiltonian `H(q, p)`.
///
/// Wraps a multilayer perceptron `2k -> d_hidden... -> 1`. The network
/// parameters are the only persistent state and are changed only by an
/// optimizer.
#[derive(Clone, Debug)]
pub struct HamiltonianModule {
    net: MultilayerPerceptron,
    d_input: usize,
    mode: Mode,
}

impl HamiltonianModule {
    /// Build a module for phase-space dimension `d_input`.
    ///
    /// Fails with `InvalidInputShape` when `d_input` is zero or odd and with
    /// `InvalidConfig` when a hidden width is zero. Without a seed the
    /// weights are drawn from entropy.
    pub fn new(
        d_input: usize,
        d_hidden: &[usize],
        activation: Activation,
        seed: Option<u64>,
    ) -> Result<Self> {
        if d_input == 0 || d_input % 2 != 0 {
            return Err(HnnError::InvalidInputShape(format!(
                "phase-space dimension must be even and positive, got {}",
                d_input
            )));
        }
        if d_hidden.iter().any(|&w| w == 0) {
            return Err(HnnError::InvalidConfig(
                "hidden layer widths must be positive".to_string(),
            ));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let net = MultilayerPerceptron::new(d_input, d_hidden, 1, activation, &mut rng);

        Ok(HamiltonianModule {
            net,
            d_input,
            mode: Mode::default(),
        })
    }

    /// Build from a model configuration
    pub fn from_config(config: &HnnConfig) -> Result<Self> {
        Self::new(
            config.d_input,
            &config.d_hidden,
            config.activation,
            config.seed,
        )
    }

    /// Energy of each point: `(..., 2k) -> (...)`.
    ///
    /// Available in either mode. Tracking gradients on `z` does not change
    /// the values.
    pub fn hamiltonian(&self, z: &Var) -> Result<Var> {
        evaluate_energy(self, z)
    }

    /// Time derivative `dz/dt = concat(∂H/∂p, -∂H/∂q)`, same shape as `z`.
    ///
    /// See [`symplectic_gradient_of`].
    pub fn symplectic_gradient(&self, z: &Var) -> Result<Var> {
        symplectic_gradient_of(self, z)
    }

    /// Mode-dependent evaluation.
    ///
    /// **The result rank depends on the mode.** In [`Mode::Training`] this is
    /// [`symplectic_gradient`](Self::symplectic_gradient) with shape
    /// `(..., 2k)`; in [`Mode::Evaluation`] it is
    /// [`hamiltonian`](Self::hamiltonian) with shape `(...)`. Prefer calling
    /// those two directly when the caller knows which one it needs.
    pub fn forward(&self, z: &Var) -> Result<Var> {
        match self.mode {
            Mode::Training => self.symplectic_gradient(z),
            Mode::Evaluation => self.hamiltonian(z),
        }
    }

    /// Switch to training mode
    pub fn train(&mut self) {
        self.mode = Mode::Training;
    }

    /// Switch to evaluation mode
    pub fn eval(&mut self) {
        self.mode = Mode::Evaluation;
    }

    /// Set the mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Check if `forward` returns the symplectic gradient
    pub fn is_training(&self) -> bool {
        self.mode == Mode::Training
    }

    /// Phase-space dimension `2k`
    pub fn d_input(&self) -> usize {
        self.d_input
    }

    /// Number of positions `k`
    pub fn half_dim(&self) -> usize {
        self.d_input / 2
    }

    /// The energy network
    pub fn net(&self) -> &MultilayerPerceptron {
        &self.net
    }

    /// Trainable parameters
    pub fn parameters(&self) -> Vec<&Parameter> {
        self.net.parameters()
    }

    /// Trainable parameters, mutably
    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.net.parameters_mut()
    }

    /// Clear all gradient buffers
    pub fn zero_grad(&mut self) {
        self.net.zero_grad();
    }

    /// Total number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        self.net.num_parameters()
    }

    /// Store gradients computed on a parameter-tracking graph
    pub fn assign_gradients(&mut self, grads: Vec<(ParameterId, ArrayD<f64>)>) {
        self.net.assign_gradients(grads);
    }

    /// Copies of the parameter values, in [`parameters`](Self::parameters) order
    pub fn parameter_values(&self) -> Vec<ArrayD<f64>> {
        self.parameters().into_iter().map(|p| p.data().clone()).collect()
    }

    /// Overwrite the parameter values, in [`parameters`](Self::parameters) order.
    pub fn load_parameters(&mut self, values: Vec<ArrayD<f64>>) -> Result<()> {
        let mut params = self.parameters_mut();
        if params.len() != values.len() {
            return Err(HnnError::InvalidConfig(format!(
                "expected {} parameter tensors, got {}",
                params.len(),
                values.len()
            )));
        }
        if let Some((p, v)) = params
            .iter()
            .zip(&values)
            .find(|(p, v)| p.shape() != v.shape())
        {
            return Err(HnnError::InvalidInputShape(format!(
                "parameter of shape {:?} cannot take a value of shape {:?}",
                p.shape(),
                v.shape()
            )));
        }
        for (p, v) in params.iter_mut().zip(values) {
            *p.data_mut() = v;
            p.zero_grad();
        }
        Ok(())
    }
}

impl EnergyFunction for HamiltonianModule {
    fn phase_dim(&self) -> usize {
        self.d_input
    }

    fn energy_rows(&self, z: &Var) -> Var {
        let rows = z.shape()[0];
        self.net.forward(z).reshape(&[rows])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Graph;
    use ndarray::{arr1, arr2, Array, Array1, Array2, ArrayD, IxDyn};
    use proptest::prelude::*;
    use rand::Rng;

    fn scenario_module() -> HamiltonianModule {
        HamiltonianModule::new(2, &[4, 4], Activation::Tanh, Some(7)).unwrap()
    }

    fn energy_at(module: &HamiltonianModule, q: f64, p: f64) -> f64 {
        let graph = Graph::new();
        let z = graph.constant(arr2(&[[q, p]]).into_dyn());
        module.hamiltonian(&z).unwrap().value()[[0]]
    }

    fn energy_of_row(module: &HamiltonianModule, row: &Array1<f64>) -> f64 {
        let graph = Graph::new();
        let z = graph.constant(row.clone().insert_axis(ndarray::Axis(0)).into_dyn());
        module.hamiltonian(&z).unwrap().value()[[0]]
    }

    /// Central-difference `dH/dz_i` at every coordinate of `row`
    fn numerical_energy_gradient(module: &HamiltonianModule, row: &Array1<f64>) -> Array1<f64> {
        let eps = 1e-5;
        Array1::from_shape_fn(row.len(), |i| {
            let mut up = row.clone();
            let mut down = row.clone();
            up[i] += eps;
            down[i] -= eps;
            (energy_of_row(module, &up) - energy_of_row(module, &down)) / (2.0 * eps)
        })
    }

    #[test]
    fn test_symplectic_gradient_matches_finite_differences() {
        let module = scenario_module();
        let graph = Graph::new();
        let z = graph.constant(arr2(&[[0.5, -0.3]]).into_dyn());

        let h = module.hamiltonian(&z).unwrap();
        assert_eq!(h.shape(), vec![1]);
        assert!(h.value()[[0]].is_finite());

        let dz = module.symplectic_gradient(&z).unwrap().value();
        assert_eq!(dz.shape(), &[1, 2]);

        let eps = 1e-5;
        let dh_dq = (energy_at(&module, 0.5 + eps, -0.3) - energy_at(&module, 0.5 - eps, -0.3))
            / (2.0 * eps);
        let dh_dp = (energy_at(&module, 0.5, -0.3 + eps) - energy_at(&module, 0.5, -0.3 - eps))
            / (2.0 * eps);

        assert!((dz[[0, 0]] - dh_dp).abs() < 1e-3);
        assert!((dz[[0, 1]] + dh_dq).abs() < 1e-3);
    }

    #[test]
    fn test_hamiltonian_ignores_gradient_tracking() {
        let module = scenario_module();
        let values = arr2(&[[0.5, -0.3], [1.0, 2.0], [-0.7, 0.1]]).into_dyn();

        let plain = module
            .hamiltonian(&Graph::new().constant(values.clone()))
            .unwrap()
            .value();
        let tracked = module
            .hamiltonian(&Graph::new().variable(values))
            .unwrap()
            .value();
        assert_eq!(plain, tracked);
    }

    #[test]
    fn test_forward_depends_on_mode() {
        let mut module = HamiltonianModule::new(4, &[8], Activation::Softplus, Some(1)).unwrap();
        let graph = Graph::new();
        let z = graph.constant(ArrayD::from_elem(IxDyn(&[3, 4]), 0.25));

        assert!(module.is_training());
        assert_eq!(module.forward(&z).unwrap().shape(), vec![3, 4]);

        module.eval();
        assert_eq!(module.mode(), Mode::Evaluation);
        assert_eq!(module.forward(&z).unwrap().shape(), vec![3]);

        module.set_mode(Mode::Training);
        assert_eq!(module.forward(&z).unwrap().shape(), vec![3, 4]);
    }

    #[test]
    fn test_odd_dimension_rejected() {
        assert!(matches!(
            HamiltonianModule::new(3, &[4], Activation::Tanh, Some(0)),
            Err(HnnError::InvalidInputShape(_))
        ));
        assert!(matches!(
            HamiltonianModule::new(0, &[4], Activation::Tanh, Some(0)),
            Err(HnnError::InvalidInputShape(_))
        ));
        assert!(matches!(
            HamiltonianModule::new(2, &[4, 0], Activation::Tanh, Some(0)),
            Err(HnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let module = scenario_module();
        let graph = Graph::new();

        let odd = graph.constant(arr2(&[[0.1, 0.2, 0.3]]).into_dyn());
        assert!(matches!(
            module.symplectic_gradient(&odd),
            Err(HnnError::InvalidInputShape(_))
        ));
        assert!(matches!(
            module.hamiltonian(&odd),
            Err(HnnError::InvalidInputShape(_))
        ));

        let scalar = graph.constant(ArrayD::from_elem(IxDyn(&[]), 1.0));
        assert!(module.hamiltonian(&scalar).is_err());
    }

    struct Quadratic {
        d: usize,
    }

    impl EnergyFunction for Quadratic {
        fn phase_dim(&self) -> usize {
            self.d
        }

        // H = (|q|^2 + |p|^2) / 2
        fn energy_rows(&self, z: &Var) -> Var {
            let rows = z.shape()[0];
            let ones = z.graph().constant(ArrayD::ones(IxDyn(&[self.d, 1])));
            z.square().matmul(&ones).scale(0.5).reshape(&[rows])
        }
    }

    #[test]
    fn test_quadratic_energy_rotates_phase_space() {
        let graph = Graph::new();
        let z = graph.constant(arr2(&[[1.0, 2.0, 3.0, 4.0]]).into_dyn());

        let dz = symplectic_gradient_of(&Quadratic { d: 4 }, &z).unwrap();
        assert_eq!(dz.value(), arr2(&[[3.0, 4.0, -1.0, -2.0]]).into_dyn());
    }

    #[test]
    fn test_single_point_and_leading_axes() {
        let module = HamiltonianModule::new(2, &[6], Activation::Tanh, Some(3)).unwrap();
        let graph = Graph::new();

        let point = graph.constant(arr1(&[0.5, -0.3]).into_dyn());
        let h = module.hamiltonian(&point).unwrap();
        assert_eq!(h.shape(), Vec::<usize>::new());
        assert!((h.item() - energy_at(&module, 0.5, -0.3)).abs() < 1e-12);
        assert_eq!(module.symplectic_gradient(&point).unwrap().shape(), vec![2]);

        let values = Array::from_shape_fn(IxDyn(&[2, 3, 2]), |idx| {
            0.1 * (idx[0] * 6 + idx[1] * 2 + idx[2]) as f64 - 0.5
        });
        let z = graph.constant(values.clone());
        let h = module.hamiltonian(&z).unwrap().value();
        assert_eq!(h.shape(), &[2, 3]);
        assert_eq!(module.symplectic_gradient(&z).unwrap().shape(), vec![2, 3, 2]);

        let expected = energy_at(&module, values[[1, 2, 0]], values[[1, 2, 1]]);
        assert!((h[[1, 2]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_symplectic_gradient_is_differentiable_in_parameters() {
        let module = scenario_module();
        let graph = Graph::with_parameter_tracking();
        let z = graph.constant(arr2(&[[0.5, -0.3], [0.2, 0.9]]).into_dyn());

        let dz = module.symplectic_gradient(&z).unwrap();
        let loss = dz.square().mean();
        let grads = graph.parameter_gradients(&loss).unwrap();

        assert_eq!(grads.len(), module.parameters().len());
        let total: f64 = grads.iter().map(|(_, g)| g.iter().map(|v| v * v).sum::<f64>()).sum();
        assert!(total > 0.0);
    }

    #[test]
    fn test_parameter_values_round_trip() {
        let source = scenario_module();
        let mut target = HamiltonianModule::new(2, &[4, 4], Activation::Tanh, Some(99)).unwrap();
        assert_ne!(energy_at(&source, 0.5, -0.3), energy_at(&target, 0.5, -0.3));

        target.load_parameters(source.parameter_values()).unwrap();
        assert_eq!(energy_at(&source, 0.5, -0.3), energy_at(&target, 0.5, -0.3));

        assert!(target.load_parameters(Vec::new()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_symplectic_gradient_preserves_shape(k in 1usize..4, n in 1usize..6, seed in 0u64..1000) {
            let module = HamiltonianModule::new(2 * k, &[5], Activation::Tanh, Some(seed)).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let values = Array::from_shape_fn(IxDyn(&[n, 2 * k]), |_| rng.gen_range(-2.0..2.0));

            let graph = Graph::new();
            let z = graph.constant(values);
            let dz = module.symplectic_gradient(&z).unwrap();
            prop_assert_eq!(dz.shape(), vec![n, 2 * k]);
            prop_assert_eq!(module.hamiltonian(&z).unwrap().shape(), vec![n]);
        }

        #[test]
        fn prop_symplectic_gradient_matches_central_differences(k in 1usize..4, seed in 0u64..1000) {
            let module = HamiltonianModule::new(2 * k, &[6, 6], Activation::Tanh, Some(seed)).unwrap();
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(17));
            let values = Array2::from_shape_fn((3, 2 * k), |_| rng.gen_range(-1.5..1.5));

            let graph = Graph::new();
            let z = graph.constant(values.clone().into_dyn());
            let dz = module.symplectic_gradient(&z).unwrap().value();

            for (r, row) in values.rows().into_iter().enumerate() {
                let dh = numerical_energy_gradient(&module, &row.to_owned());
                for j in 0..k {
                    let dh_dq = dh[j];
                    let dh_dp = dh[k + j];
                    let tol = 1e-4 * (1.0 + dh_dq.abs().max(dh_dp.abs()));
                    prop_assert!((dz[[r, j]] - dh_dp).abs() < tol, "dq/dt[{}] = {} vs {}", j, dz[[r, j]], dh_dp);
                    prop_assert!((dz[[r, k + j]] + dh_dq).abs() < tol, "dp/dt[{}] = {} vs {}", j, dz[[r, k + j]], -dh_dq);
                }
            }
        }
    }
}
