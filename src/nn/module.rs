//! Common interface of network building blocks

use crate::autodiff::Var;
use crate::nn::{Parameter, ParameterId};

/// A differentiable block with trainable parameters.
pub trait Module {
    /// Forward pass, recorded on the input's graph.
    fn forward(&self, input: &Var) -> Var;

    /// All trainable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Parameter>;

    /// All trainable parameters mutably, in the same order.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Clear every gradient buffer.
    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Total number of trainable scalars.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Store gradients produced by
    /// [`Graph::parameter_gradients`](crate::autodiff::Graph::parameter_gradients).
    ///
    /// Entries for parameters this module does not own are ignored.
    fn assign_gradients(&mut self, grads: Vec<(ParameterId, ndarray::ArrayD<f64>)>) {
        let mut grads: std::collections::HashMap<_, _> = grads.into_iter().collect();
        for p in self.parameters_mut() {
            if let Some(g) = grads.remove(&p.id()) {
                p.set_grad(g);
            }
        }
    }
}
