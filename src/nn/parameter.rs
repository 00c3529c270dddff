//! Trainable parameters

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a parameter, used to route gradients back from a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterId(u64);

impl ParameterId {
    fn fresh() -> Self {
        ParameterId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A trainable tensor with an associated gradient buffer.
#[derive(Debug)]
pub struct Parameter {
    id: ParameterId,
    data: ArrayD<f64>,
    grad: Option<ArrayD<f64>>,
}

impl Parameter {
    /// Wrap an initial value
    pub fn new(data: ArrayD<f64>) -> Self {
        Parameter {
            id: ParameterId::fresh(),
            data,
            grad: None,
        }
    }

    /// Zero-initialized parameter
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Parameter drawn from `U(-bound, bound)`.
    pub fn uniform<R: Rng + ?Sized>(shape: &[usize], bound: f64, rng: &mut R) -> Self {
        let dist = Uniform::new_inclusive(-bound, bound);
        Self::new(ArrayD::from_shape_simple_fn(IxDyn(shape), || dist.sample(&mut *rng)))
    }

    /// Unique id of this parameter
    pub fn id(&self) -> ParameterId {
        self.id
    }

    /// Current value
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Mutable access to the value, for optimizers
    pub fn data_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }

    /// Gradient from the last backward pass, if any
    pub fn grad(&self) -> Option<&ArrayD<f64>> {
        self.grad.as_ref()
    }

    /// Store a gradient
    pub fn set_grad(&mut self, grad: ArrayD<f64>) {
        self.grad = Some(grad);
    }

    /// Clear the gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Shape of the value
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of scalars
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

impl Clone for Parameter {
    /// Clones get a new id so two copies never alias on one graph.
    fn clone(&self) -> Self {
        Parameter {
            id: ParameterId::fresh(),
            data: self.data.clone(),
            grad: self.grad.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_ids_are_unique() {
        let a = Parameter::zeros(&[2]);
        let b = Parameter::zeros(&[2]);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), a.clone().id());
    }

    #[test]
    fn test_uniform_within_bound() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let p = Parameter::uniform(&[4, 5], 0.25, &mut rng);
        assert_eq!(p.shape(), &[4, 5]);
        assert_eq!(p.numel(), 20);
        assert!(p.data().iter().all(|x| x.abs() <= 0.25));
    }

    #[test]
    fn test_grad_buffer() {
        let mut p = Parameter::zeros(&[3]);
        assert!(p.grad().is_none());
        p.set_grad(ArrayD::ones(IxDyn(&[3])));
        assert_eq!(p.grad().map(|g| g.sum()), Some(3.0));
        p.zero_grad();
        assert!(p.grad().is_none());
    }
}
