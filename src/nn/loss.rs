//! Training objectives

use crate::autodiff::Var;
use crate::{HnnError, Result};

/// Mean squared error between predictions and labels.
///
/// Both tensors must have the same shape; the result is a rank-0 tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct L2Loss;

impl L2Loss {
    /// Create the loss
    pub fn new() -> Self {
        L2Loss
    }

    /// `mean((output - labels)^2)`
    pub fn loss(&self, output: &Var, labels: &Var) -> Result<Var> {
        if output.shape() != labels.shape() {
            return Err(HnnError::InvalidInputShape(format!(
                "loss expects matching shapes, got output {:?} and labels {:?}",
                output.shape(),
                labels.shape()
            )));
        }
        Ok((output - labels).square().mean())
    }
}
