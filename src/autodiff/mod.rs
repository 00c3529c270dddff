//! Reverse-mode automatic differentiation over `ndarray` tensors.
//!
//! A [`Graph`] records every operation applied to its [`Var`]s. [`grad`]
//! walks the record backwards; because the backward pass is itself
//! recorded, gradients can be differentiated again, which is what training
//! on a gradient-derived vector field needs.
//!
//! ```
//! use hamiltonian_nn::autodiff::{grad, Graph};
//! use ndarray::arr1;
//!
//! let graph = Graph::new();
//! let x = graph.variable(arr1(&[3.0]).into_dyn());
//! let y = x.square().sum();
//!
//! let dy = grad(&y, &[&x], true).unwrap().remove(0);
//! let d2y = grad(&dy.sum(), &[&x], false).unwrap().remove(0);
//! assert_eq!(dy.item(), 6.0);
//! assert_eq!(d2y.item(), 2.0);
//! ```

mod backward;
mod graph;
mod var;

pub use backward::grad;
pub use graph::Graph;
pub use var::Var;
