//! Neural network building blocks on top of the autodiff graph

mod activation;
mod layers;
mod loss;
mod module;
mod optimizer;
mod parameter;

pub use activation::{Activation, LEAKY_RELU_SLOPE};
pub use layers::{Linear, MultilayerPerceptron};
pub use loss::L2Loss;
pub use module::Module;
pub use optimizer::{Adam, Optimizer, OptimizerKind, Sgd};
pub use parameter::{Parameter, ParameterId};
