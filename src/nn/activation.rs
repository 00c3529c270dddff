//! Hidden-layer activation functions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::autodiff::Var;
use crate::HnnError;

/// Negative slope used by [`Activation::LeakyRelu`].
pub const LEAKY_RELU_SLOPE: f64 = 0.01;

/// Activation applied between hidden layers.
///
/// Energy gradients are differentiated a second time during training, so
/// smooth choices (`tanh`, `softplus`, `silu`, `sigmoid`) give the model a
/// usable training signal; piecewise-linear ones have zero curvature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Hyperbolic tangent
    #[default]
    Tanh,
    /// Rectified linear unit
    Relu,
    /// Leaky ReLU with slope [`LEAKY_RELU_SLOPE`]
    LeakyRelu,
    /// Logistic sigmoid
    Sigmoid,
    /// `ln(1 + e^x)`
    Softplus,
    /// `x * sigmoid(x)`
    #[serde(alias = "swish")]
    Silu,
    /// No activation
    #[serde(alias = "linear")]
    Identity,
}

impl Activation {
    /// Apply the activation elementwise
    pub fn apply(&self, x: &Var) -> Var {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.relu(),
            Activation::LeakyRelu => x.leaky_relu(LEAKY_RELU_SLOPE),
            Activation::Sigmoid => x.sigmoid(),
            Activation::Softplus => x.softplus(),
            Activation::Silu => x * &x.sigmoid(),
            Activation::Identity => x.clone(),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Softplus => "softplus",
            Activation::Silu => "silu",
            Activation::Identity => "identity",
        }
    }
}

impl FromStr for Activation {
    type Err = HnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyRelu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "softplus" => Ok(Activation::Softplus),
            "silu" | "swish" => Ok(Activation::Silu),
            "identity" | "linear" => Ok(Activation::Identity),
            other => Err(HnnError::UnknownActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
