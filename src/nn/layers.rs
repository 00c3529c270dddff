//! Dense layers and the multilayer perceptron built from them

use rand::Rng;

use crate::autodiff::Var;
use crate::nn::{Activation, Module, Parameter};

/// Fully connected layer: `y = x W + b`, with `W` of shape `(in, out)`.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

impl Linear {
    /// Initialize from `U(-1/sqrt(in), 1/sqrt(in))` for both weight and bias.
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f64).sqrt();
        Linear {
            weight: Parameter::uniform(&[in_features, out_features], bound, rng),
            bias: Parameter::uniform(&[out_features], bound, rng),
        }
    }

    /// Input width
    pub fn in_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Output width
    pub fn out_features(&self) -> usize {
        self.weight.shape()[1]
    }
}

impl Module for Linear {
    fn forward(&self, input: &Var) -> Var {
        let graph = input.graph();
        let w = graph.bind_parameter(&self.weight);
        let b = graph.bind_parameter(&self.bias);
        let rows = input.shape()[0];
        &input.matmul(&w) + &b.broadcast_rows(rows)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Feed-forward network: hidden layers with an activation between them and
/// a linear output layer.
#[derive(Clone, Debug)]
pub struct MultilayerPerceptron {
    layers: Vec<Linear>,
    activation: Activation,
}

impl MultilayerPerceptron {
    /// Build `d_input -> d_hidden[0] -> ... -> d_output`.
    pub fn new<R: Rng + ?Sized>(
        d_input: usize,
        d_hidden: &[usize],
        d_output: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let mut widths = Vec::with_capacity(d_hidden.len() + 2);
        widths.push(d_input);
        widths.extend_from_slice(d_hidden);
        widths.push(d_output);

        let layers = widths
            .windows(2)
            .map(|pair| Linear::new(pair[0], pair[1], &mut *rng))
            .collect();

        MultilayerPerceptron { layers, activation }
    }

    /// Layers in evaluation order
    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    /// Hidden activation
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Input width
    pub fn d_input(&self) -> usize {
        self.layers.first().map_or(0, Linear::in_features)
    }

    /// Output width
    pub fn d_output(&self) -> usize {
        self.layers.last().map_or(0, Linear::out_features)
    }
}

impl Module for MultilayerPerceptron {
    /// `input` has shape `(n, d_input)`; the result has shape `(n, d_output)`.
    fn forward(&self, input: &Var) -> Var {
        let last = self.layers.len().saturating_sub(1);
        let mut h = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h);
            if i < last {
                h = self.activation.apply(&h);
            }
        }
        h
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.layers.iter().flat_map(Module::parameters).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers.iter_mut().flat_map(Module::parameters_mut).collect()
    }
}
