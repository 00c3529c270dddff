//! Gradient-descent optimizers

use ndarray::{ArrayD, IxDyn, Zip};
use serde::{Deserialize, Serialize};

use crate::nn::Parameter;

/// Updates parameters in place from their stored gradients.
///
/// Parameters must be passed in the same order on every step; per-parameter
/// state is kept by position. Parameters without a gradient are skipped.
pub trait Optimizer {
    /// Apply one update
    fn step(&mut self, params: &mut [&mut Parameter]);

    /// Current learning rate
    fn lr(&self) -> f64;

    /// Change the learning rate
    fn set_lr(&mut self, lr: f64);
}

/// Optimizer selection for [`HnnConfig`](crate::core::HnnConfig).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OptimizerKind {
    /// Adam with the usual defaults
    #[default]
    Adam,
    /// Stochastic gradient descent
    Sgd {
        /// Momentum coefficient; 0 disables momentum
        #[serde(default)]
        momentum: f64,
    },
}

impl OptimizerKind {
    /// Build the optimizer with the given learning rate
    pub fn build(&self, lr: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(lr)),
            OptimizerKind::Sgd { momentum } => Box::new(Sgd::with_momentum(lr, *momentum)),
        }
    }
}

/// Adam optimizer
#[derive(Clone, Debug)]
pub struct Adam {
    /// Learning rate
    pub lr: f64,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Denominator offset
    pub epsilon: f64,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
    t: i32,
}

impl Adam {
    /// Adam with `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`
    pub fn new(lr: f64) -> Self {
        Self::with_betas(lr, 0.9, 0.999)
    }

    /// Adam with custom decay rates
    pub fn with_betas(lr: f64, beta1: f64, beta2: f64) -> Self {
        Adam {
            lr,
            beta1,
            beta2,
            epsilon: 1e-8,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| ArrayD::zeros(IxDyn(p.shape()))).collect();
            self.v = params.iter().map(|p| ArrayD::zeros(IxDyn(p.shape()))).collect();
            self.t = 0;
        }
        self.t += 1;

        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.lr);
        let bc1 = 1.0 - beta1.powi(self.t);
        let bc2 = 1.0 - beta2.powi(self.t);

        for (i, p) in params.iter_mut().enumerate() {
            let Some(grad) = p.grad().cloned() else {
                continue;
            };
            Zip::from(p.data_mut())
                .and(&mut self.m[i])
                .and(&mut self.v[i])
                .and(&grad)
                .for_each(|w, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bc1;
                    let v_hat = *v / bc2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }
}

/// Stochastic gradient descent with optional momentum
#[derive(Clone, Debug)]
pub struct Sgd {
    /// Learning rate
    pub lr: f64,
    /// Momentum coefficient
    pub momentum: f64,
    velocity: Vec<ArrayD<f64>>,
}

impl Sgd {
    /// Plain SGD
    pub fn new(lr: f64) -> Self {
        Self::with_momentum(lr, 0.0)
    }

    /// SGD with momentum
    pub fn with_momentum(lr: f64, momentum: f64) -> Self {
        Sgd {
            lr,
            momentum,
            velocity: Vec::new(),
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        if self.momentum > 0.0 && self.velocity.len() != params.len() {
            self.velocity = params.iter().map(|p| ArrayD::zeros(IxDyn(p.shape()))).collect();
        }

        let (lr, momentum) = (self.lr, self.momentum);
        for (i, p) in params.iter_mut().enumerate() {
            let Some(grad) = p.grad().cloned() else {
                continue;
            };
            if momentum > 0.0 {
                let vel = &mut self.velocity[i];
                Zip::from(p.data_mut())
                    .and(vel)
                    .and(&grad)
                    .for_each(|w, v, &g| {
                        *v = momentum * *v + g;
                        *w -= lr * *v;
                    });
            } else {
                p.data_mut().scaled_add(-lr, &grad);
            }
        }
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }
}
