//! Analytic Hamiltonian systems with known dynamics

use ndarray::{Array1, ArrayView1};

/// A Hamiltonian system in canonical coordinates `z = (q, p)`.
pub trait HamiltonianSystem {
    /// Phase-space dimension `2k`
    fn dim(&self) -> usize;

    /// Energy `H(q, p)`
    fn energy(&self, z: ArrayView1<f64>) -> f64;

    /// `dz/dt = (∂H/∂p, -∂H/∂q)`
    fn time_derivative(&self, z: ArrayView1<f64>) -> Array1<f64>;
}

/// Mass on a spring: `H = k q²/2 + p²/(2m)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spring {
    /// Spring constant
    pub k: f64,
    /// Mass
    pub m: f64,
}

impl Spring {
    /// Spring with constant `k` and mass `m`
    pub fn new(k: f64, m: f64) -> Self {
        Spring { k, m }
    }

    /// Angular frequency `sqrt(k/m)`
    pub fn omega(&self) -> f64 {
        (self.k / self.m).sqrt()
    }
}

impl Default for Spring {
    fn default() -> Self {
        Spring::new(1.0, 1.0)
    }
}

impl HamiltonianSystem for Spring {
    fn dim(&self) -> usize {
        2
    }

    fn energy(&self, z: ArrayView1<f64>) -> f64 {
        let (q, p) = (z[0], z[1]);
        0.5 * self.k * q * q + p * p / (2.0 * self.m)
    }

    fn time_derivative(&self, z: ArrayView1<f64>) -> Array1<f64> {
        let (q, p) = (z[0], z[1]);
        Array1::from(vec![p / self.m, -self.k * q])
    }
}

/// Ideal pendulum: `H = m g l (1 - cos q) + p²/(2 m l²)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pendulum {
    /// Bob mass
    pub m: f64,
    /// Gravitational acceleration
    pub g: f64,
    /// Rod length
    pub l: f64,
}

impl Pendulum {
    /// Pendulum with mass `m`, gravity `g` and length `l`
    pub fn new(m: f64, g: f64, l: f64) -> Self {
        Pendulum { m, g, l }
    }
}

impl Default for Pendulum {
    fn default() -> Self {
        Pendulum::new(1.0, 3.0, 1.0)
    }
}

impl HamiltonianSystem for Pendulum {
    fn dim(&self) -> usize {
        2
    }

    fn energy(&self, z: ArrayView1<f64>) -> f64 {
        let (q, p) = (z[0], z[1]);
        self.m * self.g * self.l * (1.0 - q.cos()) + p * p / (2.0 * self.m * self.l * self.l)
    }

    fn time_derivative(&self, z: ArrayView1<f64>) -> Array1<f64> {
        let (q, p) = (z[0], z[1]);
        Array1::from(vec![
            p / (self.m * self.l * self.l),
            -self.m * self.g * self.l * q.sin(),
        ])
    }
}
