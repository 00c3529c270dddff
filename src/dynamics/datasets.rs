//! Synthetic `(z, dz/dt)` training data from analytic systems

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal, Uniform};

use crate::core::Dataset;
use crate::dynamics::{simulate, HamiltonianSystem};
use crate::{HnnError, Result};

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn check_noise(noise_std: f64) -> Result<()> {
    if !(noise_std >= 0.0 && noise_std.is_finite()) {
        return Err(HnnError::InvalidConfig(format!(
            "noise standard deviation must be finite and non-negative, got {}",
            noise_std
        )));
    }
    Ok(())
}

fn noisy_derivative<S: HamiltonianSystem + ?Sized>(
    system: &S,
    z: ArrayView1<f64>,
    noise_std: f64,
    rng: &mut StdRng,
) -> Array1<f64> {
    let mut dz = system.time_derivative(z);
    if noise_std > 0.0 {
        dz.mapv_inplace(|v| {
            let eps: f64 = StandardNormal.sample(&mut *rng);
            v + noise_std * eps
        });
    }
    dz
}

/// Random phase-space points with their time derivatives.
///
/// Points are drawn uniformly in direction with a radius from
/// `radius = (min, max)`; the derivatives get Gaussian noise of standard
/// deviation `noise_std`.
pub fn sample_dataset<S: HamiltonianSystem + ?Sized>(
    system: &S,
    n: usize,
    radius: (f64, f64),
    noise_std: f64,
    seed: Option<u64>,
) -> Result<Dataset> {
    let (r_min, r_max) = radius;
    if !(r_min >= 0.0 && r_min <= r_max && r_max.is_finite()) {
        return Err(HnnError::InvalidConfig(format!(
            "radius range must satisfy 0 <= min <= max, got ({}, {})",
            r_min, r_max
        )));
    }
    check_noise(noise_std)?;

    let d = system.dim();
    let mut rng = rng_from(seed);
    let radii = Uniform::new_inclusive(r_min, r_max);
    let mut x = Array2::zeros((n, d));
    let mut y = Array2::zeros((n, d));

    for i in 0..n {
        let direction = loop {
            let v: Array1<f64> = (0..d).map(|_| StandardNormal.sample(&mut rng)).collect();
            let norm = v.dot(&v).sqrt();
            if norm > f64::EPSILON {
                break v / norm;
            }
        };
        let z = direction * radii.sample(&mut rng);
        let dz = noisy_derivative(system, z.view(), noise_std, &mut rng);
        x.row_mut(i).assign(&z);
        y.row_mut(i).assign(&dz);
    }

    Dataset::new(x, y)
}

/// States along one exact trajectory from `z0`, with noisy derivatives.
pub fn trajectory_dataset<S: HamiltonianSystem + ?Sized>(
    system: &S,
    z0: ArrayView1<f64>,
    dt: f64,
    steps: usize,
    noise_std: f64,
    seed: Option<u64>,
) -> Result<Dataset> {
    check_noise(noise_std)?;

    let x = simulate(system, z0, dt, steps)?;
    let mut rng = rng_from(seed);
    let mut y = Array2::zeros(x.raw_dim());
    for (z, mut dz) in x.rows().into_iter().zip(y.rows_mut()) {
        dz.assign(&noisy_derivative(system, z, noise_std, &mut rng));
    }

    Dataset::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{Pendulum, Spring};
    use ndarray::arr1;

    #[test]
    fn test_sample_dataset_respects_radius() {
        let spring = Spring::default();
        let data = sample_dataset(&spring, 50, (0.2, 1.0), 0.0, Some(0)).unwrap();
        assert_eq!(data.len(), 50);
        assert_eq!(data.x().ncols(), 2);

        for (z, dz) in data.x().rows().into_iter().zip(data.y().rows()) {
            let r = z.dot(&z).sqrt();
            assert!(r >= 0.2 - 1e-12 && r <= 1.0 + 1e-12);
            assert_eq!(dz, spring.time_derivative(z));
        }
    }

    #[test]
    fn test_sample_dataset_is_seeded() {
        let pendulum = Pendulum::default();
        let a = sample_dataset(&pendulum, 20, (0.5, 2.0), 0.1, Some(9)).unwrap();
        let b = sample_dataset(&pendulum, 20, (0.5, 2.0), 0.1, Some(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_perturbs_targets() {
        let spring = Spring::default();
        let data = sample_dataset(&spring, 10, (1.0, 1.0), 0.5, Some(2)).unwrap();
        let z = data.x().row(0);
        assert_ne!(data.y().row(0), spring.time_derivative(z));
    }

    #[test]
    fn test_invalid_arguments() {
        let spring = Spring::default();
        assert!(sample_dataset(&spring, 10, (1.0, 0.5), 0.0, None).is_err());
        assert!(sample_dataset(&spring, 10, (0.1, 1.0), -1.0, None).is_err());
    }

    #[test]
    fn test_trajectory_dataset() {
        let spring = Spring::new(1.0, 2.0);
        let data = trajectory_dataset(&spring, arr1(&[1.0, 0.0]).view(), 0.1, 20, 0.0, Some(1))
            .unwrap();
        assert_eq!(data.len(), 21);
        assert_eq!(data.x().row(0), arr1(&[1.0, 0.0]));
        assert_eq!(data.y().row(0), arr1(&[0.0, -1.0]));
    }
}
