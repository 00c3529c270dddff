//! Explicit Runge-Kutta integration of phase-space vector fields

use ndarray::{Array1, Array2, ArrayView1};

use crate::dynamics::HamiltonianSystem;
use crate::{HnnError, Result};

fn check_width(k: &Array1<f64>, z: &ArrayView1<f64>) -> Result<()> {
    if k.len() != z.len() {
        return Err(HnnError::InvalidInputShape(format!(
            "vector field returned {} components for a state of {}",
            k.len(),
            z.len()
        )));
    }
    Ok(())
}

fn check_dt(dt: f64) -> Result<()> {
    if !dt.is_finite() {
        return Err(HnnError::InvalidConfig(format!(
            "time step must be finite, got {}",
            dt
        )));
    }
    Ok(())
}

/// One classical RK4 step of `dz/dt = f(z)`.
///
/// A zero `dt` leaves the state unchanged; a non-finite one is an error.
pub fn rk4_step<F>(f: &mut F, z: ArrayView1<f64>, dt: f64) -> Result<Array1<f64>>
where
    F: FnMut(ArrayView1<f64>) -> Result<Array1<f64>>,
{
    check_dt(dt)?;
    if dt == 0.0 {
        return Ok(z.to_owned());
    }

    let k1 = f(z)?;
    check_width(&k1, &z)?;
    let k2 = f((&z + &(&k1 * (0.5 * dt))).view())?;
    check_width(&k2, &z)?;
    let k3 = f((&z + &(&k2 * (0.5 * dt))).view())?;
    check_width(&k3, &z)?;
    let k4 = f((&z + &(&k3 * dt)).view())?;
    check_width(&k4, &z)?;

    Ok(&z + &((k1 + &k2 * 2.0 + &k3 * 2.0 + k4) * (dt / 6.0)))
}

/// Integrate `steps` RK4 steps from `z0`.
///
/// Row `i` of the result is the state at time `i * dt`; row 0 is `z0`.
pub fn integrate<F>(mut f: F, z0: ArrayView1<f64>, dt: f64, steps: usize) -> Result<Array2<f64>>
where
    F: FnMut(ArrayView1<f64>) -> Result<Array1<f64>>,
{
    check_dt(dt)?;
    let mut trajectory = Array2::zeros((steps + 1, z0.len()));
    trajectory.row_mut(0).assign(&z0);

    let mut state = z0.to_owned();
    for i in 1..=steps {
        state = rk4_step(&mut f, state.view(), dt)?;
        trajectory.row_mut(i).assign(&state);
    }
    Ok(trajectory)
}

/// Integrate the exact dynamics of `system` from `z0`.
pub fn simulate<S: HamiltonianSystem + ?Sized>(
    system: &S,
    z0: ArrayView1<f64>,
    dt: f64,
    steps: usize,
) -> Result<Array2<f64>> {
    if z0.len() != system.dim() {
        return Err(HnnError::InvalidInputShape(format!(
            "initial state has {} components, system needs {}",
            z0.len(),
            system.dim()
        )));
    }
    integrate(|z| Ok(system.time_derivative(z)), z0, dt, steps)
}

/// Largest absolute deviation of the energy from its value at row 0.
pub fn max_energy_drift<S: HamiltonianSystem + ?Sized>(
    system: &S,
    trajectory: &Array2<f64>,
) -> f64 {
    let mut rows = trajectory.rows().into_iter();
    let Some(first) = rows.next() else {
        return 0.0;
    };
    let e0 = system.energy(first);
    rows.map(|z| (system.energy(z) - e0).abs())
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::Spring;
    use ndarray::arr1;

    #[test]
    fn test_zero_dt_is_identity() {
        let spring = Spring::default();
        let z = arr1(&[1.2, -0.4]);
        let next = rk4_step(&mut |z| Ok(spring.time_derivative(z)), z.view(), 0.0).unwrap();
        assert_eq!(next, z);
    }

    #[test]
    fn test_spring_matches_closed_form() {
        // q(t) = cos(t), p(t) = -sin(t) for k = m = 1
        let spring = Spring::default();
        let dt = 0.01;
        let steps = 300;
        let path = simulate(&spring, arr1(&[1.0, 0.0]).view(), dt, steps).unwrap();

        assert_eq!(path.shape(), &[steps + 1, 2]);
        let t = dt * steps as f64;
        assert!((path[[steps, 0]] - t.cos()).abs() < 1e-8);
        assert!((path[[steps, 1]] + t.sin()).abs() < 1e-8);
    }

    #[test]
    fn test_energy_drift_small() {
        let spring = Spring::new(2.0, 1.0);
        let path = simulate(&spring, arr1(&[0.5, 0.5]).view(), 0.05, 400).unwrap();
        assert!(max_energy_drift(&spring, &path) < 1e-4);
    }

    #[test]
    fn test_simulate_rejects_wrong_dimension() {
        let spring = Spring::default();
        assert!(simulate(&spring, arr1(&[1.0, 0.0, 0.0]).view(), 0.1, 1).is_err());
    }

    #[test]
    fn test_wrong_width_vector_field_is_an_error() {
        let result = integrate(
            |_z| Ok(arr1(&[1.0, 2.0, 3.0])),
            arr1(&[1.0, 0.0]).view(),
            0.1,
            2,
        );
        assert!(matches!(result, Err(HnnError::InvalidInputShape(_))));
    }

    #[test]
    fn test_non_finite_dt_rejected() {
        let spring = Spring::default();
        let z0 = arr1(&[1.0, 0.0]);
        for dt in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                simulate(&spring, z0.view(), dt, 3),
                Err(HnnError::InvalidConfig(_))
            ));
            assert!(rk4_step(&mut |z: ArrayView1<f64>| Ok(spring.time_derivative(z)), z0.view(), dt).is_err());
        }
        // zero steps still validate the step size
        assert!(simulate(&spring, z0.view(), f64::NAN, 0).is_err());

        let still = simulate(&spring, z0.view(), 0.0, 3).unwrap();
        assert!(still.rows().into_iter().all(|row| row == z0));
    }

    #[test]
    fn test_vector_field_errors_propagate() {
        let result = integrate(
            |_z| Err(HnnError::GradientUnavailable("test".to_string())),
            arr1(&[1.0, 0.0]).view(),
            0.1,
            3,
        );
        assert!(matches!(result, Err(HnnError::GradientUnavailable(_))));
    }
}
