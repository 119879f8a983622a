//! Two-axis trajectories and scan parameter derivation.
//!
//! Every trajectory is a deterministic list of `(x, y)` points. Spiral patterns are centred on
//! `(x_centre, y_centre)` and clipped to the `x_range` by `y_range` rectangle.

use crate::error::{MonoError, MonoResult};
use std::f64::consts::PI;

/// Golden angle used by the Fermat spiral (degrees).
const FERMAT_PHI_DEG: f64 = 137.508;

/// One axis of a step-size scan.
///
/// The number of steps is chosen so the last point lands as close as possible to `end`; the
/// sign of `step` is corrected to point from `start` towards `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSweep {
    /// Axis name
    pub axis: String,
    /// First point
    pub start: f64,
    /// Requested end point
    pub end: f64,
    /// Requested step size (sign is ignored)
    pub step: f64,
}

impl AxisSweep {
    /// New sweep; `step` must be finite and non-zero.
    pub fn new(axis: impl Into<String>, start: f64, end: f64, step: f64) -> MonoResult<Self> {
        let axis = axis.into();
        if !(step.is_finite() && step != 0.0 && start.is_finite() && end.is_finite()) {
            return Err(MonoError::Plan(format!(
                "{axis}: invalid sweep {start} -> {end} step {step}"
            )));
        }
        Ok(Self {
            axis,
            start,
            end,
            step,
        })
    }

    /// Step with its sign pointing from `start` to `end`.
    pub fn signed_step(&self) -> f64 {
        if (self.start < self.end && self.step < 0.0) || (self.start > self.end && self.step > 0.0) {
            -self.step
        } else {
            self.step
        }
    }

    /// Number of steps, `|round((end - start) / step)|`.
    pub fn steps(&self) -> usize {
        ((self.end - self.start) / self.step).round().abs() as usize
    }

    /// Actual last point, `start + step * steps`.
    pub fn stop(&self) -> f64 {
        self.start + self.signed_step() * self.steps() as f64
    }

    /// `end - start`
    pub fn range(&self) -> f64 {
        self.end - self.start
    }

    /// Midpoint of the requested interval.
    pub fn centre(&self) -> f64 {
        self.start + self.range() / 2.0
    }
}

/// Angular density of the concentric spiral for a two-axis scan.
///
/// `num_theta = round(4π · dr / (atan(2 · step_y) · range_x))` with `dr` the x step size.
pub fn num_theta(delta_radius: f64, step_y: f64, range_x: f64) -> MonoResult<f64> {
    let denominator = (2.0 * step_y).atan() * range_x;
    let value = (4.0 * PI * delta_radius / denominator).round().abs();
    if !value.is_finite() || value < 1.0 {
        return Err(MonoError::Plan(format!(
            "spiral angular density {value} from dr={delta_radius}, step={step_y}, range={range_x}"
        )));
    }
    Ok(value)
}

fn check_spiral_args(x_range: f64, y_range: f64, dr: f64, density: f64) -> MonoResult<()> {
    let valid = [x_range, y_range, dr, density]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if !valid {
        return Err(MonoError::Plan(format!(
            "spiral needs positive ranges, radius step and density (got {x_range}, {y_range}, {dr}, {density})"
        )));
    }
    Ok(())
}

/// Concentric-ring spiral.
///
/// Ring `i` (from 1) has radius `i · dr` and `int(i · nth)` equally spaced points starting at
/// angle 0. Rings continue one past the rectangle's half-diagonal; points outside are dropped.
pub fn spiral(
    x_centre: f64,
    y_centre: f64,
    x_range: f64,
    y_range: f64,
    dr: f64,
    nth: f64,
) -> MonoResult<Vec<(f64, f64)>> {
    check_spiral_args(x_range.abs(), y_range.abs(), dr, nth)?;
    let half_x = x_range.abs() / 2.0;
    let half_y = y_range.abs() / 2.0;
    let r_max = half_x.hypot(half_y);
    let num_ring = 1 + (r_max / dr) as usize;

    let mut points = Vec::new();
    for ring in 1..=num_ring + 1 {
        let radius = ring as f64 * dr;
        let per_ring = (ring as f64 * nth) as usize;
        let angle_step = 2.0 * PI / (ring as f64 * nth);
        for i in 0..per_ring {
            let angle = i as f64 * angle_step;
            let x = radius * angle.cos();
            let y = radius * angle.sin();
            if x.abs() <= half_x && y.abs() <= half_y {
                points.push((x_centre + x, y_centre + y));
            }
        }
    }
    Ok(points)
}

/// Fermat (sunflower) spiral.
///
/// Point `i` sits at radius `sqrt(i) · dr / factor` and angle `i · 137.508°`.
pub fn fermat_spiral(
    x_centre: f64,
    y_centre: f64,
    x_range: f64,
    y_range: f64,
    dr: f64,
    factor: f64,
) -> MonoResult<Vec<(f64, f64)>> {
    check_spiral_args(x_range.abs(), y_range.abs(), dr, factor)?;
    let half_x = x_range.abs() / 2.0;
    let half_y = y_range.abs() / 2.0;
    let scaled_dr = dr / factor;
    let num_rings = (1.5 * half_x.hypot(half_y) / scaled_dr).powi(2) as usize;
    let phi = FERMAT_PHI_DEG.to_radians();

    let points = (1..num_rings)
        .filter_map(|i| {
            let radius = (i as f64).sqrt() * scaled_dr;
            let angle = phi * i as f64;
            let (x, y) = (radius * angle.cos(), radius * angle.sin());
            (x.abs() <= half_x && y.abs() <= half_y).then_some((x_centre + x, y_centre + y))
        })
        .collect();
    Ok(points)
}

/// Square spiral of expanding rectangular rings covering an `x_num` by `y_num` grid.
///
/// `y_num` is bumped by one when its parity differs from `x_num`'s so the rings close. With odd
/// counts the centre is visited first; with even counts the first ring is the inner 2 by 2.
pub fn square_spiral(
    x_centre: f64,
    y_centre: f64,
    x_range: f64,
    y_range: f64,
    x_num: usize,
    y_num: usize,
) -> MonoResult<Vec<(f64, f64)>> {
    if x_num < 2 || y_num < 2 {
        return Err(MonoError::Plan(format!(
            "square spiral needs at least 2 points per axis (got {x_num} x {y_num})"
        )));
    }
    let y_num = if x_num % 2 != y_num % 2 { y_num + 1 } else { y_num };
    let (first_ring, offset) = if x_num % 2 == 0 { (2, 0.5) } else { (1, 0.0) };

    let dx = x_range / (x_num - 1) as f64;
    let dy = y_range / (y_num - 1) as f64;
    let tol_x = dx.abs() * 1e-9;
    let tol_y = dy.abs() * 1e-9;
    let x_half = (dx * (x_num - 1) as f64 / 2.0).abs();
    let y_half = (dy * (y_num - 1) as f64 / 2.0).abs();
    let inside = |x: f64, y: f64| {
        (x - x_centre).abs() <= x_half + tol_x && (y - y_centre).abs() <= y_half + tol_y
    };

    let mut points = Vec::with_capacity(x_num * y_num);
    if offset == 0.0 {
        points.push((x_centre, y_centre));
    }

    let num_ring = x_num.max(y_num);
    for (n, side) in (first_ring..=num_ring).step_by(2).enumerate() {
        let reach = n as f64 + offset;
        let (x_lo, x_hi) = (x_centre - dx * reach, x_centre + dx * reach);
        let (y_lo, y_hi) = (y_centre - dy * reach, y_centre + dy * reach);

        let bottom = (1..side).map(|k| (x_lo + dx * (k - 1) as f64, y_lo));
        let right = (1..side).map(|k| (x_hi, y_lo + dy * (k - 1) as f64));
        let top = (1..side).map(|k| (x_hi - dx * (k - 1) as f64, y_hi));
        let left = (1..side).map(|k| (x_lo, y_hi - dy * (k - 1) as f64));

        points.extend(
            bottom
                .chain(right)
                .chain(top)
                .chain(left)
                .filter(|&(x, y)| inside(x, y)),
        );
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distinct(points: &[(f64, f64)]) -> usize {
        let mut keys: Vec<(i64, i64)> = points
            .iter()
            .map(|(x, y)| ((x * 1e6).round() as i64, (y * 1e6).round() as i64))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }

    #[test]
    fn test_sweep_step_count() {
        let sweep = AxisSweep::new("x", 0.0, 1.0, 0.3).unwrap();
        assert_eq!(sweep.steps(), 3);
        assert!((sweep.stop() - 0.9).abs() < 1e-12);

        // Wrong sign is corrected
        let sweep = AxisSweep::new("x", 5.0, 1.0, 1.0).unwrap();
        assert_eq!(sweep.signed_step(), -1.0);
        assert_eq!(sweep.steps(), 4);
        assert_eq!(sweep.stop(), 1.0);
        assert_eq!(sweep.centre(), 3.0);

        assert!(AxisSweep::new("x", 0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_num_theta() {
        assert_eq!(num_theta(0.5, 0.1, 2.0).unwrap(), 16.0);
        assert!(num_theta(0.0, 0.1, 2.0).is_err());
    }

    #[test]
    fn test_spiral_points() {
        let points = spiral(0.0, 0.0, 2.0, 2.0, 0.5, 4.0).unwrap();
        assert_eq!(points.len(), 12);
        assert_eq!(points[0], (0.5, 0.0));
        assert!(points.iter().all(|(x, y)| x.abs() <= 1.0 && y.abs() <= 1.0));
    }

    #[test]
    fn test_spiral_is_centred() {
        let points = spiral(10.0, -3.0, 2.0, 2.0, 0.5, 4.0).unwrap();
        assert!((points[0].0 - 10.5).abs() < 1e-12);
        assert!((points[0].1 + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fermat_spiral_points() {
        let points = fermat_spiral(0.0, 0.0, 2.0, 2.0, 0.5, 1.0).unwrap();
        assert_eq!(points.len(), 5);
        assert!(points.iter().all(|(x, y)| x.abs() <= 1.0 && y.abs() <= 1.0));
        assert!(fermat_spiral(0.0, 0.0, 2.0, 2.0, 0.5, 0.0).is_err());
    }

    #[test]
    fn test_square_spiral_odd_grid() {
        let points = square_spiral(0.0, 0.0, 2.0, 2.0, 3, 3).unwrap();
        assert_eq!(points.len(), 9);
        assert_eq!(distinct(&points), 9);
        assert_eq!(points[0], (0.0, 0.0));
        assert_eq!(points[1], (-1.0, -1.0));
    }

    #[test]
    fn test_square_spiral_covers_grid() {
        for (x_num, y_num, expected) in [(4, 4, 16), (5, 5, 25), (4, 5, 24), (5, 3, 15), (2, 2, 4)] {
            let points = square_spiral(0.0, 0.0, 2.0, 2.0, x_num, y_num).unwrap();
            assert_eq!(points.len(), expected, "{x_num} x {y_num}");
            assert_eq!(distinct(&points), expected, "{x_num} x {y_num}");
        }
    }

    #[test]
    fn test_square_spiral_rejects_single_point_axis() {
        assert!(square_spiral(0.0, 0.0, 2.0, 2.0, 1, 3).is_err());
    }
}
