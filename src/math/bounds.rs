//! Bounded ↔ unbounded parameter transforms.
//!
//! The optimizer works in an unbounded internal space. Bounded parameters are
//! mapped with the MINUIT transforms:
//!
//! - both bounds: `x = min + (sin(i) + 1)·(max − min)/2`
//! - lower bound only: `x = min − 1 + √(i² + 1)`
//! - upper bound only: `x = max + 1 − √(i² + 1)`
//!
//! so every internal value maps to a feasible external one.

use crate::domain::Bounds;

/// Map an external (bounded) value to internal coordinates.
pub fn to_internal(value: f64, bounds: &Bounds) -> f64 {
    let x = bounds.clamp(value);
    match (bounds.min.is_finite(), bounds.max.is_finite()) {
        (true, true) => {
            let width = bounds.max - bounds.min;
            if width <= 0.0 {
                return 0.0;
            }
            (2.0 * (x - bounds.min) / width - 1.0).clamp(-1.0, 1.0).asin()
        }
        (true, false) => ((x - bounds.min + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (false, true) => ((bounds.max - x + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (false, false) => x,
    }
}

/// Map an internal value back to external (bounded) coordinates.
pub fn to_external(internal: f64, bounds: &Bounds) -> f64 {
    match (bounds.min.is_finite(), bounds.max.is_finite()) {
        (true, true) => bounds.min + (internal.sin() + 1.0) * (bounds.max - bounds.min) / 2.0,
        (true, false) => bounds.min - 1.0 + (internal * internal + 1.0).sqrt(),
        (false, true) => bounds.max + 1.0 - (internal * internal + 1.0).sqrt(),
        (false, false) => internal,
    }
}

/// `dx/di` at an internal value (chain rule for uncertainties).
pub fn derivative(internal: f64, bounds: &Bounds) -> f64 {
    match (bounds.min.is_finite(), bounds.max.is_finite()) {
        (true, true) => internal.cos() * (bounds.max - bounds.min) / 2.0,
        (true, false) => internal / (internal * internal + 1.0).sqrt(),
        (false, true) => -internal / (internal * internal + 1.0).sqrt(),
        (false, false) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trips_inside_bounds() {
        let cases = [
            (0.07, Bounds::new(Some(0.0), Some(0.5))),
            (12.0, Bounds::new(Some(0.0), None)),
            (-3.0, Bounds::new(None, Some(1.0))),
            (42.0, Bounds::UNBOUNDED),
        ];
        for (x, b) in cases {
            assert_relative_eq!(to_external(to_internal(x, &b), &b), x, epsilon = 1e-10);
        }
    }

    #[test]
    fn any_internal_value_is_feasible() {
        let b = Bounds::new(Some(0.0), Some(0.5));
        for i in [-100.0, -1.0, 0.0, 3.0, 1e6] {
            assert!(b.contains(to_external(i, &b)));
        }
        let lower = Bounds::new(Some(2.0), None);
        assert!(to_external(-50.0, &lower) >= 2.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let b = Bounds::new(Some(0.0), Some(0.5));
        let i = 0.3;
        let h = 1e-6;
        let fd = (to_external(i + h, &b) - to_external(i - h, &b)) / (2.0 * h);
        assert_relative_eq!(derivative(i, &b), fd, epsilon = 1e-8);

        let lower = Bounds::new(Some(1.0), None);
        let fd = (to_external(2.0 + h, &lower) - to_external(2.0 - h, &lower)) / (2.0 * h);
        assert_relative_eq!(derivative(2.0, &lower), fd, epsilon = 1e-8);
    }
}
