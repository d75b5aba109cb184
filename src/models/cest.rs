//! CEST profiles by Bloch–McConnell propagation.
//!
//! The independent variable is the B1 offset (Hz) from the carrier. For each offset
//! the homogeneous (augmented) Bloch–McConnell matrix is propagated over the
//! saturation delay and the longitudinal magnetization of state A is read out.
//!
//! Magnetization vector: `[E, Ix(a), Iy(a), Iz(a), Ix(b), Iy(b), Iz(b), ...]`, where
//! `E` carries the return to equilibrium.
//!
//! Offsets at or below −10 kHz are reference (unsaturated) points and evaluate to
//! the ground-state population. Profiles are scaled analytically against the data.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::models::{Exchange, Kinetics, ModelContext, ModelFn, Scaling, Scope, SlotSpec};

/// Offsets at or below this value (Hz) are reference points.
pub const REFERENCE_OFFSET: f64 = -1.0e4;

const CS_A: SlotSpec = SlotSpec::new("cs_a", Scope::GroupTemperature, 0.0).fixed();
const DW_AB: SlotSpec = SlotSpec::new("dw_ab", Scope::GroupTemperature, 0.0);
const DW_AC: SlotSpec = SlotSpec::new("dw_ac", Scope::GroupTemperature, 0.0);
const R1_A: SlotSpec = SlotSpec::new("r1_a", Scope::GroupFieldTemperature, 1.5).min(0.0);
const R2_A: SlotSpec = SlotSpec::new("r2_a", Scope::GroupFieldTemperature, 10.0).min(0.0);

#[derive(Debug)]
pub struct CestProfile {
    states: usize,
    kinetics: Kinetics,
    slots: Vec<SlotSpec>,
    ppm_to_rads: f64,
    /// Carrier position (ppm).
    carrier: f64,
    /// B1 field strength (Hz).
    b1_frq: f64,
    /// Saturation delay (s).
    time_t1: f64,
    /// Width (Hz) of the window around the ground-state resonance that is dropped.
    on_resonance_filter: f64,
}

pub fn build_two_state(ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
    Ok(Arc::new(CestProfile::new(ctx, 2)?))
}

pub fn build_three_state(ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
    Ok(Arc::new(CestProfile::new(ctx, 3)?))
}

impl CestProfile {
    fn new(ctx: &ModelContext, states: usize) -> Result<Self, FitError> {
        let kinetics = Kinetics::from_context(ctx, states)?;
        let mut slots = kinetics.slots().to_vec();
        slots.push(CS_A);
        slots.push(DW_AB);
        if states == 3 {
            slots.push(DW_AC);
        }
        slots.push(R1_A);
        slots.push(R2_A);

        let time_t1 = ctx.constant("time_t1")?;
        if time_t1 < 0.0 {
            return Err(FitError::parse(
                ctx.origin.clone(),
                format!("time_t1 must be non-negative, got {time_t1}"),
            ));
        }

        Ok(Self {
            states,
            kinetics,
            slots,
            ppm_to_rads: ctx.conditions.ppm_to_rads(),
            carrier: ctx.constant("carrier")?,
            b1_frq: ctx.constant("b1_frq")?,
            time_t1,
            on_resonance_filter: ctx.constant_or("on_resonance_filter", 0.0),
        })
    }

    fn spin_offset(&self) -> usize {
        self.kinetics.slots().len()
    }

    fn liouvillian(&self, ex: &Exchange, omegas: &[f64], r1: f64, r2: f64) -> DMatrix<f64> {
        let n = 1 + 3 * self.states;
        let w1 = 2.0 * PI * self.b1_frq;
        let mut l = DMatrix::<f64>::zeros(n, n);

        for s in 0..self.states {
            let b = 1 + 3 * s;
            let omega = omegas[s];

            l[(b, b)] = -r2;
            l[(b, b + 1)] = -omega;
            l[(b + 1, b)] = omega;
            l[(b + 1, b + 1)] = -r2;
            l[(b + 1, b + 2)] = -w1;
            l[(b + 2, b + 1)] = w1;
            l[(b + 2, b + 2)] = -r1;
            l[(b + 2, 0)] = r1 * ex.populations[s];

            for t in (0..self.states).filter(|&t| t != s) {
                let k = ex.rates[s][t];
                let bt = 1 + 3 * t;
                for c in 0..3 {
                    l[(b + c, b + c)] -= k;
                    l[(bt + c, b + c)] += k;
                }
            }
        }
        l
    }
}

impl ModelFn for CestProfile {
    fn slots(&self) -> &[SlotSpec] {
        &self.slots
    }

    fn predict(&self, values: &[f64], offset: f64) -> f64 {
        let n = self.spin_offset();
        let ex = self.kinetics.exchange(&values[..n]);
        if offset <= REFERENCE_OFFSET {
            return ex.pa();
        }

        let cs_a = values[n];
        let mut dws = [0.0; 3];
        dws[1] = values[n + 1];
        if self.states == 3 {
            dws[2] = values[n + 2];
        }
        let r1 = values[n + self.states];
        let r2 = values[n + self.states + 1];

        let omega_a = (cs_a - self.carrier) * self.ppm_to_rads - 2.0 * PI * offset;
        let omegas: Vec<f64> = (0..self.states)
            .map(|s| omega_a + dws[s] * self.ppm_to_rads)
            .collect();

        let l = self.liouvillian(&ex, &omegas, r1, r2);

        let mut m0 = DVector::<f64>::zeros(1 + 3 * self.states);
        m0[0] = 1.0;
        for s in 0..self.states {
            m0[3 + 3 * s] = ex.populations[s];
        }

        let propagated = (l * self.time_t1).exp() * m0;
        propagated[3]
    }

    fn scaling(&self) -> Scaling {
        Scaling::Analytic
    }

    fn kinetics(&self) -> Option<Kinetics> {
        Some(self.kinetics)
    }

    fn check_x(&self, offset: f64) -> Result<(), String> {
        if offset.is_finite() {
            Ok(())
        } else {
            Err(format!("B1 offset must be finite, got {offset}"))
        }
    }

    fn keep_point(&self, values: &[f64], offset: f64) -> bool {
        if self.on_resonance_filter <= 0.0 || offset <= REFERENCE_OFFSET {
            return true;
        }
        let cs_a = values[self.spin_offset()];
        let nu = (cs_a - self.carrier) * self.ppm_to_rads / (2.0 * PI) - offset;
        nu.abs() > 0.5 * self.on_resonance_filter
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;

    use super::*;
    use crate::domain::{Conditions, Nucleus};

    fn context(filter: f64) -> ModelContext {
        let constants = BTreeMap::from([
            ("carrier".to_string(), 118.0),
            ("b1_frq".to_string(), 25.0),
            ("time_t1".to_string(), 0.5),
            ("on_resonance_filter".to_string(), filter),
        ]);
        ModelContext {
            key: "cest_2st".to_string(),
            origin: "cest.toml".to_string(),
            conditions: Conditions {
                h_larmor_frq: 600.0,
                temperature: 25.0,
                nucleus: Nucleus::N15,
                p_total: None,
                l_total: None,
            },
            kinetics: None,
            constants,
        }
    }

    // pb, kex_ab, cs_a, dw_ab, r1_a, r2_a
    const VALUES: [f64; 6] = [0.1, 200.0, 118.0, 5.0, 1.5, 10.0];

    #[test]
    fn reference_and_far_offsets() {
        let model = build_two_state(&context(0.0)).unwrap();
        assert_relative_eq!(model.predict(&VALUES, -2.0e4), 0.9);

        let no_exchange = [0.0, 0.0, 118.0, 0.0, 1.5, 10.0];
        assert_relative_eq!(model.predict(&no_exchange, 5000.0), 1.0, epsilon = 1e-2);
        assert!(model.predict(&no_exchange, 0.0) < 0.5);
    }

    #[test]
    fn minor_state_dip_is_visible() {
        let model = build_two_state(&context(0.0)).unwrap();
        let ppm_hz = 600.0 * Nucleus::N15.xi_ratio();
        let minor = 5.0 * ppm_hz;
        let at_minor = model.predict(&VALUES, minor);
        let mirrored = model.predict(&VALUES, -minor);
        assert!(at_minor < mirrored - 0.01, "{at_minor} vs {mirrored}");
    }

    #[test]
    fn three_state_reduces_to_two_state_without_c() {
        let two = build_two_state(&context(0.0)).unwrap();
        let mut ctx = context(0.0);
        ctx.key = "cest_3st".to_string();
        let three = build_three_state(&ctx).unwrap();
        // pb, pc, kex_ab, kex_bc, kex_ac, cs_a, dw_ab, dw_ac, r1_a, r2_a
        let values3 = [0.1, 0.0, 200.0, 0.0, 0.0, 118.0, 5.0, -3.0, 1.5, 10.0];
        for offset in [-300.0, 0.0, 150.0, 304.0] {
            assert_relative_eq!(
                two.predict(&VALUES, offset),
                three.predict(&values3, offset),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn on_resonance_filter_drops_central_points() {
        let model = build_two_state(&context(100.0)).unwrap();
        assert!(!model.keep_point(&VALUES, 10.0));
        assert!(model.keep_point(&VALUES, 80.0));
        assert!(model.keep_point(&VALUES, -2.0e4));
    }

    #[test]
    fn missing_constant_is_parse_error() {
        let mut ctx = context(0.0);
        ctx.constants.remove("b1_frq");
        let err = build_two_state(&ctx).unwrap_err();
        assert!(err.to_string().contains("b1_frq"));
    }
}
