//! CPMG relaxation dispersion.
//!
//! Observables are effective transverse relaxation rates `R2,eff` (s⁻¹) measured
//! against the CPMG pulsing frequency `ν_CPMG` (Hz).
//!
//! - `cpmg_2st_cr`: Carver–Richards closed form, valid at any exchange rate
//! - `cpmg_2st_fast`: Luz–Meiboom fast-exchange limit

use std::sync::Arc;

use crate::error::FitError;
use crate::models::{Kinetics, ModelContext, ModelFn, Scope, SlotSpec};

const SPIN_SLOTS: [SlotSpec; 2] = [
    SlotSpec::new("dw_ab", Scope::GroupTemperature, 0.0),
    SlotSpec::new("r2_a", Scope::GroupFieldTemperature, 10.0).min(0.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    CarverRichards,
    FastExchange,
}

#[derive(Debug)]
pub struct CpmgTwoState {
    regime: Regime,
    kinetics: Kinetics,
    slots: Vec<SlotSpec>,
    ppm_to_rads: f64,
}

pub fn build_carver_richards(ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
    Ok(Arc::new(CpmgTwoState::new(ctx, Regime::CarverRichards)?))
}

pub fn build_fast_exchange(ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
    Ok(Arc::new(CpmgTwoState::new(ctx, Regime::FastExchange)?))
}

impl CpmgTwoState {
    fn new(ctx: &ModelContext, regime: Regime) -> Result<Self, FitError> {
        let kinetics = Kinetics::from_context(ctx, 2)?;
        let mut slots = kinetics.slots().to_vec();
        slots.extend_from_slice(&SPIN_SLOTS);
        Ok(Self {
            regime,
            kinetics,
            slots,
            ppm_to_rads: ctx.conditions.ppm_to_rads(),
        })
    }
}

impl ModelFn for CpmgTwoState {
    fn slots(&self) -> &[SlotSpec] {
        &self.slots
    }

    fn predict(&self, values: &[f64], nu_cpmg: f64) -> f64 {
        let n = self.kinetics.slots().len();
        let ex = self.kinetics.exchange(&values[..n]);
        let dw = values[n] * self.ppm_to_rads;
        let r2 = values[n + 1];

        let (pa, pb) = (ex.pa(), ex.pb());
        let kex = ex.kex(0, 1);
        match self.regime {
            Regime::CarverRichards => carver_richards(r2, pa, pb, ex.rates[0][1], ex.rates[1][0], kex, dw, nu_cpmg),
            Regime::FastExchange => r2 + luz_meiboom(pa, pb, kex, dw, nu_cpmg),
        }
    }

    fn kinetics(&self) -> Option<Kinetics> {
        Some(self.kinetics)
    }

    fn check_x(&self, nu_cpmg: f64) -> Result<(), String> {
        if nu_cpmg > 0.0 && nu_cpmg.is_finite() {
            Ok(())
        } else {
            Err(format!("CPMG frequency must be positive, got {nu_cpmg}"))
        }
    }
}

/// Exact two-state `R2,eff`; both states share the intrinsic rate `r2`.
#[allow(clippy::too_many_arguments)]
fn carver_richards(r2: f64, pa: f64, pb: f64, kab: f64, kba: f64, kex: f64, dw: f64, nu: f64) -> f64 {
    let fact = kab - kba;
    let psi = fact * fact - dw * dw + 4.0 * pa * pb * kex * kex;
    let zeta = 2.0 * dw * fact;
    let root = (psi * psi + zeta * zeta).sqrt();

    // Without exchange or shift difference the dispersion term vanishes.
    if root == 0.0 {
        return r2;
    }

    let d_part = (psi + 2.0 * dw * dw) / root;
    let d_pos = 0.5 * (1.0 + d_part);
    let d_neg = 0.5 * (-1.0 + d_part);

    let eta_scale = 2.0_f64.powf(-1.5) / nu;
    let eta_pos = eta_scale * (psi + root).max(0.0).sqrt();
    let eta_neg = eta_scale * (-psi + root).max(0.0).sqrt();

    let arg = (d_pos * eta_pos.cosh() - d_neg * eta_neg.cos()).max(1.0);
    r2 + 0.5 * kex - nu * arg.acosh()
}

/// Exchange contribution in the fast-exchange limit.
fn luz_meiboom(pa: f64, pb: f64, kex: f64, dw: f64, nu: f64) -> f64 {
    if kex <= 0.0 {
        return 0.0;
    }
    let phi = pa * pb * dw * dw;
    let x = kex / (4.0 * nu);
    phi / kex * (1.0 - x.tanh() / x)
}
