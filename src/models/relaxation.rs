//! Longitudinal relaxation decay `I(t) = s · exp(-R1 · t)`.

use std::sync::Arc;

use crate::error::FitError;
use crate::models::{ModelContext, ModelFn, Scaling, Scope, SlotSpec};

const SLOTS: [SlotSpec; 1] = [SlotSpec::new("r1_a", Scope::GroupFieldTemperature, 1.0).min(0.0)];

#[derive(Debug)]
pub struct R1Decay;

pub fn build_r1_decay(ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
    if let Some(kinetics) = &ctx.kinetics {
        return Err(FitError::UnknownModel {
            key: format!("{}/{kinetics}", ctx.key),
            origin: ctx.origin.clone(),
        });
    }
    Ok(Arc::new(R1Decay))
}

impl ModelFn for R1Decay {
    fn slots(&self) -> &[SlotSpec] {
        &SLOTS
    }

    fn predict(&self, values: &[f64], delay: f64) -> f64 {
        (-values[0] * delay).exp()
    }

    fn scaling(&self) -> Scaling {
        Scaling::Analytic
    }

    fn check_x(&self, delay: f64) -> Result<(), String> {
        if delay >= 0.0 && delay.is_finite() {
            Ok(())
        } else {
            Err(format!("relaxation delay must be non-negative, got {delay}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_from_one() {
        let model = R1Decay;
        assert_eq!(model.predict(&[2.0], 0.0), 1.0);
        assert!((model.predict(&[2.0], 0.5) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(model.check_x(-0.1).is_err());
    }
}
