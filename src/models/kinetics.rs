//! Exchange kinetics.
//!
//! A kinetics model turns its own parameters into state populations and
//! pairwise rate constants at the dataset's temperature. Experiment models put the
//! kinetics slots first, followed by their spin parameters.

use crate::domain::Conditions;
use crate::error::FitError;
use crate::models::{ModelContext, Scope, SlotSpec};

/// Gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_618;
/// Boltzmann constant, J/K.
pub const BOLTZMANN: f64 = 1.380_649e-23;
/// Planck constant, J·s.
pub const PLANCK: f64 = 6.626_070_15e-34;

const KELVIN: f64 = 273.15;

/// Populations and rate constants, `rates[i][j]` being the i → j rate (s⁻¹).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exchange {
    pub populations: [f64; 3],
    pub rates: [[f64; 3]; 3],
}

impl Exchange {
    pub fn two_state(pb: f64, kex: f64) -> Self {
        let pa = 1.0 - pb;
        let mut rates = [[0.0; 3]; 3];
        rates[0][1] = kex * pb;
        rates[1][0] = kex * pa;
        Self {
            populations: [pa, pb, 0.0],
            rates,
        }
    }

    /// Split each pairwise `kex` into forward/backward rates by detailed balance.
    pub fn three_state(pb: f64, pc: f64, kex_ab: f64, kex_bc: f64, kex_ac: f64) -> Self {
        let pa = 1.0 - pb - pc;
        let p = [pa, pb, pc];
        let mut rates = [[0.0; 3]; 3];
        for (i, j, kex) in [(0, 1, kex_ab), (1, 2, kex_bc), (0, 2, kex_ac)] {
            let total = p[i] + p[j];
            if total > 0.0 {
                rates[i][j] = kex * p[j] / total;
                rates[j][i] = kex * p[i] / total;
            }
        }
        Self {
            populations: p,
            rates,
        }
    }

    pub fn pa(&self) -> f64 {
        self.populations[0]
    }

    pub fn pb(&self) -> f64 {
        self.populations[1]
    }

    /// `k_ij + k_ji`.
    pub fn kex(&self, i: usize, j: usize) -> f64 {
        self.rates[i][j] + self.rates[j][i]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kinetics {
    TwoStatePbKex,
    TwoStateEyring { kelvin: f64 },
    TwoStateTemperature { kelvin: f64 },
    TwoStateKabKd { p_total: f64, l_total: f64 },
    TwoStateKonKoff { p_total: f64, l_total: f64 },
    ThreeStatePbKex,
    ThreeStateTemperature { kelvin: f64 },
}

const PB_KEX_2ST: &[SlotSpec] = &[
    SlotSpec::new("pb", Scope::Temperature, 0.05).range(0.0, 1.0),
    SlotSpec::new("kex_ab", Scope::Temperature, 200.0).min(0.0),
];

const EYRING_2ST: &[SlotSpec] = &[
    SlotSpec::new("dh_b", Scope::Global, 6.5e3),
    SlotSpec::new("ds_b", Scope::Global, 0.0).fixed(),
    SlotSpec::new("dh_ab", Scope::Global, 6.5e4),
    SlotSpec::new("ds_ab", Scope::Global, 0.0).fixed(),
];

const TEMPERATURE_2ST: &[SlotSpec] = &[
    SlotSpec::new("t0", Scope::Global, 25.0).fixed(),
    SlotSpec::new("pb0", Scope::Global, 0.05).range(0.0, 1.0),
    SlotSpec::new("kex0", Scope::Global, 100.0).min(0.0),
    SlotSpec::new("dh_ab", Scope::Global, 0.0),
    SlotSpec::new("dh_ats", Scope::Global, 10.0).min(0.0),
];

const KAB_KD_2ST: &[SlotSpec] = &[
    SlotSpec::new("kab", Scope::Temperature, 1.0e9).min(0.0),
    SlotSpec::new("kd_ab", Scope::Temperature, 100.0).min(0.0),
];

const KON_KOFF_2ST: &[SlotSpec] = &[
    SlotSpec::new("kon", Scope::Temperature, 1.0e9).min(0.0),
    SlotSpec::new("koff", Scope::Temperature, 1.0e2).min(0.0),
];

const PB_KEX_3ST: &[SlotSpec] = &[
    SlotSpec::new("pb", Scope::Temperature, 0.05).range(0.0, 1.0),
    SlotSpec::new("pc", Scope::Temperature, 0.05).range(0.0, 1.0),
    SlotSpec::new("kex_ab", Scope::Temperature, 200.0).min(0.0),
    SlotSpec::new("kex_bc", Scope::Temperature, 200.0).min(0.0),
    SlotSpec::new("kex_ac", Scope::Temperature, 0.0).min(0.0).fixed(),
];

const TEMPERATURE_3ST: &[SlotSpec] = &[
    SlotSpec::new("t0", Scope::Global, 25.0).fixed(),
    SlotSpec::new("pb0", Scope::Global, 0.05).range(0.0, 1.0),
    SlotSpec::new("pc0", Scope::Global, 0.05).range(0.0, 1.0),
    SlotSpec::new("kexab0", Scope::Global, 100.0).min(0.0),
    SlotSpec::new("kexbc0", Scope::Global, 100.0).min(0.0),
    SlotSpec::new("kexac0", Scope::Global, 0.0).min(0.0).fixed(),
    SlotSpec::new("dh_ab", Scope::Global, 0.0).range(-200.0, 200.0),
    SlotSpec::new("dh_ac", Scope::Global, 0.0).range(-200.0, 200.0),
    SlotSpec::new("dh_tsab", Scope::Global, 10.0).range(0.0, 200.0),
    SlotSpec::new("dh_tsbc", Scope::Global, 10.0).range(0.0, 200.0),
    SlotSpec::new("dh_tsac", Scope::Global, 10.0).range(0.0, 200.0).fixed(),
];

impl Kinetics {
    /// Resolve the kinetics named in a descriptor for a model with `states` states.
    ///
    /// Without a name, `2st.pb_kex` / `3st.pb_kex` is used.
    pub fn from_context(ctx: &ModelContext, states: usize) -> Result<Self, FitError> {
        let name = match ctx.kinetics.as_deref() {
            Some(name) => name.trim().to_lowercase(),
            None => format!("{states}st.pb_kex"),
        };
        let unknown = || FitError::UnknownModel {
            key: format!("{}/{name}", ctx.key),
            origin: ctx.origin.clone(),
        };

        let cond = &ctx.conditions;
        let kinetics = match name.as_str() {
            "2st.pb_kex" => Kinetics::TwoStatePbKex,
            "2st.eyring" => Kinetics::TwoStateEyring {
                kelvin: cond.temperature_kelvin(),
            },
            "2st.temperature" => Kinetics::TwoStateTemperature {
                kelvin: cond.temperature_kelvin(),
            },
            "2st.kab_kd" | "2st.kon_koff" => {
                let (p_total, l_total) = binding_concentrations(ctx, cond, &name)?;
                if name == "2st.kab_kd" {
                    Kinetics::TwoStateKabKd { p_total, l_total }
                } else {
                    Kinetics::TwoStateKonKoff { p_total, l_total }
                }
            }
            "3st.pb_kex" => Kinetics::ThreeStatePbKex,
            "3st.temperature" => Kinetics::ThreeStateTemperature {
                kelvin: cond.temperature_kelvin(),
            },
            _ => return Err(unknown()),
        };

        if kinetics.states() != states {
            return Err(unknown());
        }
        Ok(kinetics)
    }

    pub fn states(&self) -> usize {
        match self {
            Kinetics::ThreeStatePbKex | Kinetics::ThreeStateTemperature { .. } => 3,
            _ => 2,
        }
    }

    pub fn slots(&self) -> &'static [SlotSpec] {
        match self {
            Kinetics::TwoStatePbKex => PB_KEX_2ST,
            Kinetics::TwoStateEyring { .. } => EYRING_2ST,
            Kinetics::TwoStateTemperature { .. } => TEMPERATURE_2ST,
            Kinetics::TwoStateKabKd { .. } => KAB_KD_2ST,
            Kinetics::TwoStateKonKoff { .. } => KON_KOFF_2ST,
            Kinetics::ThreeStatePbKex => PB_KEX_3ST,
            Kinetics::ThreeStateTemperature { .. } => TEMPERATURE_3ST,
        }
    }

    /// Populations and rates reported next to the fitted parameters, keyed by
    /// temperature. Empty when they are fitted directly (`*.pb_kex`).
    pub fn derived(&self, values: &[f64]) -> Vec<(&'static str, f64)> {
        let ex = self.exchange(values);
        match *self {
            Kinetics::TwoStatePbKex | Kinetics::ThreeStatePbKex => Vec::new(),
            Kinetics::ThreeStateTemperature { .. } => vec![
                ("pb", ex.populations[1]),
                ("pc", ex.populations[2]),
                ("kex_ab", ex.kex(0, 1)),
                ("kex_bc", ex.kex(1, 2)),
                ("kex_ac", ex.kex(0, 2)),
            ],
            Kinetics::TwoStateKonKoff { .. } => {
                let (kon, koff) = (values[0], values[1]);
                let kd = if kon > 0.0 { koff / kon } else { f64::INFINITY };
                vec![("kd", kd), ("pb", ex.pb()), ("kex_ab", ex.kex(0, 1))]
            }
            _ => vec![("pb", ex.pb()), ("kex_ab", ex.kex(0, 1))],
        }
    }

    /// Populations and rates from the kinetics slot values (`values[..slots().len()]`).
    pub fn exchange(&self, values: &[f64]) -> Exchange {
        match *self {
            Kinetics::TwoStatePbKex => Exchange::two_state(values[0], values[1]),
            Kinetics::TwoStateEyring { kelvin } => {
                let (dh_b, ds_b, dh_ab, ds_ab) = (values[0], values[1], values[2], values[3]);
                let rt = GAS_CONSTANT * kelvin;
                let kbt_h = BOLTZMANN * kelvin / PLANCK;
                let k_eq = ((dh_b - kelvin * ds_b) / rt).exp();
                let pb = 1.0 / (1.0 + k_eq);
                let kex = kbt_h * (-(dh_ab - kelvin * ds_ab) / rt).exp() * (1.0 + k_eq);
                Exchange::two_state(pb, kex)
            }
            Kinetics::TwoStateTemperature { kelvin } => {
                let (t0, pb0, kex0, dh_ab, dh_ats) =
                    (values[0], values[1], values[2], values[3], values[4]);
                let f = van_t_hoff_factor(kelvin, t0);
                // K0 = pb0 / pa0, not pb0 / (1 + pb0), so that pb(t0) == pb0.
                let k0 = pb0 / (1.0 - pb0);
                let k = k0 * (-dh_ab * f).exp();
                let pb = k / (1.0 + k);
                let kex = kex0 * (-dh_ats * f).exp() * (pb0 + (1.0 - pb0) * (dh_ab * f).exp());
                Exchange::two_state(pb, kex)
            }
            Kinetics::TwoStateKabKd { p_total, l_total } => {
                let (kab, kd) = (values[0], values[1]);
                let l_free = free_ligand(p_total, l_total, kd);
                Exchange::two_state((l_total - l_free) / p_total, (l_free + kd) * kab)
            }
            Kinetics::TwoStateKonKoff { p_total, l_total } => {
                let (kon, koff) = (values[0], values[1]);
                let kd = if kon > 0.0 { koff / kon } else { f64::INFINITY };
                let l_free = free_ligand(p_total, l_total, kd);
                Exchange::two_state((l_total - l_free) / p_total, l_free * kon + koff)
            }
            Kinetics::ThreeStatePbKex => {
                Exchange::three_state(values[0], values[1], values[2], values[3], values[4])
            }
            Kinetics::ThreeStateTemperature { kelvin } => {
                let [t0, pb0, pc0, kexab0, kexbc0, kexac0, dh_ab, dh_ac, dh_tsab, dh_tsbc, dh_tsac] =
                    [
                        values[0], values[1], values[2], values[3], values[4], values[5],
                        values[6], values[7], values[8], values[9], values[10],
                    ];
                let f = van_t_hoff_factor(kelvin, t0);
                let pa0 = 1.0 - pb0 - pc0;
                let k_ab = pb0 / pa0 * (-dh_ab * f).exp();
                let k_ac = pc0 / pa0 * (-dh_ac * f).exp();
                let pb = k_ab / (1.0 + k_ab + k_ac);
                let pc = k_ac / (1.0 + k_ab + k_ac);

                let kex_ab = kexab0
                    * (-dh_tsab * f).exp()
                    * (pb0 / (1.0 - pc0) + pa0 / (1.0 - pc0) * (dh_ab * f).exp());
                let kex_bc = kexbc0
                    * (-dh_tsbc * f).exp()
                    * (pc0 / (pb0 + pc0) * (dh_ab * f).exp() + pb0 / (pb0 + pc0) * (dh_ac * f).exp());
                let kex_ac = kexac0
                    * (-dh_tsac * f).exp()
                    * (pc0 / (1.0 - pb0) + pa0 / (1.0 - pb0) * (dh_ac * f).exp());
                Exchange::three_state(pb, pc, kex_ab, kex_bc, kex_ac)
            }
        }
    }
}

/// `(1/T − 1/T0) / R` with enthalpies in kJ/mol and `t0` in °C.
fn van_t_hoff_factor(kelvin: f64, t0_celsius: f64) -> f64 {
    (1.0 / kelvin - 1.0 / (t0_celsius + KELVIN)) / (GAS_CONSTANT * 1e-3)
}

/// Free ligand concentration of a 1:1 binding equilibrium.
fn free_ligand(p_total: f64, l_total: f64, kd: f64) -> f64 {
    if !kd.is_finite() {
        return l_total;
    }
    let b = l_total - p_total - kd;
    0.5 * (b + (b * b + 4.0 * kd * l_total).sqrt())
}

fn binding_concentrations(
    ctx: &ModelContext,
    cond: &Conditions,
    name: &str,
) -> Result<(f64, f64), FitError> {
    match (cond.p_total, cond.l_total) {
        (Some(p), Some(l)) if p > 0.0 && l >= 0.0 => Ok((p, l)),
        _ => Err(FitError::parse(
            ctx.origin.clone(),
            format!("kinetics '{name}' requires conditions p_total > 0 and l_total >= 0"),
        )),
    }
}
