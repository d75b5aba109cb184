//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - written to parameter/residual/statistics files
//! - reloaded later as parameter descriptors

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Residue/spin label used for parameter sharing and selection filters.
///
/// Labels are case-insensitive; they are stored upper-cased (`32n-hn` → `32N-HN`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    pub fn new(label: &str) -> Self {
        Self(label.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GroupId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(value: GroupId) -> Self {
        value.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A physical qualifier (temperature in °C, B0 in MHz) stored in milli-units so
/// that sharing-class identities can be hashed and compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qualifier(i64);

impl Qualifier {
    pub fn from_f64(value: f64) -> Self {
        Self((value * 1000.0).round() as i64)
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

/// Sharing-class identity of a parameter.
///
/// Two parameters with the same `ParamName` are the same optimization variable,
/// whichever datasets reference them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamName {
    pub name: String,
    pub group: Option<GroupId>,
    pub temperature: Option<Qualifier>,
    pub b0: Option<Qualifier>,
}

impl ParamName {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            group: None,
            temperature: None,
            b0: None,
        }
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(Qualifier::from_f64(celsius));
        self
    }

    pub fn with_b0(mut self, mhz: f64) -> Self {
        self.b0 = Some(Qualifier::from_f64(mhz));
        self
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(group) = &self.group {
            write!(f, ", GRP->{group}")?;
        }
        if let Some(b0) = self.b0 {
            write!(f, ", B0->{b0}MHz")?;
        }
        if let Some(t) = self.temperature {
            write!(f, ", T->{t}C")?;
        }
        Ok(())
    }
}

/// Closed interval `[min, max]`; infinite ends mean "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min: min.unwrap_or(f64::NEG_INFINITY),
            max: max.unwrap_or(f64::INFINITY),
        }
    }

    /// Intersection of two intervals, `None` when empty.
    pub fn intersect(&self, other: &Bounds) -> Option<Bounds> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        if min <= max { Some(Bounds { min, max }) } else { None }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Observed nucleus, used to convert ppm to rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nucleus {
    #[serde(rename = "1H")]
    H1,
    #[serde(rename = "13C")]
    C13,
    #[serde(rename = "15N")]
    N15,
    #[serde(rename = "19F")]
    F19,
    #[serde(rename = "31P")]
    P31,
}

impl Nucleus {
    /// Ratio of the nucleus' resonance frequency to the ¹H frequency.
    pub fn xi_ratio(self) -> f64 {
        match self {
            Nucleus::H1 => 1.0,
            Nucleus::C13 => 0.251_450_20,
            Nucleus::N15 => 0.101_367_67,
            Nucleus::F19 => 0.940_940_11,
            Nucleus::P31 => 0.404_807_42,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "1H" | "H" | "H1" => Some(Nucleus::H1),
            "13C" | "C" | "C13" => Some(Nucleus::C13),
            "15N" | "N" | "N15" => Some(Nucleus::N15),
            "19F" | "F" | "F19" => Some(Nucleus::F19),
            "31P" | "P" | "P31" => Some(Nucleus::P31),
            _ => None,
        }
    }
}

/// Experiment-level conditions shared by every point of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    /// ¹H Larmor frequency (MHz).
    pub h_larmor_frq: f64,
    /// Sample temperature (°C).
    pub temperature: f64,
    pub nucleus: Nucleus,
    /// Total protein concentration (binding kinetics only).
    pub p_total: Option<f64>,
    /// Total ligand concentration (binding kinetics only).
    pub l_total: Option<f64>,
}

impl Conditions {
    /// rad/s per ppm for the observed nucleus.
    pub fn ppm_to_rads(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.h_larmor_frq * self.nucleus.xi_ratio()
    }

    pub fn temperature_kelvin(&self) -> f64 {
        self.temperature + 273.15
    }
}

/// Order in which per-dataset residual blocks are computed.
///
/// Whatever the order, each block is written at its fixed offset of the global
/// residual vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationOrder {
    #[default]
    Parallel,
    Forward,
    Reverse,
}

/// A full `chemex fit` run as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub experiments: Vec<PathBuf>,
    pub parameters: Vec<PathBuf>,
    pub method: Option<PathBuf>,
    pub output: PathBuf,

    /// Groups removed from the fit (`-r`).
    pub exclude: Vec<String>,
    /// Groups kept in the fit (`+r`).
    pub include: Vec<String>,

    pub order: EvaluationOrder,
    /// Disable the terminal summary.
    pub quiet: bool,
}

/// A `chemex simulate` run.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub experiments: Vec<PathBuf>,
    pub parameters: Vec<PathBuf>,
    pub output: PathBuf,
    pub seed: u64,
    /// Skip the noise step and write exact back-calculated values.
    pub noiseless: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ids_are_case_insensitive() {
        assert_eq!(GroupId::new("32n-hn"), GroupId::new("32N-HN"));
    }

    #[test]
    fn param_name_display_lists_qualifiers() {
        let name = ParamName::new("R2_A")
            .with_group(GroupId::new("32N-HN"))
            .with_b0(600.0)
            .with_temperature(25.0);
        assert_eq!(name.to_string(), "r2_a, GRP->32N-HN, B0->600.0MHz, T->25.0C");
    }

    #[test]
    fn bounds_intersection() {
        let a = Bounds::new(Some(0.0), Some(0.3));
        let b = Bounds::new(Some(0.1), None);
        assert_eq!(a.intersect(&b), Some(Bounds { min: 0.1, max: 0.3 }));

        let c = Bounds::new(Some(0.5), Some(0.6));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn qualifiers_compare_exactly() {
        assert_eq!(Qualifier::from_f64(25.0), Qualifier::from_f64(25.0000001));
        assert_ne!(Qualifier::from_f64(25.0), Qualifier::from_f64(25.1));
    }
}
