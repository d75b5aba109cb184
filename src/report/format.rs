//! Terminal output.
//!
//! Formatting lives in one place so the fitting code stays clean and output
//! changes are localized.

use crate::domain::FitConfig;
use crate::fit::{FitResult, FittedParameter, PointResidual};

/// Format the run summary: stages, parameter table and goodness of fit.
pub fn format_fit_summary(result: &FitResult, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== chemex - global fit ===\n");
    out.push_str(&format!("Experiments: {}\n", config.experiments.len()));
    if !config.exclude.is_empty() {
        out.push_str(&format!("Excluded: {}\n", config.exclude.join(", ")));
    }
    if !config.include.is_empty() {
        out.push_str(&format!("Included: {}\n", config.include.join(", ")));
    }
    out.push_str(&format!(
        "Points: n={} | free={} | dof={}\n",
        result.statistics.n_points, result.statistics.n_free, result.statistics.dof
    ));

    out.push_str("\nStages:\n");
    for s in &result.stages {
        let mark = if s.converged { "*" } else { "!" };
        out.push_str(&format!(
            "{mark} {:>2}. {:<28} free={:<4} clusters={:<4} iter={:<4} chisqr={:.4} ({})\n",
            s.index,
            truncate(&s.name, 28),
            s.n_free,
            s.clusters,
            s.iterations,
            s.chisqr,
            s.termination
        ));
    }

    out.push_str("\nParameters:\n");
    out.push_str(&format_parameter_table(&result.parameters));

    out.push_str("\nGoodness of fit:\n");
    let stats = &result.statistics;
    out.push_str(&format!("- chisqr : {:.4}\n", stats.chisqr));
    match stats.redchi {
        Some(r) => out.push_str(&format!("- redchi : {r:.4}\n")),
        None => out.push_str("- redchi : n/a\n"),
    }
    out.push_str(&format!("- AIC    : {:.4}\n", stats.aic));
    out.push_str(&format!("- BIC    : {:.4}\n", stats.bic));

    if let Some(failure) = &result.failure {
        out.push_str(&format!("\nWARNING: {failure}\n"));
    }
    out.push('\n');

    out
}

fn format_parameter_table(rows: &[FittedParameter]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<12} {:<14} {:>7} {:>7} {:>14} {:>12} {:<5}\n",
            "name", "group", "B0", "T", "value", "error", "fixed"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<12} {:-<14} {:-<7} {:-<7} {:-<14} {:-<12} {:-<5}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for p in rows {
        out.push_str(
            format!(
                "{:<12} {:<14} {:>7} {:>7} {:>14.6} {:>12} {:<5}\n",
                truncate(&p.name, 12),
                truncate(p.group.as_deref().unwrap_or("-"), 14),
                p.b0.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string()),
                p.temperature.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string()),
                p.value,
                p.error.map(|e| format!("{e:.6}")).unwrap_or_else(|| "-".to_string()),
                if p.fixed {
                    "yes"
                } else if p.derived {
                    "calc"
                } else {
                    ""
                },
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Format the points with the largest normalized residuals.
pub fn format_worst_residuals(rows: &[PointResidual]) -> String {
    let mut out = String::new();
    out.push_str("Largest residuals:\n");
    out.push_str(
        format!(
            "{:<32} {:>10} {:>12} {:>12} {:>10}\n",
            "dataset", "x", "observed", "calculated", "residual"
        )
        .trim_end(),
    );
    out.push('\n');
    for r in rows {
        out.push_str(
            format!(
                "{:<32} {:>10.3} {:>12.4} {:>12.4} {:>10.3}\n",
                truncate(&r.dataset, 32),
                r.x,
                r.observed,
                r.calculated,
                r.residual
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// One line per written experiment for `chemex simulate`.
pub fn format_simulation_summary(experiments: usize, datasets: usize, points: usize, noiseless: bool) -> String {
    format!(
        "=== chemex - simulation ===\nExperiments: {experiments} | datasets: {datasets} | points: {points} | noise: {}\n",
        if noiseless { "none" } else { "gaussian" }
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvaluationOrder, ParamName};
    use crate::fit::{EngineState, Statistics};
    use crate::params::ParameterRegistry;
    use crate::params::ParamDescriptor;
    use chrono::Utc;
    use std::path::PathBuf;

    fn result() -> FitResult {
        let mut registry = ParameterRegistry::new();
        let id = registry
            .register(ParamDescriptor::explicit(ParamName::new("pb").with_temperature(25.0), "p.toml").with_value(0.05))
            .unwrap();
        let mut p = FittedParameter::new(id, registry.get(id), 0.0512, false);
        p.error = Some(0.0021);
        FitResult {
            parameters: vec![p],
            residuals: vec![
                PointResidual {
                    dataset: "cpmg/32N-HN".to_string(),
                    group: "32N-HN".to_string(),
                    x: 50.0,
                    observed: 12.0,
                    error: 0.3,
                    calculated: 12.3,
                    residual: 1.0,
                },
                PointResidual {
                    dataset: "cpmg/32N-HN".to_string(),
                    group: "32N-HN".to_string(),
                    x: 100.0,
                    observed: 11.0,
                    error: 0.3,
                    calculated: 10.1,
                    residual: -3.0,
                },
            ],
            statistics: Statistics::compute(&[1.0, -3.0], 1),
            stages: Vec::new(),
            transitions: vec![EngineState::Idle, EngineState::Done],
            failure: None,
            timestamp: Utc::now(),
        }
    }

    fn config() -> FitConfig {
        FitConfig {
            experiments: vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")],
            parameters: Vec::new(),
            method: None,
            output: PathBuf::from("out"),
            exclude: vec!["32N-HN".to_string()],
            include: Vec::new(),
            order: EvaluationOrder::Parallel,
            quiet: false,
        }
    }

    #[test]
    fn summary_lists_parameters_and_statistics() {
        let text = format_fit_summary(&result(), &config());
        assert!(text.contains("Experiments: 2"));
        assert!(text.contains("Excluded: 32N-HN"));
        assert!(text.contains("0.051200"));
        assert!(text.contains("0.002100"));
        assert!(text.contains("chisqr : 10.0000"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn worst_residuals_rank_by_magnitude() {
        let worst = crate::report::worst_residuals(&result(), 1);
        assert_eq!(worst.len(), 1);
        assert_eq!(worst[0].x, 100.0);
        assert!(format_worst_residuals(&worst).contains("cpmg/32N-HN"));
    }
}
