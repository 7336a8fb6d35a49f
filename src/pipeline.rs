//! Filter then redistribute, with the oracle released on every exit path.

use crate::config::types::Result;
use crate::distribution::Distribution;
use crate::filter::{filter, FilterSummary};
use crate::oracle::DecisionOracle;
use crate::redistribution::{redistribute, RedistributionLaw};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Successful redistribution
#[derive(Clone, Debug)]
pub struct RunReport {
    pub output: Distribution,
    pub filter: FilterSummary,
    pub law: String,
    /// Rows the law added beyond the accepted ones
    pub synthetic_rows: usize,
    pub output_mass: f64,
    pub relaunches: u32,
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Redistributed(RunReport),
    /// No probability mass survived; there is no output distribution.
    Degenerate(FilterSummary),
}

impl RunOutcome {
    pub fn filter_summary(&self) -> &FilterSummary {
        match self {
            RunOutcome::Redistributed(report) => &report.filter,
            RunOutcome::Degenerate(summary) => summary,
        }
    }

    pub fn output(&self) -> Option<&Distribution> {
        match self {
            RunOutcome::Redistributed(report) => Some(&report.output),
            RunOutcome::Degenerate(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Redistributed,
    Degenerate,
}

/// Machine-readable account of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub mode: String,
    pub invert: bool,
    pub outcome: OutcomeKind,
    pub input_rows: usize,
    pub accepted_rows: usize,
    pub synthetic_rows: usize,
    pub output_rows: usize,
    pub total_mass: f64,
    pub filtered_mass: f64,
    pub surplus: f64,
    pub output_mass: Option<f64>,
    pub oracle_relaunches: u32,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome, mode: &str, invert: bool, relaunches: u32) -> Self {
        let f = outcome.filter_summary();
        let (kind, synthetic_rows, output_rows, output_mass) = match outcome {
            RunOutcome::Redistributed(report) => (
                OutcomeKind::Redistributed,
                report.synthetic_rows,
                report.output.len(),
                Some(report.output_mass),
            ),
            RunOutcome::Degenerate(_) => (OutcomeKind::Degenerate, 0, 0, None),
        };
        Self {
            timestamp: Utc::now(),
            mode: mode.to_string(),
            invert,
            outcome: kind,
            input_rows: f.input_rows,
            accepted_rows: f.accepted_rows,
            synthetic_rows,
            output_rows,
            total_mass: f.total_mass,
            filtered_mass: f.filtered_mass,
            surplus: f.surplus,
            output_mass,
            oracle_relaunches: relaunches,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::config::types::FilterError::Config(format!("Failed to encode summary: {}", e))
        })
    }
}

/// Run the filter stage and, unless degenerate, the redistribution law.
///
/// `oracle.finish()` is called before returning, whether the run succeeded,
/// was degenerate or failed.
pub fn run(
    distribution: Distribution,
    oracle: &mut dyn DecisionOracle,
    law: &dyn RedistributionLaw,
    invert: bool,
) -> Result<RunOutcome> {
    let filtered = filter(distribution, oracle, invert);
    let relaunches = oracle.relaunch_count();
    oracle.finish();
    let result = filtered?;

    let summary = result.summary();
    if result.is_degenerate() {
        info!(
            "All probability mass was filtered out ({} of {} rows kept); nothing to redistribute",
            summary.accepted_rows, summary.input_rows
        );
        return Ok(RunOutcome::Degenerate(summary));
    }

    let accepted_rows = result.accepted.len();
    let output = redistribute(result, law)?;
    let output_mass = output.total_mass();
    info!(
        "Mode '{}' produced {} rows with mass {:.6}",
        law.name(),
        output.len(),
        output_mass
    );

    Ok(RunOutcome::Redistributed(RunReport {
        synthetic_rows: output.len().saturating_sub(accepted_rows),
        output_mass,
        output,
        filter: summary,
        law: law.name().to_string(),
        relaunches,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::FilterError;
    use crate::oracle::from_fn;
    use crate::redistribution::laws::{ConvergentLaw, ExtraneousLaw};

    struct Tracked<O> {
        inner: O,
        finished: usize,
    }

    impl<O: DecisionOracle> DecisionOracle for Tracked<O> {
        fn decide(&mut self, password: &str) -> Result<bool> {
            self.inner.decide(password)
        }

        fn finish(&mut self) {
            self.finished += 1;
        }
    }

    fn reference() -> Distribution {
        Distribution::from_pairs(&[("aaaaaa", 0.5), ("Xy9!", 0.3), ("bbbb", 0.2)]).unwrap()
    }

    #[test]
    fn reference_example_redistributes_to_one_row() {
        let mut oracle = Tracked {
            inner: from_fn(|pw: &str| pw.chars().count() >= 5),
            finished: 0,
        };
        let outcome = run(reference(), &mut oracle, &ConvergentLaw, false).unwrap();
        assert_eq!(oracle.finished, 1);

        let RunOutcome::Redistributed(report) = outcome else {
            panic!("expected redistribution");
        };
        assert_eq!(report.output.len(), 1);
        assert!((report.output_mass - 1.0).abs() < 1e-12);
        assert_eq!(report.synthetic_rows, 0);
        assert_eq!(report.law, "convergent");
    }

    #[test]
    fn degenerate_run_has_no_output() {
        let mut oracle = Tracked {
            inner: from_fn(|_: &str| false),
            finished: 0,
        };
        let outcome = run(reference(), &mut oracle, &ConvergentLaw, false).unwrap();
        assert_eq!(oracle.finished, 1);
        assert!(outcome.output().is_none());
        assert_eq!(outcome.filter_summary().rejected_rows, 3);

        let summary = RunSummary::from_outcome(&outcome, "convergent", false, 0);
        assert_eq!(summary.outcome, OutcomeKind::Degenerate);
        assert!(summary.output_mass.is_none());
    }

    #[test]
    fn oracle_is_finished_when_filtering_fails() {
        struct Broken;
        impl DecisionOracle for Broken {
            fn decide(&mut self, _: &str) -> Result<bool> {
                Err(FilterError::OracleUnavailable("down".to_string()))
            }
        }
        let mut oracle = Tracked {
            inner: Broken,
            finished: 0,
        };
        assert!(run(reference(), &mut oracle, &ConvergentLaw, false).is_err());
        assert_eq!(oracle.finished, 1);
    }

    #[test]
    fn summary_counts_synthetic_rows() {
        let d = Distribution::from_pairs(&[("keep", 0.25), ("drop", 0.75)]).unwrap();
        let mut oracle = from_fn(|pw: &str| pw == "keep");
        let law = ExtraneousLaw::new(10, Some(9));
        let outcome = run(d, &mut oracle, &law, false).unwrap();

        let summary = RunSummary::from_outcome(&outcome, "extraneous", false, 0);
        assert_eq!(summary.synthetic_rows, 3);
        assert_eq!(summary.output_rows, 4);
        assert_eq!(summary.outcome, OutcomeKind::Redistributed);

        let json = summary.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["outcome"], "redistributed");
        assert_eq!(value["synthetic_rows"], 3);
    }
}
