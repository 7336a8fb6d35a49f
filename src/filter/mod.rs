//! Filter stage
//!
//! Classifies every row of a distribution with a [`DecisionOracle`] and
//! accounts for the probability mass that was filtered out.

use crate::config::types::{FilterError, Result};
use crate::distribution::Distribution;
use crate::oracle::DecisionOracle;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Relative slack for floating-point noise in the surplus.
pub const MASS_TOLERANCE: f64 = 1e-9;

/// Accepted rows plus the mass bookkeeping for redistribution
#[derive(Clone, Debug)]
pub struct FilterResult {
    pub accepted: Distribution,
    pub rejected: Distribution,
    pub total_mass: f64,
    pub filtered_mass: f64,
    pub surplus: f64,
}

impl FilterResult {
    /// Account for a split of rows whose input summed to `total_mass`.
    ///
    /// A surplus below zero beyond floating-point noise means the accepted
    /// rows carry more mass than the input had; it is reported, not clamped.
    pub fn from_split(
        accepted: Distribution,
        rejected: Distribution,
        total_mass: f64,
    ) -> Result<Self> {
        let filtered_mass = accepted.total_mass();
        let surplus = total_mass - filtered_mass;
        if surplus < -(MASS_TOLERANCE * total_mass.max(1.0)) {
            return Err(FilterError::NegativeSurplus {
                total: total_mass,
                filtered: filtered_mass,
                surplus,
            });
        }
        Ok(Self {
            accepted,
            rejected,
            total_mass,
            filtered_mass,
            surplus,
        })
    }

    /// Nothing (or only zero-probability rows) survived, so there is
    /// nowhere to place the surplus.
    pub fn is_degenerate(&self) -> bool {
        self.filtered_mass == 0.0
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            input_rows: self.accepted.len() + self.rejected.len(),
            accepted_rows: self.accepted.len(),
            rejected_rows: self.rejected.len(),
            total_mass: self.total_mass,
            filtered_mass: self.filtered_mass,
            surplus: self.surplus,
        }
    }
}

/// Row and mass counts of a filter pass
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilterSummary {
    pub input_rows: usize,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    pub total_mass: f64,
    pub filtered_mass: f64,
    pub surplus: f64,
}

/// Split `distribution` into accepted and rejected rows.
///
/// A row is kept when `invert XOR oracle.decide(password)`. Rows are asked
/// about in probability-descending order and both outputs stay sorted. Any
/// oracle error aborts the pass; no partial result is returned.
pub fn filter(
    distribution: Distribution,
    oracle: &mut dyn DecisionOracle,
    invert: bool,
) -> Result<FilterResult> {
    let total_mass = distribution.total_mass();
    let mut accepted = distribution.empty_like();
    let mut rejected = distribution.empty_like();

    let (_, rows) = distribution.into_parts();
    let row_count = rows.len();
    for row in rows {
        if invert ^ oracle.decide(&row.password)? {
            accepted.push_sorted(row);
        } else {
            rejected.push_sorted(row);
        }
    }

    let result = FilterResult::from_split(accepted, rejected, total_mass)?;
    info!(
        "Filtered {} rows: {} accepted, {} rejected (invert={}); surplus {:.6} of {:.6}",
        row_count,
        result.accepted.len(),
        result.rejected.len(),
        invert,
        result.surplus,
        total_mass
    );
    debug!("Filtered mass {}", result.filtered_mass);
    Ok(result)
}
