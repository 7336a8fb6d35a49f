//! Optimal guessing curve
//!
//! An attacker who knows the distribution guesses passwords in
//! probability-descending order. The curve lists the probability mass already
//! cracked before each guess, ending with the total mass.

use crate::config::types::Result;
use crate::distribution::Distribution;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Points emitted in percentile mode, final total included.
pub const PERCENTILE_POINTS: usize = 100;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CurveMode {
    /// One point per guess
    #[default]
    Full,
    /// At most [`PERCENTILE_POINTS`] points, one every `floor(rows / 100)` guesses
    Percentile,
}

/// Cumulative cracked mass before each sampled guess, then the total.
pub fn optimal_guess_curve(distribution: &Distribution, mode: CurveMode) -> Vec<f64> {
    let rows = distribution.len();
    let (interval, cap) = match mode {
        CurveMode::Full => (1, rows),
        // Fewer than 100 rows would give a zero interval.
        CurveMode::Percentile => ((rows / PERCENTILE_POINTS).max(1), PERCENTILE_POINTS - 1),
    };

    let mut curve = Vec::with_capacity(cap + 1);
    let mut cumulative = 0.0;
    for (index, row) in distribution.iter().enumerate() {
        if index % interval == 0 && curve.len() < cap {
            curve.push(cumulative);
        }
        cumulative += row.probability;
    }
    curve.push(cumulative);
    curve
}

/// One value per line.
pub fn write_curve<W: Write>(writer: &mut W, curve: &[f64]) -> Result<()> {
    for point in curve {
        writeln!(writer, "{}", point)?;
    }
    writer.flush()?;
    Ok(())
}
