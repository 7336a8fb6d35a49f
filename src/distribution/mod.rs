//! Password probability distributions
//!
//! A [`Distribution`] is an in-memory sequence of rows kept in
//! probability-descending order. Every stage consumes one value and produces
//! a new one; nothing mutates a distribution in place across a failure.

pub mod csv;

use crate::config::types::{FilterError, Result};
use std::collections::HashSet;

pub const PASSWORD_COLUMN: &str = "password";
pub const PROBABILITY_COLUMN: &str = "probability";

/// Single (password, probability) entry with untouched extra fields
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionRow {
    pub password: String,
    pub probability: f64,
    /// Values of every other column, in header order
    pub passthrough: Vec<String>,
}

impl DistributionRow {
    pub fn new(password: impl Into<String>, probability: f64) -> Self {
        Self {
            password: password.into(),
            probability,
            passthrough: Vec::new(),
        }
    }
}

/// Column order of the tabular source a distribution was read from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    pub header: Vec<String>,
    pub password: usize,
    pub probability: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            header: vec![PASSWORD_COLUMN.to_string(), PROBABILITY_COLUMN.to_string()],
            password: 0,
            probability: 1,
        }
    }
}

impl ColumnLayout {
    /// Locate the password and probability columns in a header row.
    pub fn from_header(header: Vec<String>) -> Result<Self> {
        let find = |name: &str| {
            header.iter().position(|h| h == name).ok_or_else(|| FilterError::InvalidRow {
                line: 1,
                message: format!("missing '{}' column in header {:?}", name, header),
            })
        };
        let password = find(PASSWORD_COLUMN)?;
        let probability = find(PROBABILITY_COLUMN)?;
        Ok(Self {
            header,
            password,
            probability,
        })
    }

    /// Number of passthrough columns per row.
    pub fn passthrough_width(&self) -> usize {
        self.header.len().saturating_sub(2)
    }
}

/// Probability-sorted sequence of rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution {
    layout: ColumnLayout,
    rows: Vec<DistributionRow>,
}

fn check_probability(index: usize, probability: f64) -> Result<()> {
    if !probability.is_finite() || probability < 0.0 {
        return Err(FilterError::InvalidRow {
            line: index + 1,
            message: format!("probability must be finite and non-negative, got {}", probability),
        });
    }
    Ok(())
}

impl Distribution {
    /// Build from rows with the default two-column layout.
    pub fn new(rows: Vec<DistributionRow>) -> Result<Self> {
        Self::with_layout(ColumnLayout::default(), rows)
    }

    /// Build from rows, validating probabilities and sorting descending.
    /// The sort is stable, so equal-probability rows keep their relative order.
    pub fn with_layout(layout: ColumnLayout, mut rows: Vec<DistributionRow>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            check_probability(i, row.probability)?;
        }
        rows.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Ok(Self { layout, rows })
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|(password, probability)| DistributionRow::new(*password, *probability))
                .collect(),
        )
    }

    /// Empty distribution sharing this one's layout.
    pub fn empty_like(&self) -> Self {
        Self {
            layout: self.layout.clone(),
            rows: Vec::new(),
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn rows(&self) -> &[DistributionRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DistributionRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (ColumnLayout, Vec<DistributionRow>) {
        (self.layout, self.rows)
    }

    /// Sum of all row probabilities.
    pub fn total_mass(&self) -> f64 {
        self.rows.iter().map(|r| r.probability).sum()
    }

    /// Highest-probability row.
    pub fn head(&self) -> Option<&DistributionRow> {
        self.rows.first()
    }

    /// Smallest probability present.
    pub fn min_probability(&self) -> Option<f64> {
        self.rows.last().map(|r| r.probability)
    }

    pub fn passwords(&self) -> HashSet<&str> {
        self.rows.iter().map(|r| r.password.as_str()).collect()
    }

    /// Rewrite every probability with `f(index, probability)`.
    ///
    /// Results are revalidated and the order restored, so a law can never
    /// leak NaN, infinities or negative mass into its output.
    pub fn map_probabilities<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, f64) -> f64,
    {
        let (layout, mut rows) = self.into_parts();
        for (i, row) in rows.iter_mut().enumerate() {
            row.probability = f(i, row.probability);
        }
        Self::with_layout(layout, rows)
    }

    /// Append rows after the existing ones.
    pub fn extend(self, extra: Vec<DistributionRow>) -> Result<Self> {
        let (layout, mut rows) = self.into_parts();
        rows.extend(extra);
        Self::with_layout(layout, rows)
    }

    pub(crate) fn push_sorted(&mut self, row: DistributionRow) {
        debug_assert!(self
            .rows
            .last()
            .map_or(true, |last| last.probability >= row.probability));
        self.rows.push(row);
    }
}

impl<'a> IntoIterator for &'a Distribution {
    type Item = &'a DistributionRow;
    type IntoIter = std::slice::Iter<'a, DistributionRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
