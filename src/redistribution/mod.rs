//! Redistribution engine
//!
//! A redistribution law maps `(total_mass, surplus, accepted)` to the final
//! distribution. Built-in laws are a closed set ([`BuiltinLaw`]); custom laws
//! plug in through the same [`RedistributionLaw`] trait and are resolved by
//! name through the [`registry::ModeRegistry`].

pub mod laws;
pub mod registry;

use crate::config::types::{FilterError, Result};
use crate::distribution::Distribution;
use crate::filter::FilterResult;
use log::info;
use serde::{Deserialize, Serialize};

/// Reallocation of filtered-out probability mass.
pub trait RedistributionLaw: Send + Sync {
    /// Name the law is registered and reported under.
    fn name(&self) -> &str;

    /// Produce the output distribution. `accepted` is sorted
    /// probability-descending and has non-zero total mass.
    fn reselect(&self, total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution>;
}

/// Closure adapter for custom laws.
pub struct FnLaw<F> {
    name: String,
    f: F,
}

impl<F> FnLaw<F>
where
    F: Fn(f64, f64, Distribution) -> Result<Distribution> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> RedistributionLaw for FnLaw<F>
where
    F: Fn(f64, f64, Distribution) -> Result<Distribution> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn reselect(&self, total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution> {
        (self.f)(total, surplus, accepted)
    }
}

/// Built-in laws - closed set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinLaw {
    /// Identity; the surplus is discarded
    None,
    /// Scale every row by `total / filtered`
    Proportional,
    /// Add `surplus / rows` to every row
    Uniform,
    /// Add the whole surplus to the most probable row
    Convergent,
    /// Append synthetic rows at the minimum probability
    Extraneous,
}

impl BuiltinLaw {
    pub const ALL: [BuiltinLaw; 5] = [
        BuiltinLaw::None,
        BuiltinLaw::Proportional,
        BuiltinLaw::Uniform,
        BuiltinLaw::Convergent,
        BuiltinLaw::Extraneous,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinLaw::None => "none",
            BuiltinLaw::Proportional => "proportional",
            BuiltinLaw::Uniform => "uniform",
            BuiltinLaw::Convergent => "convergent",
            BuiltinLaw::Extraneous => "extraneous",
        }
    }

    /// Numeric mode accepted by the command line.
    pub fn alias(self) -> u8 {
        match self {
            BuiltinLaw::None => 0,
            BuiltinLaw::Proportional => 1,
            BuiltinLaw::Uniform => 2,
            BuiltinLaw::Convergent => 3,
            BuiltinLaw::Extraneous => 4,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|law| law.name().eq_ignore_ascii_case(name) || law.alias().to_string() == name)
    }

    /// Whether output mass equals input mass for this law.
    pub fn conserves_mass(self) -> bool {
        matches!(
            self,
            BuiltinLaw::Proportional | BuiltinLaw::Uniform | BuiltinLaw::Convergent
        )
    }
}

impl std::fmt::Display for BuiltinLaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Apply `law` to a non-degenerate filter result.
pub fn redistribute(result: FilterResult, law: &dyn RedistributionLaw) -> Result<Distribution> {
    if result.is_degenerate() {
        return Err(FilterError::Law {
            law: law.name().to_string(),
            message: "no accepted probability mass to redistribute into".to_string(),
        });
    }

    info!(
        "Redistributing surplus {:.6} over {} rows with '{}'",
        result.surplus,
        result.accepted.len(),
        law.name()
    );
    law.reselect(result.total_mass, result.surplus, result.accepted)
}
