//! Accept/reject decision sources.
//!
//! The filter stage only sees [`DecisionOracle`]. Two implementations ship
//! with the crate: [`client::OracleClient`], which delegates to a long-lived
//! external process over a line protocol, and
//! [`local::LocalComplianceOracle`], which evaluates a character-class
//! composition policy in process.

pub mod client;
pub mod local;
pub mod retry;
pub mod session;

use crate::config::types::Result;

/// Source of accept/reject verdicts for individual passwords.
///
/// Implementations are driven strictly sequentially, one query at a time.
pub trait DecisionOracle {
    /// Whether `password` satisfies the policy.
    fn decide(&mut self, password: &str) -> Result<bool>;

    /// Release any resources once no further decisions are needed.
    /// Must be idempotent.
    fn finish(&mut self) {}

    /// Times the backing resource had to be replaced during the run.
    fn relaunch_count(&self) -> u32 {
        0
    }
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for Box<T> {
    fn decide(&mut self, password: &str) -> Result<bool> {
        (**self).decide(password)
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn relaunch_count(&self) -> u32 {
        (**self).relaunch_count()
    }
}

/// Infallible closure adapter, mostly for tests and embedding.
pub struct FnOracle<F>(pub F);

impl<F> DecisionOracle for FnOracle<F>
where
    F: FnMut(&str) -> bool,
{
    fn decide(&mut self, password: &str) -> Result<bool> {
        Ok((self.0)(password))
    }
}

pub fn from_fn<F>(f: F) -> FnOracle<F>
where
    F: FnMut(&str) -> bool,
{
    FnOracle(f)
}
