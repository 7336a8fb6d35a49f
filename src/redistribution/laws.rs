//! Built-in redistribution laws.

use super::{BuiltinLaw, RedistributionLaw};
use crate::config::types::{
    ExtraneousSettings, FilterError, Result, DEFAULT_MAX_SYNTHETIC_ROWS,
};
use crate::distribution::{Distribution, DistributionRow};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Mutex;

/// Letters, digits and ASCII punctuation.
pub const PASSWORD_ALPHABET: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~"
);

/// Identity on accepted rows. Breaks the mass invariant on purpose.
#[derive(Debug, Clone, Default)]
pub struct NoneLaw;

impl RedistributionLaw for NoneLaw {
    fn name(&self) -> &str {
        BuiltinLaw::None.name()
    }

    fn reselect(&self, _total: f64, _surplus: f64, accepted: Distribution) -> Result<Distribution> {
        Ok(accepted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProportionalLaw;

impl RedistributionLaw for ProportionalLaw {
    fn name(&self) -> &str {
        BuiltinLaw::Proportional.name()
    }

    fn reselect(&self, total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution> {
        let filtered = total - surplus;
        if filtered <= 0.0 {
            return Err(guard(self.name(), "filtered mass is zero"));
        }
        let factor = total / filtered;
        accepted.map_probabilities(|_, p| p * factor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UniformLaw;

impl RedistributionLaw for UniformLaw {
    fn name(&self) -> &str {
        BuiltinLaw::Uniform.name()
    }

    fn reselect(&self, _total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution> {
        if accepted.is_empty() {
            return Err(guard(self.name(), "no rows to share the surplus"));
        }
        let each = surplus / accepted.len() as f64;
        accepted.map_probabilities(|_, p| p + each)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvergentLaw;

impl RedistributionLaw for ConvergentLaw {
    fn name(&self) -> &str {
        BuiltinLaw::Convergent.name()
    }

    fn reselect(&self, _total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution> {
        if accepted.is_empty() {
            return Err(guard(self.name(), "no row to receive the surplus"));
        }
        accepted.map_probabilities(|i, p| if i == 0 { p + surplus } else { p })
    }
}

/// Appends `floor(surplus / min)` random passwords at the minimum probability.
///
/// Generated passwords never collide with existing rows or with each other.
#[derive(Debug)]
pub struct ExtraneousLaw {
    password_length: usize,
    max_rows: usize,
    rng: Mutex<StdRng>,
}

impl ExtraneousLaw {
    pub fn new(password_length: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            password_length,
            max_rows: DEFAULT_MAX_SYNTHETIC_ROWS,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_settings(settings: &ExtraneousSettings) -> Self {
        Self::new(settings.password_length, settings.seed)
            .with_max_rows(settings.max_synthetic_rows)
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn password_length(&self) -> usize {
        self.password_length
    }

    /// `floor(surplus / single)`, or `None` once that exceeds `limit`.
    /// A zero minimum or a non-positive surplus yields `Some(0)`.
    pub fn extra_count(surplus: f64, single: f64, limit: usize) -> Option<usize> {
        if single <= 0.0 || surplus <= 0.0 {
            return Some(0);
        }
        let count = (surplus / single).floor();
        // The comparison happens in f64 so the cast below cannot saturate.
        if !count.is_finite() || count > limit as f64 {
            return None;
        }
        Some(count as usize)
    }
}

impl Default for ExtraneousLaw {
    fn default() -> Self {
        Self::from_settings(&ExtraneousSettings::default())
    }
}

/// Random password of `length` characters drawn from [`PASSWORD_ALPHABET`].
pub fn random_password<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let alphabet = PASSWORD_ALPHABET.as_bytes();
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

impl RedistributionLaw for ExtraneousLaw {
    fn name(&self) -> &str {
        BuiltinLaw::Extraneous.name()
    }

    fn reselect(&self, _total: f64, surplus: f64, accepted: Distribution) -> Result<Distribution> {
        let Some(single) = accepted.min_probability() else {
            return Ok(accepted);
        };
        let Some(extra) = Self::extra_count(surplus, single, self.max_rows) else {
            return Err(guard(
                self.name(),
                &format!(
                    "surplus {} at minimum probability {} needs more than {} synthetic rows",
                    surplus, single, self.max_rows
                ),
            ));
        };
        if extra == 0 {
            debug!("Extraneous: surplus {} below minimum {}, nothing to add", surplus, single);
            return Ok(accepted);
        }
        if self.password_length == 0 {
            return Err(guard(self.name(), "password length is zero"));
        }

        let mut rng = self
            .rng
            .lock()
            .map_err(|_| guard(self.name(), "random generator lock poisoned"))?;
        let mut taken: HashSet<String> =
            accepted.iter().map(|row| row.password.clone()).collect();
        let mut synthetic = Vec::new();
        let mut collisions = 0usize;
        while synthetic.len() < extra {
            let password = random_password(&mut *rng, self.password_length);
            if taken.insert(password.clone()) {
                synthetic.push(DistributionRow::new(password, single));
            } else {
                collisions += 1;
                if collisions > extra.saturating_mul(16).max(1024) {
                    return Err(guard(
                        self.name(),
                        "password space exhausted while generating unique rows",
                    ));
                }
            }
        }
        if collisions > 0 {
            warn!("Extraneous: regenerated {} colliding passwords", collisions);
        }
        debug!("Extraneous: appending {} rows at probability {}", extra, single);

        accepted.extend(synthetic)
    }
}

fn guard(law: &str, message: &str) -> FilterError {
    FilterError::Law {
        law: law.to_string(),
        message: message.to_string(),
    }
}

/// Instantiate a built-in law.
pub fn builtin(law: BuiltinLaw, extraneous: &ExtraneousSettings) -> Box<dyn RedistributionLaw> {
    match law {
        BuiltinLaw::None => Box::new(NoneLaw),
        BuiltinLaw::Proportional => Box::new(ProportionalLaw),
        BuiltinLaw::Uniform => Box::new(UniformLaw),
        BuiltinLaw::Convergent => Box::new(ConvergentLaw),
        BuiltinLaw::Extraneous => Box::new(ExtraneousLaw::from_settings(extraneous)),
    }
}
