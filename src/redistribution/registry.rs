use crate::config::types::{ExtraneousSettings, FilterError, Result};
use crate::redistribution::laws;
use crate::redistribution::{BuiltinLaw, RedistributionLaw};
use std::collections::HashMap;

/// Resolves mode names to redistribution laws.
///
/// Built-in laws answer to their name (any case) or numeric alias. Custom
/// laws are looked up by exact name and may not reuse a built-in name.
pub struct ModeRegistry {
    builtins: HashMap<BuiltinLaw, Box<dyn RedistributionLaw>>,
    custom: HashMap<String, Box<dyn RedistributionLaw>>,
}

impl ModeRegistry {
    pub fn new(extraneous: &ExtraneousSettings) -> Self {
        let builtins = BuiltinLaw::ALL
            .into_iter()
            .map(|law| (law, laws::builtin(law, extraneous)))
            .collect();
        Self {
            builtins,
            custom: HashMap::new(),
        }
    }

    /// Add a custom law under its own name.
    pub fn register(&mut self, law: Box<dyn RedistributionLaw>) -> Result<()> {
        let name = law.name().to_string();
        if name.trim().is_empty() {
            return Err(FilterError::Config(
                "custom redistribution mode needs a name".to_string(),
            ));
        }
        if BuiltinLaw::parse(&name).is_some() {
            return Err(FilterError::Config(format!(
                "custom redistribution mode '{}' collides with a built-in mode",
                name
            )));
        }
        if self.custom.contains_key(&name) {
            return Err(FilterError::Config(format!(
                "redistribution mode '{}' is already registered",
                name
            )));
        }
        self.custom.insert(name, law);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn RedistributionLaw> {
        if let Some(builtin) = BuiltinLaw::parse(name) {
            if let Some(law) = self.builtins.get(&builtin) {
                return Ok(law.as_ref());
            }
        }
        self.custom
            .get(name)
            .map(|law| law.as_ref())
            .ok_or_else(|| FilterError::UnknownLaw(name.to_string()))
    }

    /// Built-in names first, then custom names sorted.
    pub fn names(&self) -> Vec<String> {
        let mut custom: Vec<String> = self.custom.keys().cloned().collect();
        custom.sort();
        BuiltinLaw::ALL
            .into_iter()
            .map(|law| law.name().to_string())
            .chain(custom)
            .collect()
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::new(&ExtraneousSettings::default())
    }
}

impl std::fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeRegistry")
            .field("modes", &self.names())
            .finish()
    }
}
