use crate::core::{DbError, Result};
use std::env::{self, VarError};

pub const DEFAULT_UNITS: usize = 10;
pub const UNITS_ENV: &str = "OCC_DEMO_UNITS";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Number of concurrent execution units per trial
    pub units: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self {
            units: DEFAULT_UNITS,
        }
    }

    /// Set the number of execution units
    pub fn units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    /// Read `OCC_DEMO_UNITS`, falling back to the default when it is unset.
    pub fn from_env() -> Result<Self> {
        Self::from_var(env::var(UNITS_ENV))
    }

    fn from_var(units: std::result::Result<String, VarError>) -> Result<Self> {
        let config = match units {
            Ok(raw) => Self::new().units(parse_units(&raw)?),
            Err(VarError::NotPresent) => Self::new(),
            Err(VarError::NotUnicode(raw)) => {
                return Err(DbError::ConfigError(format!(
                    "{UNITS_ENV} is not valid unicode: {}",
                    raw.to_string_lossy()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.units == 0 {
            return Err(DbError::ConfigError("units must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_units(raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|_| {
        DbError::ConfigError(format!("{UNITS_ENV} must be a positive integer, got '{raw}'"))
    })
}
