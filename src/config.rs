use crate::calculator::DEFAULT_BALANCE_TOLERANCE;
use crate::coercion::InputMode;
use crate::error::{KpiError, Result};
use crate::mapping::AccountMapping;
use crate::schema::PositionSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a [`crate::KpiEngine`] is built from. Every field has a default,
/// so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_tolerance")]
    #[schemars(description = "Largest absolute difference between the two sides that still counts as balanced")]
    pub balance_tolerance: f64,

    #[serde(default)]
    #[schemars(description = "How form fields are read: a single number, or a +/- sum")]
    pub input_mode: InputMode,

    #[serde(default)]
    #[schemars(description = "Position tree and metadata. Defaults to the Art. 2424 layout")]
    pub schema: PositionSchema,

    #[serde(default = "default_mappings")]
    #[schemars(description = "Chart-of-accounts mappings available for ledger import")]
    pub mappings: Vec<AccountMapping>,
}

fn default_tolerance() -> f64 {
    DEFAULT_BALANCE_TOLERANCE
}

fn default_mappings() -> Vec<AccountMapping> {
    vec![AccountMapping::automotive_dealer()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: default_tolerance(),
            input_mode: InputMode::default(),
            schema: PositionSchema::cee(),
            mappings: default_mappings(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.balance_tolerance.is_finite() || self.balance_tolerance <= 0.0 {
            return Err(KpiError::Config(format!(
                "balance_tolerance must be a positive number, got {}",
                self.balance_tolerance
            )));
        }

        self.schema.validate()?;

        for mapping in &self.mappings {
            mapping.validate(&self.schema)?;
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}
