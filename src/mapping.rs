//! Chart-of-accounts mappings from CEE positions to a company's ledger codes.
//!
//! A mapping lets a trial balance exported from accounting software be
//! summed straight into a [`BalanceSheetSnapshot`].

use crate::error::{KpiError, Result};
use crate::position::PositionCode;
use crate::schema::PositionSchema;
use crate::snapshot::BalanceSheetSnapshot;
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const AUTOMOTIVE_DEALER_JSON: &str = include_str!("../data/automotive_dealer.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccountMapping {
    #[schemars(description = "Identifier used to select the mapping")]
    pub id: String,

    pub display_name: String,

    #[schemars(description = "Ledger account codes feeding each CEE position")]
    pub codes: BTreeMap<PositionCode, Vec<String>>,
}

impl AccountMapping {
    /// Sample mapping for a car dealership's chart of accounts.
    pub fn automotive_dealer() -> Self {
        serde_json::from_str(AUTOMOTIVE_DEALER_JSON)
            .expect("bundled automotive_dealer mapping is valid JSON")
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn ledger_codes(&self, position: &PositionCode) -> &[String] {
        self.codes.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn position_for_ledger_code(&self, ledger_code: &str) -> Option<&PositionCode> {
        self.codes
            .iter()
            .find(|(_, codes)| codes.iter().any(|c| c == ledger_code))
            .map(|(position, _)| position)
    }

    /// Every mapped position must exist in `schema` and no ledger code may feed two positions.
    pub fn validate(&self, schema: &PositionSchema) -> Result<()> {
        let mut owners: HashMap<&str, &PositionCode> = HashMap::new();

        for (position, ledger_codes) in &self.codes {
            if schema.info(position).is_none() {
                return Err(KpiError::Mapping(format!(
                    "Mapping '{}' refers to unknown position '{}'",
                    self.id, position
                )));
            }

            for code in ledger_codes {
                if let Some(previous) = owners.insert(code.as_str(), position) {
                    return Err(KpiError::Mapping(format!(
                        "Mapping '{}' assigns ledger code '{}' to both '{}' and '{}'",
                        self.id, code, previous, position
                    )));
                }
            }
        }

        Ok(())
    }

    /// Sums ledger balances into positions. Rows whose code is not mapped are
    /// reported back rather than dropped silently.
    pub fn build_snapshot(
        &self,
        rows: &[LedgerBalance],
        reference_date: Option<NaiveDate>,
    ) -> LedgerImport {
        let index: HashMap<&str, &PositionCode> = self
            .codes
            .iter()
            .flat_map(|(position, codes)| codes.iter().map(move |c| (c.as_str(), position)))
            .collect();

        let mut snapshot = BalanceSheetSnapshot {
            reference_date,
            values: BTreeMap::new(),
        };
        let mut unmapped = Vec::new();

        for row in rows {
            match index.get(row.ledger_code.trim()) {
                Some(position) => snapshot.add((*position).clone(), row.balance),
                None => unmapped.push(row.clone()),
            }
        }

        if !unmapped.is_empty() {
            warn!(
                "{} ledger rows have no position in mapping '{}'",
                unmapped.len(),
                self.id
            );
        }
        debug!(
            "Imported {} ledger rows into {} positions",
            rows.len() - unmapped.len(),
            snapshot.len()
        );

        LedgerImport { snapshot, unmapped }
    }
}

/// One row of a trial balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub ledger_code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub balance: f64,
}

impl LedgerBalance {
    pub fn new(ledger_code: impl Into<String>, balance: f64) -> Self {
        Self {
            ledger_code: ledger_code.into(),
            description: None,
            balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerImport {
    pub snapshot: BalanceSheetSnapshot,
    pub unmapped: Vec<LedgerBalance>,
}

impl LedgerImport {
    pub fn unmapped_total(&self) -> f64 {
        self.unmapped.iter().map(|r| r.balance).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: BTreeMap<String, AccountMapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mappings` after checking each against `schema`.
    pub fn from_mappings(mappings: &[AccountMapping], schema: &PositionSchema) -> Result<Self> {
        let mut registry = Self::new();
        for mapping in mappings {
            registry.insert(mapping.clone(), schema)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, mapping: AccountMapping, schema: &PositionSchema) -> Result<()> {
        mapping.validate(schema)?;
        if self.mappings.contains_key(&mapping.id) {
            return Err(KpiError::Mapping(format!(
                "Mapping '{}' is registered twice",
                mapping.id
            )));
        }
        self.mappings.insert(mapping.id.clone(), mapping);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AccountMapping> {
        self.mappings.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.mappings.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountMapping> {
        self.mappings.values()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
