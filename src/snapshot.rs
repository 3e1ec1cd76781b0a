use crate::position::PositionCode;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position values for a single balance sheet. Missing positions read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceSheetSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<NaiveDate>,
    #[serde(default)]
    pub values: BTreeMap<PositionCode, f64>,
}

impl BalanceSheetSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn get(&self, position: &PositionCode) -> f64 {
        self.values.get(position).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, position: impl Into<PositionCode>, value: f64) {
        self.values.insert(position.into(), value);
    }

    /// Adds `value` to whatever is already recorded for `position`.
    pub fn add(&mut self, position: impl Into<PositionCode>, value: f64) {
        *self.values.entry(position.into()).or_insert(0.0) += value;
    }

    pub fn contains(&self, position: &PositionCode) -> bool {
        self.values.contains_key(position)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PositionCode, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    /// Keeps only `positions`, filling the ones not yet present with zero.
    pub fn retain_positions(&mut self, positions: &[PositionCode]) {
        self.values.retain(|code, _| positions.contains(code));
        for position in positions {
            self.values.entry(position.clone()).or_insert(0.0);
        }
    }
}

impl<P: Into<PositionCode>> FromIterator<(P, f64)> for BalanceSheetSnapshot {
    fn from_iter<I: IntoIterator<Item = (P, f64)>>(iter: I) -> Self {
        Self {
            reference_date: None,
            values: iter.into_iter().map(|(p, v)| (p.into(), v)).collect(),
        }
    }
}

impl From<BTreeMap<PositionCode, f64>> for BalanceSheetSnapshot {
    fn from(values: BTreeMap<PositionCode, f64>) -> Self {
        Self {
            reference_date: None,
            values,
        }
    }
}
