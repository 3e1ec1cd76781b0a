use crate::coercion::{format_for_input, FieldError, FormData};
use crate::engine::KpiEngine;
use crate::error::{KpiError, Result};
use crate::position::PositionCode;
use crate::report::AnalysisReport;
use crate::snapshot::BalanceSheetSnapshot;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State carried between the selection, data-entry and results steps.
///
/// The caller owns it and persists it between round trips; the engine keeps
/// no per-user state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    selected: Vec<String>,
    required: Vec<PositionCode>,
    snapshot: BalanceSheetSnapshot,
    raw_inputs: BTreeMap<PositionCode, String>,
    field_errors: Vec<FieldError>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a KPI selection and the positions it needs. Values already
    /// entered for positions that are still required are kept.
    ///
    /// On an invalid selection the session is left as it was.
    pub fn select<S: AsRef<str>>(
        &mut self,
        engine: &KpiEngine,
        kpi_ids: &[S],
    ) -> Result<&[PositionCode]> {
        let required = engine.resolve_requirements(kpi_ids)?;

        self.selected = kpi_ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| engine.catalog().contains(id))
            .map(str::to_string)
            .collect();
        self.snapshot.retain_positions(&required);
        self.raw_inputs.retain(|position, _| required.contains(position));
        self.field_errors.clear();
        self.required = required;

        debug!(
            "Session selection: {} KPIs, {} positions",
            self.selected.len(),
            self.required.len()
        );

        Ok(&self.required)
    }

    /// Reads the data-entry form. The raw text is always kept for redisplay;
    /// the snapshot only changes when every field is valid.
    pub fn submit_form(
        &mut self,
        engine: &KpiEngine,
        form: &FormData,
    ) -> std::result::Result<(), Vec<FieldError>> {
        let validation = engine.validate_form(form, &self.required);
        self.raw_inputs = validation.raw.clone();
        self.field_errors = validation.errors.clone();

        let values = match validation.into_snapshot() {
            Ok(snapshot) => snapshot.values,
            Err(errors) => return Err(errors),
        };

        for (position, value) in values {
            self.snapshot.set(position, value);
        }
        Ok(())
    }

    pub fn set_value(&mut self, position: impl Into<PositionCode>, value: f64) {
        let position = position.into();
        self.raw_inputs.remove(&position);
        self.snapshot.set(position, value);
    }

    pub fn set_reference_date(&mut self, date: Option<NaiveDate>) {
        self.snapshot.reference_date = date;
    }

    /// Runs the balance check and the selected KPIs.
    pub fn evaluate(&self, engine: &KpiEngine) -> Result<AnalysisReport> {
        if self.selected.is_empty() {
            return Err(KpiError::EmptySelection);
        }
        Ok(engine.evaluate(&self.snapshot, &self.selected))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn required(&self) -> &[PositionCode] {
        &self.required
    }

    pub fn snapshot(&self) -> &BalanceSheetSnapshot {
        &self.snapshot
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn has_errors(&self) -> bool {
        !self.field_errors.is_empty()
    }

    /// Text to prefill a field with: what the user typed last, or the stored value.
    pub fn display_value(&self, position: &PositionCode) -> String {
        match self.raw_inputs.get(position) {
            Some(raw) => raw.clone(),
            None => format_for_input(self.snapshot.get(position)),
        }
    }
}
