use crate::calculator::{BalanceCheckResult, CalculationResult, RatioCalculator};
use crate::coercion::{validate_form, FormData, FormValidation};
use crate::config::EngineConfig;
use crate::error::{KpiError, Result};
use crate::groups::PositionGroups;
use crate::kpi::{KpiCatalog, KpiDefinition};
use crate::mapping::{LedgerBalance, LedgerImport, MappingRegistry};
use crate::position::PositionCode;
use crate::report::AnalysisReport;
use crate::resolver::{FormSection, RequirementResolver};
use crate::schema::PositionSchema;
use crate::snapshot::BalanceSheetSnapshot;
use chrono::NaiveDate;
use log::{debug, info};
use std::sync::Arc;

/// Read-only configuration plus the three core operations.
///
/// Built once at startup and shared by reference; nothing here is mutated
/// after construction, so concurrent calculations never interfere.
#[derive(Debug, Clone)]
pub struct KpiEngine {
    config: EngineConfig,
    groups: PositionGroups,
    catalog: KpiCatalog,
    mappings: MappingRegistry,
}

impl KpiEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let groups = PositionGroups::from_schema(&config.schema)?;
        let catalog = KpiCatalog::standard(&groups);
        let mappings = MappingRegistry::from_mappings(&config.mappings, &config.schema)?;

        info!(
            "KPI engine ready: {} positions, {} KPIs, {} account mappings",
            config.schema.positions.len(),
            catalog.len(),
            mappings.len()
        );

        Ok(Self {
            config,
            groups,
            catalog,
            mappings,
        })
    }

    /// Engine over the built-in Art. 2424 schema with default settings.
    pub fn standard() -> Self {
        Self::new(EngineConfig::default()).expect("built-in engine configuration is valid")
    }

    /// Adds a custom KPI. Must happen before the engine is shared.
    pub fn with_kpi(mut self, definition: KpiDefinition) -> Result<Self> {
        self.catalog.insert(definition)?;
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &PositionSchema {
        &self.config.schema
    }

    pub fn groups(&self) -> &PositionGroups {
        &self.groups
    }

    pub fn catalog(&self) -> &KpiCatalog {
        &self.catalog
    }

    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    pub fn kpis_by_category(&self) -> Vec<(String, Vec<Arc<KpiDefinition>>)> {
        self.catalog.grouped_by_category()
    }

    fn resolver(&self) -> RequirementResolver<'_> {
        RequirementResolver::new(&self.catalog, &self.config.schema)
    }

    fn calculator(&self) -> RatioCalculator<'_> {
        RatioCalculator::new(&self.groups, &self.catalog)
            .with_tolerance(self.config.balance_tolerance)
    }

    pub fn resolve_requirements<S: AsRef<str>>(&self, kpi_ids: &[S]) -> Result<Vec<PositionCode>> {
        self.resolver().resolve(kpi_ids)
    }

    pub fn required_layout<S: AsRef<str>>(&self, kpi_ids: &[S]) -> Result<Vec<FormSection>> {
        self.resolver().required_layout(kpi_ids)
    }

    pub fn calculate<S: AsRef<str>>(
        &self,
        snapshot: &BalanceSheetSnapshot,
        kpi_ids: &[S],
    ) -> Vec<CalculationResult> {
        self.calculator().calculate(snapshot, kpi_ids)
    }

    pub fn check_balance(&self, snapshot: &BalanceSheetSnapshot) -> BalanceCheckResult {
        self.calculator().check_balance(snapshot)
    }

    /// Balance check and calculation together, packaged for display.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        snapshot: &BalanceSheetSnapshot,
        kpi_ids: &[S],
    ) -> AnalysisReport {
        let calculator = self.calculator();
        let balance = calculator.check_balance(snapshot);
        let results = calculator.calculate(snapshot, kpi_ids);

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(
            "Evaluated {} KPIs ({} failed), balance {}",
            results.len(),
            failed,
            if balance.valid { "ok" } else { "mismatched" }
        );

        AnalysisReport::new(snapshot, balance, results, &self.config.schema)
    }

    /// Reads the required fields of a submitted form using the configured input mode.
    pub fn validate_form(&self, form: &FormData, required: &[PositionCode]) -> FormValidation {
        validate_form(form, required, self.config.input_mode)
    }

    pub fn import_ledger(
        &self,
        mapping_id: &str,
        rows: &[LedgerBalance],
        reference_date: Option<NaiveDate>,
    ) -> Result<LedgerImport> {
        let mapping = self
            .mappings
            .get(mapping_id)
            .ok_or_else(|| KpiError::Mapping(format!("Unknown mapping '{}'", mapping_id)))?;
        debug!("Importing {} ledger rows with mapping '{}'", rows.len(), mapping_id);
        Ok(mapping.build_snapshot(rows, reference_date))
    }
}

impl Default for KpiEngine {
    fn default() -> Self {
        Self::standard()
    }
}
