use crate::groups::{Aggregate, PositionGroups};
use crate::kpi::{KpiCatalog, KpiDefinition};
use crate::position::PositionCode;
use crate::snapshot::BalanceSheetSnapshot;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub const DEFAULT_BALANCE_TOLERANCE: f64 = 0.01;

/// Message for a KPI whose formula failed without a specific reason.
pub const COMPUTATION_FAILED: &str = "computation failed unexpectedly";

/// Sum of the snapshot values for `positions`, missing positions counting as zero.
pub fn sum_positions(snapshot: &BalanceSheetSnapshot, positions: &[PositionCode]) -> f64 {
    positions.iter().map(|p| snapshot.get(p)).sum()
}

/// Every named total, computed once per calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub current_assets: f64,
    pub liquid_assets: f64,
    pub cash: f64,
    pub current_liabilities: f64,
    pub total_liabilities: f64,
    pub total_liabilities_excl_severance: f64,
    pub total_equity: f64,
    pub total_assets: f64,
    pub net_fixed_assets: f64,
    pub intangible_assets: f64,
    pub non_current_financial_assets: f64,
    pub current_financial_assets: f64,
    pub long_term_debt: f64,
    pub tax_social_debt: f64,
}

impl Aggregates {
    pub fn compute(snapshot: &BalanceSheetSnapshot, groups: &PositionGroups) -> Self {
        let sum = |positions: &[PositionCode]| sum_positions(snapshot, positions);

        let total_liabilities = sum(&groups.total_liabilities);

        Self {
            current_assets: sum(&groups.current_assets),
            liquid_assets: sum(&groups.liquid_assets),
            cash: sum(&groups.cash),
            current_liabilities: sum(&groups.current_liabilities),
            total_liabilities,
            total_liabilities_excl_severance: total_liabilities - sum(&groups.severance),
            total_equity: sum(&groups.equity_additive) - sum(&groups.treasury_shares),
            total_assets: sum(&groups.total_assets),
            net_fixed_assets: sum(&groups.net_fixed_assets),
            intangible_assets: sum(&groups.intangible_assets),
            non_current_financial_assets: sum(&groups.non_current_financial_assets),
            current_financial_assets: sum(&groups.current_financial_assets),
            long_term_debt: sum(&groups.long_term_debt),
            tax_social_debt: sum(&groups.tax_social_debt),
        }
    }

    pub fn get(&self, aggregate: Aggregate) -> f64 {
        match aggregate {
            Aggregate::CurrentAssets => self.current_assets,
            Aggregate::LiquidAssets => self.liquid_assets,
            Aggregate::Cash => self.cash,
            Aggregate::CurrentLiabilities => self.current_liabilities,
            Aggregate::TotalLiabilities => self.total_liabilities,
            Aggregate::TotalLiabilitiesExclSeverance => self.total_liabilities_excl_severance,
            Aggregate::TotalEquity => self.total_equity,
            Aggregate::TotalAssets => self.total_assets,
            Aggregate::NetFixedAssets => self.net_fixed_assets,
            Aggregate::IntangibleAssets => self.intangible_assets,
            Aggregate::NonCurrentFinancialAssets => self.non_current_financial_assets,
            Aggregate::CurrentFinancialAssets => self.current_financial_assets,
            Aggregate::LongTermDebt => self.long_term_debt,
            Aggregate::TaxSocialDebt => self.tax_social_debt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalculationResult {
    pub kpi_id: String,
    pub value: Option<f64>,
    pub status: KpiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Arc<KpiDefinition>>,
}

impl CalculationResult {
    fn ok(definition: &Arc<KpiDefinition>, value: f64) -> Self {
        Self {
            kpi_id: definition.id.clone(),
            value: Some(value),
            status: KpiStatus::Ok,
            message: None,
            definition: Some(Arc::clone(definition)),
        }
    }

    fn error(kpi_id: &str, message: String, definition: Option<&Arc<KpiDefinition>>) -> Self {
        Self {
            kpi_id: kpi_id.to_string(),
            value: None,
            status: KpiStatus::Error,
            message: Some(message),
            definition: definition.map(Arc::clone),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == KpiStatus::Ok
    }

    pub fn is_ratio(&self) -> bool {
        self.definition.as_ref().map_or(true, |d| d.is_ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheckResult {
    pub valid: bool,
    pub assets_total: f64,
    pub equity_and_liabilities_total: f64,
    pub difference: f64,
    pub tolerance: f64,
}

pub struct RatioCalculator<'a> {
    groups: &'a PositionGroups,
    catalog: &'a KpiCatalog,
    tolerance: f64,
}

impl<'a> RatioCalculator<'a> {
    pub fn new(groups: &'a PositionGroups, catalog: &'a KpiCatalog) -> Self {
        Self {
            groups,
            catalog,
            tolerance: DEFAULT_BALANCE_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// One result per requested id, in request order. A failing KPI never
    /// stops the others.
    pub fn calculate<S: AsRef<str>>(
        &self,
        snapshot: &BalanceSheetSnapshot,
        kpi_ids: &[S],
    ) -> Vec<CalculationResult> {
        let aggregates = Aggregates::compute(snapshot, self.groups);
        debug!("Aggregates: {:?}", aggregates);

        kpi_ids
            .iter()
            .map(|id| self.calculate_one(id.as_ref(), &aggregates))
            .collect()
    }

    fn calculate_one(&self, kpi_id: &str, aggregates: &Aggregates) -> CalculationResult {
        let Some(definition) = self.catalog.get(kpi_id) else {
            debug!("Unknown KPI '{}' requested", kpi_id);
            return CalculationResult::error(kpi_id, format!("unknown KPI '{}'", kpi_id), None);
        };

        // A panicking custom formula fails only its own KPI.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| definition.evaluate(aggregates)));

        match outcome {
            Ok(Ok(value)) => CalculationResult::ok(definition, value),
            Ok(Err(issue)) => {
                warn!("KPI '{}' could not be computed: {}", kpi_id, issue);
                CalculationResult::error(kpi_id, issue.to_string(), Some(definition))
            }
            Err(_) => {
                warn!("KPI '{}' panicked during computation", kpi_id);
                CalculationResult::error(kpi_id, COMPUTATION_FAILED.to_string(), Some(definition))
            }
        }
    }

    /// Assets against the other side of the sheet, over the full snapshot.
    pub fn check_balance(&self, snapshot: &BalanceSheetSnapshot) -> BalanceCheckResult {
        let sum = |positions: &[PositionCode]| sum_positions(snapshot, positions);

        let assets_total = sum(&self.groups.all_assets);
        let equity = sum(&self.groups.all_equity_additive) - sum(&self.groups.treasury_shares);
        let equity_and_liabilities_total = sum(&self.groups.debts)
            + equity
            + sum(&self.groups.provisions)
            + sum(&self.groups.accrued_liabilities)
            + sum(&self.groups.severance);

        let difference = assets_total - equity_and_liabilities_total;
        let valid = difference.abs() < self.tolerance;

        if !valid {
            warn!(
                "Balance sheet does not balance: assets {:.2}, equity and liabilities {:.2}, difference {:.2}",
                assets_total, equity_and_liabilities_total, difference
            );
        }

        BalanceCheckResult {
            valid,
            assets_total,
            equity_and_liabilities_total,
            difference,
            tolerance: self.tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PositionSchema;

    fn setup() -> (PositionGroups, KpiCatalog) {
        let groups = PositionGroups::from_schema(&PositionSchema::cee()).unwrap();
        let catalog = KpiCatalog::standard(&groups);
        (groups, catalog)
    }

    fn value(results: &[CalculationResult], id: &str) -> Option<f64> {
        results.iter().find(|r| r.kpi_id == id).and_then(|r| r.value)
    }

    #[test]
    fn test_current_ratio() {
        let (groups, catalog) = setup();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let snapshot: BalanceSheetSnapshot =
            [("31", 100.0), ("49", 50.0), ("79", 75.0)].into_iter().collect();

        let results = calculator.calculate(&snapshot, &["current_ratio", "working_capital"]);
        assert!((value(&results, "current_ratio").unwrap() - 2.0).abs() < 1e-9);
        assert!((value(&results, "working_capital").unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominator_is_an_error_result() {
        let (groups, catalog) = setup();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let snapshot: BalanceSheetSnapshot = [("31", 100.0)].into_iter().collect();

        let results = calculator.calculate(&snapshot, &["current_ratio", "working_capital"]);
        assert_eq!(results[0].status, KpiStatus::Error);
        assert_eq!(results[0].value, None);
        assert!(results[0]
            .message
            .as_deref()
            .unwrap()
            .contains("current liabilities"));
        assert!(results[1].is_ok());
        assert!((results[1].value.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_id_does_not_abort_batch() {
        let (groups, catalog) = setup();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let snapshot: BalanceSheetSnapshot = [("49", 10.0), ("80", 5.0)].into_iter().collect();

        let results = calculator.calculate(&snapshot, &["bogus", "cash_ratio"]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, KpiStatus::Error);
        assert!(results[0].definition.is_none());
        assert!((results[1].value.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_input_is_contained() {
        let (groups, catalog) = setup();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let snapshot: BalanceSheetSnapshot =
            [("31", f64::INFINITY), ("79", 10.0), ("49", 5.0)].into_iter().collect();

        let results = calculator.calculate(&snapshot, &["current_ratio", "cash_ratio"]);
        assert_eq!(results[0].status, KpiStatus::Error);
        assert!((results[1].value.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_panicking_formula_is_contained() {
        let (groups, mut catalog) = setup();
        let broken = KpiDefinition::new(
            "broken_lookup",
            "Broken",
            "Custom",
            vec![Aggregate::Cash],
            |a| {
                let history: Vec<f64> = Vec::new();
                Ok(a.cash / history[0])
            },
            &groups,
        );
        catalog.insert(broken).unwrap();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let snapshot: BalanceSheetSnapshot =
            [("31", 30.0), ("49", 10.0), ("79", 20.0)].into_iter().collect();

        let results =
            calculator.calculate(&snapshot, &["cash_ratio", "broken_lookup", "current_ratio"]);
        assert_eq!(results.len(), 3);
        assert!((results[0].value.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(results[1].status, KpiStatus::Error);
        assert_eq!(results[1].value, None);
        assert_eq!(results[1].message.as_deref(), Some(COMPUTATION_FAILED));
        assert!(results[1].definition.is_some());
        assert!((results[2].value.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_equity_subtracts_treasury_shares() {
        let (groups, _) = setup();
        let snapshot: BalanceSheetSnapshot =
            [("52", 1000.0), ("64", 200.0), ("66", 50.0)].into_iter().collect();
        let aggregates = Aggregates::compute(&snapshot, &groups);
        assert!((aggregates.total_equity - 1150.0).abs() < 1e-9);
    }

    #[test]
    fn test_severance_exclusion() {
        let (groups, _) = setup();
        let snapshot: BalanceSheetSnapshot =
            [("100", 30.0), ("79", 70.0)].into_iter().collect();
        let aggregates = Aggregates::compute(&snapshot, &groups);
        assert!((aggregates.total_liabilities - 100.0).abs() < 1e-9);
        assert!((aggregates.total_liabilities_excl_severance - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_check() {
        let (groups, catalog) = setup();
        let calculator = RatioCalculator::new(&groups, &catalog);
        let balanced: BalanceSheetSnapshot = [
            ("14", 500.0),
            ("49", 500.0),
            ("52", 600.0),
            ("79", 300.0),
            ("100", 100.0),
        ]
        .into_iter()
        .collect();

        let check = calculator.check_balance(&balanced);
        assert!(check.valid);
        assert!((check.assets_total - 1000.0).abs() < 1e-9);
        assert!((check.equity_and_liabilities_total - 1000.0).abs() < 1e-9);

        let mut unbalanced = balanced.clone();
        unbalanced.set("49", 510.0);
        let check = calculator.check_balance(&unbalanced);
        assert!(!check.valid);
        assert!((check.difference - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_tolerance_is_configurable() {
        let (groups, catalog) = setup();
        let snapshot: BalanceSheetSnapshot = [("49", 100.5), ("52", 100.0)].into_iter().collect();

        let strict = RatioCalculator::new(&groups, &catalog);
        assert!(!strict.check_balance(&snapshot).valid);

        let lenient = RatioCalculator::new(&groups, &catalog).with_tolerance(1.0);
        assert!(lenient.check_balance(&snapshot).valid);
    }
}
