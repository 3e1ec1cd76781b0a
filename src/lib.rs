//! # CEE KPI Analyzer
//!
//! A library for computing liquidity, leverage and structural ratios from a
//! balance sheet laid out on the Italian civil-code (Art. 2424, "CEE")
//! position schema.
//!
//! ## Core Concepts
//!
//! - **Position**: one balance-sheet line, identified by a code such as `"39"` or `"39.NCA"`
//! - **Schema**: the tree of sections that positions belong to, with names and maturities
//! - **Aggregate**: a named sum over a fixed set of positions (current assets, total equity, ...)
//! - **KPI**: a ratio or absolute figure computed from aggregates
//! - **Snapshot**: the position values of one balance sheet; missing positions read as zero
//!
//! A typical round trip resolves the positions a KPI selection needs, asks
//! the user for those values only, then checks the balance and computes the
//! KPIs.
//!
//! ## Example
//!
//! ```rust
//! use cee_kpi_analyzer::*;
//!
//! let engine = KpiEngine::standard();
//!
//! let required = engine.resolve_requirements(&["current_ratio"]).unwrap();
//! assert!(required.contains(&PositionCode::from(79)));
//!
//! let snapshot: BalanceSheetSnapshot = [
//!     ("31", 10.0), ("32", 10.0), ("33", 10.0), ("34", 10.0), ("35", 10.0),
//!     ("79", 5.0), ("80", 5.0), ("81", 5.0), ("82", 5.0),
//! ]
//! .into_iter()
//! .collect();
//!
//! let results = engine.calculate(&snapshot, &["current_ratio"]);
//! assert!((results[0].value.unwrap() - 2.5).abs() < 1e-9);
//!
//! let amount = coerce_input("1.234,56").unwrap();
//! assert!((amount - 1234.56).abs() < 1e-9);
//! ```

pub mod calculator;
pub mod coercion;
pub mod config;
pub mod engine;
pub mod error;
pub mod groups;
pub mod kpi;
pub mod mapping;
pub mod position;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod snapshot;

pub use calculator::{
    sum_positions, Aggregates, BalanceCheckResult, CalculationResult, KpiStatus, RatioCalculator,
    COMPUTATION_FAILED, DEFAULT_BALANCE_TOLERANCE,
};
pub use coercion::{
    coerce, coerce_expression, coerce_input, format_amount, format_for_input, validate_form,
    FieldError, FormData, FormValidation, InputMode, INVALID_NUMBER_MESSAGE,
};
pub use config::EngineConfig;
pub use engine::KpiEngine;
pub use error::{KpiError, Result};
pub use groups::{Aggregate, PositionGroups};
pub use kpi::{ratio, KpiCatalog, KpiDefinition, KpiFormula, KpiIssue};
pub use mapping::{AccountMapping, LedgerBalance, LedgerImport, MappingRegistry};
pub use position::{sorted_positions, PositionCode, NON_CURRENT_SUFFIX};
pub use report::{AnalysisReport, InputLine, KpiInputs};
pub use resolver::{validate_selection, FormField, FormSection, RequirementResolver};
pub use schema::{Maturity, PositionInfo, PositionSchema, SchemaNode, SchemaSection};
pub use session::AnalysisSession;
pub use snapshot::BalanceSheetSnapshot;

/// Resolves requirements against the built-in engine.
pub fn resolve_requirements<S: AsRef<str>>(kpi_ids: &[S]) -> Result<Vec<PositionCode>> {
    KpiEngine::standard().resolve_requirements(kpi_ids)
}

/// Calculates KPIs against the built-in engine.
pub fn calculate<S: AsRef<str>>(
    snapshot: &BalanceSheetSnapshot,
    kpi_ids: &[S],
) -> Vec<CalculationResult> {
    KpiEngine::standard().calculate(snapshot, kpi_ids)
}

/// Checks the balance against the built-in engine.
pub fn check_balance(snapshot: &BalanceSheetSnapshot) -> BalanceCheckResult {
    KpiEngine::standard().check_balance(snapshot)
}
