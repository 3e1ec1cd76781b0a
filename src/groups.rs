//! Named position groups behind every aggregate.
//!
//! Groups are derived from the [`PositionSchema`] once, when an engine is
//! built. Nothing here is hand-listed: a different schema with the same
//! section keys yields matching groups.

use crate::error::Result;
use crate::position::{sorted_positions, PositionCode};
use crate::schema::{Maturity, PositionSchema, ASSETS, EQUITY_AND_LIABILITIES};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const CURRENT_ASSETS: &str = "current_assets";
const NON_CURRENT_ASSETS: &str = "non_current_assets";
const RECEIVABLES: &str = "trade_and_other_receivables";
const DEFERRED_TAX_SECTIONS: [&str; 2] = [
    "deferred_tax_assets_current",
    "deferred_tax_assets_non_current",
];
const LIABILITIES: &str = "liabilities";
const EQUITY: &str = "equity";
const TREASURY_SHARES: &str = "negative_reserve_for_treasury_shares";

/// Debt categories whose long-maturity part counts as long-term debt.
const FINANCIAL_DEBT_SECTIONS: [&str; 7] = [
    "bonds_issued",
    "convertible_bonds_issued",
    "amounts_owed_to_shareholders_for_loans",
    "amounts_owed_to_banks",
    "amounts_owed_to_other_lenders",
    "debt_represented_by_credit_instruments",
    "amounts_owed_to_group_companies",
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    CurrentAssets,
    LiquidAssets,
    Cash,
    CurrentLiabilities,
    TotalLiabilities,
    TotalLiabilitiesExclSeverance,
    TotalEquity,
    TotalAssets,
    NetFixedAssets,
    IntangibleAssets,
    NonCurrentFinancialAssets,
    CurrentFinancialAssets,
    LongTermDebt,
    TaxSocialDebt,
}

impl Aggregate {
    pub const ALL: [Aggregate; 14] = [
        Aggregate::CurrentAssets,
        Aggregate::LiquidAssets,
        Aggregate::Cash,
        Aggregate::CurrentLiabilities,
        Aggregate::TotalLiabilities,
        Aggregate::TotalLiabilitiesExclSeverance,
        Aggregate::TotalEquity,
        Aggregate::TotalAssets,
        Aggregate::NetFixedAssets,
        Aggregate::IntangibleAssets,
        Aggregate::NonCurrentFinancialAssets,
        Aggregate::CurrentFinancialAssets,
        Aggregate::LongTermDebt,
        Aggregate::TaxSocialDebt,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Aggregate::CurrentAssets => "current assets",
            Aggregate::LiquidAssets => "liquid assets",
            Aggregate::Cash => "cash",
            Aggregate::CurrentLiabilities => "current liabilities",
            Aggregate::TotalLiabilities => "total liabilities",
            Aggregate::TotalLiabilitiesExclSeverance => "total liabilities excl. severance",
            Aggregate::TotalEquity => "total equity",
            Aggregate::TotalAssets => "total assets",
            Aggregate::NetFixedAssets => "net fixed assets",
            Aggregate::IntangibleAssets => "intangible assets",
            Aggregate::NonCurrentFinancialAssets => "non-current financial investments",
            Aggregate::CurrentFinancialAssets => "current financial assets",
            Aggregate::LongTermDebt => "long-term debt",
            Aggregate::TaxSocialDebt => "tax and social-security debt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionGroups {
    pub inventories: Vec<PositionCode>,
    pub receivables: Vec<PositionCode>,
    pub current_financial_assets: Vec<PositionCode>,
    pub cash: Vec<PositionCode>,
    pub current_assets: Vec<PositionCode>,
    pub liquid_assets: Vec<PositionCode>,
    pub intangible_assets: Vec<PositionCode>,
    pub tangible_assets: Vec<PositionCode>,
    pub non_current_financial_assets: Vec<PositionCode>,
    pub net_fixed_assets: Vec<PositionCode>,
    pub total_assets: Vec<PositionCode>,

    pub equity_additive: Vec<PositionCode>,
    pub treasury_shares: Vec<PositionCode>,
    pub provisions: Vec<PositionCode>,
    pub severance: Vec<PositionCode>,
    pub debts: Vec<PositionCode>,
    pub accrued_liabilities: Vec<PositionCode>,
    pub current_liabilities: Vec<PositionCode>,
    pub total_liabilities: Vec<PositionCode>,
    pub total_liabilities_excl_severance: Vec<PositionCode>,
    pub long_term_debt: Vec<PositionCode>,
    pub tax_social_debt: Vec<PositionCode>,

    /// Every asset-side position, placeholders included. Used by the balance check.
    pub all_assets: Vec<PositionCode>,
    /// Every equity position except the treasury-share reserve, placeholders included.
    pub all_equity_additive: Vec<PositionCode>,
}

impl PositionGroups {
    pub fn from_schema(schema: &PositionSchema) -> Result<Self> {
        let at = |path: &[&str]| schema.positions_at(path);
        let clean = |path: &[&str]| -> Result<Vec<PositionCode>> {
            Ok(schema.without_placeholders(at(path)?))
        };

        let inventories = clean(&[ASSETS, CURRENT_ASSETS, "inventories"])?;
        let receivables = clean(&[ASSETS, CURRENT_ASSETS, RECEIVABLES])?;
        let current_financial_assets =
            clean(&[ASSETS, CURRENT_ASSETS, "current_financial_assets"])?;
        let cash = clean(&[ASSETS, CURRENT_ASSETS, "cash_and_cash_equivalents"])?;

        let current_assets = union(&[&inventories, &receivables, &current_financial_assets, &cash]);

        let mut deferred_tax = Vec::new();
        for key in DEFERRED_TAX_SECTIONS {
            if let Some(node) = schema.node_at(&[ASSETS, CURRENT_ASSETS, RECEIVABLES, key]) {
                deferred_tax.extend(node.flatten());
            }
        }
        let liquid_receivables: Vec<PositionCode> = receivables
            .iter()
            .filter(|p| schema.maturity(p) != Some(Maturity::Beyond12Months))
            .filter(|p| !deferred_tax.contains(*p))
            .cloned()
            .collect();
        let liquid_assets = union(&[&liquid_receivables, &current_financial_assets, &cash]);

        let intangible_assets = clean(&[ASSETS, NON_CURRENT_ASSETS, "intangible_assets"])?;
        let tangible_assets = clean(&[ASSETS, NON_CURRENT_ASSETS, "tangible_assets"])?;
        let non_current_financial_assets =
            clean(&[ASSETS, NON_CURRENT_ASSETS, "financial_investments_non_current"])?;
        let net_fixed_assets = union(&[
            &intangible_assets,
            &tangible_assets,
            &non_current_financial_assets,
        ]);

        let all_assets = at(&[ASSETS])?;
        let total_assets = schema.without_placeholders(all_assets.clone());

        let treasury_shares = at(&[EQUITY_AND_LIABILITIES, EQUITY, TREASURY_SHARES])?;
        let all_equity_additive: Vec<PositionCode> = at(&[EQUITY_AND_LIABILITIES, EQUITY])?
            .into_iter()
            .filter(|p| !treasury_shares.contains(p))
            .collect();
        let equity_additive = schema.without_placeholders(all_equity_additive.clone());

        let provisions = at(&[EQUITY_AND_LIABILITIES, "provisions_for_risks_and_charges"])?;
        let severance = at(&[EQUITY_AND_LIABILITIES, "employee_severance_indemnity_tfr"])?;
        let debts = at(&[EQUITY_AND_LIABILITIES, LIABILITIES])?;
        let accrued_liabilities =
            at(&[EQUITY_AND_LIABILITIES, "accrued_expenses_and_deferred_income"])?;

        let short_debts: Vec<PositionCode> = debts
            .iter()
            .filter(|p| schema.maturity(p) == Some(Maturity::Within12Months))
            .cloned()
            .collect();
        let current_liabilities = union(&[&short_debts, &accrued_liabilities]);

        let total_liabilities = union(&[&provisions, &severance, &debts, &accrued_liabilities]);
        let total_liabilities_excl_severance: Vec<PositionCode> = total_liabilities
            .iter()
            .filter(|p| !severance.contains(*p))
            .cloned()
            .collect();

        let mut long_term_debt = Vec::new();
        for key in FINANCIAL_DEBT_SECTIONS {
            let section = at(&[EQUITY_AND_LIABILITIES, LIABILITIES, key])?;
            long_term_debt.extend(
                section
                    .into_iter()
                    .filter(|p| schema.maturity(p) != Some(Maturity::Within12Months)),
            );
        }
        let long_term_debt = sorted_positions(long_term_debt);

        let tax_social_debt = union(&[
            &at(&[EQUITY_AND_LIABILITIES, LIABILITIES, "tax_payables"])?,
            &at(&[EQUITY_AND_LIABILITIES, LIABILITIES, "social_security_payables"])?,
        ]);

        let groups = Self {
            inventories,
            receivables,
            current_financial_assets,
            cash,
            current_assets,
            liquid_assets,
            intangible_assets,
            tangible_assets,
            non_current_financial_assets,
            net_fixed_assets,
            total_assets,
            equity_additive,
            treasury_shares,
            provisions,
            severance,
            debts,
            accrued_liabilities,
            current_liabilities,
            total_liabilities,
            total_liabilities_excl_severance,
            long_term_debt,
            tax_social_debt,
            all_assets,
            all_equity_additive,
        };

        debug!(
            "Derived position groups: {} current assets, {} current liabilities, {} total assets, {} total liabilities",
            groups.current_assets.len(),
            groups.current_liabilities.len(),
            groups.total_assets.len(),
            groups.total_liabilities.len()
        );

        Ok(groups)
    }

    /// Positions that must be known to compute `aggregate`.
    pub fn positions_for(&self, aggregate: Aggregate) -> Vec<PositionCode> {
        match aggregate {
            Aggregate::CurrentAssets => self.current_assets.clone(),
            Aggregate::LiquidAssets => self.liquid_assets.clone(),
            Aggregate::Cash => self.cash.clone(),
            Aggregate::CurrentLiabilities => self.current_liabilities.clone(),
            Aggregate::TotalLiabilities => self.total_liabilities.clone(),
            Aggregate::TotalLiabilitiesExclSeverance => {
                self.total_liabilities_excl_severance.clone()
            }
            Aggregate::TotalEquity => union(&[&self.equity_additive, &self.treasury_shares]),
            Aggregate::TotalAssets => self.total_assets.clone(),
            Aggregate::NetFixedAssets => self.net_fixed_assets.clone(),
            Aggregate::IntangibleAssets => self.intangible_assets.clone(),
            Aggregate::NonCurrentFinancialAssets => self.non_current_financial_assets.clone(),
            Aggregate::CurrentFinancialAssets => self.current_financial_assets.clone(),
            Aggregate::LongTermDebt => self.long_term_debt.clone(),
            Aggregate::TaxSocialDebt => self.tax_social_debt.clone(),
        }
    }
}

fn union(parts: &[&Vec<PositionCode>]) -> Vec<PositionCode> {
    sorted_positions(parts.iter().flat_map(|p| p.iter().cloned()))
}
