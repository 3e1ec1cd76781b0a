//! KPI definitions and the standard catalog.
//!
//! Every KPI carries a plain function over the precomputed [`Aggregates`];
//! the catalog is a lookup table from identifier to definition, so adding a
//! KPI never touches the calculator.

use crate::calculator::Aggregates;
use crate::error::{KpiError, Result};
use crate::groups::Aggregate::*;
use crate::groups::{Aggregate, PositionGroups};
use crate::position::{sorted_positions, PositionCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a single KPI produced no value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KpiIssue {
    #[error("division by zero: {0} sums to zero")]
    DivisionByZero(&'static str),

    #[error("computation produced a non-finite value")]
    NonFinite,
}

pub type KpiFormula = fn(&Aggregates) -> std::result::Result<f64, KpiIssue>;

#[derive(Debug, Clone, Serialize)]
pub struct KpiDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub is_ratio: bool,
    pub is_crisis_law_kpi: bool,
    pub formula_display: String,
    pub optimal_range: String,
    pub inputs: Vec<Aggregate>,
    /// Sorted union of the positions behind `inputs`.
    pub required_positions: Vec<PositionCode>,
    #[serde(skip)]
    formula: KpiFormula,
}

impl KpiDefinition {
    /// Builds a definition, deriving its required positions from `groups`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        inputs: Vec<Aggregate>,
        formula: KpiFormula,
        groups: &PositionGroups,
    ) -> Self {
        let required_positions =
            sorted_positions(inputs.iter().flat_map(|a| groups.positions_for(*a)));
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: category.into(),
            is_ratio: true,
            is_crisis_law_kpi: false,
            formula_display: String::new(),
            optimal_range: String::new(),
            inputs,
            required_positions,
            formula,
        }
    }

    pub fn evaluate(&self, aggregates: &Aggregates) -> std::result::Result<f64, KpiIssue> {
        let value = (self.formula)(aggregates)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(KpiIssue::NonFinite)
        }
    }
}

/// `numerator / denominator`, refusing an exactly-zero denominator.
pub fn ratio(
    numerator: f64,
    denominator: f64,
    label: &'static str,
) -> std::result::Result<f64, KpiIssue> {
    if denominator == 0.0 {
        return Err(KpiIssue::DivisionByZero(label));
    }
    Ok(numerator / denominator)
}

fn over(
    a: &Aggregates,
    numerator: f64,
    denominator: Aggregate,
) -> std::result::Result<f64, KpiIssue> {
    ratio(numerator, a.get(denominator), denominator.label())
}

type Outcome = std::result::Result<f64, KpiIssue>;

fn current_ratio(a: &Aggregates) -> Outcome {
    over(a, a.current_assets, Aggregate::CurrentLiabilities)
}

fn quick_ratio(a: &Aggregates) -> Outcome {
    over(a, a.liquid_assets, Aggregate::CurrentLiabilities)
}

fn cash_ratio(a: &Aggregates) -> Outcome {
    over(a, a.cash, Aggregate::CurrentLiabilities)
}

fn debt_to_equity(a: &Aggregates) -> Outcome {
    over(a, a.total_liabilities, Aggregate::TotalEquity)
}

fn debt_to_equity_excl_tfr(a: &Aggregates) -> Outcome {
    over(a, a.total_liabilities_excl_severance, Aggregate::TotalEquity)
}

fn debt_ratio(a: &Aggregates) -> Outcome {
    over(a, a.total_liabilities, Aggregate::TotalAssets)
}

fn debt_ratio_excl_tfr(a: &Aggregates) -> Outcome {
    over(a, a.total_liabilities_excl_severance, Aggregate::TotalAssets)
}

fn working_capital(a: &Aggregates) -> Outcome {
    Ok(a.current_assets - a.current_liabilities)
}

fn asset_rigidity_index(a: &Aggregates) -> Outcome {
    over(a, a.net_fixed_assets, Aggregate::TotalAssets)
}

fn asset_elasticity_index(a: &Aggregates) -> Outcome {
    over(a, a.current_assets, Aggregate::TotalAssets)
}

fn fixed_asset_coverage_ratio(a: &Aggregates) -> Outcome {
    over(a, a.total_equity, Aggregate::NetFixedAssets)
}

fn tax_social_debt_on_assets_ratio(a: &Aggregates) -> Outcome {
    over(a, a.tax_social_debt, Aggregate::TotalAssets)
}

fn tangible_net_worth(a: &Aggregates) -> Outcome {
    Ok(a.total_equity - a.intangible_assets)
}

fn equity_multiplier(a: &Aggregates) -> Outcome {
    over(a, a.total_assets, Aggregate::TotalEquity)
}

fn long_term_debt_to_equity(a: &Aggregates) -> Outcome {
    over(a, a.long_term_debt, Aggregate::TotalEquity)
}

fn intangible_assets_ratio(a: &Aggregates) -> Outcome {
    over(a, a.intangible_assets, Aggregate::TotalAssets)
}

fn financial_assets_ratio(a: &Aggregates) -> Outcome {
    over(
        a,
        a.non_current_financial_assets + a.current_financial_assets,
        Aggregate::TotalAssets,
    )
}

fn non_current_assets_coverage(a: &Aggregates) -> Outcome {
    over(a, a.total_equity + a.long_term_debt, Aggregate::NetFixedAssets)
}

fn net_working_capital_ratio(a: &Aggregates) -> Outcome {
    over(
        a,
        a.current_assets - a.current_liabilities,
        Aggregate::TotalAssets,
    )
}

struct StandardKpi {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    is_ratio: bool,
    is_crisis_law_kpi: bool,
    formula_display: &'static str,
    optimal_range: &'static str,
    inputs: &'static [Aggregate],
    formula: KpiFormula,
}

const LIQUIDITY: &str = "Indici di Liquidità";
const LEVERAGE: &str = "Struttura Finanziaria e Leva";
const WORKING_CAPITAL: &str = "Capitale Circolante";
const ASSET_STRUCTURE: &str = "Analisi Strutturale dell'Attivo";
const SOLIDITY: &str = "Solidità Patrimoniale e Rischio";
const COVERAGE: &str = "Copertura e Capitale Circolante";

const STANDARD_KPIS: [StandardKpi; 19] = [
    StandardKpi {
        id: "current_ratio",
        name: "Indice di Liquidità Corrente",
        description: "Misura la capacità di coprire le passività a breve termine con le attività correnti.",
        category: LIQUIDITY,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Attività Correnti / Passività Correnti",
        optimal_range: "1.2 - 2.0 (manifatturiero), 0.8 - 1.5 (servizi). Varia per settore.",
        inputs: &[CurrentAssets, CurrentLiabilities],
        formula: current_ratio,
    },
    StandardKpi {
        id: "quick_ratio",
        name: "Indice di Liquidità Immediata (Acid Test)",
        description: "Misura la capacità di coprire le passività a breve termine con le attività più liquide.",
        category: LIQUIDITY,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Crediti + Titoli + Liquidità) / Passività Correnti",
        optimal_range: "0.8 - 1.2. Soglia critica < 0.5 indica alto rischio.",
        inputs: &[LiquidAssets, CurrentLiabilities],
        formula: quick_ratio,
    },
    StandardKpi {
        id: "cash_ratio",
        name: "Indice di Cassa",
        description: "Misura la capacità di coprire le passività a breve termine con la sola liquidità disponibile.",
        category: LIQUIDITY,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Liquidità / Passività Correnti",
        optimal_range: "0.1 - 0.2 (PMI). Valori > 0.5 potrebbero indicare eccesso di liquidità non investita.",
        inputs: &[Cash, CurrentLiabilities],
        formula: cash_ratio,
    },
    StandardKpi {
        id: "debt_to_equity",
        name: "Rapporto Debiti/Patrimonio Netto",
        description: "Indica il rapporto tra il finanziamento tramite terzi e il capitale proprio.",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Totale Passività / Patrimonio Netto",
        optimal_range: "Banche: 8-12 (regolamentato), Manifatturiero: 0.3-0.8, Servizi: 0.2-0.6. Varia molto per settore.",
        inputs: &[TotalLiabilities, TotalEquity],
        formula: debt_to_equity,
    },
    StandardKpi {
        id: "debt_to_equity_excl_tfr",
        name: "Rapporto Debiti/Patrimonio Netto (escl. TFR)",
        description: "Indica il rapporto tra il finanziamento tramite terzi (escluso TFR) e il capitale proprio.",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Totale Passività - TFR) / Patrimonio Netto",
        optimal_range: "Simile al D/E standard, ma valori leggermente inferiori. Varia per settore.",
        inputs: &[TotalLiabilitiesExclSeverance, TotalEquity],
        formula: debt_to_equity_excl_tfr,
    },
    StandardKpi {
        id: "debt_ratio",
        name: "Rapporto di Indebitamento Totale",
        description: "Indica la percentuale di attivi finanziati tramite debito.",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Totale Passività / Totale Attivo",
        optimal_range: "Generalmente < 0.6 per aziende stabili. Dipende dal settore e dalla fase del ciclo di vita dell'azienda.",
        inputs: &[TotalLiabilities, TotalAssets],
        formula: debt_ratio,
    },
    StandardKpi {
        id: "debt_ratio_excl_tfr",
        name: "Rapporto di Indebitamento Totale (escl. TFR)",
        description: "Indica la percentuale di attivi finanziati tramite debito (escluso TFR).",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Totale Passività - TFR) / Totale Attivo",
        optimal_range: "Generalmente < 0.6. Valori leggermente inferiori al Debt Ratio standard.",
        inputs: &[TotalLiabilitiesExclSeverance, TotalAssets],
        formula: debt_ratio_excl_tfr,
    },
    StandardKpi {
        id: "working_capital",
        name: "Capitale Circolante Netto",
        description: "Differenza tra attività correnti e passività correnti.",
        category: WORKING_CAPITAL,
        is_ratio: false,
        is_crisis_law_kpi: false,
        formula_display: "Attività Correnti - Passività Correnti",
        optimal_range: "Positivo è generalmente buono. Un valore negativo persistente può indicare problemi di liquidità.",
        inputs: &[CurrentAssets, CurrentLiabilities],
        formula: working_capital,
    },
    StandardKpi {
        id: "asset_rigidity_index",
        name: "Indice di Rigidità dell'Attivo",
        description: "Misura la proporzione di attivi immobilizzati sul totale attivo.",
        category: ASSET_STRUCTURE,
        is_ratio: true,
        is_crisis_law_kpi: true,
        formula_display: "Immobilizzazioni Nette / Totale Attivo",
        optimal_range: "Varia per settore. Settori capital intensive avranno valori più alti.",
        inputs: &[NetFixedAssets, TotalAssets],
        formula: asset_rigidity_index,
    },
    StandardKpi {
        id: "asset_elasticity_index",
        name: "Indice di Elasticità dell'Attivo",
        description: "Misura la proporzione di attivo circolante sul totale attivo.",
        category: ASSET_STRUCTURE,
        is_ratio: true,
        is_crisis_law_kpi: true,
        formula_display: "Attivo Circolante / Totale Attivo",
        optimal_range: "Varia per settore. Solitamente complementare all'indice di rigidità.",
        inputs: &[CurrentAssets, TotalAssets],
        formula: asset_elasticity_index,
    },
    StandardKpi {
        id: "fixed_asset_coverage_ratio",
        name: "Grado di Copertura delle Immobilizzazioni",
        description: "Indica in che misura le immobilizzazioni sono finanziate dal patrimonio netto.",
        category: SOLIDITY,
        is_ratio: true,
        is_crisis_law_kpi: true,
        formula_display: "Patrimonio Netto / Immobilizzazioni Nette",
        optimal_range: "Generalmente > 1 è considerato positivo. Valori < 1 indicano che parte delle immobilizzazioni è finanziata con debito.",
        inputs: &[TotalEquity, NetFixedAssets],
        formula: fixed_asset_coverage_ratio,
    },
    StandardKpi {
        id: "tax_social_debt_on_assets_ratio",
        name: "Incidenza Debiti Tributari e Previdenziali su Attivo",
        description: "Misura il peso dei debiti fiscali e contributivi sul totale attivo.",
        category: SOLIDITY,
        is_ratio: true,
        is_crisis_law_kpi: true,
        formula_display: "(Debiti Tributari + Debiti Verso Istituti di Previdenza) / Totale Attivo",
        optimal_range: "Non esiste un range ottimale fisso; va monitorato nel tempo e confrontato con medie settoriali.",
        inputs: &[TaxSocialDebt, TotalAssets],
        formula: tax_social_debt_on_assets_ratio,
    },
    StandardKpi {
        id: "tangible_net_worth",
        name: "Patrimonio Netto Tangibile",
        description: "Misura il patrimonio netto escludendo le attività immateriali.",
        category: SOLIDITY,
        is_ratio: false,
        is_crisis_law_kpi: true,
        formula_display: "Patrimonio Netto Totale - Immobilizzazioni Immateriali Totali",
        optimal_range: "Dipende dal settore. Un valore positivo è generalmente atteso.",
        inputs: &[TotalEquity, IntangibleAssets],
        formula: tangible_net_worth,
    },
    StandardKpi {
        id: "equity_multiplier",
        name: "Moltiplicatore dell'Equity",
        description: "Misura la leva finanziaria dell'azienda.",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Totale Attivo / Patrimonio Netto",
        optimal_range: "Varia significativamente per settore. Confrontare con medie settoriali.",
        inputs: &[TotalAssets, TotalEquity],
        formula: equity_multiplier,
    },
    StandardKpi {
        id: "long_term_debt_to_equity",
        name: "Rapporto Debiti M/L Termine su Patrimonio Netto",
        description: "Misura l'indebitamento a medio-lungo termine rispetto al capitale proprio.",
        category: LEVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Debiti oltre 12 mesi / Patrimonio Netto",
        optimal_range: "Generalmente, valori più bassi sono preferibili. Dipende dal settore e dalla stabilità dei flussi di cassa.",
        inputs: &[LongTermDebt, TotalEquity],
        formula: long_term_debt_to_equity,
    },
    StandardKpi {
        id: "intangible_assets_ratio",
        name: "Incidenza Immobilizzazioni Immateriali",
        description: "Percentuale di attività immateriali sul totale attivo.",
        category: ASSET_STRUCTURE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "Immobilizzazioni Immateriali / Totale Attivo",
        optimal_range: "Varia per settore. Elevato in settori tech/pharma, basso in manifatturiero tradizionale.",
        inputs: &[IntangibleAssets, TotalAssets],
        formula: intangible_assets_ratio,
    },
    StandardKpi {
        id: "financial_assets_ratio",
        name: "Incidenza Attività Finanziarie",
        description: "Peso delle attività finanziarie sul totale attivo.",
        category: ASSET_STRUCTURE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Immobilizzazioni Finanziarie + Attività Finanziarie Correnti) / Totale Attivo",
        optimal_range: "Dipende dalla strategia aziendale (holding vs. operativa).",
        inputs: &[NonCurrentFinancialAssets, CurrentFinancialAssets, TotalAssets],
        formula: financial_assets_ratio,
    },
    StandardKpi {
        id: "non_current_assets_coverage",
        name: "Copertura Immobilizzazioni (Capitale Permanente)",
        description: "Misura come le immobilizzazioni sono coperte da patrimonio netto e debiti a M/L.",
        category: COVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Patrimonio Netto + Debiti oltre 12 mesi) / Immobilizzazioni Nette",
        optimal_range: "Idealmente > 1. Valori inferiori a 1 indicano che parte dell'attivo fisso è finanziato con passività correnti.",
        inputs: &[TotalEquity, LongTermDebt, NetFixedAssets],
        formula: non_current_assets_coverage,
    },
    StandardKpi {
        id: "net_working_capital_ratio",
        name: "Indice Capitale Circolante Netto su Attivo",
        description: "Misura l'incidenza del capitale circolante netto sul totale attivo.",
        category: COVERAGE,
        is_ratio: true,
        is_crisis_law_kpi: false,
        formula_display: "(Attivo Circolante - Passivo Corrente) / Totale Attivo",
        optimal_range: "Varia per settore. Un valore positivo è necessario, ma valori troppo alti possono indicare inefficienze.",
        inputs: &[CurrentAssets, CurrentLiabilities, TotalAssets],
        formula: net_working_capital_ratio,
    },
];

/// Ordered lookup table of KPI definitions.
#[derive(Debug, Clone, Default)]
pub struct KpiCatalog {
    definitions: Vec<Arc<KpiDefinition>>,
    index: HashMap<String, usize>,
}

impl KpiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nineteen balance-sheet KPIs, with required positions taken from `groups`.
    pub fn standard(groups: &PositionGroups) -> Self {
        let mut catalog = Self::new();
        for kpi in &STANDARD_KPIS {
            let mut definition = KpiDefinition::new(
                kpi.id,
                kpi.name,
                kpi.category,
                kpi.inputs.to_vec(),
                kpi.formula,
                groups,
            );
            definition.description = kpi.description.to_string();
            definition.is_ratio = kpi.is_ratio;
            definition.is_crisis_law_kpi = kpi.is_crisis_law_kpi;
            definition.formula_display = kpi.formula_display.to_string();
            definition.optimal_range = kpi.optimal_range.to_string();
            catalog.push(definition);
        }
        catalog
    }

    /// Adds a definition. Identifiers must be unique.
    pub fn insert(&mut self, definition: KpiDefinition) -> Result<()> {
        if self.contains(&definition.id) {
            return Err(KpiError::Config(format!(
                "KPI '{}' is already defined",
                definition.id
            )));
        }
        self.push(definition);
        Ok(())
    }

    fn push(&mut self, definition: KpiDefinition) {
        self.index
            .insert(definition.id.clone(), self.definitions.len());
        self.definitions.push(Arc::new(definition));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<KpiDefinition>> {
        self.index.get(id).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<KpiDefinition>> {
        self.definitions.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definitions grouped by category, categories in order of first appearance.
    pub fn grouped_by_category(&self) -> Vec<(String, Vec<Arc<KpiDefinition>>)> {
        let mut groups: Vec<(String, Vec<Arc<KpiDefinition>>)> = Vec::new();
        for definition in &self.definitions {
            match groups.iter_mut().find(|(c, _)| *c == definition.category) {
                Some((_, members)) => members.push(Arc::clone(definition)),
                None => groups.push((definition.category.clone(), vec![Arc::clone(definition)])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PositionSchema;

    fn catalog() -> KpiCatalog {
        let groups = PositionGroups::from_schema(&PositionSchema::cee()).unwrap();
        KpiCatalog::standard(&groups)
    }

    #[test]
    fn test_standard_catalog_has_nineteen_kpis() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 19);
        assert_eq!(catalog.ids()[0], "current_ratio");
        assert_eq!(catalog.ids()[18], "net_working_capital_ratio");
    }

    #[test]
    fn test_absolute_kpis() {
        let catalog = catalog();
        let absolute: Vec<&str> = catalog
            .iter()
            .filter(|d| !d.is_ratio)
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(absolute, vec!["working_capital", "tangible_net_worth"]);
    }

    #[test]
    fn test_required_positions_are_derived_from_groups() {
        let catalog = catalog();
        let cash_ratio = catalog.get("cash_ratio").unwrap();
        let codes: Vec<&str> = cash_ratio
            .required_positions
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(
            codes,
            vec!["49", "50", "79", "80", "81", "82", "83", "84", "85", "86", "87", "88"]
        );
    }

    #[test]
    fn test_categories_in_first_appearance_order() {
        let catalog = catalog();
        let categories: Vec<String> = catalog
            .grouped_by_category()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(
            categories,
            vec![LIQUIDITY, LEVERAGE, WORKING_CAPITAL, ASSET_STRUCTURE, SOLIDITY, COVERAGE]
        );
        let total: usize = catalog
            .grouped_by_category()
            .iter()
            .map(|(_, m)| m.len())
            .sum();
        assert_eq!(total, 19);
    }

    #[test]
    fn test_ratio_refuses_zero_denominator() {
        assert_eq!(
            ratio(1.0, 0.0, "current liabilities"),
            Err(KpiIssue::DivisionByZero("current liabilities"))
        );
        assert!((ratio(3.0, 2.0, "x").unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(
            KpiIssue::DivisionByZero("total equity").to_string(),
            "division by zero: total equity sums to zero"
        );
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let groups = PositionGroups::from_schema(&PositionSchema::cee()).unwrap();
        let mut catalog = KpiCatalog::standard(&groups);
        let duplicate = KpiDefinition::new(
            "cash_ratio",
            "Dup",
            "Custom",
            vec![Aggregate::Cash],
            |a| Ok(a.cash),
            &groups,
        );
        assert!(catalog.insert(duplicate).is_err());

        let custom = KpiDefinition::new(
            "cash_share",
            "Cash share",
            "Custom",
            vec![Aggregate::Cash, Aggregate::TotalAssets],
            |a| ratio(a.cash, a.total_assets, "total assets"),
            &groups,
        );
        catalog.insert(custom).unwrap();
        assert_eq!(catalog.len(), 20);
        assert!(catalog.contains("cash_share"));
    }
}
