use crate::error::{KpiError, Result};
use crate::position::{codes, PositionCode, NON_CURRENT_SUFFIX};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const ASSETS: &str = "assets";
pub const EQUITY_AND_LIABILITIES: &str = "equity_and_liabilities";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    #[schemars(description = "Due within 12 months (short maturity, 'entro 12 mesi')")]
    Within12Months,

    #[schemars(description = "Due beyond 12 months (long maturity, 'oltre 12 mesi')")]
    Beyond12Months,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PositionInfo {
    #[schemars(description = "Display name of the balance-sheet line")]
    pub name: String,

    #[serde(default)]
    #[schemars(
        description = "Filler position outside the civil-code layout. Excluded from totals built over a section and from input forms."
    )]
    pub placeholder: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Maturity bucket for lines split by due date")]
    pub maturity: Option<Maturity>,
}

/// A node of the position tree: either a list of positions or an ordered set of named sub-sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum SchemaNode {
    Leaf(Vec<PositionCode>),
    Group(Vec<SchemaSection>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SchemaSection {
    pub key: String,
    pub node: SchemaNode,
}

impl SchemaNode {
    /// All positions below this node, in tree order.
    pub fn flatten(&self) -> Vec<PositionCode> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<PositionCode>) {
        match self {
            SchemaNode::Leaf(positions) => out.extend(positions.iter().cloned()),
            SchemaNode::Group(sections) => {
                for section in sections {
                    section.node.collect_into(out);
                }
            }
        }
    }

    pub fn child(&self, key: &str) -> Option<&SchemaNode> {
        match self {
            SchemaNode::Group(sections) => sections
                .iter()
                .find(|s| s.key == key)
                .map(|s| &s.node),
            SchemaNode::Leaf(_) => None,
        }
    }

    /// Prunes the tree to `required`, dropping empty leaves and groups.
    pub fn restricted_to(&self, required: &BTreeSet<PositionCode>) -> Option<SchemaNode> {
        match self {
            SchemaNode::Leaf(positions) => {
                let kept: Vec<PositionCode> = positions
                    .iter()
                    .filter(|p| required.contains(*p))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(SchemaNode::Leaf(kept))
                }
            }
            SchemaNode::Group(sections) => {
                let kept: Vec<SchemaSection> = sections
                    .iter()
                    .filter_map(|s| {
                        s.node.restricted_to(required).map(|node| SchemaSection {
                            key: s.key.clone(),
                            node,
                        })
                    })
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(SchemaNode::Group(kept))
                }
            }
        }
    }
}

/// The balance-sheet position tree plus per-position metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PositionSchema {
    #[schemars(description = "Asset side of the balance sheet (Attivo)")]
    pub assets: SchemaNode,

    #[schemars(description = "Equity, provisions, severance, debts and accruals (Passivo e Patrimonio Netto)")]
    pub equity_and_liabilities: SchemaNode,

    #[schemars(description = "Metadata for every position code that appears in the tree")]
    pub positions: BTreeMap<PositionCode, PositionInfo>,

    #[serde(default)]
    #[schemars(description = "Display titles keyed by section key")]
    pub section_titles: BTreeMap<String, String>,
}

impl PositionSchema {
    pub fn branch(&self, key: &str) -> Option<&SchemaNode> {
        match key {
            ASSETS => Some(&self.assets),
            EQUITY_AND_LIABILITIES => Some(&self.equity_and_liabilities),
            _ => None,
        }
    }

    /// Looks up a node by section path, e.g. `["assets", "current_assets", "inventories"]`.
    pub fn node_at(&self, path: &[&str]) -> Option<&SchemaNode> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.branch(first)?, |node, key| node.child(key))
    }

    pub fn positions_at(&self, path: &[&str]) -> Result<Vec<PositionCode>> {
        self.node_at(path).map(SchemaNode::flatten).ok_or_else(|| {
            KpiError::Schema(format!("Missing schema section '{}'", path.join(".")))
        })
    }

    pub fn all_positions(&self) -> Vec<PositionCode> {
        let mut all = self.assets.flatten();
        all.extend(self.equity_and_liabilities.flatten());
        all
    }

    pub fn info(&self, code: &PositionCode) -> Option<&PositionInfo> {
        self.positions.get(code)
    }

    pub fn is_placeholder(&self, code: &PositionCode) -> bool {
        self.info(code).map(|i| i.placeholder).unwrap_or(false)
    }

    pub fn maturity(&self, code: &PositionCode) -> Option<Maturity> {
        self.info(code).and_then(|i| i.maturity)
    }

    pub fn position_name(&self, code: &PositionCode) -> String {
        self.info(code)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| format!("Posizione {}", code))
    }

    pub fn section_title(&self, key: &str) -> String {
        if let Some(title) = self.section_titles.get(key) {
            return title.clone();
        }

        key.split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn without_placeholders(&self, positions: Vec<PositionCode>) -> Vec<PositionCode> {
        positions
            .into_iter()
            .filter(|p| !self.is_placeholder(p))
            .collect()
    }

    /// The input-form layout for a set of required positions: both branches pruned to `required`.
    pub fn restricted_to(&self, required: &BTreeSet<PositionCode>) -> Vec<SchemaSection> {
        [
            (ASSETS, &self.assets),
            (EQUITY_AND_LIABILITIES, &self.equity_and_liabilities),
        ]
        .into_iter()
        .filter_map(|(key, node)| {
            node.restricted_to(required).map(|node| SchemaSection {
                key: key.to_string(),
                node,
            })
        })
        .collect()
    }

    /// Checks that every code is well formed, sits in exactly one leaf and has metadata.
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeSet<&PositionCode> = BTreeSet::new();
        let all = self.all_positions();

        for code in &all {
            if !code.is_recognised() {
                return Err(KpiError::Schema(format!(
                    "Position '{}' is not a valid position code",
                    code
                )));
            }
            if !seen.insert(code) {
                return Err(KpiError::Schema(format!(
                    "Position '{}' appears in more than one section",
                    code
                )));
            }
            if !self.positions.contains_key(code) {
                return Err(KpiError::Schema(format!(
                    "Position '{}' has no metadata",
                    code
                )));
            }
        }

        if let Some(orphan) = self.positions.keys().find(|code| !seen.contains(code)) {
            return Err(KpiError::Schema(format!(
                "Position '{}' has metadata but belongs to no section",
                orphan
            )));
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PositionSchema)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    /// Balance sheet layout of Art. 2424 Codice Civile.
    pub fn cee() -> Self {
        // Receivables are split by maturity into two sibling leaves.
        let receivable = |key: &str, base: u32| {
            vec![
                section(
                    &format!("{}_current", key),
                    leaf(vec![PositionCode::from(base)]),
                ),
                section(
                    &format!("{}_non_current", key),
                    leaf(vec![PositionCode::with_suffix(base, NON_CURRENT_SUFFIX)]),
                ),
            ]
        };

        let receivables: Vec<SchemaSection> = [
            ("due_from_customers", 39),
            ("due_from_subsidiaries", 40),
            ("due_from_associates", 41),
            ("due_from_parent_companies", 42),
            ("tax_receivables", 43),
            ("deferred_tax_assets", 44),
            ("other_receivables", 45),
        ]
        .into_iter()
        .flat_map(|(key, base)| receivable(key, base))
        .collect();

        let assets = group(vec![
            section("due_from_shareholders", leaf(vec![])),
            section(
                "non_current_assets",
                group(vec![
                    section("intangible_assets", leaf(codes(1..=10))),
                    section("tangible_assets", leaf(codes(11..=25))),
                    section("financial_investments_non_current", leaf(codes(26..=30))),
                ]),
            ),
            section(
                "current_assets",
                group(vec![
                    section("inventories", leaf(codes(31..=38))),
                    section("trade_and_other_receivables", group(receivables)),
                    section("current_financial_assets", leaf(codes(46..=48))),
                    section("cash_and_cash_equivalents", leaf(codes(49..=50))),
                ]),
            ),
            section("prepaid_expenses_and_accrued_income", leaf(codes([51]))),
        ]);

        let equity_and_liabilities = group(vec![
            section(
                "equity",
                group(vec![
                    section("share_capital", leaf(codes([52]))),
                    section("endowment_fund", leaf(codes([53]))),
                    section("share_premium_reserve", leaf(codes([54]))),
                    section("revaluation_reserve", leaf(codes([55]))),
                    section("legal_reserve", leaf(codes([56]))),
                    section("statutory_reserves", leaf(codes([57]))),
                    section("other_reserves", leaf(codes([58]))),
                    section("cash_flow_hedge_reserve", leaf(codes([59]))),
                    section("reserve_placeholders", leaf(codes(60..=63))),
                    section("retained_earnings", leaf(codes([64]))),
                    section("profit_or_loss_for_the_year", leaf(codes([65]))),
                    section("negative_reserve_for_treasury_shares", leaf(codes([66]))),
                ]),
            ),
            section("provisions_for_risks_and_charges", leaf(codes(67..=69))),
            section("employee_severance_indemnity_tfr", leaf(codes([100]))),
            section(
                "liabilities",
                group(vec![
                    section("bonds_issued", leaf(codes([70]))),
                    section("convertible_bonds_issued", leaf(codes([71]))),
                    section("amounts_owed_to_shareholders_for_loans", leaf(codes([72]))),
                    section("amounts_owed_to_banks", leaf(codes([73, 80]))),
                    section("amounts_owed_to_other_lenders", leaf(codes([74, 81]))),
                    section("advances_received_from_customers", leaf(codes([75, 82]))),
                    section("trade_payables", leaf(codes([76, 79]))),
                    section("debt_represented_by_credit_instruments", leaf(codes([77, 83]))),
                    section("amounts_owed_to_group_companies", leaf(codes([78, 84]))),
                    section("tax_payables", leaf(codes([85]))),
                    section("social_security_payables", leaf(codes([86]))),
                    section("other_payables", leaf(codes([87]))),
                ]),
            ),
            section("accrued_expenses_and_deferred_income", leaf(codes([88]))),
        ]);

        let positions = CEE_POSITIONS
            .iter()
            .map(|&(code, name, kind)| {
                let info = PositionInfo {
                    name: name.to_string(),
                    placeholder: kind == Kind::Placeholder,
                    maturity: match kind {
                        Kind::Short => Some(Maturity::Within12Months),
                        Kind::Long => Some(Maturity::Beyond12Months),
                        _ => None,
                    },
                };
                (PositionCode::from(code), info)
            })
            .collect();

        let section_titles = CEE_SECTION_TITLES
            .iter()
            .map(|&(key, title)| (key.to_string(), title.to_string()))
            .collect();

        Self {
            assets,
            equity_and_liabilities,
            positions,
            section_titles,
        }
    }
}

impl Default for PositionSchema {
    fn default() -> Self {
        Self::cee()
    }
}

fn leaf(positions: Vec<PositionCode>) -> SchemaNode {
    SchemaNode::Leaf(positions)
}

fn group(sections: Vec<SchemaSection>) -> SchemaNode {
    SchemaNode::Group(sections)
}

fn section(key: &str, node: SchemaNode) -> SchemaSection {
    SchemaSection {
        key: key.to_string(),
        node,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Placeholder,
    Short,
    Long,
}

const CEE_POSITIONS: &[(&str, &str, Kind)] = &[
    ("1", "Costi di impianto e di ampliamento", Kind::Plain),
    ("2", "Costi di sviluppo", Kind::Plain),
    ("3", "Diritti di brevetto industriale e diritti di utilizzazione delle opere dell'ingegno", Kind::Plain),
    ("4", "Concessioni, licenze, marchi e diritti simili", Kind::Plain),
    ("5", "Avviamento", Kind::Plain),
    ("6", "Immobilizzazioni in corso e acconti (Immateriali)", Kind::Plain),
    ("7", "Altre immobilizzazioni immateriali", Kind::Plain),
    ("8", "(Placeholder 8 - Immateriali)", Kind::Placeholder),
    ("9", "(Placeholder 9 - Immateriali)", Kind::Placeholder),
    ("10", "(Placeholder 10 - Immateriali)", Kind::Placeholder),
    ("11", "Terreni e fabbricati", Kind::Plain),
    ("12", "Impianti e macchinario", Kind::Plain),
    ("13", "Attrezzature industriali e commerciali", Kind::Plain),
    ("14", "Altri beni (Materiali)", Kind::Plain),
    ("15", "Immobilizzazioni in corso e acconti (Materiali)", Kind::Plain),
    ("16", "(Placeholder 16 - Materiali)", Kind::Placeholder),
    ("17", "(Placeholder 17 - Materiali)", Kind::Placeholder),
    ("18", "(Placeholder 18 - Materiali)", Kind::Placeholder),
    ("19", "(Placeholder 19 - Materiali)", Kind::Placeholder),
    ("20", "(Placeholder 20 - Materiali)", Kind::Placeholder),
    ("21", "(Placeholder 21 - Materiali)", Kind::Placeholder),
    ("22", "(Placeholder 22 - Materiali)", Kind::Placeholder),
    ("23", "(Placeholder 23 - Materiali)", Kind::Placeholder),
    ("24", "(Placeholder 24 - Materiali)", Kind::Placeholder),
    ("25", "(Placeholder 25 - Materiali)", Kind::Placeholder),
    ("26", "Partecipazioni in imprese controllate (Immobilizzate)", Kind::Plain),
    ("27", "Partecipazioni in imprese collegate (Immobilizzate)", Kind::Plain),
    ("28", "Partecipazioni in imprese controllanti (Immobilizzate)", Kind::Plain),
    ("29", "Altre partecipazioni (Immobilizzate)", Kind::Plain),
    ("30", "Altri titoli immobilizzati", Kind::Plain),
    ("31", "Materie prime, sussidiarie e di consumo", Kind::Plain),
    ("32", "Prodotti in corso di lavorazione e semilavorati", Kind::Plain),
    ("33", "Lavori in corso su ordinazione", Kind::Plain),
    ("34", "Prodotti finiti e merci", Kind::Plain),
    ("35", "Acconti (a fornitori per rimanenze)", Kind::Plain),
    ("36", "(Placeholder 36 - Rimanenze)", Kind::Placeholder),
    ("37", "(Placeholder 37 - Rimanenze)", Kind::Placeholder),
    ("38", "(Placeholder 38 - Rimanenze)", Kind::Placeholder),
    ("39", "Crediti verso clienti (entro 12 mesi)", Kind::Short),
    ("39.NCA", "Crediti verso clienti (oltre 12 mesi)", Kind::Long),
    ("40", "Crediti verso imprese controllate (entro 12 mesi)", Kind::Short),
    ("40.NCA", "Crediti verso imprese controllate (oltre 12 mesi)", Kind::Long),
    ("41", "Crediti verso imprese collegate (entro 12 mesi)", Kind::Short),
    ("41.NCA", "Crediti verso imprese collegate (oltre 12 mesi)", Kind::Long),
    ("42", "Crediti verso imprese controllanti (entro 12 mesi)", Kind::Short),
    ("42.NCA", "Crediti verso imprese controllanti (oltre 12 mesi)", Kind::Long),
    ("43", "Crediti tributari (entro 12 mesi)", Kind::Short),
    ("43.NCA", "Crediti tributari (oltre 12 mesi)", Kind::Long),
    ("44", "Imposte anticipate (considerate correnti)", Kind::Short),
    ("44.NCA", "Imposte anticipate (considerate non correnti)", Kind::Long),
    ("45", "Crediti verso altri (entro 12 mesi)", Kind::Short),
    ("45.NCA", "Crediti verso altri (oltre 12 mesi)", Kind::Long),
    ("46", "Partecipazioni in altre imprese (Attivo Circolante)", Kind::Plain),
    ("47", "Altri titoli (Attivo Circolante)", Kind::Plain),
    ("48", "Strumenti finanziari derivati attivi (Attivo Circolante)", Kind::Plain),
    ("49", "Depositi bancari e postali", Kind::Plain),
    ("50", "Assegni e denaro in cassa", Kind::Plain),
    ("51", "Ratei e Risconti attivi", Kind::Plain),
    ("52", "Capitale sociale", Kind::Plain),
    ("53", "Fondo di dotazione", Kind::Plain),
    ("54", "Riserva da sovrapprezzo delle azioni", Kind::Plain),
    ("55", "Riserve di rivalutazione", Kind::Plain),
    ("56", "Riserva legale", Kind::Plain),
    ("57", "Riserve statutarie", Kind::Plain),
    ("58", "Altre riserve, distintamente indicate", Kind::Plain),
    ("59", "Riserva per operazioni di copertura di flussi finanziari attesi", Kind::Plain),
    ("60", "(Placeholder 60 - Riserve)", Kind::Placeholder),
    ("61", "(Placeholder 61 - Riserve)", Kind::Placeholder),
    ("62", "(Placeholder 62 - Riserve)", Kind::Placeholder),
    ("63", "(Placeholder 63 - Riserve)", Kind::Placeholder),
    ("64", "Utili (perdite) portati a nuovo", Kind::Plain),
    ("65", "Utile (perdita) dell'esercizio", Kind::Plain),
    ("66", "Riserva negativa per azioni proprie in portafoglio", Kind::Plain),
    ("67", "Fondi per imposte, anche differite", Kind::Plain),
    ("68", "Fondi per quiescenza e obblighi simili", Kind::Plain),
    ("69", "Altri fondi (Rischi e Oneri)", Kind::Plain),
    ("70", "Obbligazioni", Kind::Long),
    ("71", "Obbligazioni convertibili", Kind::Long),
    ("72", "Debiti verso soci per finanziamenti", Kind::Long),
    ("73", "Debiti verso banche (oltre 12 mesi)", Kind::Long),
    ("74", "Debiti verso altri finanziatori (oltre 12 mesi)", Kind::Long),
    ("75", "Acconti da clienti (oltre 12 mesi)", Kind::Long),
    ("76", "Debiti verso fornitori (oltre 12 mesi)", Kind::Long),
    ("77", "Debiti rappresentati da titoli di credito (oltre 12 mesi)", Kind::Long),
    ("78", "Debiti verso imprese del gruppo (oltre 12 mesi)", Kind::Long),
    ("79", "Debiti verso fornitori (entro 12 mesi)", Kind::Short),
    ("80", "Debiti verso banche (entro 12 mesi)", Kind::Short),
    ("81", "Debiti verso altri finanziatori (entro 12 mesi)", Kind::Short),
    ("82", "Acconti da clienti (entro 12 mesi)", Kind::Short),
    ("83", "Debiti rappresentati da titoli di credito (entro 12 mesi)", Kind::Short),
    ("84", "Debiti verso imprese del gruppo (entro 12 mesi)", Kind::Short),
    ("85", "Debiti tributari", Kind::Short),
    ("86", "Debiti verso istituti di previdenza e sicurezza sociale", Kind::Short),
    ("87", "Altri debiti (entro 12 mesi)", Kind::Short),
    ("88", "Ratei e Risconti passivi", Kind::Plain),
    ("100", "Trattamento di fine rapporto di lavoro subordinato", Kind::Plain),
];

const CEE_SECTION_TITLES: &[(&str, &str)] = &[
    (ASSETS, "ATTIVO"),
    (EQUITY_AND_LIABILITIES, "PASSIVO E PATRIMONIO NETTO"),
    ("due_from_shareholders", "A) Crediti verso soci per versamenti ancora dovuti"),
    ("non_current_assets", "B) Immobilizzazioni"),
    ("intangible_assets", "B.I) Immobilizzazioni Immateriali"),
    ("tangible_assets", "B.II) Immobilizzazioni Materiali"),
    ("financial_investments_non_current", "B.III) Immobilizzazioni Finanziarie"),
    ("current_assets", "C) Attivo Circolante"),
    ("inventories", "C.I) Rimanenze"),
    ("trade_and_other_receivables", "C.II) Crediti"),
    ("current_financial_assets", "C.III) Attività Finanziarie che non costituiscono immobilizzazioni"),
    ("cash_and_cash_equivalents", "C.IV) Disponibilità Liquide"),
    ("prepaid_expenses_and_accrued_income", "D) Ratei e Risconti Attivi"),
    ("equity", "A) Patrimonio Netto"),
    ("share_capital", "A.I) Capitale Sociale"),
    ("endowment_fund", "Fondo di dotazione"),
    ("share_premium_reserve", "A.II) Riserva da sovrapprezzo azioni"),
    ("revaluation_reserve", "A.III) Riserve di rivalutazione"),
    ("legal_reserve", "A.IV) Riserva legale"),
    ("statutory_reserves", "A.V) Riserve statutarie"),
    ("other_reserves", "A.VI) Altre riserve, distintamente indicate"),
    ("cash_flow_hedge_reserve", "A.VII) Riserva per operazioni di copertura dei flussi finanziari attesi"),
    ("retained_earnings", "A.VIII) Utili (perdite) portati a nuovo"),
    ("profit_or_loss_for_the_year", "A.IX) Utile (perdita) dell'esercizio"),
    ("negative_reserve_for_treasury_shares", "A.X) Riserva negativa per azioni proprie in portafoglio"),
    ("provisions_for_risks_and_charges", "B) Fondi per Rischi e Oneri"),
    ("employee_severance_indemnity_tfr", "C) Trattamento di Fine Rapporto di Lavoro Subordinato"),
    ("liabilities", "D) Debiti"),
    ("bonds_issued", "D.1) Obbligazioni"),
    ("convertible_bonds_issued", "D.2) Obbligazioni Convertibili"),
    ("amounts_owed_to_shareholders_for_loans", "D.3) Debiti verso soci per finanziamenti"),
    ("amounts_owed_to_banks", "D.4) Debiti verso banche"),
    ("amounts_owed_to_other_lenders", "D.5) Debiti verso altri finanziatori"),
    ("advances_received_from_customers", "D.6) Acconti da Clienti"),
    ("trade_payables", "D.7) Debiti verso fornitori"),
    ("debt_represented_by_credit_instruments", "D.8) Debiti rappresentati da titoli di credito"),
    ("amounts_owed_to_group_companies", "D.9) Debiti verso imprese del gruppo"),
    ("tax_payables", "D.12) Debiti tributari"),
    ("social_security_payables", "D.13) Debiti verso istituti di previdenza e sicurezza sociale"),
    ("other_payables", "D.14) Altri debiti"),
    ("accrued_expenses_and_deferred_income", "E) Ratei e Risconti Passivi"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cee_schema_is_valid() {
        let schema = PositionSchema::cee();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.all_positions().len(), schema.positions.len());
    }

    #[test]
    fn test_node_lookup_and_flatten() {
        let schema = PositionSchema::cee();

        let cash = schema
            .positions_at(&[ASSETS, "current_assets", "cash_and_cash_equivalents"])
            .unwrap();
        assert_eq!(cash, codes([49, 50]));

        let receivables = schema
            .positions_at(&[ASSETS, "current_assets", "trade_and_other_receivables"])
            .unwrap();
        assert_eq!(receivables.len(), 14);
        assert_eq!(receivables[0].as_str(), "39");
        assert_eq!(receivables[1].as_str(), "39.NCA");

        assert!(schema.positions_at(&[ASSETS, "nope"]).is_err());
        assert!(schema.positions_at(&[]).is_err());
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let mut schema = PositionSchema::cee();
        if let SchemaNode::Group(sections) = &mut schema.assets {
            sections.push(section("duplicate", leaf(codes([49]))));
        }
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("more than one section"));
    }

    #[test]
    fn test_missing_metadata_rejected() {
        let mut schema = PositionSchema::cee();
        schema.positions.remove(&PositionCode::from(88));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_restricted_layout_prunes_empty_sections() {
        let schema = PositionSchema::cee();
        let required: BTreeSet<PositionCode> = codes([49, 50, 80]).into_iter().collect();
        let layout = schema.restricted_to(&required);

        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].key, ASSETS);
        let assets = &layout[0].node;
        assert!(assets.child("non_current_assets").is_none());
        let current = assets.child("current_assets").unwrap();
        assert_eq!(
            current.child("cash_and_cash_equivalents").unwrap().flatten(),
            codes([49, 50])
        );

        let banks = layout[1]
            .node
            .child("liabilities")
            .and_then(|n| n.child("amounts_owed_to_banks"))
            .unwrap();
        assert_eq!(banks.flatten(), codes([80]));
    }

    #[test]
    fn test_names_and_titles() {
        let schema = PositionSchema::cee();
        assert_eq!(schema.position_name(&PositionCode::from(5)), "Avviamento");
        assert_eq!(schema.position_name(&PositionCode::from(999)), "Posizione 999");
        assert!(schema.is_placeholder(&PositionCode::from(36)));
        assert_eq!(
            schema.maturity(&PositionCode::from("39.NCA")),
            Some(Maturity::Beyond12Months)
        );
        assert_eq!(schema.section_title("equity"), "A) Patrimonio Netto");
        assert_eq!(
            schema.section_title("due_from_customers_current"),
            "Due From Customers Current"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let schema = PositionSchema::cee();
        let json = schema.to_json().unwrap();
        let back = PositionSchema::from_json_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = PositionSchema::schema_as_json().unwrap();
        assert!(schema_json.contains("equity_and_liabilities"));
        assert!(schema_json.contains("placeholder"));
    }
}
