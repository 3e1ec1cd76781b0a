use crate::calculator::{BalanceCheckResult, CalculationResult, KpiStatus};
use crate::coercion::format_amount;
use crate::position::PositionCode;
use crate::schema::PositionSchema;
use crate::snapshot::BalanceSheetSnapshot;
use chrono::NaiveDate;
use serde::Serialize;

const NOT_AVAILABLE: &str = "n/d";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputLine {
    pub position: PositionCode,
    pub name: String,
    pub value: f64,
}

/// The positions one KPI was computed from, with their values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiInputs {
    pub kpi_id: String,
    pub kpi_name: String,
    pub inputs: Vec<InputLine>,
}

/// Everything the results page shows for one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<NaiveDate>,
    pub balance: BalanceCheckResult,
    pub results: Vec<CalculationResult>,
    pub inputs_by_kpi: Vec<KpiInputs>,
}

impl AnalysisReport {
    pub fn new(
        snapshot: &BalanceSheetSnapshot,
        balance: BalanceCheckResult,
        results: Vec<CalculationResult>,
        schema: &PositionSchema,
    ) -> Self {
        let inputs_by_kpi = results
            .iter()
            .filter_map(|result| result.definition.as_ref())
            .map(|definition| KpiInputs {
                kpi_id: definition.id.clone(),
                kpi_name: definition.name.clone(),
                inputs: definition
                    .required_positions
                    .iter()
                    .map(|position| InputLine {
                        position: position.clone(),
                        name: schema.position_name(position),
                        value: snapshot.get(position),
                    })
                    .collect(),
            })
            .collect();

        Self {
            reference_date: snapshot.reference_date,
            balance,
            results,
            inputs_by_kpi,
        }
    }

    pub fn result(&self, kpi_id: &str) -> Option<&CalculationResult> {
        self.results.iter().find(|r| r.kpi_id == kpi_id)
    }

    pub fn inputs_for(&self, kpi_id: &str) -> Option<&KpiInputs> {
        self.inputs_by_kpi.iter().find(|i| i.kpi_id == kpi_id)
    }

    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == KpiStatus::Error)
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Section,Key,Name,Value,Status,Message\n");

        let balance_status = if self.balance.valid { "ok" } else { "error" };
        for (key, name, value) in [
            ("assets_total", "Totale Attivo", self.balance.assets_total),
            (
                "equity_and_liabilities_total",
                "Totale Passivo e Patrimonio Netto",
                self.balance.equity_and_liabilities_total,
            ),
            ("difference", "Differenza", self.balance.difference),
        ] {
            push_csv_row(
                &mut output,
                &["Balance", key, name, &format_amount(value, 2), balance_status, ""],
            );
        }

        for result in &self.results {
            let name = result
                .definition
                .as_ref()
                .map(|d| d.name.as_str())
                .unwrap_or("");
            push_csv_row(
                &mut output,
                &[
                    "KPI",
                    &result.kpi_id,
                    name,
                    &format_value(result.value),
                    status_label(result.status),
                    result.message.as_deref().unwrap_or(""),
                ],
            );
        }

        for kpi in &self.inputs_by_kpi {
            for line in &kpi.inputs {
                let key = format!("{}/{}", kpi.kpi_id, line.position);
                push_csv_row(
                    &mut output,
                    &["Input", &key, &line.name, &format_amount(line.value, 2), "", ""],
                );
            }
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Analisi KPI di Bilancio\n\n");
        if let Some(date) = self.reference_date {
            output.push_str(&format!("**Data di riferimento:** {}\n\n", date.format("%d/%m/%Y")));
        }

        output.push_str("## Quadratura\n\n");
        output.push_str(&format!(
            "- Totale Attivo: {}\n",
            format_amount(self.balance.assets_total, 2)
        ));
        output.push_str(&format!(
            "- Totale Passivo e Patrimonio Netto: {}\n",
            format_amount(self.balance.equity_and_liabilities_total, 2)
        ));
        if self.balance.valid {
            output.push_str("- Esito: ✅ bilancio quadrato\n\n");
        } else {
            output.push_str(&format!(
                "- Esito: ⚠️ **squadratura di {}**\n\n",
                format_amount(self.balance.difference, 2)
            ));
        }

        output.push_str("## Risultati\n\n");
        output.push_str("| KPI | Valore | Note |\n");
        output.push_str("|---|---|---|\n");
        for result in &self.results {
            let name = result
                .definition
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| result.kpi_id.clone());
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                name,
                format_value(result.value),
                result.message.as_deref().unwrap_or("")
            ));
        }
        output.push('\n');

        output.push_str("## Dati utilizzati\n\n");
        for kpi in &self.inputs_by_kpi {
            output.push_str(&format!("### {}\n\n", kpi.kpi_name));
            for line in &kpi.inputs {
                output.push_str(&format!(
                    "- {} {}: {}\n",
                    line.position,
                    line.name,
                    format_amount(line.value, 2)
                ));
            }
            output.push('\n');
        }

        output
    }
}

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format_amount(v, 2))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn status_label(status: KpiStatus) -> &'static str {
    match status {
        KpiStatus::Ok => "ok",
        KpiStatus::Error => "error",
    }
}

fn push_csv_row(output: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    output.push_str(&row.join(","));
    output.push('\n');
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
