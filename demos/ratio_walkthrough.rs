use cee_kpi_analyzer::{
    AnalysisSession, FormData, FormSection, KpiEngine, LedgerBalance, PositionCode,
};
use chrono::NaiveDate;

fn print_section(section: &FormSection, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}", indent, section.title);
    for field in &section.fields {
        println!("{}  [{}] {}", indent, field.field_name, field.label);
    }
    for child in &section.sections {
        print_section(child, depth + 1);
    }
}

fn main() {
    let engine = KpiEngine::standard();
    let selection = ["current_ratio", "quick_ratio", "debt_to_equity", "working_capital"];

    println!("Available KPIs:");
    for (category, kpis) in engine.kpis_by_category() {
        println!(" {}", category);
        for kpi in kpis {
            println!("  - {} ({})", kpi.name, kpi.id);
        }
    }

    let mut session = AnalysisSession::new();
    let required = session
        .select(&engine, &selection)
        .expect("selection should be valid")
        .to_vec();
    println!("\n{} positions needed. Form layout:", required.len());
    for section in engine.required_layout(&selection).expect("selection should be valid") {
        print_section(&section, 1);
    }

    let mut form = FormData::new();
    for (position, text) in [
        ("31", "60.000"),
        ("34", "240.000,00"),
        ("39", "95.000,00"),
        ("49", "38.000 + 2.000"),
        ("52", "100.000,00"),
        ("79", "210.000,00"),
    ] {
        form.insert(PositionCode::from(position).field_name(), text.to_string());
    }

    if let Err(errors) = session.submit_form(&engine, &form) {
        println!("\nForm rejected:");
        for error in &errors {
            println!(" - {} '{}': {}", error.field_name, error.raw, error.message);
        }
        form.insert("pos_31".to_string(), "60.000,00".to_string());
        form.insert("pos_49".to_string(), "40.000,00".to_string());
        session
            .submit_form(&engine, &form)
            .expect("corrected form should validate");
    }
    session.set_reference_date(NaiveDate::from_ymd_opt(2024, 12, 31));

    let report = session.evaluate(&engine).expect("session has a selection");
    println!("\n{}", report.to_markdown());

    let mapping = engine
        .mappings()
        .get("automotive_dealer")
        .expect("bundled mapping is registered");
    let rows: Vec<LedgerBalance> = [(49, 38_000.0), (50, 2_000.0), (79, 210_000.0)]
        .into_iter()
        .filter_map(|(position, balance)| {
            mapping
                .ledger_codes(&PositionCode::from(position))
                .first()
                .map(|code| LedgerBalance::new(code.clone(), balance))
        })
        .collect();

    let import = engine
        .import_ledger("automotive_dealer", &rows, None)
        .expect("mapping exists");
    let cash_ratio = engine.calculate(&import.snapshot, &["cash_ratio"]);
    println!(
        "Cash ratio from ledger import: {:?} ({} unmapped rows)",
        cash_ratio[0].value,
        import.unmapped.len()
    );
}
