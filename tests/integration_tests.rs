use cee_kpi_analyzer::*;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;

fn snapshot(values: &[(&str, f64)]) -> BalanceSheetSnapshot {
    values.iter().map(|&(p, v)| (p, v)).collect()
}

fn form(fields: &[(&str, &str)]) -> FormData {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A small dealership that balances to the cent.
fn dealership() -> BalanceSheetSnapshot {
    snapshot(&[
        ("1", 5_000.0),
        ("7", 12_000.0),
        ("12", 180_000.0),
        ("14", 45_000.0),
        ("26", 8_000.0),
        ("31", 60_000.0),
        ("34", 240_000.0),
        ("39", 95_000.0),
        ("39.NCA", 5_000.0),
        ("43", 7_000.0),
        ("44", 3_000.0),
        ("46", 10_000.0),
        ("49", 38_000.0),
        ("50", 2_000.0),
        ("51", 4_000.0),
        // equity
        ("52", 100_000.0),
        ("56", 20_000.0),
        ("58", 40_000.0),
        ("64", 35_000.0),
        ("65", 43_000.0),
        ("66", 5_000.0),
        // provisions, severance
        ("68", 6_000.0),
        ("100", 24_000.0),
        // debts
        ("73", 90_000.0),
        ("80", 70_000.0),
        ("76", 10_000.0),
        ("79", 210_000.0),
        ("82", 30_000.0),
        ("85", 18_000.0),
        ("86", 6_000.0),
        ("87", 9_000.0),
        ("88", 8_000.0),
    ])
}

#[test]
fn test_scenario_current_ratio() {
    let engine = KpiEngine::standard();
    let snap = snapshot(&[
        ("31", 10.0),
        ("32", 10.0),
        ("33", 10.0),
        ("34", 10.0),
        ("35", 10.0),
        ("79", 5.0),
        ("80", 5.0),
        ("81", 5.0),
        ("82", 5.0),
    ]);

    let results = engine.calculate(&snap, &["current_ratio"]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, KpiStatus::Ok);
    assert!((results[0].value.unwrap() - 2.5).abs() < 1e-9);
}

#[test]
fn test_zero_numerator_yields_zero() {
    let engine = KpiEngine::standard();
    let snap = snapshot(&[("79", 5.0), ("80", 5.0), ("81", 5.0), ("82", 5.0)]);

    let results = engine.calculate(&snap, &["current_ratio"]);
    assert_eq!(results[0].status, KpiStatus::Ok);
    assert_eq!(results[0].value, Some(0.0));
}

#[test]
fn test_scenario_zero_current_liabilities() {
    let engine = KpiEngine::standard();
    let snap = snapshot(&[("31", 50.0)]);

    let results = engine.calculate(&snap, &["current_ratio", "quick_ratio", "cash_ratio"]);
    for result in &results {
        assert_eq!(result.status, KpiStatus::Error, "{}", result.kpi_id);
        assert_eq!(result.value, None);
        assert!(result.message.as_deref().unwrap().contains("current liabilities"));
    }
}

#[test]
fn test_scenario_working_capital() {
    let engine = KpiEngine::standard();
    let snap = snapshot(&[
        ("31", 10.0),
        ("32", 10.0),
        ("33", 10.0),
        ("34", 10.0),
        ("35", 10.0),
        ("79", 5.0),
        ("80", 5.0),
        ("81", 5.0),
        ("82", 5.0),
    ]);

    let results = engine.calculate(&snap, &["working_capital"]);
    assert!((results[0].value.unwrap() - 30.0).abs() < 1e-9);

    let empty = engine.calculate(
        &BalanceSheetSnapshot::new(),
        &["working_capital", "tangible_net_worth"],
    );
    assert!(empty.iter().all(|r| r.value == Some(0.0)));
}

#[test]
fn test_scenario_balance_within_tolerance() {
    let engine = KpiEngine::standard();
    let snap = snapshot(&[("49", 1000.0), ("52", 600.0), ("79", 399.995)]);

    let check = engine.check_balance(&snap);
    assert!(check.valid);
    assert!((check.assets_total - 1000.0).abs() < 1e-9);
    assert!((check.equity_and_liabilities_total - 999.995).abs() < 1e-9);
}

#[test]
fn test_scenario_resolve_union() {
    let engine = KpiEngine::standard();
    let positions = engine
        .resolve_requirements(&["current_ratio", "cash_ratio"])
        .unwrap();

    let groups = engine.groups();
    let expected: BTreeSet<PositionCode> = groups
        .current_assets
        .iter()
        .chain(groups.current_liabilities.iter())
        .chain(groups.cash.iter())
        .cloned()
        .collect();

    assert_eq!(positions.len(), expected.len());
    assert_eq!(positions, expected.into_iter().collect::<Vec<_>>());
    assert_eq!(positions.first().map(PositionCode::as_str), Some("31"));
    assert_eq!(positions.last().map(PositionCode::as_str), Some("88"));
    let i39 = positions.iter().position(|p| p.as_str() == "39").unwrap();
    assert_eq!(positions[i39 + 1].as_str(), "39.NCA");
}

#[test]
fn test_sum_isolation() {
    let engine = KpiEngine::standard();
    let groups = engine.groups();
    let base = snapshot(&[("49", 10.0), ("50", 5.0)]);
    let mut noisy = base.clone();
    noisy.set("14", 1e9);
    noisy.set("79", 42.0);
    noisy.set("ZZ", 7.0);

    assert_eq!(
        sum_positions(&base, &groups.cash),
        sum_positions(&noisy, &groups.cash)
    );
}

#[test]
fn test_zero_denominator_for_every_ratio() {
    let engine = KpiEngine::standard();
    let ids: Vec<String> = engine.catalog().ids().iter().map(|s| s.to_string()).collect();

    let results = engine.calculate(&BalanceSheetSnapshot::new(), &ids);
    for result in results {
        let definition = result.definition.as_ref().unwrap();
        if definition.is_ratio {
            assert_eq!(result.status, KpiStatus::Error, "{}", result.kpi_id);
            assert!(result.value.is_none());
        } else {
            assert_eq!(result.status, KpiStatus::Ok, "{}", result.kpi_id);
        }
    }
}

#[test]
fn test_balance_tolerance_edges_and_symmetry() {
    let engine = KpiEngine::standard();

    let just_inside = engine.check_balance(&snapshot(&[("49", 0.009999)]));
    assert!(just_inside.valid);

    let at_tolerance = engine.check_balance(&snapshot(&[("49", 0.01)]));
    assert!(!at_tolerance.valid);

    let heavy_assets = engine.check_balance(&snapshot(&[("49", 100.5), ("52", 100.0)]));
    let heavy_equity = engine.check_balance(&snapshot(&[("49", 100.0), ("52", 100.5)]));
    assert_eq!(heavy_assets.valid, heavy_equity.valid);
    assert!((heavy_assets.difference + heavy_equity.difference).abs() < 1e-9);
}

#[test]
fn test_balance_uses_full_snapshot() {
    let engine = KpiEngine::standard();
    let check = engine.check_balance(&dealership());
    assert!(check.valid, "difference {}", check.difference);
    assert!((check.assets_total - 714_000.0).abs() < 1e-6);
}

#[test]
fn test_dealership_ratios() {
    let engine = KpiEngine::standard();
    let snap = dealership();
    let results = engine.calculate(
        &snap,
        &[
            "current_ratio",
            "quick_ratio",
            "debt_to_equity",
            "debt_to_equity_excl_tfr",
            "long_term_debt_to_equity",
            "tangible_net_worth",
            "non_current_assets_coverage",
        ],
    );
    let value = |id: &str| {
        results
            .iter()
            .find(|r| r.kpi_id == id)
            .and_then(|r| r.value)
            .unwrap()
    };

    // current assets 460.000, current liabilities 351.000
    assert!((value("current_ratio") - 460_000.0 / 351_000.0).abs() < 1e-9);
    // liquid assets leave out 39.NCA and 44
    assert!((value("quick_ratio") - 152_000.0 / 351_000.0).abs() < 1e-9);
    // equity 233.000 after subtracting 66, liabilities 481.000
    assert!((value("debt_to_equity") - 481_000.0 / 233_000.0).abs() < 1e-9);
    assert!((value("debt_to_equity_excl_tfr") - 457_000.0 / 233_000.0).abs() < 1e-9);
    // trade payables beyond 12 months (76) are not financial debt
    assert!((value("long_term_debt_to_equity") - 90_000.0 / 233_000.0).abs() < 1e-9);
    assert!((value("tangible_net_worth") - (233_000.0 - 17_000.0)).abs() < 1e-9);
    assert!(
        (value("non_current_assets_coverage") - (233_000.0 + 90_000.0) / 250_000.0).abs() < 1e-9
    );
}

#[test]
fn test_selection_errors() {
    let engine = KpiEngine::standard();
    let none: [&str; 0] = [];
    assert!(matches!(
        engine.resolve_requirements(&none),
        Err(KpiError::EmptySelection)
    ));
    let err = engine.resolve_requirements(&["nope"]).unwrap_err();
    assert!(err.is_invalid_selection());

    let partial = engine.resolve_requirements(&["nope", "cash_ratio"]).unwrap();
    assert_eq!(partial, engine.resolve_requirements(&["cash_ratio"]).unwrap());
}

#[test]
fn test_coercion_round_trip() {
    for raw in ["1.234,56", "1234,56"] {
        let value = coerce_input(raw).unwrap();
        assert!((value - 1234.56).abs() < 1e-9);
        assert_eq!(coerce_input(&format_for_input(value)).unwrap(), value);
    }

    let err = coerce_input("12a,5").unwrap_err();
    assert_eq!(err.raw_input(), Some("12a,5"));
}

#[test]
fn test_misgrouped_amount_is_a_field_error() {
    let engine = KpiEngine::standard();
    let required = engine.resolve_requirements(&["cash_ratio"]).unwrap();
    let validation = engine.validate_form(
        &form(&[("pos_49", "1,234.56"), ("pos_50", "12.34,5"), ("pos_79", "1.234,56")]),
        &required,
    );

    let failed: Vec<&str> = validation
        .errors
        .iter()
        .map(|e| e.field_name.as_str())
        .collect();
    assert_eq!(failed, vec!["pos_49", "pos_50"]);
    assert_eq!(validation.errors[0].raw, "1,234.56");
    assert!((validation.values[&PositionCode::from(79)] - 1234.56).abs() < 1e-9);
}

#[test]
fn test_session_round_trip() -> anyhow::Result<()> {
    let engine = KpiEngine::standard();
    let mut session = AnalysisSession::new();

    let required = session.select(&engine, &["cash_ratio", "current_ratio"])?.to_vec();
    let layout = engine.required_layout(&["cash_ratio", "current_ratio"])?;
    let field_count: usize = layout.iter().map(FormSection::field_count).sum();
    assert_eq!(field_count, required.len());

    let submitted = form(&[("pos_31", "1.000"), ("pos_49", "abc"), ("pos_79", "500,00")]);
    let errors = session.submit_form(&engine, &submitted).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].raw, "abc");
    assert_eq!(errors[0].message, INVALID_NUMBER_MESSAGE);

    let submitted = form(&[("pos_31", "1.000,00"), ("pos_49", "250"), ("pos_79", "500,00")]);
    session.submit_form(&engine, &submitted).unwrap();
    session.set_reference_date(NaiveDate::from_ymd_opt(2024, 12, 31));

    let report = session.evaluate(&engine)?;
    assert!((report.result("cash_ratio").unwrap().value.unwrap() - 0.5).abs() < 1e-9);
    assert!((report.result("current_ratio").unwrap().value.unwrap() - 2.5).abs() < 1e-9);
    assert_eq!(report.inputs_by_kpi.len(), 2);
    assert!(!report.balance.valid);

    let markdown = report.to_markdown();
    assert!(markdown.contains("31/12/2024"));
    assert!(markdown.contains("squadratura"));
    Ok(())
}

#[test]
fn test_ledger_import_feeds_calculation() -> anyhow::Result<()> {
    let engine = KpiEngine::standard();
    let mapping = engine.mappings().get("automotive_dealer").unwrap();

    let cash_code = mapping.ledger_codes(&PositionCode::from(49))[0].clone();
    let payable_code = mapping.ledger_codes(&PositionCode::from(79))[0].clone();
    let rows = vec![
        LedgerBalance::new(cash_code, 300.0),
        LedgerBalance::new(payable_code, 600.0),
        LedgerBalance::new("0000000000", 1.0),
    ];

    let import = engine.import_ledger(
        "automotive_dealer",
        &rows,
        NaiveDate::from_ymd_opt(2024, 12, 31),
    )?;
    assert_eq!(import.unmapped.len(), 1);

    let results = engine.calculate(&import.snapshot, &["cash_ratio"]);
    assert!((results[0].value.unwrap() - 0.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_report_csv_parses() -> anyhow::Result<()> {
    let engine = KpiEngine::standard();
    let report = engine.evaluate(&dealership(), &["current_ratio", "working_capital", "bogus"]);
    let csv_text = report.to_csv();

    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();
    assert_eq!(&headers[0], "Section");
    assert_eq!(headers.len(), 6);

    let records: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
    let kpi_rows: Vec<&csv::StringRecord> = records.iter().filter(|r| &r[0] == "KPI").collect();
    assert_eq!(kpi_rows.len(), 3);
    assert_eq!(&kpi_rows[1][1], "working_capital");
    assert_eq!(&kpi_rows[1][3], "109.000,00");
    assert_eq!(&kpi_rows[2][4], "error");
    assert_eq!(&kpi_rows[2][3], "n/d");

    let mut file = File::create(std::env::temp_dir().join("cee_kpi_report.csv"))?;
    file.write_all(csv_text.as_bytes())?;
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> anyhow::Result<()> {
    let config = EngineConfig {
        balance_tolerance: 0.5,
        input_mode: InputMode::Expression,
        ..EngineConfig::default()
    };
    let path = std::env::temp_dir().join("cee_kpi_engine_config.json");
    let mut file = File::create(&path)?;
    file.write_all(config.to_json()?.as_bytes())?;

    let loaded = EngineConfig::from_json_file(&path)?;
    assert_eq!(loaded, config);

    let engine = KpiEngine::new(loaded)?;
    let validation = engine.validate_form(
        &form(&[("pos_49", "100 + 50,5")]),
        &[PositionCode::from(49)],
    );
    assert!(validation.is_valid());
    assert!((validation.values[&PositionCode::from(49)] - 150.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_schema_generation() {
    let schema = EngineConfig::schema_as_json().unwrap();
    assert!(schema.contains("balance_tolerance"));
    assert!(schema.contains("within_12_months"));

    let position_schema = PositionSchema::schema_as_json().unwrap();
    assert!(position_schema.contains("placeholder"));
}

#[test]
fn test_custom_schema_from_json() -> anyhow::Result<()> {
    let json = PositionSchema::cee().to_json()?;
    let schema = PositionSchema::from_json_str(&json)?;
    assert_eq!(schema, PositionSchema::cee());

    let broken = json.replacen("\"49\"", "\"50\"", 1);
    assert!(matches!(
        PositionSchema::from_json_str(&broken),
        Err(KpiError::Schema(_))
    ));
    Ok(())
}
