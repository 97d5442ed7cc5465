use grounded_core::{plan_question, Intent, Metrics, RowRef, Settings, TabName};
use grounded_ingest::{load_dataset, CsvDirectory, DatasetProvider};
use std::path::PathBuf;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("fixtures")
        .join("sheet")
}

#[test]
fn test_fixture_rows_are_normalized_and_canonicalized() {
    let data = load_dataset(fixture_dir()).expect("fixture should load");

    assert_eq!(data.stock.len(), 4);
    let first = &data.stock[0];
    assert_eq!(first.source, RowRef::new(TabName::Stock, 2));
    assert_eq!(first.distributor, "Alpha Distributors");
    assert_eq!(first.product, "Paracetamol");
    assert_eq!(first.quantity, Some(1200.0));

    // blank line 5 is skipped without renumbering the next row
    let last = data.stock.last().unwrap();
    assert_eq!(last.source.row_number, 6);
    assert_eq!(last.quantity, None);

    assert_eq!(data.sales[1].territory, "North");
    assert_eq!(data.sales[2].product, "Paracetamol");

    let dar = data.crm.iter().find(|r| r.doctor == "Dr Dar").unwrap();
    assert_eq!(dar.territory, "North");
    assert_eq!(dar.visits, None);
    assert_eq!(dar.coverage_flag, None);
    assert_eq!(data.crm[0].coverage_flag, Some(true));
    assert_eq!(data.crm[2].coverage_flag, Some(false));
}

#[test]
fn test_fixture_settings_override_defaults() {
    let provider = CsvDirectory::new(fixture_dir(), Settings::default());
    let (_, settings) = provider.load().unwrap();
    assert_eq!(settings.cache_ttl_seconds, 300);
    assert_eq!(settings.max_rows_context, 10);
    assert!(settings.meta_prompt.starts_with("You are the commercial excellence assistant"));
}

#[test]
fn test_synonym_question_reaches_canonical_stock_rows() {
    let provider = CsvDirectory::new(fixture_dir(), Settings::default());
    let (data, settings) = provider.load().unwrap();

    let plan = plan_question("how much stock of panadol do we have?", &data, &settings);
    assert_eq!(plan.intent, Intent::StockLookup);
    assert_eq!(plan.scope.product.as_deref(), Some("Paracetamol"));

    let analysis = plan.analysis.expect("stock lookup should match");
    assert_eq!(
        analysis.metrics,
        Metrics::StockLookup {
            total_quantity: 1650.0,
            rows: 2,
        }
    );
    let rows: Vec<usize> = analysis.sources.iter().map(|s| s.row_number).collect();
    assert_eq!(rows, vec![2, 4]);
    assert!(!plan.refusal_expected);
}
