use crate::cache::ResultCache;
use crate::composer::{ComposeError, ComposedQuery};
use crate::data_store::{DataStore, DataStoreError, SqliteDataStore, Table, Value};
use crate::engine::{EngineError, EngineOptions, QueryEngine, Scope};
use crate::filter::{normalize, Dimension, FilterError, FilterSet, RawSelection};
use crate::template::{TemplateError, TemplateId, TemplateStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SEED: &str = "
CREATE TABLE sales (
  row_id INTEGER PRIMARY KEY, order_id TEXT, order_date TEXT, ship_date TEXT,
  ship_mode TEXT, customer_id TEXT, customer_name TEXT, segment TEXT,
  country TEXT, city TEXT, state TEXT, postal_code TEXT, region TEXT,
  product_id TEXT, category TEXT, sub_category TEXT, product_name TEXT,
  sales REAL, quantity INTEGER, discount REAL, profit REAL
);
INSERT INTO sales VALUES
  (1, 'CA-1', '2014-01-03', '2014-01-07', 'Standard Class', 'C1', 'Ann', 'Consumer', 'United States', 'Houston', 'Texas', '77095', 'Central', 'P1', 'Office Supplies', 'Paper', 'Copy Paper', 16.45, 2, 0.2, 5.55),
  (2, 'CA-2', '2014-03-15', '2014-03-18', 'Second Class', 'C2', 'Bob', 'Corporate', 'United States', 'Seattle', 'Washington', '98103', 'West', 'P2', 'Technology', 'Phones', 'Phone X', 911.42, 3, 0.0, 68.36),
  (3, 'CA-3', '2014-12-31', '2015-01-04', 'Standard Class', 'C1', 'Ann', 'Consumer', 'United States', 'Houston', 'Texas', '77095', 'Central', 'P3', 'Furniture', 'Chairs', 'Chair A', 731.94, 3, 0.3, -14.63),
  (4, 'CA-4', '2015-02-10', '2015-02-12', 'First Class', 'C3', 'Cy', 'Home Office', 'United States', 'New York City', 'New York', '10024', 'East', 'P4', 'Technology', 'Accessories', 'Mouse', 90.57, 3, 0.0, 11.77),
  (5, 'CA-5', '2015-06-20', '2015-06-25', 'Standard Class', 'C4', 'Di', 'Consumer', 'United States', 'Los Angeles', 'California', '90036', 'West', 'P5', 'Office Supplies', 'Binders', 'Binder B', 22.37, 4, 0.2, 7.27),
  (6, 'CA-6', '2015-11-05', '2015-11-09', 'Second Class', 'C2', 'Bob', 'Corporate', 'United States', 'Philadelphia', 'Pennsylvania', '19140', 'East', 'P6', 'Furniture', 'Tables', 'Table T', 1044.63, 3, 0.4, -123.86),
  (7, 'CA-7', '2016-04-01', '2016-04-03', 'Same Day', 'C5', 'Ed', 'Consumer', 'United States', 'Houston', 'Texas', '77041', 'Central', 'P7', 'Technology', 'Phones', 'Phone Y', 371.17, 4, 0.2, 41.91),
  (8, 'CA-8', '2016-08-19', '2016-08-24', 'Standard Class', 'C3', 'Cy', 'Home Office', 'United States', 'Seattle', 'Washington', '98115', 'West', 'P8', 'Office Supplies', 'Art', 'Pencils', 8.56, 2, 0.0, 2.48);
";

fn seeded_store() -> SqliteDataStore {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SEED).unwrap();
    SqliteDataStore::from_connection(conn)
}

/// Counts executions and optionally stalls before delegating.
#[derive(Clone)]
struct CountingStore {
    inner: SqliteDataStore,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

#[async_trait]
impl DataStore for CountingStore {
    async fn execute(&self, query: &ComposedQuery) -> Result<Table, DataStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.execute(query).await
    }
}

struct Harness {
    engine: QueryEngine<CountingStore>,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self::with(TemplateStore::builtin(), EngineOptions::default(), None)
    }

    fn with(templates: TemplateStore, options: EngineOptions, delay: Option<Duration>) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: seeded_store(),
            calls: calls.clone(),
            delay,
        };
        let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
        Harness {
            engine: QueryEngine::new(templates, store, cache, options),
            calls,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn consumer_2014() -> FilterSet {
    FilterSet::new(
        Some(date("2014-01-01")),
        Some(date("2014-12-31")),
        [(Dimension::Segment, ["Consumer"])],
    )
    .unwrap()
}

/// Rows in a stable order, for comparing results of unordered queries.
fn sorted_rows(table: &Table) -> Vec<String> {
    let mut rows: Vec<String> = table.rows.iter().map(|row| format!("{:?}", row)).collect();
    rows.sort();
    rows
}

fn integer(table: &Table, column: &str) -> i64 {
    table
        .get(0, column)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("no integer in column {column}: {table:?}"))
}

#[test]
fn test_category_sales_scenario() {
    let harness = Harness::new();
    let (query, scope) = harness
        .engine
        .prepare(
            "SELECT category, SUM(sales) AS sales FROM sales GROUP BY category",
            &consumer_2014(),
            true,
        )
        .unwrap();

    assert_eq!(scope, Scope::Filtered);
    assert_eq!(
        query.sql(),
        "WITH filtered_sales AS (SELECT * FROM sales WHERE date(order_date) BETWEEN date(:d0) AND date(:d1) AND segment IN (:seg0)) \
         SELECT category, SUM(sales) AS sales FROM filtered_sales GROUP BY category"
    );
    let bindings: Vec<(&str, &str)> = query
        .bindings()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        bindings,
        vec![("d0", "2014-01-01"), ("d1", "2014-12-31"), ("seg0", "Consumer")]
    );
}

#[test_log::test(tokio::test)]
async fn test_empty_filters_match_unmodified_templates() {
    let harness = Harness::new();
    let direct = seeded_store();

    for id in harness.engine.templates().ids() {
        let template = harness.engine.templates().lookup(id).unwrap();
        let expected = direct
            .execute(&ComposedQuery::passthrough(template.sql.clone()))
            .await
            .unwrap();
        let outcome = harness
            .engine
            .run(id, &FilterSet::empty(), true)
            .await
            .unwrap();

        let expected_scope = if id == TemplateId::Schema {
            Scope::NotApplicable
        } else {
            Scope::Filtered
        };
        assert_eq!(outcome.scope, expected_scope, "{id}");
        assert_eq!(outcome.table.columns, expected.columns, "{id}");
        assert_eq!(sorted_rows(&outcome.table), sorted_rows(&expected), "{id}");
    }
}

#[test_log::test(tokio::test)]
async fn test_full_selection_is_no_restriction() {
    let harness = Harness::new();
    let domain = harness.engine.filter_domain().await.unwrap();

    let everything = RawSelection {
        selections: HashMap::from([(
            Dimension::Segment,
            vec![
                "Home Office".to_string(),
                "Consumer".to_string(),
                "Corporate".to_string(),
            ],
        )]),
        ..Default::default()
    };
    let all = normalize(&everything, &domain).unwrap();
    let none = normalize(&RawSelection::default(), &domain).unwrap();

    assert_eq!(all.fingerprint().unwrap(), none.fingerprint().unwrap());
    let template = harness.engine.templates().lookup(TemplateId::Kpis).unwrap();
    let (with_all, _) = harness.engine.prepare(&template.sql, &all, true).unwrap();
    let (with_none, _) = harness.engine.prepare(&template.sql, &none, true).unwrap();
    assert_eq!(with_all, with_none);
}

#[test_log::test(tokio::test)]
async fn test_filters_restrict_rows() {
    let harness = Harness::new();

    let outcome = harness
        .engine
        .run(TemplateId::Kpis, &consumer_2014(), true)
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::Filtered);
    // Rows 1 and 3; the range includes its last day.
    assert_eq!(integer(&outcome.table, "total_orders"), 2);

    let since_2015 = FilterSet::new(
        Some(date("2015-01-01")),
        None,
        [(Dimension::Region, ["West", "East"])],
    )
    .unwrap();
    let outcome = harness
        .engine
        .run(TemplateId::Kpis, &since_2015, true)
        .await
        .unwrap();
    // Rows 4, 5, 6 and 8.
    assert_eq!(integer(&outcome.table, "total_orders"), 4);
}

#[test_log::test(tokio::test)]
async fn test_unfiltered_run_ignores_filters() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run(TemplateId::CountRows, &consumer_2014(), false)
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::Unfiltered);
    assert_eq!(integer(&outcome.table, "total_rows"), 8);
}

#[test_log::test(tokio::test)]
async fn test_schema_template_is_never_filtered() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run(TemplateId::Schema, &consumer_2014(), true)
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::NotApplicable);
    assert_eq!(outcome.table.len(), 21);
}

#[test_log::test(tokio::test)]
async fn test_repeated_run_executes_once() {
    let harness = Harness::new();
    let filters = consumer_2014();

    let first = harness
        .engine
        .run(TemplateId::TopStates, &filters, true)
        .await
        .unwrap();
    let second = harness
        .engine
        .run(TemplateId::TopStates, &filters, true)
        .await
        .unwrap();
    assert_eq!(harness.calls(), 1);
    assert!(Arc::ptr_eq(&first.table, &second.table));

    harness
        .engine
        .run(TemplateId::TopStates, &FilterSet::empty(), true)
        .await
        .unwrap();
    assert_eq!(harness.calls(), 2);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_runs_share_one_execution() {
    let harness = Harness::with(
        TemplateStore::builtin(),
        EngineOptions::default(),
        Some(Duration::from_millis(20)),
    );
    let filters = consumer_2014();

    let runs = (0..4).map(|_| harness.engine.run(TemplateId::Kpis, &filters, true));
    let outcomes = futures::future::try_join_all(runs).await.unwrap();

    assert_eq!(outcomes.len(), 4);
    assert_eq!(harness.calls(), 1);
}

#[test_log::test(tokio::test)]
async fn test_dashboard_panels() {
    let harness = Harness::new();
    let filters = consumer_2014();

    let panels = harness
        .engine
        .run_many(TemplateId::DASHBOARD, &filters, true)
        .await
        .unwrap();

    let ids: Vec<TemplateId> = panels.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, TemplateId::DASHBOARD.to_vec());
    for (id, outcome) in &panels {
        assert_eq!(outcome.scope, Scope::Filtered, "{id}");
    }
    let (_, discount_vs_profit) = &panels[4];
    assert_eq!(discount_vs_profit.table.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_ambiguous_query_runs_unfiltered() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run_ad_hoc("SELECT COUNT(*) AS n FROM sales AS s", &consumer_2014(), true)
        .await
        .unwrap();

    assert!(matches!(outcome.scope, Scope::Degraded { .. }));
    assert_eq!(integer(&outcome.table, "n"), 8);
}

#[test_log::test(tokio::test)]
async fn test_ambiguous_query_fails_in_strict_mode() {
    let options = EngineOptions {
        strict_composition: true,
        ..Default::default()
    };
    let harness = Harness::with(TemplateStore::builtin(), options, None);

    let result = harness
        .engine
        .run_ad_hoc("SELECT COUNT(*) AS n FROM sales AS s", &consumer_2014(), true)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Composition(ComposeError::Ambiguous(_)))
    ));
    assert_eq!(harness.calls(), 0);
}

#[test_log::test(tokio::test)]
async fn test_ad_hoc_query_is_filtered() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run_ad_hoc(
            "SELECT state, COUNT(*) AS n FROM sales GROUP BY state ORDER BY state",
            &consumer_2014(),
            true,
        )
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::Filtered);
    assert_eq!(
        outcome.table.rows,
        vec![vec![Value::Text("Texas".to_string()), Value::Integer(2)]]
    );
}

#[test_log::test(tokio::test)]
async fn test_parenthesized_source_is_filtered() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run_ad_hoc("SELECT COUNT(*) AS n FROM (sales)", &consumer_2014(), true)
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::Filtered);
    assert_eq!(integer(&outcome.table, "n"), 2);
}

#[test_log::test(tokio::test)]
async fn test_explain_query_plan_is_filtered() {
    let harness = Harness::new();
    let outcome = harness
        .engine
        .run_ad_hoc(
            "EXPLAIN QUERY PLAN SELECT * FROM sales",
            &consumer_2014(),
            true,
        )
        .await
        .unwrap();
    assert_eq!(outcome.scope, Scope::Filtered);
    assert!(!outcome.table.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_write_statements_are_rejected() {
    let harness = Harness::new();
    for sql in [
        "DELETE FROM sales",
        "SELECT 1; DROP TABLE sales",
        "PRAGMA query_only = 0",
    ] {
        let result = harness
            .engine
            .run_ad_hoc(sql, &FilterSet::empty(), false)
            .await;
        assert!(
            matches!(result, Err(EngineError::PermissionDenied(_))),
            "{sql}"
        );
    }
    assert_eq!(harness.calls(), 0);
}

#[test_log::test(tokio::test)]
async fn test_unknown_template() {
    let templates = TemplateStore::from_json_str(r#"{"kpis": "SELECT COUNT(*) AS total_orders FROM sales"}"#)
        .unwrap();
    let harness = Harness::with(templates, EngineOptions::default(), None);

    let outcome = harness
        .engine
        .run(TemplateId::Kpis, &FilterSet::empty(), true)
        .await
        .unwrap();
    assert_eq!(integer(&outcome.table, "total_orders"), 8);

    assert!(matches!(
        harness
            .engine
            .run(TemplateId::TopStates, &FilterSet::empty(), true)
            .await,
        Err(EngineError::Template(TemplateError::UnknownTemplate(_)))
    ));
}

#[test_log::test(tokio::test)]
async fn test_filter_domain() {
    let harness = Harness::new();
    let domain = harness.engine.filter_domain().await.unwrap();

    assert_eq!(domain.date_min, Some(date("2014-01-03")));
    assert_eq!(domain.date_max, Some(date("2016-08-19")));
    let segments: Vec<&str> = domain.values[&Dimension::Segment]
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(segments, vec!["Consumer", "Corporate", "Home Office"]);
    assert_eq!(domain.values[&Dimension::Region].len(), 3);
    assert_eq!(domain.values[&Dimension::State].len(), 5);

    let calls = harness.calls();
    harness.engine.filter_domain().await.unwrap();
    assert_eq!(harness.calls(), calls);
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_reported_and_not_cached() {
    let options = EngineOptions {
        query_timeout: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    let harness = Harness::with(
        TemplateStore::builtin(),
        options,
        Some(Duration::from_millis(200)),
    );

    for expected_calls in 1..=2 {
        let result = harness
            .engine
            .run(TemplateId::Kpis, &FilterSet::empty(), true)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::DataStore(DataStoreError::Timeout(_)))
        ));
        assert_eq!(harness.calls(), expected_calls);
    }
}

#[test_log::test(tokio::test)]
async fn test_concurrent_runs_share_one_failure() {
    let options = EngineOptions {
        query_timeout: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    let harness = Harness::with(
        TemplateStore::builtin(),
        options,
        Some(Duration::from_millis(200)),
    );

    let filters = FilterSet::empty();
    let runs = (0..4).map(|_| harness.engine.run(TemplateId::Kpis, &filters, true));
    let results = futures::future::join_all(runs).await;

    for result in results {
        assert!(matches!(
            result,
            Err(EngineError::DataStore(DataStoreError::Timeout(_)))
        ));
    }
    assert_eq!(harness.calls(), 1);
}

#[test]
fn test_inverted_range_is_rejected() {
    let raw = RawSelection {
        date_from: Some(date("2016-01-01")),
        date_to: Some(date("2015-01-01")),
        ..Default::default()
    };
    assert!(matches!(
        normalize(&raw, &Default::default()),
        Err(FilterError::InvalidRange { .. })
    ));
}

#[test_log::test(tokio::test)]
async fn test_custom_relation_name() {
    let options = EngineOptions {
        relation: "orders".to_string(),
        ..Default::default()
    };
    let templates =
        TemplateStore::from_json_str(r#"{"count_rows": "SELECT COUNT(*) AS total_rows FROM orders"}"#)
            .unwrap();
    let harness = Harness::with(templates, options, None);
    let template = harness
        .engine
        .templates()
        .lookup(TemplateId::CountRows)
        .unwrap();

    let (query, scope) = harness
        .engine
        .prepare(&template.sql, &consumer_2014(), true)
        .unwrap();
    assert_eq!(scope, Scope::Filtered);
    assert!(query
        .sql()
        .starts_with("WITH filtered_orders AS (SELECT * FROM orders WHERE"));
    assert!(query.sql().ends_with("FROM filtered_orders"));
}
