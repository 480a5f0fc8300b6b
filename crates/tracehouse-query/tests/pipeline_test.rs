//! End-to-end tests: query building, SQL rendering and execution against the
//! in-memory backend.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracehouse_query::{
    AggregateKind, BackendRow, ClickHouseDialect, ColumnSpec, DataType, Expr, GenericDialect,
    Interval, LogicalOp, MemoryBackend, Planner, Query, QueryConfig, QueryEngine, QueryError,
    ResultFormat, Schema, Selector, Value, WindowSpec,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        "http-metrics",
        "http_metrics",
        "timestamp",
        vec![
            ColumnSpec::new("appName", DataType::String),
            ColumnSpec::new("uri", DataType::String),
            ColumnSpec::new("responseTime", DataType::Long),
            ColumnSpec::new("requests", DataType::Long),
            ColumnSpec::pre_aggregated("requestCount", DataType::Long, AggregateKind::Sum),
        ],
    ))
}

fn interval(start_ms: i64, end_ms: i64) -> Interval {
    Interval::new(
        Utc.timestamp_millis_opt(start_ms).unwrap(),
        Utc.timestamp_millis_opt(end_ms).unwrap(),
    )
}

fn config(dialect: &str) -> QueryConfig {
    QueryConfig {
        dialect: dialect.to_string(),
        ..Default::default()
    }
}

fn grouped_query() -> Query {
    Query::new(schema(), interval(1_700_000_000_000, 1_700_000_060_000))
        .select(Selector::column("appName", DataType::String))
        .select(Selector::new(
            "totalTime",
            Expr::function("sum", vec![Expr::ident("responseTime")]),
            DataType::Long,
        ))
        .filter(Expr::equals(Expr::ident("appName"), Expr::lit("x")))
        .group_by(["appName"])
}

#[tokio::test]
async fn test_grouped_query_end_to_end() {
    init_tracing();
    let query = grouped_query();

    let config = config("clickhouse");
    let dialect = ClickHouseDialect;
    let planner = Planner::new(&dialect, &config);
    let statement = planner.statement(&query).unwrap();
    match statement.where_clause.as_ref().unwrap() {
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        } => assert_eq!(operands.len(), 3),
        other => panic!("unexpected where clause {other:?}"),
    }

    let sql = planner.render(&statement).unwrap();
    assert_eq!(
        sql,
        "SELECT `appName`, sum(`responseTime`) AS `totalTime` FROM `http_metrics` \
         WHERE `timestamp` >= fromUnixTimestamp64Milli(1700000000000) \
         AND `timestamp` < fromUnixTimestamp64Milli(1700000060000) \
         AND `appName` = 'x' GROUP BY `appName`"
    );

    let backend = Arc::new(MemoryBackend::new().respond(
        sql.clone(),
        vec![BackendRow::new(vec![Value::from("x"), Value::Long(1_250)])],
    ));
    let engine = QueryEngine::new(backend.clone(), config).unwrap();
    let result = engine.time_series(&query).await.unwrap();
    assert_eq!(result.key_columns, vec!["appName"]);
    assert_eq!(result.value_columns, vec!["totalTime"]);

    let table = &result.table;
    assert_eq!(result.row_count(), 1);
    assert_eq!(table.column("appName").unwrap().get_string(0).unwrap(), "x");
    assert_eq!(table.column("totalTime").unwrap().get_long(0).unwrap(), 1_250);
    assert_eq!(backend.executed().await, vec![sql]);
    assert_eq!(backend.open_cursors(), 0);
}

#[tokio::test]
async fn test_same_query_renders_for_both_dialects() {
    let query = grouped_query().filter(Expr::not_matches(Expr::ident("uri"), "^/api"));

    let clickhouse = QueryEngine::new(Arc::new(MemoryBackend::new()), config("clickhouse"))
        .unwrap()
        .explain(&query)
        .unwrap();
    assert!(clickhouse.ends_with("AND NOT (startsWith(`uri`, '/api')) GROUP BY `appName`"));

    let generic = QueryEngine::new(Arc::new(MemoryBackend::new()), config("generic"))
        .unwrap()
        .explain(&query)
        .unwrap();
    assert!(generic.ends_with("AND NOT REGEXP_LIKE(\"uri\", '^/api') GROUP BY \"appName\""));
}

#[tokio::test]
async fn test_pre_aggregated_column_uses_merge() {
    let query = Query::new(schema(), interval(0, 60_000))
        .select(Selector::column("appName", DataType::String))
        .select(Selector::new(
            "requests",
            Expr::function("sum", vec![Expr::ident("requestCount")]),
            DataType::Long,
        ))
        .group_by(["appName"]);
    let sql = QueryEngine::new(Arc::new(MemoryBackend::new()), config("clickhouse"))
        .unwrap()
        .explain(&query)
        .unwrap();
    assert!(sql.contains("sumMerge(`requestCount`) AS `requests`"));
}

fn window_query() -> Query {
    Query::new(schema(), interval(600_000, 1_200_000).with_step_ms(60_000))
        .select(Selector::column("appName", DataType::String))
        .select(Selector::column("timestamp", DataType::DateTimeMilli))
        .select(Selector::new(
            "movingRequests",
            Expr::Window(WindowSpec {
                function: "sum".to_string(),
                argument: Box::new(Expr::ident("requests")),
                partition_by: vec!["appName".to_string()],
                order_by: "timestamp".to_string(),
                window_ms: 300_000,
            }),
            DataType::Long,
        ))
}

#[tokio::test]
async fn test_sliding_window_end_to_end() {
    init_tracing();
    let row = |app: &str, ts: i64, v: i64| {
        BackendRow::new(vec![Value::from(app), Value::Long(ts), Value::Long(v)])
    };
    let backend = Arc::new(MemoryBackend::new().with_default_rows(vec![
        row("a", 300_000, 1),
        row("a", 420_000, 2),
        row("a", 600_000, 3),
        row("a", 660_000, 4),
        row("a", 960_000, 5),
        row("b", 600_000, 10),
    ]));
    let engine = QueryEngine::new(backend.clone(), config("generic")).unwrap();
    let result = engine.time_series(&window_query()).await.unwrap();
    assert_eq!(result.key_columns, vec!["appName"]);
    assert_eq!(result.value_columns, vec!["timestamp", "movingRequests"]);

    let table = &result.table;

    assert_eq!(
        table.names().collect::<Vec<_>>(),
        vec!["appName", "timestamp", "movingRequests"]
    );
    let apps = table.column("appName").unwrap();
    let ts = table.column("timestamp").unwrap();
    let sums = table.column("movingRequests").unwrap();
    let rows: Vec<(String, i64, i64)> = (0..table.row_count())
        .map(|r| {
            (
                apps.get_string(r).unwrap().to_string(),
                ts.get_long(r).unwrap(),
                sums.get_long(r).unwrap(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("a".to_string(), 600_000, 6),
            ("a".to_string(), 660_000, 9),
            ("a".to_string(), 960_000, 9),
            ("b".to_string(), 600_000, 10),
        ]
    );

    // the backend was asked for five minutes of look-back, ordered for the window
    let sql = &backend.executed().await[0];
    assert!(sql.contains("\"timestamp\" >= TIMESTAMP '1970-01-01 00:05:00.000'"));
    assert!(sql.contains("ORDER BY \"appName\" ASC, \"timestamp\" ASC) AS \"windowed\""));
}

#[tokio::test]
async fn test_result_formats() {
    let backend = Arc::new(MemoryBackend::new().with_default_rows(vec![BackendRow::new(vec![
        Value::from("x"),
        Value::Long(7),
    ])]));
    let engine = QueryEngine::new(backend, config("clickhouse")).unwrap();

    let objects = engine.select_rows(&grouped_query()).await.unwrap();
    assert_eq!(objects, vec![serde_json::json!({"appName": "x", "totalTime": 7})]);

    let arrays = engine
        .select_rows(&grouped_query().result_format(ResultFormat::Array))
        .await
        .unwrap();
    assert_eq!(arrays, vec![serde_json::json!(["x", 7])]);
}

#[tokio::test]
async fn test_row_limit_is_enforced() {
    let rows = (0..5)
        .map(|i| BackendRow::new(vec![Value::from("x"), Value::Long(i)]))
        .collect();
    let backend = Arc::new(MemoryBackend::new().with_default_rows(rows));
    let config = QueryConfig {
        max_rows: 3,
        ..config("clickhouse")
    };
    let engine = QueryEngine::new(backend.clone(), config).unwrap();
    let err = engine.time_series(&grouped_query()).await.unwrap_err();
    assert!(matches!(err, QueryError::ResultTooLarge(3)));
    assert_eq!(backend.open_cursors(), 0);
}

#[tokio::test]
async fn test_multiple_windows_fail_before_sql() {
    let backend = Arc::new(MemoryBackend::new());
    let engine = QueryEngine::new(backend.clone(), config("clickhouse")).unwrap();
    let mut query = window_query();
    let second = query.selectors[2].expr.clone();
    query = query.select(Selector::new("again", second, DataType::Long));

    let err = engine.time_series(&query).await.unwrap_err();
    assert!(matches!(err, QueryError::MultipleWindowFunctions(_)));
    assert!(backend.executed().await.is_empty());
}

#[test]
fn test_generic_sql_parses() {
    use sqlparser::dialect::GenericDialect as ParserDialect;
    use sqlparser::parser::Parser;

    let config = config("generic");
    let dialect = GenericDialect;
    let planner = Planner::new(&dialect, &config);

    let filtered = grouped_query()
        .filter(Expr::and_all([
            Expr::matches(Expr::ident("uri"), "^/api/[0-9]+$"),
            Expr::like(Expr::ident("uri"), "%users%"),
            Expr::in_list(Expr::ident("appName"), vec!["x".into(), "y".into()]),
        ])
        .unwrap())
        .limit(10, 5);

    for query in [grouped_query(), filtered, window_query()] {
        let sql = planner.render(&planner.statement(&query).unwrap()).unwrap();
        let parsed = Parser::parse_sql(&ParserDialect {}, &sql);
        assert!(parsed.is_ok(), "failed to parse {sql}: {parsed:?}");
    }
}
