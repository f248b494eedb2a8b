//! End-to-end tests for the tornado job.

use super::tornadoes::{
    build_pipeline, format_counts, run, source_table, stage_names, TornadoCount, TornadoReading,
    TORNADO_QUERY,
};
use crate::config::JobConfig;
use crate::core::StageKind;
use crate::errors::{BatchflowError, ExtractError, LoadError};
use crate::events::{CollectingEventSink, EventSink};
use crate::records::{FieldType, FromRow, Record, TableRow, TableSchema, ToRow};
use crate::runner::PipelineState;
use crate::warehouse::{
    CreateDisposition, InMemoryWarehouse, LoadRequest, LocalWarehouse, MockTableSink,
    TableReference, TableSink, WriteDisposition, WriteResult,
};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn output_table() -> TableReference {
    TableReference::new("my-proj", "weather", "tornadoes")
}

fn config(partitions: usize) -> JobConfig {
    JobConfig::new(output_table()).with_partitions(partitions)
}

fn warehouse_with(readings: &[TornadoReading]) -> Arc<InMemoryWarehouse> {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    warehouse.create_table(
        source_table(),
        TornadoReading::schema(),
        readings.iter().map(ToRow::to_row).collect(),
    );
    warehouse
}

fn written_counts(warehouse: &InMemoryWarehouse) -> Vec<TornadoCount> {
    let mut counts: Vec<TornadoCount> = warehouse
        .table_rows(&output_table())
        .unwrap_or_default()
        .iter()
        .map(|row| TornadoCount::from_row(row).unwrap())
        .collect();
    counts.sort_unstable();
    counts
}

/// A deterministic mix of readings: every third has no tornado flag,
/// every other remaining one saw a tornado.
fn generated_readings(n: i64) -> Vec<TornadoReading> {
    (0..n)
        .map(|i| {
            let tornado = match i % 3 {
                0 => None,
                1 => Some(i % 2 == 0),
                _ => Some(true),
            };
            TornadoReading::new(tornado, (i * 7) % 12 + 1)
        })
        .collect()
}

#[test]
fn test_record_schemas() {
    assert_eq!(TornadoReading::schema().field_names(), vec!["tornado", "month"]);
    assert_eq!(TornadoCount::schema().field_names(), vec!["month", "tornado_count"]);
}

#[test]
fn test_reading_from_row() {
    let row = TableRow::new().with("tornado", true).with("month", "4");
    assert_eq!(TornadoReading::from_row(&row).unwrap(), TornadoReading::new(Some(true), 4));

    let row = TableRow::new().with("month", 9);
    assert_eq!(TornadoReading::from_row(&row).unwrap(), TornadoReading::new(None, 9));

    assert!(TornadoReading::from_row(&TableRow::new().with("tornado", false)).is_err());
}

#[test]
fn test_absent_tornado_is_excluded() {
    assert_eq!(TornadoReading::new(Some(true), 3).tornado_month(), Some(3));
    assert_eq!(TornadoReading::new(Some(false), 3).tornado_month(), None);
    assert_eq!(TornadoReading::new(None, 3).tornado_month(), None);
}

#[test]
fn test_format_counts() {
    let counts = HashMap::from([(5, 1), (3, 2)]);
    assert_eq!(
        format_counts(counts),
        vec![
            TornadoCount { month: 3, tornado_count: 2 },
            TornadoCount { month: 5, tornado_count: 1 },
        ]
    );
}

#[test]
fn test_graph_shape() {
    let warehouse = warehouse_with(&[]);
    let graph = build_pipeline(&config(2), warehouse.clone(), warehouse).unwrap();

    assert_eq!(
        graph.execution_order(),
        [
            stage_names::EXTRACT,
            stage_names::FILTER,
            stage_names::COUNT,
            stage_names::FORMAT,
            stage_names::LOAD,
            stage_names::INSPECT_LOADS,
            stage_names::INSPECT_FAILED_INSERTS,
        ]
    );
    assert_eq!(graph.stage(stage_names::EXTRACT).unwrap().kind, StageKind::Extract);
    assert_eq!(graph.stage(stage_names::COUNT).unwrap().kind, StageKind::Aggregate);
    assert_eq!(graph.stage(stage_names::LOAD).unwrap().kind, StageKind::Load);
    for inspect in [stage_names::INSPECT_LOADS, stage_names::INSPECT_FAILED_INSERTS] {
        let spec = graph.stage(inspect).unwrap();
        assert_eq!(spec.kind, StageKind::Inspect);
        assert_eq!(spec.dependencies, HashSet::from([stage_names::LOAD.to_string()]));
    }
}

#[tokio::test]
async fn test_counts_tornadoes_per_month() {
    let warehouse = warehouse_with(&[
        TornadoReading::new(Some(true), 3),
        TornadoReading::new(Some(false), 3),
        TornadoReading::new(Some(true), 3),
        TornadoReading::new(Some(true), 5),
    ]);

    let result = run(&config(4), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();

    assert_eq!(result.state, PipelineState::Done);
    assert_eq!(
        written_counts(&warehouse),
        vec![
            TornadoCount { month: 3, tornado_count: 2 },
            TornadoCount { month: 5, tornado_count: 1 },
        ]
    );
    assert_eq!(result.load.successful_loads, vec![output_table()]);
    assert_eq!(result.load.failed_inserts, 0);
    assert_eq!(result.load.rows_written, 2);
    assert!(result.outputs[stage_names::EXTRACT].data.is_none());
    assert!(result.outputs[stage_names::LOAD].data.is_some());
}

#[tokio::test]
async fn test_count_sum_and_unique_months() {
    let readings = generated_readings(500);
    let expected_total = readings.iter().filter(|r| r.tornado == Some(true)).count() as i64;
    let warehouse = warehouse_with(&readings);

    run(&config(3), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();

    let counts = written_counts(&warehouse);
    assert_eq!(counts.iter().map(|c| c.tornado_count).sum::<i64>(), expected_total);

    let months: HashSet<i64> = counts.iter().map(|c| c.month).collect();
    assert_eq!(months.len(), counts.len());
    assert!(counts.iter().all(|c| c.tornado_count > 0));
}

#[tokio::test]
async fn test_result_independent_of_partitions() {
    let readings = generated_readings(97);
    let mut fingerprints = Vec::new();

    for partitions in [1, 2, 5, 16] {
        let warehouse = warehouse_with(&readings);
        run(&config(partitions), warehouse.clone(), warehouse.clone(), None)
            .await
            .unwrap();
        fingerprints.push(warehouse.fingerprint(&output_table()).unwrap());
    }

    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let warehouse = warehouse_with(&generated_readings(40));

    run(&config(4), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();
    let once = warehouse.fingerprint(&output_table()).unwrap();

    run(&config(4), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();
    let twice = warehouse.fingerprint(&output_table()).unwrap();

    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_truncate_replaces_previous_contents() {
    let warehouse = warehouse_with(&[TornadoReading::new(Some(true), 6)]);
    warehouse.create_table(
        output_table(),
        TornadoCount::schema(),
        vec![TornadoCount { month: 1, tornado_count: 99 }.to_row()],
    );

    run(&config(2), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();

    assert_eq!(
        written_counts(&warehouse),
        vec![TornadoCount { month: 6, tornado_count: 1 }]
    );
}

#[tokio::test]
async fn test_empty_input() {
    let warehouse = warehouse_with(&[]);

    let result = run(&config(4), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();

    assert_eq!(result.state, PipelineState::Done);
    assert!(written_counts(&warehouse).is_empty());
    assert!(warehouse.contains_table(&output_table()));
    assert_eq!(result.load.failed_inserts, 0);
    assert_eq!(result.load.rows_written, 0);
}

#[tokio::test]
async fn test_all_inserts_rejected_is_not_fatal() {
    let source = warehouse_with(&[
        TornadoReading::new(Some(true), 1),
        TornadoReading::new(Some(true), 2),
        TornadoReading::new(Some(true), 2),
    ]);
    let sink = Arc::new(InMemoryWarehouse::new());
    sink.reject_inserts_where(|_| true);

    let result = run(&config(2), source, sink.clone(), None).await.unwrap();

    assert_eq!(result.state, PipelineState::Done);
    assert!(result.load.successful_loads.is_empty());
    assert_eq!(result.load.failed_inserts, 2);
    assert_eq!(result.load.rows_written, 0);

    let inspected = &result.outputs[stage_names::INSPECT_FAILED_INSERTS];
    assert_eq!(inspected.get_as::<u64>("failed_insert_count").unwrap(), Some(2));
    let inspected = &result.outputs[stage_names::INSPECT_LOADS];
    assert_eq!(
        inspected.get_as::<Vec<TableReference>>("successful_loads").unwrap(),
        Some(Vec::new())
    );
    assert!(!sink.contains_table(&output_table()));
}

#[tokio::test]
async fn test_all_inserts_rejected_keeps_previous_contents() {
    let source = warehouse_with(&[
        TornadoReading::new(Some(true), 3),
        TornadoReading::new(Some(true), 4),
    ]);
    let sink = Arc::new(InMemoryWarehouse::new());
    sink.create_table(
        output_table(),
        TornadoCount::schema(),
        vec![TornadoCount { month: 9, tornado_count: 42 }.to_row()],
    );
    sink.reject_inserts_where(|_| true);

    let result = run(&config(2), source, sink.clone(), None).await.unwrap();

    assert_eq!(result.state, PipelineState::Done);
    assert!(result.load.successful_loads.is_empty());
    assert_eq!(result.load.failed_inserts, 2);
    assert_eq!(
        written_counts(&sink),
        vec![TornadoCount { month: 9, tornado_count: 42 }]
    );
}

#[tokio::test]
async fn test_unreachable_source_is_fatal() {
    let warehouse = warehouse_with(&[TornadoReading::new(Some(true), 1)]);
    warehouse.set_available(false);

    let err = run(&config(2), warehouse.clone(), Arc::new(InMemoryWarehouse::new()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchflowError::Extract(ExtractError::Unavailable(_))));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_missing_source_table_is_fatal() {
    let empty = Arc::new(InMemoryWarehouse::new());

    let err = run(&config(2), empty.clone(), empty, None).await.unwrap_err();

    assert!(matches!(err, BatchflowError::Extract(ExtractError::TableNotFound(_))));
}

#[tokio::test]
async fn test_malformed_source_row_is_fatal() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    warehouse.create_table(
        source_table(),
        TableSchema::builder()
            .nullable("tornado", FieldType::Boolean)
            .nullable("month", FieldType::Integer)
            .build(),
        vec![TableRow::new().with("tornado", true)],
    );

    let err = run(&config(2), warehouse.clone(), warehouse, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchflowError::Extract(ExtractError::Row { .. })));
    assert!(err.to_string().contains("month"));
}

#[tokio::test]
async fn test_unavailable_sink_is_fatal() {
    let source = warehouse_with(&[TornadoReading::new(Some(true), 1)]);
    let sink = Arc::new(InMemoryWarehouse::new());
    sink.set_available(false);
    let events = Arc::new(CollectingEventSink::new());
    let event_sink: Arc<dyn EventSink> = events.clone();

    let err = run(&config(2), source, sink.clone(), Some(event_sink))
        .await
        .unwrap_err();

    assert!(matches!(err, BatchflowError::Load(LoadError::Unavailable(_))));
    assert_eq!(err.exit_code(), 4);
    assert!(!sink.contains_table(&output_table()));
    assert_eq!(events.events_of_type("pipeline.failed").len(), 1);
    assert!(events.events_of_type("stage.completed").len() < 7);
}

#[tokio::test]
async fn test_load_request_uses_truncate_and_create() {
    let source = warehouse_with(&[
        TornadoReading::new(Some(true), 7),
        TornadoReading::new(None, 7),
    ]);
    let mut sink = MockTableSink::new();
    sink.expect_write()
        .withf(|request: &LoadRequest| {
            request.destination == output_table()
                && request.write_disposition == WriteDisposition::WriteTruncate
                && request.create_disposition == CreateDisposition::CreateIfNeeded
                && request.schema == TornadoCount::schema()
                && request.rows == vec![TornadoCount { month: 7, tornado_count: 1 }.to_row()]
        })
        .times(1)
        .returning(|request| {
            Ok(WriteResult {
                successful_loads: vec![request.destination],
                failed_inserts: Vec::new(),
                rows_written: 1,
            })
        });

    let sink: Arc<dyn TableSink> = Arc::new(sink);
    let result = run(&config(2), source, sink, None).await.unwrap();

    assert_eq!(result.load.successful_loads, vec![output_table()]);
    assert_eq!(result.load.rows_written, 1);
}

#[tokio::test]
async fn test_stage_events() {
    let warehouse = warehouse_with(&[TornadoReading::new(Some(true), 2)]);
    let events = Arc::new(CollectingEventSink::new());
    let event_sink: Arc<dyn EventSink> = events.clone();

    run(&config(2), warehouse.clone(), warehouse, Some(event_sink))
        .await
        .unwrap();

    assert_eq!(events.events_of_type("stage.started").len(), 7);
    assert_eq!(events.events_of_type("stage.completed").len(), 7);
    assert_eq!(events.events_of_type("load.completed").len(), 1);
    let (_, payload) = events.events_of_type("extract.completed").remove(0);
    let payload = payload.unwrap();
    assert_eq!(payload["rows"], 1);
    assert_eq!(payload["job"], "tornadoes");
}

#[tokio::test]
async fn test_runs_against_local_warehouse() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Arc::new(LocalWarehouse::new(dir.path()));
    let seed = LoadRequest::new(
        source_table(),
        TornadoReading::schema(),
        [
            TornadoReading::new(Some(true), 3),
            TornadoReading::new(Some(false), 3),
            TornadoReading::new(Some(true), 3),
            TornadoReading::new(Some(true), 5),
        ]
        .iter()
        .map(ToRow::to_row)
        .collect(),
    );
    warehouse.write(seed).await.unwrap();

    let result = run(&config(3), warehouse.clone(), warehouse.clone(), None)
        .await
        .unwrap();
    assert_eq!(result.state, PipelineState::Done);

    let mut counts: Vec<TornadoCount> = warehouse
        .read_rows(&output_table())
        .unwrap()
        .iter()
        .map(|row| TornadoCount::from_row(row).unwrap())
        .collect();
    counts.sort_unstable();
    assert_eq!(
        counts,
        vec![
            TornadoCount { month: 3, tornado_count: 2 },
            TornadoCount { month: 5, tornado_count: 1 },
        ]
    );
}

#[test]
fn test_query_targets_source_table() {
    let parsed = crate::warehouse::ParsedQuery::parse(TORNADO_QUERY).unwrap();
    assert_eq!(parsed.table, source_table());
}
