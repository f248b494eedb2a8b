//! Tornado counts per month.
//!
//! Reads weather readings with a fixed query, keeps the readings that saw a
//! tornado, counts them per month and replaces the destination table with
//! one `(month, tornado_count)` row per month.
//!
//! ```text
//! extract -> filter_tornadoes -> count_by_month -> format_counts -> load
//!                                                                   |-> inspect_loads
//!                                                                   '-> inspect_failed_inserts
//! ```

use crate::config::JobConfig;
use crate::context::{ExecutionContext, RunIdentity, StageContext};
use crate::core::{StageKind, StageOutput};
use crate::errors::{BatchflowError, ExtractError, SchemaError};
use crate::events::EventSink;
use crate::pipeline::{PipelineBuilder, StageGraph};
use crate::records::{FieldType, FromRow, Record, TableRow, TableSchema, ToRow};
use crate::runner::{LoadSummary, PipelineResult, PipelineRunner, LOAD_SUMMARY_KEY};
use crate::stages::{FnStage, Stage};
use crate::transforms::{count_by_value, Partitioned};
use crate::warehouse::{
    CreateDisposition, LoadRequest, QuerySource, TableReference, TableSink, WriteDisposition,
    WriteResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Job name used in run identities and logs.
pub const JOB_NAME: &str = "tornadoes";

/// The query the job extracts with. It is not parameterised.
pub const TORNADO_QUERY: &str = "SELECT tornado, month FROM [bigquery-public-data:samples.gsod]";

/// Stage names, in graph order.
pub mod stage_names {
    /// Runs the query.
    pub const EXTRACT: &str = "extract";
    /// Keeps tornado readings.
    pub const FILTER: &str = "filter_tornadoes";
    /// Counts readings per month.
    pub const COUNT: &str = "count_by_month";
    /// Shapes counts into output records.
    pub const FORMAT: &str = "format_counts";
    /// Writes the destination table.
    pub const LOAD: &str = "load";
    /// Logs the committed destinations.
    pub const INSPECT_LOADS: &str = "inspect_loads";
    /// Logs the failed insert count.
    pub const INSPECT_FAILED_INSERTS: &str = "inspect_failed_inserts";
}

use stage_names::{COUNT, EXTRACT, FILTER, FORMAT, INSPECT_FAILED_INSERTS, INSPECT_LOADS, LOAD};

/// The table [`TORNADO_QUERY`] reads.
#[must_use]
pub fn source_table() -> TableReference {
    TableReference::new("bigquery-public-data", "samples", "gsod")
}

/// One result row of [`TORNADO_QUERY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TornadoReading {
    /// Whether a tornado was observed; absent when not reported.
    pub tornado: Option<bool>,
    /// Month of the reading, 1 to 12.
    pub month: i64,
}

impl TornadoReading {
    /// Creates a reading.
    #[must_use]
    pub fn new(tornado: Option<bool>, month: i64) -> Self {
        Self { tornado, month }
    }

    /// Returns the month when a tornado was observed. An absent flag counts
    /// as no tornado.
    #[must_use]
    pub fn tornado_month(&self) -> Option<i64> {
        self.tornado.unwrap_or(false).then_some(self.month)
    }
}

impl Record for TornadoReading {
    fn schema() -> TableSchema {
        TableSchema::builder()
            .nullable("tornado", FieldType::Boolean)
            .required("month", FieldType::Integer)
            .build()
    }
}

impl FromRow for TornadoReading {
    fn from_row(row: &TableRow) -> Result<Self, SchemaError> {
        Ok(Self {
            tornado: row.optional_bool("tornado")?,
            month: row.required_i64("month")?,
        })
    }
}

impl ToRow for TornadoReading {
    fn to_row(&self) -> TableRow {
        let row = TableRow::new().with("month", self.month);
        match self.tornado {
            Some(tornado) => row.with("tornado", tornado),
            None => row,
        }
    }
}

/// One output row: the number of tornado readings in a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TornadoCount {
    /// Month, 1 to 12.
    pub month: i64,
    /// Readings with a tornado in that month.
    pub tornado_count: i64,
}

impl Record for TornadoCount {
    fn schema() -> TableSchema {
        TableSchema::builder()
            .required("month", FieldType::Integer)
            .required("tornado_count", FieldType::Integer)
            .build()
    }
}

impl FromRow for TornadoCount {
    fn from_row(row: &TableRow) -> Result<Self, SchemaError> {
        Ok(Self {
            month: row.required_i64("month")?,
            tornado_count: row.required_i64("tornado_count")?,
        })
    }
}

impl ToRow for TornadoCount {
    fn to_row(&self) -> TableRow {
        TableRow::new()
            .with("month", self.month)
            .with("tornado_count", self.tornado_count)
    }
}

/// Turns per-month counts into output records, ordered by month.
#[must_use]
pub fn format_counts(counts: HashMap<i64, i64>) -> Vec<TornadoCount> {
    let mut rows: Vec<TornadoCount> = counts
        .into_iter()
        .map(|(month, tornado_count)| TornadoCount { month, tornado_count })
        .collect();
    rows.sort_unstable();
    rows
}

/// Runs the query and spreads the decoded readings over partitions.
struct ExtractStage {
    source: Arc<dyn QuerySource>,
    partitions: usize,
}

impl fmt::Debug for ExtractStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractStage")
            .field("query", &TORNADO_QUERY)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl ExtractStage {
    async fn extract(&self, ctx: &StageContext) -> Result<StageOutput, BatchflowError> {
        let mut rows = self.source.query(TORNADO_QUERY).await?;
        let mut readings = Partitioned::empty(self.partitions);
        while let Some(row) = rows.next().await {
            let row = row?;
            readings.push(TornadoReading::from_row(&row).map_err(ExtractError::from)?);
        }

        info!(rows = readings.len(), partitions = readings.partition_count(), "extracted readings");
        ctx.try_emit_event("extract.completed", Some(serde_json::json!({ "rows": readings.len() })));
        Ok(StageOutput::ok_serialized("readings", &readings)
            .add_metadata("rows", serde_json::json!(readings.len())))
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        EXTRACT
    }

    fn kind(&self) -> StageKind {
        StageKind::Extract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        self.extract(ctx)
            .await
            .unwrap_or_else(|err| StageOutput::from_error(&err))
    }
}

/// Counts tornado months with a partial count per partition.
#[derive(Debug)]
struct CountStage;

#[async_trait]
impl Stage for CountStage {
    fn name(&self) -> &str {
        COUNT
    }

    fn kind(&self) -> StageKind {
        StageKind::Aggregate
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let counted = async {
            let months: Partitioned<i64> = ctx.inputs().require(FILTER, "months")?;
            count_by_value(months).await
        }
        .await;

        match counted {
            Ok(counts) => {
                debug!(months = counts.len(), "counted tornadoes");
                StageOutput::ok_serialized("counts", &counts)
            }
            Err(err) => StageOutput::from_error(&err),
        }
    }
}

/// Replaces the destination table with the formatted counts.
struct LoadStage {
    sink: Arc<dyn TableSink>,
    destination: TableReference,
}

impl fmt::Debug for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadStage")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl LoadStage {
    async fn load(&self, ctx: &StageContext) -> Result<StageOutput, BatchflowError> {
        let counts: Vec<TornadoCount> = ctx.inputs().require(FORMAT, "rows")?;
        let request = LoadRequest::new(
            self.destination.clone(),
            TornadoCount::schema(),
            counts.iter().map(ToRow::to_row).collect(),
        )
        .with_write_disposition(WriteDisposition::WriteTruncate)
        .with_create_disposition(CreateDisposition::CreateIfNeeded);

        let result = self.sink.write(request).await?;
        let summary = LoadSummary::from(&result);
        ctx.try_emit_event("load.completed", Some(serde_json::to_value(&summary)?));

        Ok(StageOutput::ok_serialized("write_result", &result)
            .with_data(HashMap::from([(
                LOAD_SUMMARY_KEY.to_string(),
                serde_json::to_value(&summary)?,
            )])))
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn name(&self) -> &str {
        LOAD
    }

    fn kind(&self) -> StageKind {
        StageKind::Load
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        self.load(ctx)
            .await
            .unwrap_or_else(|err| StageOutput::from_error(&err))
    }
}

fn filter_stage() -> Arc<dyn Stage> {
    Arc::new(FnStage::new(FILTER, |ctx: &StageContext| {
        let readings: Partitioned<TornadoReading> = ctx.inputs().require(EXTRACT, "readings")?;
        let months = readings.flat_map(|reading| reading.tornado_month());
        debug!(tornado_readings = months.len(), "filtered readings");
        Ok(StageOutput::ok_serialized("months", &months))
    }))
}

fn format_stage() -> Arc<dyn Stage> {
    Arc::new(FnStage::new(FORMAT, |ctx: &StageContext| {
        let counts: HashMap<i64, i64> = ctx.inputs().require(COUNT, "counts")?;
        Ok(StageOutput::ok_serialized("rows", &format_counts(counts)))
    }))
}

fn inspect_loads_stage() -> Arc<dyn Stage> {
    let stage = FnStage::new(INSPECT_LOADS, |ctx: &StageContext| {
        let result: WriteResult = ctx.inputs().require(LOAD, "write_result")?;
        for table in &result.successful_loads {
            info!(table = %table, "Loaded {table}");
        }
        Ok(StageOutput::ok_serialized("successful_loads", &result.successful_loads))
    });
    Arc::new(stage.with_kind(StageKind::Inspect))
}

fn inspect_failed_inserts_stage() -> Arc<dyn Stage> {
    let stage = FnStage::new(INSPECT_FAILED_INSERTS, |ctx: &StageContext| {
        let result: WriteResult = ctx.inputs().require(LOAD, "write_result")?;
        let failed = result.failed_insert_count();
        info!(failed_inserts = failed, "Failed inserts: {failed}");
        for insert in &result.failed_inserts {
            debug!(reason = %insert.reason, "failed insert");
        }
        Ok(StageOutput::ok_serialized("failed_insert_count", &failed))
    });
    Arc::new(stage.with_kind(StageKind::Inspect))
}

/// Builds the job graph.
///
/// # Errors
///
/// Returns a validation error if the graph is malformed.
pub fn build_pipeline(
    config: &JobConfig,
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn TableSink>,
) -> Result<StageGraph, BatchflowError> {
    let graph = PipelineBuilder::new(JOB_NAME)
        .stage(
            EXTRACT,
            Arc::new(ExtractStage {
                source,
                partitions: config.partitions,
            }),
            &[],
        )?
        .stage(FILTER, filter_stage(), &[EXTRACT])?
        .stage(COUNT, Arc::new(CountStage), &[FILTER])?
        .stage(FORMAT, format_stage(), &[COUNT])?
        .stage(
            LOAD,
            Arc::new(LoadStage {
                sink,
                destination: config.output.clone(),
            }),
            &[FORMAT],
        )?
        .stage(INSPECT_LOADS, inspect_loads_stage(), &[LOAD])?
        .stage(INSPECT_FAILED_INSERTS, inspect_failed_inserts_stage(), &[LOAD])?
        .build()?;
    Ok(graph)
}

/// Builds the job and a runner for it.
///
/// # Errors
///
/// See [`build_pipeline`].
pub fn runner(
    config: &JobConfig,
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn TableSink>,
) -> Result<PipelineRunner, BatchflowError> {
    let identity = RunIdentity::new(JOB_NAME)
        .with_runner(config.runner)
        .with_project(config.project.clone())
        .with_region(config.region.clone());
    Ok(PipelineRunner::new(build_pipeline(config, source, sink)?, identity))
}

/// Runs the job to completion.
///
/// Rows the sink refuses are counted in the result; they do not fail the
/// run.
///
/// # Errors
///
/// Returns the fatal error when the source cannot be read or the sink
/// cannot be written.
pub async fn run(
    config: &JobConfig,
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn TableSink>,
    events: Option<Arc<dyn EventSink>>,
) -> Result<PipelineResult, BatchflowError> {
    let mut runner = runner(config, source, sink)?;
    if let Some(events) = events {
        runner = runner.with_event_sink(events);
    }
    runner.run().await
}
