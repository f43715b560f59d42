//! One full pass over the cache log.
//!
//! # CSV pass
//!
//! ```text
//! PeekGuard::begin ── save cursor, flush pending samples, rewind
//!   header ──► writer
//!   for each record:
//!     task excluded?            ──► skip
//!     new row needed?           ──► emit accumulated row
//!     fold values into the row
//!   emit last row
//! drop(PeekGuard) ── cursor restored (also on error)
//! ```
//!
//! With `join_timestamp` set, consecutive records with exactly equal
//! timestamps share one row. Filtering happens per record, before grouping,
//! so an excluded task never contributes to a joined row.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::core::{Error, LogRecord, LogSource, PeekGuard, Result, VARS_PER_TASK};
use crate::export::options::{ExportConfig, ExportFormat};
use crate::export::writer::StreamingWriter;
use crate::schema::{DecimalPrecisionTable, TaskSchema, INVALID_PLUGIN_ID};

/// Outcome of one export pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Data rows handed to the writer.
    ///
    /// The CSV writer buffers, so when `abandoned` is set some of these rows
    /// may never have reached the transport.
    pub rows: usize,
    /// Records read from the log.
    pub records: usize,
    /// Records dropped by the task filter.
    pub skipped: usize,
    /// The writer gave up before the pass completed.
    pub abandoned: bool,
}

pub struct ExportEngine<'a> {
    config: ExportConfig,
    schema: &'a dyn TaskSchema,
    precision: DecimalPrecisionTable,
    include_task: Vec<bool>,
}

impl<'a> ExportEngine<'a> {
    pub fn new(config: ExportConfig, schema: &'a dyn TaskSchema) -> Self {
        let precision = DecimalPrecisionTable::from_schema(schema);
        let include_task = task_inclusion_mask(schema, config.only_set_tasks);
        Self {
            config,
            schema,
            precision,
            include_task,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn includes(&self, task: usize) -> bool {
        self.include_task.get(task).copied().unwrap_or(false)
    }

    /// Run one pass against `source`, streaming into `writer`.
    ///
    /// The consumption cursor of `source` is unchanged afterwards, including
    /// when the pass fails part-way.
    pub fn run<S>(&self, source: &mut S, writer: &mut dyn StreamingWriter) -> Result<ExportSummary>
    where
        S: LogSource + ?Sized,
    {
        let mut summary = ExportSummary::default();
        let outcome = match self.config.format {
            ExportFormat::Csv => self.export_rows(source, writer, &mut summary),
            ExportFormat::Json => self.export_listing(source, writer),
        };
        match outcome {
            Ok(()) => {}
            Err(Error::SinkClosed) => {
                warn!(
                    "export abandoned by writer after {} rows",
                    summary.rows
                );
                summary.abandoned = true;
            }
            Err(err) => return Err(err),
        }
        info!(
            "export finished: {} rows from {} records ({} skipped)",
            summary.rows, summary.records, summary.skipped
        );
        Ok(summary)
    }

    /// CSV header labels, matching the width of every data row.
    pub fn csv_header(&self) -> Vec<String> {
        let mut labels = vec!["UNIX timestamp".to_string(), "UTC timestamp".to_string()];
        if self.config.join_timestamp {
            labels.push("nrJoinedSamples".to_string());
        } else {
            labels.push("taskindex".to_string());
            labels.push("plugin ID".to_string());
        }
        for task in (0..self.schema.task_count()).filter(|&task| self.includes(task)) {
            labels.extend((0..VARS_PER_TASK).map(|slot| value_label(self.schema, task, slot)));
        }
        labels
    }

    /// Column labels of the JSON listing; covers every task slot.
    pub fn json_columns(&self) -> Vec<String> {
        let mut labels = vec![
            "UNIX timestamp".to_string(),
            "UTC timestamp".to_string(),
            "task index".to_string(),
        ];
        if self.config.include_plugin_id {
            labels.push("plugin ID".to_string());
        }
        for task in 0..self.schema.task_count() {
            labels.extend((0..VARS_PER_TASK).map(|slot| value_label(self.schema, task, slot)));
        }
        labels
    }

    fn export_rows<S>(
        &self,
        source: &mut S,
        writer: &mut dyn StreamingWriter,
        summary: &mut ExportSummary,
    ) -> Result<()>
    where
        S: LogSource + ?Sized,
    {
        let mut pass = PeekGuard::begin(source)?;
        writer.write_header_columns(&self.csv_header())?;

        let join = self.config.join_timestamp;
        let mut row = RowAccumulator::default();
        let mut last_timestamp: Option<u32> = None;

        while let Some(record) = pass.get_next_record()? {
            summary.records += 1;
            let task = usize::from(record.task_index);
            if !self.includes(task) {
                summary.skipped += 1;
                continue;
            }

            if !join || last_timestamp != Some(record.timestamp) {
                if !row.is_empty() {
                    writer.write_row(&row.take_cells(self))?;
                    summary.rows += 1;
                }
                row.start(&record, join);
                last_timestamp = Some(record.timestamp);
            }
            row.fold(&record, &self.precision);
        }

        if !row.is_empty() {
            writer.write_row(&row.take_cells(self))?;
            summary.rows += 1;
        }
        writer.finish()?;
        debug!(
            "csv pass done, restoring cursor {:?}",
            pass.saved_cursor()
        );
        Ok(())
    }

    fn export_listing<S>(&self, source: &mut S, writer: &mut dyn StreamingWriter) -> Result<()>
    where
        S: LogSource + ?Sized,
    {
        source.flush_pending_samples()?;
        writer.write_header_columns(&self.json_columns())?;

        let mut files = Vec::new();
        for index in 0.. {
            let (name, is_last) = source.chunk_file_name(index)?;
            if !name.is_empty() {
                files.push(name);
            }
            if is_last {
                break;
            }
        }
        writer.write_files(&files)?;

        let plugin_ids: Vec<u16> = (0..self.schema.task_count())
            .map(|task| self.schema.plugin_id(task).unwrap_or(INVALID_PLUGIN_ID))
            .collect();
        writer.write_plugin_ids(&plugin_ids)?;
        writer.finish()
    }
}

/// Run a single export pass with a fresh engine.
pub fn run_export<S>(
    source: &mut S,
    config: ExportConfig,
    schema: &dyn TaskSchema,
    writer: &mut dyn StreamingWriter,
) -> Result<ExportSummary>
where
    S: LogSource + ?Sized,
{
    ExportEngine::new(config, schema).run(source, writer)
}

/// Tasks that get columns: all slots, or only those with a plugin.
pub fn task_inclusion_mask(schema: &dyn TaskSchema, only_set_tasks: bool) -> Vec<bool> {
    (0..schema.task_count())
        .map(|task| !only_set_tasks || schema.plugin_id(task).is_some())
        .collect()
}

fn value_label(schema: &dyn TaskSchema, task: usize, slot: usize) -> String {
    format!("{}#{}", schema.task_name(task), schema.value_name(task, slot))
}

/// Cells of the row being built.
///
/// Only slots touched by folded records are stored; every other included
/// slot reads as "0" when the row is emitted.
#[derive(Default)]
struct RowAccumulator {
    leading: Vec<String>,
    cells: BTreeMap<usize, String>,
    joined: usize,
}

impl RowAccumulator {
    fn is_empty(&self) -> bool {
        self.joined == 0
    }

    fn start(&mut self, record: &LogRecord, join: bool) {
        self.leading.clear();
        self.cells.clear();
        self.joined = 0;
        self.leading.push(record.timestamp.to_string());
        self.leading.push(format_utc(record.timestamp));
        if !join {
            self.leading.push(record.task_index.to_string());
            self.leading.push(record.plugin_id.to_string());
        }
    }

    fn fold(&mut self, record: &LogRecord, precision: &DecimalPrecisionTable) {
        let task = usize::from(record.task_index);
        for (slot, value) in record.values.iter().enumerate() {
            let cell = format_value(*value, precision.get(task, slot));
            self.cells.insert(task * VARS_PER_TASK + slot, cell);
        }
        self.joined += 1;
    }

    fn take_cells(&mut self, engine: &ExportEngine<'_>) -> Vec<String> {
        let mut out = std::mem::take(&mut self.leading);
        if engine.config.join_timestamp {
            out.push(self.joined.to_string());
        }
        for task in (0..engine.schema.task_count()).filter(|&task| engine.includes(task)) {
            for slot in 0..VARS_PER_TASK {
                let cell = self
                    .cells
                    .remove(&(task * VARS_PER_TASK + slot))
                    .unwrap_or_else(|| "0".to_string());
                out.push(cell);
            }
        }
        self.cells.clear();
        self.joined = 0;
        out
    }
}

/// Format a sample with a fixed number of decimals; zero is always "0".
pub fn format_value(value: f32, decimals: u8) -> String {
    if value.abs() < f32::EPSILON {
        return "0".to_string();
    }
    format!("{:.*}", usize::from(decimals), value)
}

/// `YYYY-MM-DD hh:mm:ss` in UTC.
pub fn format_utc(timestamp: u32) -> String {
    // Every u32 second count is within OffsetDateTime's range.
    let dt = OffsetDateTime::from_unix_timestamp(i64::from(timestamp))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let date = dt.date();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        date.year(),
        date.month() as u8,
        date.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}
