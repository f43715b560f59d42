use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use cachelog::core::chunk::{chunk_path, CHUNK_HEADER_SIZE};
use cachelog::core::{CacheStore, LogRecord, LogSource, StoreConfig, RECORD_SIZE, VARS_PER_TASK};
use cachelog::export::{
    run_export, CsvWriter, ExportConfig, ExportFormat, JsonListingWriter, Separator,
    StreamingWriter,
};
use cachelog::schema::{SchemaRegistry, TaskSchema};

#[derive(Parser)]
#[command(name = "cachelog-cli", version, about = "Sample cache tooling")]
struct Cli {
    /// Store config (JSON); flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the chunk files [default: ./cache]
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Chunk size in bytes [default: 24576]
    #[arg(long)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every sample as a CSV table
    Dump {
        /// Task schema (JSON); all task slots are unnamed without it
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Separator character or Tab/Comma/Semicolon
        #[arg(long, default_value = ";")]
        separator: String,
        /// Merge samples sharing a timestamp into one row
        #[arg(long)]
        join_timestamp: bool,
        /// Only tasks with a configured plugin get columns
        #[arg(long)]
        only_set_tasks: bool,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the JSON cache listing
    Listing {
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Add a plugin ID label to the columns
        #[arg(long)]
        plugin_id: bool,
    },
    /// Buffer one sample and flush it into the chunk files
    Append {
        #[arg(long)]
        task: u8,
        #[arg(long, default_value_t = 0)]
        plugin: u16,
        /// Seconds since epoch (now when omitted)
        #[arg(long)]
        timestamp: Option<u32>,
        /// Up to four values
        values: Vec<f32>,
    },
    /// Read samples as the background consumer and commit its cursor
    Drain {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List chunk files and their record counts
    Inspect,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("load store config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = cli.dir {
        config.dir = dir;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    let mut store = CacheStore::open(&config)
        .with_context(|| format!("open cache store {}", config.dir.display()))?;

    match cli.command {
        Commands::Dump {
            schema,
            separator,
            join_timestamp,
            only_set_tasks,
            out,
        } => {
            let schema = load_schema(schema.as_deref())?;
            let config = ExportConfig {
                separator: Separator::parse(&separator),
                join_timestamp,
                only_set_tasks,
                format: ExportFormat::Csv,
                ..ExportConfig::default()
            };
            let sink: Box<dyn Write> = match &out {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout())),
            };
            let mut writer = CsvWriter::new(sink, config.separator);
            let summary = export(&mut store, config, &schema, &mut writer)?;
            info!("wrote {} rows", summary.rows);
        }
        Commands::Listing { schema, plugin_id } => {
            let schema = load_schema(schema.as_deref())?;
            let config = ExportConfig {
                include_plugin_id: plugin_id,
                format: ExportFormat::Json,
                ..ExportConfig::default()
            };
            let mut writer = JsonListingWriter::new(io::stdout());
            export(&mut store, config, &schema, &mut writer)?;
        }
        Commands::Append {
            task,
            plugin,
            timestamp,
            values,
        } => {
            if values.len() > VARS_PER_TASK {
                bail!("at most {VARS_PER_TASK} values per sample");
            }
            let mut slots = [0f32; VARS_PER_TASK];
            slots[..values.len()].copy_from_slice(&values);
            let timestamp = match timestamp {
                Some(ts) => ts,
                None => now_secs()?,
            };
            store.append_sample(LogRecord::new(timestamp, task, plugin, slots))?;
            let flushed = store.flush_pending_samples()?;
            info!("appended {flushed} sample(s) at {timestamp}");
        }
        Commands::Drain { limit } => {
            let mut out = BufWriter::new(io::stdout());
            let mut count = 0usize;
            while limit.map_or(true, |limit| count < limit) {
                let Some(record) = store.get_next_record()? else {
                    break;
                };
                writeln!(
                    out,
                    "ts={} task={} plugin={} values={:?}",
                    record.timestamp, record.task_index, record.plugin_id, record.values
                )?;
                count += 1;
            }
            out.flush()?;
            store.commit_cursor()?;
            info!("drained {count} records, cursor {:?}", store.save_cursor());
        }
        Commands::Inspect => {
            let mut out = BufWriter::new(io::stdout());
            writeln!(out, "dir: {}", store.dir().display())?;
            writeln!(out, "cursor: {:?}", store.save_cursor())?;
            writeln!(out, "pending: {}", store.pending_len())?;
            for id in store.chunk_ids()? {
                let len = std::fs::metadata(chunk_path(store.dir(), id))?.len() as usize;
                let records = len.saturating_sub(CHUNK_HEADER_SIZE) / RECORD_SIZE;
                writeln!(out, "cache_{id}.bin\t{len} bytes\t{records} records")?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn export(
    store: &mut CacheStore,
    config: ExportConfig,
    schema: &dyn TaskSchema,
    writer: &mut dyn StreamingWriter,
) -> Result<cachelog::ExportSummary> {
    let summary = run_export(store, config, schema, writer)?;
    if summary.abandoned {
        bail!("output closed after {} rows", summary.rows);
    }
    Ok(summary)
}

fn load_schema(path: Option<&Path>) -> Result<SchemaRegistry> {
    match path {
        Some(path) => SchemaRegistry::load(path)
            .with_context(|| format!("load schema {}", path.display())),
        None => Ok(SchemaRegistry::default()),
    }
}

fn now_secs() -> Result<u32> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    u32::try_from(secs).context("system time beyond u32 seconds")
}
