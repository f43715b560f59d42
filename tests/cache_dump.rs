use cachelog::core::chunk::CHUNK_HEADER_SIZE;
use cachelog::core::{CacheStore, Cursor, LogRecord, LogSource, StoreConfig, RECORD_SIZE};
use cachelog::export::{run_export, CsvWriter, ExportConfig, Separator};
use cachelog::schema::{SchemaConfig, SchemaRegistry, TaskConfig, ValueConfig};
use tempfile::tempdir;

fn two_task_schema() -> SchemaRegistry {
    let task = |name: &str, plugin: u16| TaskConfig {
        name: name.to_string(),
        plugin_id: Some(plugin),
        values: vec![ValueConfig {
            name: "value".to_string(),
            decimals: 2,
        }],
    };
    SchemaRegistry::new(SchemaConfig {
        max_tasks: 2,
        tasks: vec![task("u", 1), task("v", 2)],
    })
    .expect("schema")
}

fn small_store(dir: &std::path::Path) -> CacheStore {
    let config = StoreConfig {
        dir: dir.to_path_buf(),
        chunk_size: CHUNK_HEADER_SIZE + 3 * RECORD_SIZE,
        pending_capacity: 2,
    };
    CacheStore::open(&config).expect("store open")
}

fn dump(store: &mut CacheStore, config: ExportConfig) -> Vec<String> {
    let schema = two_task_schema();
    let mut writer = CsvWriter::new(Vec::new(), config.separator);
    run_export(store, config, &schema, &mut writer).expect("export");
    let text = String::from_utf8(writer.into_inner().expect("into inner")).expect("utf8");
    assert!(text.is_empty() || text.ends_with("\r\n"));
    text.split_terminator("\r\n").map(str::to_string).collect()
}

#[test]
fn joined_example_row() {
    let dir = tempdir().expect("tempdir");
    let mut store = small_store(dir.path());
    store
        .append_sample(LogRecord::new(100, 0, 1, [0.0; 4]))
        .expect("append u");
    store
        .append_sample(LogRecord::new(100, 1, 2, [1.23, 0.0, 0.0, 0.0]))
        .expect("append v");

    let lines = dump(
        &mut store,
        ExportConfig {
            join_timestamp: true,
            ..ExportConfig::default()
        },
    );
    assert_eq!(
        lines[0],
        "UNIX timestamp;UTC timestamp;nrJoinedSamples;u#value;u#;u#;u#;v#value;v#;v#;v#"
    );
    assert_eq!(lines[1], "100;1970-01-01 00:01:40;2;0;0;0;0;1.23;0;0;0");
    assert_eq!(lines.len(), 2);
}

#[test]
fn empty_log_emits_header_only() {
    let dir = tempdir().expect("tempdir");
    let mut store = small_store(dir.path());
    let lines = dump(
        &mut store,
        ExportConfig {
            separator: Separator::TAB,
            ..ExportConfig::default()
        },
    );
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("UNIX timestamp\tUTC timestamp\ttaskindex\tplugin ID\t"));
    assert_eq!(store.save_cursor(), Cursor::START);
}

#[test]
fn export_spans_chunks_and_leaves_consumer_untouched() {
    let dir = tempdir().expect("tempdir");
    let mut store = small_store(dir.path());
    for ts in 0..10u32 {
        store
            .append_sample(LogRecord::new(1000 + ts, (ts % 2) as u8, 1, [ts as f32; 4]))
            .expect("append");
    }
    // Pending capacity is 2, so the eleventh sample is still in memory.
    store
        .append_sample(LogRecord::new(2000, 0, 1, [9.0; 4]))
        .expect("append pending");
    assert_eq!(store.pending_len(), 1);
    assert!(store.chunk_ids().expect("chunks").len() >= 3);

    // Background consumer has read three samples.
    for _ in 0..3 {
        store.get_next_record().expect("consume").expect("record");
    }
    let before = store.save_cursor();

    let lines = dump(&mut store, ExportConfig::default());
    assert_eq!(lines.len(), 1 + 11, "flushed sample included");
    assert!(lines[11].starts_with("2000;"));

    assert_eq!(store.save_cursor(), before);
    let next = store.get_next_record().expect("resume").expect("record");
    assert_eq!(next.timestamp, 1003);
}

#[test]
fn repeated_exports_are_identical() {
    let dir = tempdir().expect("tempdir");
    let mut store = small_store(dir.path());
    for ts in [5u32, 5, 6, 7, 7, 7] {
        store
            .append_sample(LogRecord::new(ts, 1, 2, [0.5, 0.0, 0.0, 0.0]))
            .expect("append");
    }
    let config = ExportConfig {
        join_timestamp: true,
        ..ExportConfig::default()
    };
    let first = dump(&mut store, config.clone());
    let second = dump(&mut store, config);
    assert_eq!(first, second);
    // Three runs of equal timestamps.
    assert_eq!(first.len(), 1 + 3);
    assert_eq!(first[3], "7;1970-01-01 00:00:07;3;0;0;0;0;0.50;0;0;0");
}
