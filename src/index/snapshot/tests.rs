use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

fn record(filename: &str) -> DocumentRecord {
    DocumentRecord {
        doc_id: format!("id-{}", filename),
        filename: filename.to_string(),
        filepath: PathBuf::from("/library").join(filename),
        extension: ".txt".to_string(),
        size_mb: 0.25,
        text_excerpt: "Quarterly numbers".to_string(),
        text_length: 42,
        full_text: "Quarterly numbers for the budget committee, café included".to_string(),
        indexed_at: Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .single()
            .expect("should build timestamp"),
    }
}

fn sample_store() -> VectorStore {
    let mut store = VectorStore::new();
    store
        .add(&[0.1, -0.2, f32::MIN_POSITIVE], record("a.txt"))
        .expect("should add first record");
    store
        .add(&[1.0e-7, 3.5, -0.0], record("b.txt"))
        .expect("should add second record");
    store
}

#[test]
fn round_trip_preserves_records_and_vector_bits() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("index.arrow");
    let store = sample_store();

    write(&store, &path).expect("should write snapshot");
    let loaded = read(&path).expect("should read snapshot");

    assert_eq!(loaded.records(), store.records());
    assert_eq!(loaded.dimension(), Some(3));
    let original_bits: Vec<u32> = store.embeddings().iter().map(|v| v.to_bits()).collect();
    let loaded_bits: Vec<u32> = loaded.embeddings().iter().map(|v| v.to_bits()).collect();
    assert_eq!(original_bits, loaded_bits);
}

#[test]
fn empty_store_round_trips_without_dimension() {
    let store = VectorStore::new();

    let bytes = encode(&store).expect("should encode empty store");
    let decoded = decode(&bytes).expect("should decode empty store");

    assert!(decoded.is_empty());
    assert_eq!(decoded.dimension(), None);
}

#[test]
fn write_creates_parent_directories_and_leaves_no_temp_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("nested").join("index.arrow");

    write(&sample_store(), &path).expect("should write snapshot");

    let entries: Vec<_> = fs::read_dir(path.parent().expect("should have parent"))
        .expect("should list directory")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("index.arrow")]);
}

#[test]
fn garbage_bytes_are_reported_as_corrupt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("index.arrow");
    fs::write(&path, b"definitely not arrow").expect("should write garbage");

    let result = read(&path);

    assert!(matches!(
        result,
        Err(StoreError::CorruptSnapshot { path: p, .. }) if p == path
    ));
}

#[test]
fn truncated_snapshot_is_corrupt() {
    let bytes = encode(&sample_store()).expect("should encode");
    let truncated = &bytes[..bytes.len() / 2];

    assert!(decode(truncated).is_err());
}

#[test]
fn unknown_format_version_is_rejected() {
    let schema = Arc::new(Schema::new_with_metadata(
        vec![Field::new("doc_id", DataType::Utf8, false)],
        HashMap::from([(FORMAT_VERSION_KEY.to_string(), "99".to_string())]),
    ));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from(vec!["x"])) as ArrayRef],
    )
    .expect("should build batch");
    let mut writer = FileWriter::try_new(Vec::new(), &schema).expect("should create writer");
    writer.write(&batch).expect("should write batch");
    writer.finish().expect("should finish");
    let bytes = writer.into_inner().expect("should take bytes");

    let error = decode(&bytes).expect_err("version 99 should be rejected");
    assert!(error.contains("format version"), "unexpected reason: {}", error);
}

#[test]
fn missing_column_is_rejected() {
    let schema = Arc::new(Schema::new_with_metadata(
        vec![Field::new("doc_id", DataType::Utf8, false)],
        HashMap::from([
            (FORMAT_VERSION_KEY.to_string(), FORMAT_VERSION.to_string()),
            (DIMENSION_KEY.to_string(), "3".to_string()),
        ]),
    ));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from(vec!["x"])) as ArrayRef],
    )
    .expect("should build batch");
    let mut writer = FileWriter::try_new(Vec::new(), &schema).expect("should create writer");
    writer.write(&batch).expect("should write batch");
    writer.finish().expect("should finish");
    let bytes = writer.into_inner().expect("should take bytes");

    let error = decode(&bytes).expect_err("missing columns should be rejected");
    assert!(error.contains("missing"), "unexpected reason: {}", error);
}

#[test]
fn schema_records_dimension_metadata() {
    let schema = create_schema(Some(768));
    assert_eq!(
        schema.metadata().get(DIMENSION_KEY).map(String::as_str),
        Some("768")
    );
    assert_eq!(
        schema.metadata().get(FORMAT_VERSION_KEY).map(String::as_str),
        Some(FORMAT_VERSION)
    );

    let schema = create_schema(None);
    assert!(!schema.metadata().contains_key(DIMENSION_KEY));
}
