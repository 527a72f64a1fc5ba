// Whole-store persistence as a single Arrow IPC file

#[cfg(test)]
mod tests;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Float64Array, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{DocumentRecord, StoreError, VectorStore};

pub const FORMAT_VERSION: &str = "1";

const FORMAT_VERSION_KEY: &str = "format_version";
const DIMENSION_KEY: &str = "dimension";

fn create_schema(dimension: Option<usize>) -> Arc<Schema> {
    let mut metadata = HashMap::from([(
        FORMAT_VERSION_KEY.to_string(),
        FORMAT_VERSION.to_string(),
    )]);
    if let Some(dimension) = dimension {
        metadata.insert(DIMENSION_KEY.to_string(), dimension.to_string());
    }

    // A FixedSizeList needs a width even for an empty store
    let width = dimension.unwrap_or(0) as i32;

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("filepath", DataType::Utf8, false),
            Field::new("extension", DataType::Utf8, false),
            Field::new("size_mb", DataType::Float64, false),
            Field::new("text_excerpt", DataType::Utf8, false),
            Field::new("text_length", DataType::UInt64, false),
            Field::new("full_text", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    width,
                ),
                false,
            ),
        ],
        metadata,
    ))
}

fn create_record_batch(store: &VectorStore) -> Result<RecordBatch, StoreError> {
    let records = store.records();
    let width = store.dimension().unwrap_or(0);
    let schema = create_schema(store.dimension());

    let filepaths: Vec<String> = records
        .iter()
        .map(|r| r.filepath.to_string_lossy().into_owned())
        .collect();
    let indexed_ats: Vec<String> = records.iter().map(|r| r.indexed_at.to_rfc3339()).collect();

    let values = Float32Array::from(store.embeddings().to_vec());
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let vectors = FixedSizeListArray::try_new(item, width as i32, Arc::new(values), None)
        .map_err(|e| StoreError::Serialization(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.doc_id.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.filename.as_str()),
        )),
        Arc::new(StringArray::from(filepaths)),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.extension.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.size_mb),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.text_excerpt.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(
            records.iter().map(|r| r.text_length as u64),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.full_text.as_str()),
        )),
        Arc::new(StringArray::from(indexed_ats)),
        Arc::new(vectors),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| StoreError::Serialization(format!("Failed to create record batch: {}", e)))
}

/// Serialize the store to Arrow IPC bytes.
#[inline]
pub fn encode(store: &VectorStore) -> Result<Vec<u8>, StoreError> {
    let batch = create_record_batch(store)?;
    let serialization = |e: arrow::error::ArrowError| StoreError::Serialization(e.to_string());

    let mut writer = FileWriter::try_new(Vec::new(), &batch.schema()).map_err(serialization)?;
    writer.write(&batch).map_err(serialization)?;
    writer.finish().map_err(serialization)?;
    writer.into_inner().map_err(serialization)
}

/// Write the store to `path` through a temporary sibling file that is
/// renamed over the target, so readers never see a partial snapshot.
#[inline]
pub fn write(store: &VectorStore, path: &Path) -> Result<(), StoreError> {
    let bytes = encode(store)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    debug!("Writing index snapshot to {}", tmp_path.display());

    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp_path, path)) {
        error!("Failed to write index snapshot {}: {}", path.display(), e);
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io(e));
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4()));
    path.with_file_name(name)
}

/// Read a snapshot file into a fresh store.
#[inline]
pub fn read(path: &Path) -> Result<VectorStore, StoreError> {
    let bytes = fs::read(path)?;
    decode(&bytes).map_err(|reason| StoreError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse Arrow IPC bytes into a store. Every failure is reported as a
/// human-readable reason.
#[inline]
pub fn decode(bytes: &[u8]) -> Result<VectorStore, String> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| format!("not an Arrow IPC file: {}", e))?;

    let schema = reader.schema();
    let metadata = schema.metadata();
    match metadata.get(FORMAT_VERSION_KEY).map(String::as_str) {
        Some(FORMAT_VERSION) => {}
        Some(other) => return Err(format!("unsupported format version {}", other)),
        None => return Err("missing format version".to_string()),
    }
    let dimension = metadata
        .get(DIMENSION_KEY)
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| format!("invalid dimension {:?}", d))
        })
        .transpose()?;

    let mut records = Vec::new();
    let mut embeddings = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| format!("unreadable record batch: {}", e))?;
        parse_batch(&batch, dimension, &mut records, &mut embeddings)?;
    }

    let store = VectorStore::from_parts(embeddings, records, dimension).map_err(|e| e.to_string())?;
    info!("Decoded index snapshot with {} documents", store.count());
    Ok(store)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing {} column", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("invalid {} column type", name))
}

fn parse_batch(
    batch: &RecordBatch,
    dimension: Option<usize>,
    records: &mut Vec<DocumentRecord>,
    embeddings: &mut Vec<f32>,
) -> Result<(), String> {
    let doc_ids = string_column(batch, "doc_id")?;
    let filenames = string_column(batch, "filename")?;
    let filepaths = string_column(batch, "filepath")?;
    let extensions = string_column(batch, "extension")?;
    let excerpts = string_column(batch, "text_excerpt")?;
    let full_texts = string_column(batch, "full_text")?;
    let indexed_ats = string_column(batch, "indexed_at")?;

    let sizes = batch
        .column_by_name("size_mb")
        .ok_or("missing size_mb column")?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or("invalid size_mb column type")?;

    let lengths = batch
        .column_by_name("text_length")
        .ok_or("missing text_length column")?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or("invalid text_length column type")?;

    let vectors = batch
        .column_by_name("vector")
        .ok_or("missing vector column")?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or("invalid vector column type")?;

    let width = vectors.value_length() as usize;
    if batch.num_rows() > 0 && dimension != Some(width) {
        return Err(format!(
            "vector width {} disagrees with recorded dimension {:?}",
            width, dimension
        ));
    }

    let values = vectors
        .values()
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or("invalid vector item type")?;

    for row in 0..batch.num_rows() {
        let indexed_at = DateTime::parse_from_rfc3339(indexed_ats.value(row))
            .map_err(|e| format!("invalid indexed_at at row {}: {}", row, e))?
            .with_timezone(&Utc);

        records.push(DocumentRecord {
            doc_id: doc_ids.value(row).to_string(),
            filename: filenames.value(row).to_string(),
            filepath: PathBuf::from(filepaths.value(row)),
            extension: extensions.value(row).to_string(),
            size_mb: sizes.value(row),
            text_excerpt: excerpts.value(row).to_string(),
            text_length: lengths.value(row) as usize,
            full_text: full_texts.value(row).to_string(),
            indexed_at,
        });

        let start = vectors.value_offset(row) as usize;
        let row_values = values
            .values()
            .get(start..start + width)
            .ok_or_else(|| format!("truncated vector at row {}", row))?;
        embeddings.extend_from_slice(row_values);
    }

    debug!("Parsed {} rows from snapshot batch", batch.num_rows());
    Ok(())
}
