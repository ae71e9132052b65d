use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float64Type};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use serde_json::Value as JsonValue;

/// Table file extensions probed for a table path, in preference order.
pub const TABLE_EXTENSIONS: &[&str] = &["parquet", "csv", "json"];

/// Schema and length of one table file, known without reading its data.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub columns: Vec<String>,
    pub rows: usize,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Introspect a table file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – flat schema of numeric / boolean columns (recommended)
/// * `.csv`     – header row, one numeric cell per column
/// * `.json`    – `[{ "column": value, ... }, ...]`
pub fn probe_table(path: &Path) -> Result<TableInfo> {
    match extension(path).as_str() {
        "parquet" | "pq" => probe_parquet(path),
        "csv" => probe_csv(path),
        "json" => probe_json(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Read the named columns of a table file, decoded to `f64`, in the order
/// requested.
pub fn read_columns(path: &Path, columns: &[String]) -> Result<Vec<Vec<f64>>> {
    read_range(path, columns, None)
}

/// As [`read_columns`], for at most `len` rows starting at row `start`.
/// Rows past the end of the file are simply not returned.
pub fn read_rows(path: &Path, columns: &[String], start: usize, len: usize) -> Result<Vec<Vec<f64>>> {
    read_range(path, columns, Some(start..start.saturating_add(len)))
}

fn read_range(path: &Path, columns: &[String], rows: Option<Range<usize>>) -> Result<Vec<Vec<f64>>> {
    match extension(path).as_str() {
        "parquet" | "pq" => read_parquet(path, columns, rows),
        "csv" => read_csv(path, columns, rows),
        "json" => read_json(path, columns, rows),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn probe_parquet(path: &Path) -> Result<TableInfo> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let rows = builder.metadata().file_metadata().num_rows();

    Ok(TableInfo {
        columns,
        rows: usize::try_from(rows).unwrap_or(0),
    })
}

/// Only the requested columns are decoded; the rest of the file is skipped
/// through a projection mask, and rows outside `rows` through a row
/// selection.
fn read_parquet(path: &Path, columns: &[String], rows: Option<Range<usize>>) -> Result<Vec<Vec<f64>>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    if let Some(range) = rows {
        let total = usize::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
        let start = range.start.min(total);
        let end = range.end.clamp(start, total);
        builder = builder.with_row_selection(RowSelection::from(vec![
            RowSelector::skip(start),
            RowSelector::select(end - start),
        ]));
    }

    let schema = builder.schema().clone();
    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        let idx = schema
            .index_of(name)
            .map_err(|_| anyhow!("Parquet file missing '{name}' column"))?;
        indices.push(idx);
    }

    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    let reader = builder
        .with_projection(mask)
        .build()
        .context("building parquet reader")?;

    let mut out = vec![Vec::new(); columns.len()];
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let batch_schema = batch.schema();

        for (values, name) in out.iter_mut().zip(columns) {
            let idx = batch_schema.index_of(name)?;
            extend_f64(values, batch.column(idx))
                .with_context(|| format!("decoding column '{name}'"))?;
        }
    }

    Ok(out)
}

/// Append an Arrow column as doubles; nulls become NaN, booleans 0/1.
fn extend_f64(out: &mut Vec<f64>, col: &ArrayRef) -> Result<()> {
    let cast = arrow::compute::cast(col, &DataType::Float64)
        .with_context(|| format!("column type {:?} is not numeric", col.data_type()))?;
    let doubles = cast.as_primitive::<Float64Type>();
    out.extend(doubles.iter().map(|v| v.unwrap_or(f64::NAN)));
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one value per cell.
/// Empty cells are null (NaN); `true` / `false` decode to 1 / 0.
fn probe_csv(path: &Path) -> Result<TableInfo> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = 0;
    for result in reader.records() {
        result.with_context(|| format!("CSV row {rows}"))?;
        rows += 1;
    }

    Ok(TableInfo { columns, rows })
}

fn read_csv(path: &Path, columns: &[String], rows: Option<Range<usize>>) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let indices = columns
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("CSV missing '{name}' column"))
        })
        .collect::<Result<Vec<_>>>()?;

    let range = rows.unwrap_or(0..usize::MAX);
    let mut out = vec![Vec::new(); columns.len()];
    let records = reader.records().enumerate().skip(range.start).take(range.len());
    for (row_no, result) in records {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (values, (&idx, name)) in out.iter_mut().zip(indices.iter().zip(columns)) {
            let cell = record.get(idx).unwrap_or("");
            values.push(decode_cell(cell).with_context(|| {
                format!("CSV row {row_no}, {name}: '{cell}' is not a number")
            })?);
        }
    }

    Ok(out)
}

fn decode_cell(s: &str) -> Option<f64> {
    let s = s.trim();
    match s {
        "" => Some(f64::NAN),
        "true" => Some(1.0),
        "false" => Some(0.0),
        _ => s.parse::<f64>().ok(),
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "SeriesNumber": 11204111500, "EventCategory": 0, "VTTime20": -120.5 },
///   ...
/// ]
/// ```
fn probe_json(path: &Path) -> Result<TableInfo> {
    let records = load_json_records(path)?;
    let columns = match records.first() {
        Some(first) => first
            .as_object()
            .context("Row 0 is not a JSON object")?
            .keys()
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    Ok(TableInfo {
        columns,
        rows: records.len(),
    })
}

/// A record without one of the requested keys is an error; an explicit
/// `null` decodes to NaN.
fn read_json(path: &Path, columns: &[String], rows: Option<Range<usize>>) -> Result<Vec<Vec<f64>>> {
    let records = load_json_records(path)?;
    let range = rows.unwrap_or(0..records.len());
    let start = range.start.min(records.len());
    let end = range.end.clamp(start, records.len());

    let mut out = vec![Vec::with_capacity(end - start); columns.len()];
    for (i, rec) in records.iter().enumerate().take(end).skip(start) {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        for (values, name) in out.iter_mut().zip(columns) {
            let value = match obj.get(name) {
                None => bail!("Row {i}: missing '{name}'"),
                Some(JsonValue::Null) => f64::NAN,
                Some(JsonValue::Bool(b)) => f64::from(u8::from(*b)),
                Some(JsonValue::Number(n)) => n
                    .as_f64()
                    .with_context(|| format!("Row {i}, {name}: not representable as f64"))?,
                Some(other) => bail!("Row {i}, {name}: expected a number, got {other}"),
            };
            values.push(value);
        }
    }

    Ok(out)
}

fn load_json_records(path: &Path) -> Result<Vec<JsonValue>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    match root {
        JsonValue::Array(records) => Ok(records),
        _ => bail!("Expected top-level JSON array"),
    }
}
