use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

use super::loader::{self, TABLE_EXTENSIONS, TableInfo};
use super::location::LocationTemplate;
use super::model::RowView;
use crate::error::{BlindError, BlindResult};

// ---------------------------------------------------------------------------
// TabularSource – one logical table, possibly chained over many files
// ---------------------------------------------------------------------------

/// A row-addressable table of named numeric columns with a single cursor.
pub trait TabularSource {
    /// Human-readable identity used in error messages.
    fn name(&self) -> &str;

    /// Every column the table offers, activated or not.
    fn columns(&self) -> &[String];

    /// Restrict reads to the given columns.  Replaces any previous selection.
    fn activate(&mut self, columns: &[String]) -> BlindResult<()>;

    fn num_rows(&self) -> usize;

    /// Move the cursor to `row` and materialize the active columns.
    fn read_row(&mut self, row: usize) -> BlindResult<()>;

    /// Values at the cursor.
    fn row(&self) -> &RowView;

    fn has_column(&self, column: &str) -> bool {
        self.columns().iter().any(|c| c == column)
    }
}

// ---------------------------------------------------------------------------
// ColumnarTable – fully materialized columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ColumnarTable {
    name: String,
    schema: Vec<String>,
    data: Vec<Vec<f64>>,
    rows: usize,
    active: Vec<usize>,
    cursor: RowView,
}

impl ColumnarTable {
    /// Build a table from `(column, values)` pairs; all columns must have the
    /// same length.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        columns: Vec<(S, Vec<f64>)>,
    ) -> BlindResult<Self> {
        let name = name.into();
        let mut schema = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        let mut rows = None;

        for (column, values) in columns {
            let column = column.into();
            match rows {
                None => rows = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(BlindError::RowCountMismatch {
                        source_name: format!("{name}/{column}"),
                        expected,
                        found: values.len(),
                    });
                }
                Some(_) => {}
            }
            schema.push(column);
            data.push(values);
        }

        Ok(Self {
            name,
            schema,
            data,
            rows: rows.unwrap_or(0),
            active: Vec::new(),
            cursor: RowView::default(),
        })
    }

    /// Append the rows of `parts` after this table's.  Every part must carry
    /// all of this table's columns.
    pub fn chain(mut self, parts: Vec<ColumnarTable>) -> BlindResult<Self> {
        for part in parts {
            for (column, values) in self.schema.iter().zip(self.data.iter_mut()) {
                let idx = part.schema.iter().position(|c| c == column).ok_or_else(|| {
                    BlindError::ColumnNotFound {
                        column: column.clone(),
                        source_name: part.name.clone(),
                    }
                })?;
                values.extend_from_slice(&part.data[idx]);
            }
            self.rows += part.rows;
        }
        Ok(self)
    }
}

impl TabularSource for ColumnarTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.schema
    }

    fn activate(&mut self, columns: &[String]) -> BlindResult<()> {
        let mut active = Vec::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        for column in columns {
            let idx = self
                .schema
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| BlindError::ColumnNotFound {
                    column: column.clone(),
                    source_name: self.name.clone(),
                })?;
            if !active.contains(&idx) {
                active.push(idx);
                names.push(column.clone());
            }
        }
        self.active = active;
        self.cursor = RowView::new(names);
        Ok(())
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn read_row(&mut self, row: usize) -> BlindResult<()> {
        if row >= self.rows {
            return Err(BlindError::RowRead {
                source_name: self.name.clone(),
                row,
            });
        }
        let data = &self.data;
        self.cursor
            .fill(row, self.active.iter().map(|&idx| data[idx][row]));
        Ok(())
    }

    fn row(&self) -> &RowView {
        &self.cursor
    }
}

// ---------------------------------------------------------------------------
// FileChain – table files concatenated in order, read in row blocks
// ---------------------------------------------------------------------------

/// Rows decoded per file read.
pub const BLOCK_ROWS: usize = 4096;

/// Decoded rows `start..start + len` of one file's active columns.
#[derive(Debug)]
struct Block {
    file: usize,
    start: usize,
    len: usize,
    values: Vec<Vec<f64>>,
}

impl Block {
    fn covers(&self, file: usize, local: usize) -> bool {
        self.file == file && (self.start..self.start + self.len).contains(&local)
    }
}

/// Table files read as one table.  The schema is the first file's.  Only
/// activated columns are decoded, one block of rows of one file at a time.
#[derive(Debug)]
pub struct FileChain {
    name: String,
    files: Vec<(PathBuf, TableInfo)>,
    /// Chain row at which each file starts.
    offsets: Vec<usize>,
    schema: Vec<String>,
    rows: usize,
    active: Vec<String>,
    block_rows: usize,
    block: Option<Block>,
    cursor: RowView,
}

impl FileChain {
    pub fn open(name: impl Into<String>, paths: Vec<PathBuf>) -> BlindResult<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let info = loader::probe_table(&path).map_err(|source| BlindError::Storage {
                path: path.display().to_string(),
                source,
            })?;
            files.push((path, info));
        }

        let mut offsets = Vec::with_capacity(files.len());
        let mut rows = 0;
        for (_, info) in &files {
            offsets.push(rows);
            rows += info.rows;
        }
        let schema = files
            .first()
            .map(|(_, info)| info.columns.clone())
            .unwrap_or_default();

        Ok(Self {
            name: name.into(),
            files,
            offsets,
            schema,
            rows,
            active: Vec::new(),
            block_rows: BLOCK_ROWS,
            block: None,
            cursor: RowView::default(),
        })
    }

    pub fn with_block_rows(mut self, rows: usize) -> Self {
        self.block_rows = rows.max(1);
        self.block = None;
        self
    }

    fn load_block(&self, file: usize, local: usize) -> BlindResult<Block> {
        let (path, info) = &self.files[file];
        let len = self.block_rows.min(info.rows - local);
        let values = if self.active.is_empty() {
            Vec::new()
        } else {
            loader::read_rows(path, &self.active, local, len).map_err(|source| {
                BlindError::Storage {
                    path: path.display().to_string(),
                    source,
                }
            })?
        };
        if let Some(short) = values.iter().find(|column| column.len() != len) {
            return Err(BlindError::RowRead {
                source_name: path.display().to_string(),
                row: local + short.len(),
            });
        }
        debug!("{}: decoded rows {local}..{} of {}", self.name, local + len, path.display());
        Ok(Block {
            file,
            start: local,
            len,
            values,
        })
    }

    #[cfg(test)]
    fn buffered_rows(&self) -> usize {
        self.block.as_ref().map_or(0, |block| block.len)
    }
}

impl TabularSource for FileChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[String] {
        &self.schema
    }

    fn activate(&mut self, columns: &[String]) -> BlindResult<()> {
        let mut wanted: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !wanted.contains(column) {
                wanted.push(column.clone());
            }
        }

        for (path, info) in &self.files {
            if let Some(missing) = wanted.iter().find(|c| !info.columns.contains(c)) {
                return Err(BlindError::ColumnNotFound {
                    column: missing.clone(),
                    source_name: path.display().to_string(),
                });
            }
        }

        debug!("{}: activated {} column(s)", self.name, wanted.len());
        self.cursor = RowView::new(wanted.clone());
        self.active = wanted;
        self.block = None;
        Ok(())
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn read_row(&mut self, row: usize) -> BlindResult<()> {
        if row >= self.rows {
            return Err(BlindError::RowRead {
                source_name: self.name.clone(),
                row,
            });
        }
        // offsets[0] is 0, so at least one file starts at or before `row`.
        let file = self.offsets.partition_point(|&offset| offset <= row) - 1;
        let local = row - self.offsets[file];

        let block = match self.block.take() {
            Some(block) if block.covers(file, local) => block,
            _ => self.load_block(file, local)?,
        };
        let at = local - block.start;
        self.cursor.fill(row, block.values.iter().map(|column| column[at]));
        self.block = Some(block);
        Ok(())
    }

    fn row(&self) -> &RowView {
        &self.cursor
    }
}

// ---------------------------------------------------------------------------
// SourceResolver – turns a location template into a source
// ---------------------------------------------------------------------------

/// Resolves a location for the samples of a run.  `Ok(None)` means no table
/// exists there for at least one sample.
pub trait SourceResolver {
    fn resolve(
        &self,
        template: &LocationTemplate,
        samples: &[String],
        detector: Option<&str>,
    ) -> BlindResult<Option<Box<dyn TabularSource>>>;
}

/// Filesystem layout: the files half globs sample container directories, the
/// table half is a path inside each container, completed with a table file
/// extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsResolver;

impl SourceResolver for FsResolver {
    fn resolve(
        &self,
        template: &LocationTemplate,
        samples: &[String],
        detector: Option<&str>,
    ) -> BlindResult<Option<Box<dyn TabularSource>>> {
        let table = template.table_for(detector);
        let mut files = Vec::new();

        for sample in samples {
            let pattern = template.files_for(sample);
            let mut containers: Vec<PathBuf> =
                glob::glob(&pattern)?.filter_map(Result::ok).collect();
            containers.sort();

            let found: Vec<PathBuf> = containers
                .iter()
                .filter_map(|c| find_table(c, &table))
                .collect();
            if found.is_empty() {
                debug!("no table {table} under {pattern}");
                return Ok(None);
            }
            files.extend(found);
        }

        if files.is_empty() {
            return Ok(None);
        }

        let chain = FileChain::open(template.describe(samples, detector), files)?;
        Ok(Some(Box::new(chain)))
    }
}

fn find_table(container: &Path, table: &str) -> Option<PathBuf> {
    TABLE_EXTENSIONS
        .iter()
        .map(|ext| container.join(format!("{table}.{ext}")))
        .find(|path| path.is_file())
}

/// In-memory tables keyed by fully substituted `files:table` location.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    tables: BTreeMap<String, ColumnarTable>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, table: ColumnarTable) {
        self.tables.insert(location.into(), table);
    }

    pub fn with(mut self, location: impl Into<String>, table: ColumnarTable) -> Self {
        self.insert(location, table);
        self
    }

    /// Take over every table of `other`, replacing equal locations.
    pub fn merge(&mut self, other: MemoryResolver) {
        self.tables.extend(other.tables);
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(
        &self,
        template: &LocationTemplate,
        samples: &[String],
        detector: Option<&str>,
    ) -> BlindResult<Option<Box<dyn TabularSource>>> {
        let table = template.table_for(detector);
        let mut parts = Vec::with_capacity(samples.len());
        for sample in samples {
            let key = format!("{}:{table}", template.files_for(sample));
            match self.tables.get(&key) {
                Some(part) => parts.push(part.clone()),
                None => return Ok(None),
            }
        }

        let mut parts = parts.into_iter();
        let Some(first) = parts.next() else {
            return Ok(None);
        };
        let mut chained = first.chain(parts.collect())?;
        chained.name = template.describe(samples, detector);
        Ok(Some(Box::new(chained)))
    }
}
