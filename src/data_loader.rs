//! Parquet loading with bounded memory.
//!
//! [`ChunkedParquetReader`] yields a file as consecutive row slices of at
//! most `chunk_size` rows, so peak resident rows per slice is bounded
//! regardless of file size. Row order within a slice follows the file.

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{PipelineError, PipelineResult};

/// Reject paths that do not exist or are not parquet files.
fn check_parquet_path(path: &Path) -> PipelineResult<()> {
    if !path.exists() {
        return Err(PipelineError::file_not_found(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "parquet" {
        return Err(PipelineError::validation(format!(
            "Unsupported file format: {}",
            extension
        )));
    }
    Ok(())
}

/// Row count from the parquet footer, without reading row groups.
pub fn count_rows<P: AsRef<Path>>(path: P) -> PipelineResult<usize> {
    let path = path.as_ref();
    check_parquet_path(path)?;

    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("Failed to open {}: {}", path.display(), e)))?;
    ParquetReader::new(file)
        .num_rows()
        .map_err(|e| PipelineError::PolarsError(format!("Failed to read metadata: {}", e)))
}

/// Read a whole parquet file.
pub fn load_parquet<P: AsRef<Path>>(path: P) -> PipelineResult<DataFrame> {
    let path = path.as_ref();
    check_parquet_path(path)?;

    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("Failed to open {}: {}", path.display(), e)))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| PipelineError::PolarsError(format!("Failed to read Parquet: {}", e)))
}

/// Lazy scan over a parquet file.
pub fn scan_parquet<P: AsRef<Path>>(path: P) -> PipelineResult<LazyFrame> {
    let path = path.as_ref();
    check_parquet_path(path)?;

    LazyFrame::scan_parquet(path, ScanArgsParquet::default())
        .map_err(|e| PipelineError::PolarsError(format!("Failed to scan Parquet: {}", e)))
}

/// Iterator over fixed-size row slices of a parquet file.
pub struct ChunkedParquetReader {
    path: PathBuf,
    scan: LazyFrame,
    total_rows: usize,
    chunk_size: usize,
    offset: usize,
}

impl ChunkedParquetReader {
    /// Open a file for slice-wise reading.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> PipelineResult<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::invalid_param("chunk_size", "must be positive"));
        }
        let path = path.as_ref().to_path_buf();
        let total_rows = count_rows(&path)?;
        let scan = scan_parquet(&path)?;

        Ok(Self {
            path,
            scan,
            total_rows,
            chunk_size,
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of slices the file will be read in.
    pub fn chunk_count(&self) -> usize {
        self.total_rows.div_ceil(self.chunk_size)
    }

    /// Row offset of the next slice.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for ChunkedParquetReader {
    type Item = PipelineResult<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.total_rows {
            return None;
        }

        let len = self.chunk_size.min(self.total_rows - self.offset);
        let slice = self
            .scan
            .clone()
            .slice(self.offset as i64, len as IdxSize)
            .collect()
            .map_err(|e| {
                PipelineError::PolarsError(format!(
                    "Failed to read rows {}..{} of {}: {}",
                    self.offset,
                    self.offset + len,
                    self.path.display(),
                    e
                ))
            });
        self.offset += len;
        Some(slice)
    }
}
