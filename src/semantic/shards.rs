//! Embedding shard loading.
//!
//! A shard directory holds one file pair per batch:
//!
//! - `embeddings_batch_<N>.npy`: float32 (or float64) array, `(rows, dim)` or `(dim,)`
//! - `indices_batch_<N>.npy`: optional integer ids, any shape (flattened)
//!
//! Batches are merged in ascending numeric order of `<N>`. Each batch is
//! validated on its own and either loaded or skipped with a reason; a bad
//! batch never fails the whole load.

use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use ndarray_npy::read_npy;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::vacancies::VacancyId;

static BATCH_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^embeddings_batch_(\d+)\.npy$").expect("valid batch regex"));

#[derive(Debug, thiserror::Error)]
pub enum ShardLoadError {
    #[error("shard directory not found: {0}")]
    DirectoryMissing(PathBuf),

    #[error("failed to read shard directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("no loadable embedding batches in {dir} ({skipped} skipped)")]
    NoShards { dir: PathBuf, skipped: usize },
}

/// The files making up one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFiles {
    pub batch: u64,
    pub vectors: PathBuf,
    pub ids: Option<PathBuf>,
}

/// One validated batch: `vectors` is row-major with `ids.len()` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingShard {
    pub batch: u64,
    pub dimension: usize,
    pub vectors: Vec<f32>,
    pub ids: Vec<VacancyId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShardOutcome {
    Loaded(EmbeddingShard),
    Skipped { batch: u64, reason: String },
}

/// All loaded batches concatenated row-wise. Row `i` belongs to `ids[i]`.
#[derive(Debug, Clone, Default)]
pub struct ShardSet {
    pub dimension: usize,
    pub vectors: Vec<f32>,
    pub ids: Vec<VacancyId>,
    pub loaded_batches: usize,
    pub skipped_batches: usize,
}

impl ShardSet {
    pub fn rows(&self) -> usize {
        self.ids.len()
    }

    /// Appends a shard, refusing one whose dimension disagrees with what is
    /// already merged.
    fn push(&mut self, shard: EmbeddingShard) -> Result<(), String> {
        if self.loaded_batches > 0 && shard.dimension != self.dimension {
            return Err(format!(
                "dimension {} does not match {} of earlier batches",
                shard.dimension, self.dimension
            ));
        }
        self.dimension = shard.dimension;
        self.vectors.extend(shard.vectors);
        self.ids.extend(shard.ids);
        self.loaded_batches += 1;
        Ok(())
    }
}

/// Lists batch files sorted by their embedded batch number, not by name.
pub fn discover_batches(dir: &Path) -> Result<Vec<BatchFiles>, ShardLoadError> {
    if !dir.is_dir() {
        return Err(ShardLoadError::DirectoryMissing(dir.to_path_buf()));
    }

    let mut batches = vec![];
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(caps) = BATCH_FILE_RE.captures(name) else {
            continue;
        };

        let suffix = &caps[1];
        let Ok(batch) = suffix.parse::<u64>() else {
            log::warn!("skipping {name}: batch number out of range");
            continue;
        };

        let ids_path = dir.join(format!("indices_batch_{suffix}.npy"));
        batches.push(BatchFiles {
            batch,
            vectors: entry.path(),
            ids: ids_path.is_file().then_some(ids_path),
        });
    }

    batches.sort_by_key(|files| files.batch);
    Ok(batches)
}

/// Reads and validates one batch.
pub fn load_batch(files: &BatchFiles) -> ShardOutcome {
    let skip = |reason: String| ShardOutcome::Skipped {
        batch: files.batch,
        reason,
    };

    let vectors = match read_vectors(&files.vectors) {
        Ok(vectors) => vectors,
        Err(err) => return skip(format!("unreadable vectors: {err}")),
    };

    let ids = match &files.ids {
        Some(path) => match read_ids(path) {
            Ok(ids) => Some(ids),
            Err(err) => return skip(format!("unreadable ids: {err}")),
        },
        None => None,
    };

    normalize_shard(files.batch, vectors, ids)
}

/// Applies the loader's leniency policy to one batch:
///
/// - a 1-D vector array is a single row
/// - a scalar or multi-dimensional id array is flattened
/// - missing ids default to `0..rows`
/// - vectors and ids are truncated to the shorter of the two
pub fn normalize_shard(
    batch: u64,
    vectors: ArrayD<f32>,
    ids: Option<ArrayD<i64>>,
) -> ShardOutcome {
    let skip = |reason: String| ShardOutcome::Skipped { batch, reason };

    let (rows, dimension) = match vectors.shape() {
        [dim] => (1, *dim),
        [rows, dim] => (*rows, *dim),
        shape => return skip(format!("unsupported vector shape {shape:?}")),
    };
    if rows == 0 || dimension == 0 {
        return skip("empty batch".to_string());
    }

    let ids: Vec<VacancyId> = match ids {
        // iter() walks in logical order, which also covers 0-d arrays
        Some(ids) => ids.iter().copied().collect(),
        None => (0..rows as VacancyId).collect(),
    };

    let keep = rows.min(ids.len());
    if keep == 0 {
        return skip("id array is empty".to_string());
    }
    if keep != rows || keep != ids.len() {
        log::warn!(
            "batch {batch}: {rows} vectors vs {} ids, truncating to {keep}",
            ids.len()
        );
    }

    let mut flat: Vec<f32> = vectors.iter().copied().collect();
    flat.truncate(keep * dimension);

    let mut ids = ids;
    ids.truncate(keep);

    let (flat, ids) = drop_non_finite_rows(flat, ids, dimension);
    if ids.is_empty() {
        return skip("every row has NaN or infinite components".to_string());
    }
    if ids.len() < keep {
        log::warn!(
            "batch {batch}: dropped {} rows with NaN or infinite components",
            keep - ids.len()
        );
    }

    ShardOutcome::Loaded(EmbeddingShard {
        batch,
        dimension,
        vectors: flat,
        ids,
    })
}

fn drop_non_finite_rows(
    flat: Vec<f32>,
    ids: Vec<VacancyId>,
    dimension: usize,
) -> (Vec<f32>, Vec<VacancyId>) {
    if flat.iter().all(|v| v.is_finite()) {
        return (flat, ids);
    }

    let mut vectors = Vec::with_capacity(flat.len());
    let mut kept = Vec::with_capacity(ids.len());
    for (row, id) in flat.chunks(dimension).zip(ids) {
        if row.iter().all(|v| v.is_finite()) {
            vectors.extend_from_slice(row);
            kept.push(id);
        }
    }
    (vectors, kept)
}

fn read_vectors(path: &Path) -> Result<ArrayD<f32>, String> {
    match read_npy::<_, ArrayD<f32>>(path) {
        Ok(array) => Ok(array),
        Err(f32_err) => read_npy::<_, ArrayD<f64>>(path)
            .map(|array| array.mapv(|v| v as f32))
            .map_err(|_| f32_err.to_string()),
    }
}

fn read_ids(path: &Path) -> Result<ArrayD<i64>, String> {
    let first_err = match read_npy::<_, ArrayD<i64>>(path) {
        Ok(array) => return Ok(array),
        Err(err) => err.to_string(),
    };
    if let Ok(array) = read_npy::<_, ArrayD<i32>>(path) {
        return Ok(array.mapv(i64::from));
    }
    if let Ok(array) = read_npy::<_, ArrayD<u32>>(path) {
        return Ok(array.mapv(i64::from));
    }
    if let Ok(array) = read_npy::<_, ArrayD<u64>>(path) {
        if array.iter().any(|&v| v > i64::MAX as u64) {
            return Err("id exceeds i64 range".to_string());
        }
        return Ok(array.mapv(|v| v as i64));
    }
    Err(first_err)
}

/// Loads every batch in `dir` into one [`ShardSet`].
///
/// Batches are read in parallel but merged in batch order. Fails only when
/// nothing could be loaded.
pub fn load_shards(dir: &Path) -> Result<ShardSet, ShardLoadError> {
    let batches = discover_batches(dir)?;
    log::info!(
        "loading {} embedding batches from {}",
        batches.len(),
        dir.display()
    );

    let outcomes: Vec<ShardOutcome> = batches.par_iter().map(load_batch).collect();

    let mut set = ShardSet::default();
    for outcome in outcomes {
        match outcome {
            ShardOutcome::Loaded(shard) => {
                let batch = shard.batch;
                if let Err(reason) = set.push(shard) {
                    log::warn!("skipping batch {batch}: {reason}");
                    set.skipped_batches += 1;
                }
            }
            ShardOutcome::Skipped { batch, reason } => {
                log::warn!("skipping batch {batch}: {reason}");
                set.skipped_batches += 1;
            }
        }
    }

    if set.loaded_batches == 0 {
        return Err(ShardLoadError::NoShards {
            dir: dir.to_path_buf(),
            skipped: set.skipped_batches,
        });
    }

    log::info!(
        "loaded {} embeddings from {} batches ({} skipped), dim={}",
        set.rows(),
        set.loaded_batches,
        set.skipped_batches,
        set.dimension
    );

    Ok(set)
}
