//! Serving handle for the vacancy vector index.
//!
//! The built index lives behind an `ArcSwap`. Queries take a snapshot
//! (`Arc<VectorIndex>`) and keep it for the whole request; a rebuild builds a
//! new index off to the side and swaps it in, so a reader never sees a
//! half-built graph.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::shards::{load_shards, ShardLoadError};

#[derive(Debug, thiserror::Error)]
pub enum IndexBuildError {
    #[error(transparent)]
    Shards(#[from] ShardLoadError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub enum IndexStatus {
    Pending,
    Ready {
        index: Arc<VectorIndex>,
        loaded_batches: usize,
        skipped_batches: usize,
    },
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub ready: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub vacancies_count: usize,
    pub dimension: Option<usize>,
    pub loaded_batches: usize,
    pub skipped_batches: usize,
    pub shards_dir: PathBuf,
}

pub struct IndexService {
    shards_dir: PathBuf,
    params: IndexConfig,
    status: ArcSwap<IndexStatus>,
    /// Serialises rebuilds; readers never take it.
    rebuild_lock: Mutex<()>,
}

impl IndexService {
    pub fn new(shards_dir: PathBuf, params: IndexConfig) -> Self {
        Self {
            shards_dir,
            params,
            status: ArcSwap::from_pointee(IndexStatus::Pending),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Startup build. A failure is recorded as `Unavailable` and logged;
    /// match requests then fail fast until a rebuild succeeds.
    pub fn build_at_startup(&self) -> IndexStats {
        if let Err(err) = self.rebuild() {
            log::error!("vector index unavailable: {err}");
        }
        self.stats()
    }

    /// Loads the shards again and swaps in a fresh index. On failure the
    /// previously served index stays in place.
    pub fn rebuild(&self) -> Result<IndexStats, IndexBuildError> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let started = Instant::now();
        match self.build_index() {
            Ok(status) => {
                self.status.store(Arc::new(status));
                log::info!("vector index ready in {:.2?}", started.elapsed());
                Ok(self.stats())
            }
            Err(err) => {
                if matches!(**self.status.load(), IndexStatus::Ready { .. }) {
                    log::warn!("index rebuild failed, keeping current index: {err}");
                } else {
                    self.status
                        .store(Arc::new(IndexStatus::Unavailable(err.to_string())));
                }
                Err(err)
            }
        }
    }

    fn build_index(&self) -> Result<IndexStatus, IndexBuildError> {
        let shards = load_shards(&self.shards_dir)?;
        let loaded_batches = shards.loaded_batches;
        let skipped_batches = shards.skipped_batches;
        let index = VectorIndex::build(shards, &self.params)?;

        Ok(IndexStatus::Ready {
            index: Arc::new(index),
            loaded_batches,
            skipped_batches,
        })
    }

    /// The index to serve one request from.
    pub fn snapshot(&self) -> Result<Arc<VectorIndex>, IndexError> {
        match &**self.status.load() {
            IndexStatus::Ready { index, .. } => Ok(Arc::clone(index)),
            IndexStatus::Pending => Err(IndexError::IndexNotReady("still building".into())),
            IndexStatus::Unavailable(reason) => Err(IndexError::IndexNotReady(reason.clone())),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let status = self.status.load_full();
        let mut stats = IndexStats {
            ready: false,
            status: String::new(),
            error: None,
            vacancies_count: 0,
            dimension: None,
            loaded_batches: 0,
            skipped_batches: 0,
            shards_dir: self.shards_dir.clone(),
        };

        match &*status {
            IndexStatus::Pending => stats.status = "pending".into(),
            IndexStatus::Ready {
                index,
                loaded_batches,
                skipped_batches,
            } => {
                stats.ready = true;
                stats.status = "ready".into();
                stats.vacancies_count = index.len();
                stats.dimension = Some(index.dimension());
                stats.loaded_batches = *loaded_batches;
                stats.skipped_batches = *skipped_batches;
            }
            IndexStatus::Unavailable(reason) => {
                stats.status = "unavailable".into();
                stats.error = Some(reason.clone());
            }
        }

        stats
    }
}
