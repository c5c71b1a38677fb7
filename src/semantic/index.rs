//! Approximate nearest-neighbour index over vacancy embeddings.
//!
//! Rows are L2-normalised on build and inserted into an HNSW graph under
//! Euclidean distance, which ranks unit vectors exactly as cosine does. An
//! all-zero row stays at distance 1 from every unit query. Graph point ids
//! are row positions, mapped back to vacancy ids on search.

use std::io::IsTerminal;

use hnsw_rs::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::config::IndexConfig;
use crate::semantic::shards::ShardSet;
use crate::vacancies::VacancyId;

/// Guards the division for all-zero rows.
const NORM_EPSILON: f32 = 1e-12;

const INSERT_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector index is not ready: {0}")]
    IndexNotReady(String),

    #[error("query vector has zero norm")]
    InvalidQuery,

    #[error("dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("no vectors to index")]
    Empty,
}

/// A built, immutable index. Shared across queries behind an `Arc`.
pub struct VectorIndex {
    graph: Hnsw<'static, f32, DistL2>,
    ids: Vec<VacancyId>,
    dimension: usize,
    ef_search: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.ids.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl VectorIndex {
    pub fn build(shards: ShardSet, params: &IndexConfig) -> Result<Self, IndexError> {
        let ShardSet {
            dimension,
            mut vectors,
            ids,
            ..
        } = shards;

        if ids.is_empty() || dimension == 0 {
            return Err(IndexError::Empty);
        }
        if vectors.len() != ids.len() * dimension {
            return Err(IndexError::DimensionMismatch {
                expected: ids.len() * dimension,
                got: vectors.len(),
            });
        }

        vectors
            .par_chunks_mut(dimension)
            .for_each(normalize_in_place);

        let graph = Hnsw::<f32, DistL2>::new(
            params.max_nb_connection,
            ids.len(),
            params.max_layer,
            params.ef_construction,
            DistL2 {},
        );

        let progress = build_progress(ids.len() as u64);
        let rows: Vec<(&[f32], usize)> = vectors.chunks(dimension).zip(0..).collect();
        for chunk in rows.chunks(INSERT_CHUNK) {
            graph.parallel_insert_slice(&chunk.to_vec());
            progress.inc(chunk.len() as u64);
        }
        progress.finish_and_clear();

        log::info!(
            "built HNSW index: {} vectors, dim={}, M={}, ef_construction={}",
            ids.len(),
            dimension,
            params.max_nb_connection,
            params.ef_construction
        );

        Ok(Self {
            graph,
            ids,
            dimension,
            ef_search: params.ef_search,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns up to `k` vacancy ids, most similar first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VacancyId>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let norm = l2_norm(query);
        if norm == 0.0 || !norm.is_finite() {
            return Err(IndexError::InvalidQuery);
        }

        let k = k.min(self.ids.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let normalized: Vec<f32> = query.iter().map(|v| v / norm).collect();
        let ef = self.ef_search.max(k);
        let neighbours = self.graph.search(&normalized, k, ef);

        Ok(map_positions(
            &self.ids,
            neighbours.into_iter().map(|n| n.d_id),
        ))
    }
}

/// Maps graph positions to vacancy ids, dropping positions outside `ids`.
fn map_positions(
    ids: &[VacancyId],
    positions: impl IntoIterator<Item = usize>,
) -> Vec<VacancyId> {
    positions
        .into_iter()
        .filter_map(|pos| ids.get(pos).copied())
        .collect()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn normalize_in_place(row: &mut [f32]) {
    let denom = l2_norm(row) + NORM_EPSILON;
    row.iter_mut().for_each(|v| *v /= denom);
}

fn build_progress(len: u64) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "indexing {bar:40.cyan/blue} {pos}/{len} vectors ({eta})",
    ) {
        bar.set_style(style);
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_set(rows: &[(VacancyId, Vec<f32>)]) -> ShardSet {
        let dimension = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        ShardSet {
            dimension,
            vectors: rows.iter().flat_map(|(_, v)| v.clone()).collect(),
            ids: rows.iter().map(|(id, _)| *id).collect(),
            loaded_batches: 1,
            skipped_batches: 0,
        }
    }

    fn axis(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.01; dim];
        v[hot] = 1.0;
        v
    }

    fn sample_index() -> VectorIndex {
        let rows: Vec<(VacancyId, Vec<f32>)> =
            (0..6).map(|i| (100 + i as VacancyId, axis(6, i))).collect();
        VectorIndex::build(shard_set(&rows), &IndexConfig::default()).unwrap()
    }

    #[test]
    fn test_build_empty_fails() {
        let result = VectorIndex::build(ShardSet::default(), &IndexConfig::default());
        assert!(matches!(result, Err(IndexError::Empty)));
    }

    #[test]
    fn test_search_returns_external_ids() {
        let index = sample_index();
        assert_eq!(index.len(), 6);
        assert_eq!(index.dimension(), 6);

        let hits = index.search(&axis(6, 3), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], 103);
    }

    #[test]
    fn test_search_caps_k_at_len() {
        let index = sample_index();
        let hits = index.search(&axis(6, 0), 50).unwrap();
        assert_eq!(hits.len(), 6);
        assert_eq!(hits[0], 100);
    }

    #[test]
    fn test_scaled_query_gives_same_ranking() {
        let index = sample_index();
        let query = vec![0.9, 0.3, 0.1, 0.05, 0.0, 0.2];
        let scaled: Vec<f32> = query.iter().map(|v| v * 17.5).collect();

        assert_eq!(
            index.search(&query, 4).unwrap(),
            index.search(&scaled, 4).unwrap()
        );
    }

    #[test]
    fn test_zero_query_is_rejected() {
        let index = sample_index();
        let result = index.search(&[0.0; 6], 3);
        assert!(matches!(result, Err(IndexError::InvalidQuery)));
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let index = sample_index();
        let result = index.search(&[1.0; 4], 3);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 6,
                got: 4
            })
        ));
    }

    #[test]
    fn test_map_positions_drops_out_of_range() {
        let ids = vec![7, 8, 9];
        assert_eq!(map_positions(&ids, [2, 5, 0, 3]), vec![9, 7]);
    }

    #[test]
    fn test_normalize_in_place() {
        let mut row = vec![3.0, 4.0];
        normalize_in_place(&mut row);
        assert!((row[0] - 0.6).abs() < 1e-6);
        assert!((row[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_row_does_not_outrank_matches() {
        let rows = vec![
            (1, vec![1.0, 0.0, 0.0, 0.0]),
            (2, vec![0.7, 0.7, 0.0, 0.0]),
            (3, vec![0.0, 0.0, 1.0, 0.0]),
            (4, vec![0.0, 0.0, 0.0, 0.0]),
        ];
        let index = VectorIndex::build(shard_set(&rows), &IndexConfig::default()).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(hits, vec![1, 2, 4, 3]);
    }
}
