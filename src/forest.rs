// Copyright (c) 2025 Canopy Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Loading and querying a forest of random-projection trees.
//!
//! An index file is a packed array of fixed-size nodes. The trees' roots sit
//! at the very end of the file as a contiguous run of nodes that all carry
//! the same descendant count; [`ForestIndex::open`] finds them by scanning
//! backward node-by-node until the count changes.
//!
//! A query runs best-first over *all* trees at once: a single max-heap keyed
//! by split-plane margin holds the frontier, seeded with every root at a
//! sentinel priority that dominates any real margin. Each pop either yields
//! candidate items (leaves) or pushes the two children of a split node: the
//! child on the query's side of the hyperplane at `+margin`, the far child
//! at `-margin`, so the far half-spaces are revisited in order of how close
//! the query sits to their boundaries. Collection stops once `k` candidates
//! per tree have been gathered, then the candidate set is re-ranked under
//! the true metric and the top `k` item ids are returned.
//!
//! # Concurrency
//!
//! A [`ForestIndex`] is immutable after `open`: the mappings, root list, and
//! metadata are never written again. `nearest` keeps its heap, candidate
//! set, and scratch vectors on the call stack, so any number of threads may
//! query one index through `&self` with no locking. `close` takes
//! `&mut self`, which lets the borrow checker enforce that it happens after
//! outstanding queries.
//!
//! # Examples
//!
//! ```rust,no_run
//! use canopy::{DistanceMetric, ForestConfig, ForestIndex};
//!
//! fn main() -> canopy::Result<()> {
//!     let config = ForestConfig {
//!         dimensions: 8,
//!         metric: DistanceMetric::Angular,
//!         ..Default::default()
//!     };
//!     let index = ForestIndex::open("points.annoy", config)?;
//!
//!     let query = index.item_vector(42)?;
//!     for item in index.nearest(&query, 10)? {
//!         println!("{}", item);
//!     }
//!     Ok(())
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fs::File;
use std::path::Path;

use crate::block::BlockReader;
use crate::distance::{self, DistanceMetric};
use crate::error::{CanopyError, Result};
use crate::node::{NodeCodec, NodeKind};

/// Priority given to tree roots; dominates every real split margin.
const ROOT_PRIORITY: f32 = 1e30;

/// Largest byte span mapped as one block by default (files up to 2 GB get a
/// single mapping).
const MAX_BLOCK_BYTES: u64 = i32::MAX as u64;

/// Configuration for opening an index.
///
/// The dimension and metric are not recorded in the file; they must match
/// what the builder was run with or `open` rejects the file (or, for a
/// coincidentally divisible size, queries return garbage).
#[derive(Debug, Clone)]
pub struct ForestConfig {
    /// Vector dimensionality the index was built with.
    pub dimensions: usize,
    /// Distance metric the index was built with.
    pub metric: DistanceMetric,
    /// Nodes per mapped block. 0 sizes blocks to the 2 GB default; tests
    /// set small values to exercise the multi-block read path.
    pub block_nodes: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            metric: DistanceMetric::Angular,
            block_nodes: 0,
        }
    }
}

/// Everything that lives from `open` to `close`.
#[derive(Debug)]
struct IndexState {
    view: BlockReader,
    codec: NodeCodec,
    metric: DistanceMetric,
    dimensions: usize,
    node_size: u64,
    node_count: usize,
    /// Root offsets in reverse-discovery order (back of file first).
    roots: Vec<u64>,
    /// Keeps the descriptor alive for the engine's lifetime.
    _file: File,
}

/// Read-only query engine over an on-disk forest.
///
/// Opened from a file produced by the Annoy builder; answers
/// k-nearest-neighbor queries until [`close`](Self::close) drops the
/// mappings. See the [module docs](self) for the search algorithm.
#[derive(Debug)]
pub struct ForestIndex {
    state: Option<IndexState>,
}

/// Heap entry for the best-first traversal.
///
/// `BinaryHeap` is a max-heap, so ordering by `priority` pops the most
/// promising frontier node first. NaN priorities compare as equal; they
/// cannot arise from well-formed files (zero-norm split planes are never
/// written by the builder) but must not poison the ordering.
#[derive(Debug, Clone, Copy)]
struct SearchCandidate {
    priority: f32,
    node: u64,
}

impl PartialEq for SearchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.node == other.node
    }
}

impl Eq for SearchCandidate {}

impl PartialOrd for SearchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.partial_cmp(&other.priority) {
            Some(ord) => ord,
            None => Ordering::Equal, // Handle NaN
        }
    }
}

impl ForestIndex {
    /// Open and map an index file.
    ///
    /// Maps the file read-only (in several blocks when it exceeds the block
    /// size), then locates the tree roots by scanning backward from the end
    /// of the file: the roots are the longest trailing run of nodes sharing
    /// one descendant count.
    ///
    /// # Errors
    ///
    /// * `CanopyError::InvalidIndex` - empty file, or file size not a
    ///   multiple of the node size implied by `config` (wrong dimension or
    ///   metric)
    /// * `CanopyError::Io` - the file cannot be opened or mapped
    pub fn open<P: AsRef<Path>>(path: P, config: ForestConfig) -> Result<Self> {
        let codec = NodeCodec::new(config.metric, config.dimensions);
        let node_size = codec.node_size();

        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size == 0 {
            return Err(CanopyError::InvalidIndex("index is a 0-byte file".into()));
        }
        if file_size % node_size != 0 {
            return Err(CanopyError::InvalidIndex(format!(
                "file size {} is not a multiple of the {}-byte node size; wrong dimension or metric?",
                file_size, node_size
            )));
        }

        let block_nodes = match config.block_nodes {
            0 => (MAX_BLOCK_BYTES / node_size).max(1),
            n => n as u64,
        };
        let view = BlockReader::map(&file, block_nodes * node_size)?;

        let node_count = (file_size / node_size) as usize;
        let mut roots = Vec::new();
        let mut shared = None;
        for node in (0..node_count).rev() {
            let offset = node as u64 * node_size;
            let descendants = view.read_i32(offset);
            match shared {
                Some(m) if descendants != m => break,
                _ => {
                    roots.push(offset);
                    shared = Some(descendants);
                }
            }
        }

        tracing::debug!(
            nodes = node_count,
            trees = roots.len(),
            blocks = view.block_count(),
            "loaded forest index"
        );

        Ok(Self {
            state: Some(IndexState {
                view,
                codec,
                metric: config.metric,
                dimensions: config.dimensions,
                node_size,
                node_count,
                roots,
                _file: file,
            }),
        })
    }

    #[inline]
    fn state(&self) -> Result<&IndexState> {
        self.state.as_ref().ok_or(CanopyError::Closed)
    }

    /// Vector dimensionality the index was opened with.
    pub fn dimensions(&self) -> Result<usize> {
        Ok(self.state()?.dimensions)
    }

    /// Metric the index was opened with.
    pub fn metric(&self) -> Result<DistanceMetric> {
        Ok(self.state()?.metric)
    }

    /// Node size in bytes.
    pub fn node_size(&self) -> Result<u64> {
        Ok(self.state()?.node_size)
    }

    /// Total number of nodes in the file. The first `N` of them are items,
    /// but `N` itself is not recorded in the format.
    pub fn node_count(&self) -> Result<usize> {
        Ok(self.state()?.node_count)
    }

    /// Number of trees in the forest.
    pub fn tree_count(&self) -> Result<usize> {
        Ok(self.state()?.roots.len())
    }

    /// The stored vector of item `item`.
    ///
    /// # Errors
    ///
    /// * `CanopyError::OutOfRange` - `item` is at or past the node count
    ///   (the format does not record the item count, so the node count is
    ///   the tightest available bound)
    /// * `CanopyError::Closed` - the index has been closed
    pub fn item_vector(&self, item: usize) -> Result<Vec<f32>> {
        let state = self.state()?;
        if item >= state.node_count {
            return Err(CanopyError::OutOfRange {
                item,
                count: state.node_count,
            });
        }
        let mut v = vec![0.0f32; state.dimensions];
        state
            .codec
            .vector_into(&state.view, state.codec.item_offset(item), &mut v);
        Ok(v)
    }

    /// Find the `k` nearest items to `query`, nearest first.
    ///
    /// Runs the shared-heap best-first traversal described in the
    /// [module docs](self), then re-ranks the collected candidates under
    /// the exact metric. Items whose stored vector is the all-zero sentinel
    /// never appear. Returns fewer than `k` ids when the forest holds fewer
    /// candidates; an empty forest yields an empty list.
    ///
    /// # Errors
    ///
    /// * `CanopyError::DimensionMismatch` - `query.len()` differs from the
    ///   configured dimension
    /// * `CanopyError::Closed` - the index has been closed
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<usize>> {
        let state = self.state()?;
        if query.len() != state.dimensions {
            return Err(CanopyError::DimensionMismatch {
                expected: state.dimensions,
                got: query.len(),
            });
        }
        if state.roots.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let codec = &state.codec;
        let view = &state.view;

        let mut heap = BinaryHeap::with_capacity(state.roots.len() * 2);
        for &root in &state.roots {
            heap.push(SearchCandidate {
                priority: ROOT_PRIORITY,
                node: root,
            });
        }

        let mut candidates: HashSet<usize> = HashSet::new();
        let mut vector = vec![0.0f32; state.dimensions];
        let mut item_vec = vec![0.0f32; state.dimensions];
        let budget = state.roots.len().saturating_mul(k);

        while candidates.len() < budget {
            let Some(SearchCandidate { node, .. }) = heap.pop() else {
                break;
            };
            match codec.kind(view, node) {
                NodeKind::Item => {
                    // Single-descendant node reached through a tree rather
                    // than as an item slot; treated as an item leaf.
                    tracing::debug!(offset = node, "single-descendant node visited as leaf");
                    codec.vector_into(view, node, &mut vector);
                    if !distance::is_zero_vector(&vector) {
                        candidates.insert((node / state.node_size) as usize);
                    }
                }
                NodeKind::Bucket { count } => {
                    for i in 0..count {
                        let item = codec.bucket_item(view, node, i);
                        codec.vector_into(view, codec.item_offset(item), &mut item_vec);
                        if !distance::is_zero_vector(&item_vec) {
                            candidates.insert(item);
                        }
                    }
                }
                NodeKind::Split => {
                    codec.vector_into(view, node, &mut vector);
                    let bias = match state.metric {
                        DistanceMetric::Euclidean => codec.bias(view, node),
                        _ => 0.0,
                    };
                    let margin = state.metric.margin(&vector, query, bias);
                    // The query's own half-space (positive margin = child 1)
                    // is explored first; the far side waits in heap order.
                    heap.push(SearchCandidate {
                        priority: -margin,
                        node: codec.child(view, node, 0),
                    });
                    heap.push(SearchCandidate {
                        priority: margin,
                        node: codec.child(view, node, 1),
                    });
                }
            }
        }

        // Exact re-rank under the true metric.
        let mut scored: Vec<(f32, usize)> = Vec::with_capacity(candidates.len());
        for item in candidates {
            codec.vector_into(view, codec.item_offset(item), &mut item_vec);
            if distance::is_zero_vector(&item_vec) {
                continue;
            }
            scored.push((state.metric.score(&item_vec, query), item));
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, item)| item).collect())
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }

    /// Release the mappings and file handle. Idempotent; queries after
    /// close fail with `CanopyError::Closed`.
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!("closed forest index");
        }
    }
}
