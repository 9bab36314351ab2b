//! Test-support writer producing wire-compatible index files.
//!
//! Lays a file out the way the builder does: item nodes first (node `i` is
//! item `i`), tree-internal nodes next, and every tree root in one
//! contiguous run at the very end of the file. All integers and floats are
//! little-endian, and every node is exactly `header + 4 * dims` bytes.

// each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use canopy::distance;
use canopy::DistanceMetric;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct IndexWriter {
    metric: DistanceMetric,
    dims: usize,
    items: Vec<Vec<f32>>,
    /// Encoded non-root nodes; the first `items.len()` are the item slots.
    nodes: Vec<Vec<u8>>,
    /// Encoded tree roots, appended after every other node.
    roots: Vec<Vec<u8>>,
}

impl IndexWriter {
    pub fn new(metric: DistanceMetric, dims: usize, items: &[Vec<f32>]) -> Self {
        let nodes = items
            .iter()
            .map(|v| encode_item(metric, dims, v))
            .collect();
        Self {
            metric,
            dims,
            items: items.to_vec(),
            nodes,
            roots: Vec::new(),
        }
    }

    /// Build one tree over every item. Each call adds one root; all roots
    /// share the same descendant count (the item count), which is what the
    /// loader's backward scan keys on.
    pub fn add_tree(&mut self) {
        let ids: Vec<usize> = (0..self.items.len()).collect();
        let salt = self.roots.len();
        let encoded = self.encode_tree_node(&ids, salt);
        self.roots.push(encoded);
    }

    /// Recursive tree construction; children are allocated before their
    /// parent so the parent can reference their node indices.
    fn encode_tree_node(&mut self, ids: &[usize], salt: usize) -> Vec<u8> {
        if ids.len() <= self.dims + 2 {
            return encode_bucket(self.metric, self.dims, ids);
        }

        let (plane, bias) = self.choose_plane(ids, salt);
        let (side0, side1) = self.partition(ids, &plane, bias);

        let child0 = self.build_subtree(&side0, salt);
        let child1 = self.build_subtree(&side1, salt);
        encode_split(
            self.metric,
            self.dims,
            ids.len() as i32,
            child0,
            child1,
            &plane,
            bias,
        )
    }

    fn build_subtree(&mut self, ids: &[usize], salt: usize) -> usize {
        let encoded = self.encode_tree_node(ids, salt);
        self.nodes.push(encoded);
        self.nodes.len() - 1
    }

    /// Split plane through two of the set's points, salted per tree so the
    /// forest's trees differ. Euclidean planes carry the bias that centers
    /// the plane on the pair's midpoint.
    fn choose_plane(&self, ids: &[usize], salt: usize) -> (Vec<f32>, f32) {
        let a = ids[salt % ids.len()];
        let mut b = ids[(salt + ids.len() / 2 + 1) % ids.len()];
        if self.items[a] == self.items[b] {
            b = *ids
                .iter()
                .find(|&&id| self.items[id] != self.items[a])
                .unwrap_or(&b);
        }

        let plane: Vec<f32> = self.items[a]
            .iter()
            .zip(self.items[b].iter())
            .map(|(x, y)| x - y)
            .collect();

        let bias = match self.metric {
            DistanceMetric::Euclidean => {
                let mut dot = 0.0f64;
                for ((&x, &y), &p) in self.items[a]
                    .iter()
                    .zip(self.items[b].iter())
                    .zip(plane.iter())
                {
                    dot += ((x + y) as f64 / 2.0) * p as f64;
                }
                -(dot as f32)
            }
            _ => 0.0,
        };

        (plane, bias)
    }

    /// Items with positive margin go to child 1, the rest to child 0,
    /// matching the sign convention the searcher descends by. Degenerate
    /// one-sided splits fall back to an order split so both children stay
    /// non-empty.
    fn partition(&self, ids: &[usize], plane: &[f32], bias: f32) -> (Vec<usize>, Vec<usize>) {
        let mut side0 = Vec::new();
        let mut side1 = Vec::new();
        for &id in ids {
            let margin = self.metric.margin(plane, &self.items[id], bias);
            if margin > 0.0 {
                side1.push(id);
            } else {
                side0.push(id);
            }
        }

        if side0.is_empty() || side1.is_empty() {
            let mid = ids.len() / 2;
            return (ids[..mid].to_vec(), ids[mid..].to_vec());
        }
        (side0, side1)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        for node in self.nodes.iter().chain(self.roots.iter()) {
            file.write_all(node)?;
        }
        file.flush()
    }
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn encode_item(metric: DistanceMetric, dims: usize, vector: &[f32]) -> Vec<u8> {
    let mut node = vec![0u8; metric.node_size(dims) as usize];
    put_i32(&mut node, 0, 1);
    let base = metric.header_size() as usize;
    for (i, &v) in vector.iter().enumerate() {
        put_f32(&mut node, base + 4 * i, v);
    }
    node
}

fn encode_bucket(metric: DistanceMetric, dims: usize, ids: &[usize]) -> Vec<u8> {
    let mut node = vec![0u8; metric.node_size(dims) as usize];
    put_i32(&mut node, 0, ids.len() as i32);
    let base = metric.child_offset() as usize;
    for (i, &id) in ids.iter().enumerate() {
        put_i32(&mut node, base + 4 * i, id as i32);
    }
    node
}

fn encode_split(
    metric: DistanceMetric,
    dims: usize,
    count: i32,
    child0: usize,
    child1: usize,
    plane: &[f32],
    bias: f32,
) -> Vec<u8> {
    let mut node = vec![0u8; metric.node_size(dims) as usize];
    put_i32(&mut node, 0, count);
    if metric == DistanceMetric::Euclidean {
        put_f32(&mut node, 4, bias);
    }
    let base = metric.child_offset() as usize;
    put_i32(&mut node, base, child0 as i32);
    put_i32(&mut node, base + 4, child1 as i32);
    let header = metric.header_size() as usize;
    for (i, &v) in plane.iter().enumerate() {
        put_f32(&mut node, header + 4 * i, v);
    }
    node
}

/// Build an index file with `trees` trees over `items` and write it to
/// `path`.
pub fn write_index<P: AsRef<Path>>(
    path: P,
    metric: DistanceMetric,
    dims: usize,
    items: &[Vec<f32>],
    trees: usize,
) {
    let mut writer = IndexWriter::new(metric, dims, items);
    for _ in 0..trees {
        writer.add_tree();
    }
    writer.write_to(path).unwrap();
}

/// Deterministic pseudo-random items in `[-1, 1)`.
pub fn random_items(n: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// Exact k-nearest oracle: score every non-zero item under the final
/// metric, best first, ties by id.
pub fn brute_force_nearest(
    metric: DistanceMetric,
    items: &[Vec<f32>],
    query: &[f32],
    k: usize,
) -> Vec<usize> {
    let mut scored: Vec<(f32, usize)> = items
        .iter()
        .enumerate()
        .filter(|(_, v)| !distance::is_zero_vector(v))
        .map(|(i, v)| (metric.score(v, query), i))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, i)| i).collect()
}

/// Overlap between two result lists.
pub fn overlap(a: &[usize], b: &[usize]) -> usize {
    a.iter().filter(|x| b.contains(x)).count()
}
