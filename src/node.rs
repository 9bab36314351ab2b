//! Node decoding for the on-disk forest format.
//!
//! Every node is `header + 4 * dims` bytes. The first four bytes hold the
//! descendant count, and that single integer decides what the rest of the
//! node means:
//!
//! - `1` - an item leaf; the vector region holds the item's vector and the
//!   item id is the node's offset divided by the node size
//! - `2 ..= dims + 2` - a bucket leaf; that many packed `i32` item ids start
//!   at the child-array offset
//! - `> dims + 2` - a split node; two `i32` child node indices at the
//!   child-array offset, the hyperplane normal in the vector region, and a
//!   bias scalar at byte 4 for Euclidean
//!
//! The decode lives here as a tagged [`NodeKind`] so the search loop never
//! reimplements the three-way test.

use crate::block::BlockReader;
use crate::distance::DistanceMetric;

/// Semantic type of a node, derived from its descendant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf holding a single indexed item's vector.
    Item,
    /// Leaf holding a packed list of item ids.
    Bucket {
        /// Number of packed ids (at most `dims + 2`).
        count: usize,
    },
    /// Internal node holding a split hyperplane and two children.
    Split,
}

/// Field accessors for nodes at byte offsets inside a [`BlockReader`].
///
/// Carries the layout constants so call sites pass only offsets. Copyable;
/// a query borrows the codec together with the view.
#[derive(Debug, Clone, Copy)]
pub struct NodeCodec {
    metric: DistanceMetric,
    node_size: u64,
    header: u64,
    child_offset: u64,
    /// Largest descendant count still stored as a bucket leaf: `dims + 2`.
    min_leaf: i32,
}

impl NodeCodec {
    pub fn new(metric: DistanceMetric, dimensions: usize) -> Self {
        Self {
            metric,
            node_size: metric.node_size(dimensions),
            header: metric.header_size(),
            child_offset: metric.child_offset(),
            min_leaf: dimensions as i32 + 2,
        }
    }

    /// Node size in bytes: `header + 4 * dims`.
    #[inline]
    pub fn node_size(&self) -> u64 {
        self.node_size
    }

    /// Byte offset of item `item`'s node (item id `i` lives at node `i`).
    #[inline]
    pub fn item_offset(&self, item: usize) -> u64 {
        item as u64 * self.node_size
    }

    /// Raw descendant count of the node at `offset`.
    #[inline]
    pub fn descendants(&self, view: &BlockReader, offset: u64) -> i32 {
        view.read_i32(offset)
    }

    /// Decode the node's semantic type.
    ///
    /// Non-positive descendant counts decode as an empty bucket, which the
    /// search loop skips; the backward root scan never descends into
    /// corrupt regions on a well-formed file.
    #[inline]
    pub fn kind(&self, view: &BlockReader, offset: u64) -> NodeKind {
        let n = self.descendants(view, offset);
        if n == 1 {
            NodeKind::Item
        } else if n <= self.min_leaf {
            NodeKind::Bucket {
                count: n.max(0) as usize,
            }
        } else {
            NodeKind::Split
        }
    }

    /// Split-plane bias, meaningful only under the Euclidean layout.
    #[inline]
    pub fn bias(&self, view: &BlockReader, offset: u64) -> f32 {
        debug_assert_eq!(self.metric, DistanceMetric::Euclidean);
        view.read_f32(offset + 4)
    }

    /// Read the node's vector region (split normal or item vector).
    #[inline]
    pub fn vector_into(&self, view: &BlockReader, offset: u64, out: &mut [f32]) {
        view.read_vector_into(offset + self.header, out);
    }

    /// Byte offset of child `which` (0 or 1) of a split node.
    ///
    /// The file stores a node *index*; the index is interpreted unsigned and
    /// scaled by the node size. Index 0 (the first node in the file) is a
    /// valid child.
    #[inline]
    pub fn child(&self, view: &BlockReader, offset: u64, which: usize) -> u64 {
        debug_assert!(which < 2);
        let index = view.read_i32(offset + self.child_offset + 4 * which as u64);
        index as u32 as u64 * self.node_size
    }

    /// The `i`-th packed item id of a bucket leaf.
    #[inline]
    pub fn bucket_item(&self, view: &BlockReader, offset: u64, i: usize) -> usize {
        view.read_i32(offset + self.child_offset + 4 * i as u64) as u32 as usize
    }
}
