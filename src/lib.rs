// Copyright (c) 2025 Canopy Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! # Canopy
//!
//! A read-only query engine for Annoy index files, written in Rust.
//!
//! Canopy memory-maps the forest of random-projection binary trees that the
//! Annoy builder writes to disk and answers k-nearest-neighbor queries over
//! it. It is wire-compatible with the C++ builder's little-endian format:
//! point Canopy at an `.annoy` file, tell it the dimension and metric the
//! file was built with, and query.
//!
//! ## Features
//!
//! - **Zero-copy reads** - the index is memory-mapped; queries touch only
//!   the pages they visit
//! - **Files beyond 2 GB** - large files are stitched from multiple
//!   mappings behind one 64-bit address space
//! - **Three metrics** - [`DistanceMetric::Angular`],
//!   [`DistanceMetric::Euclidean`], and [`DistanceMetric::Dot`], each with
//!   its own node layout and kernels
//! - **Lock-free queries** - a [`ForestIndex`] is immutable after open;
//!   any number of threads may call [`nearest`](ForestIndex::nearest)
//!   concurrently through `&self`
//!
//! ## Architecture
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`block::BlockReader`] | One logical address space over 1..n mappings |
//! | [`node::NodeCodec`] | Decodes nodes (item leaf / bucket leaf / split) |
//! | [`distance`] | Layout constants, split margins, final scores |
//! | [`ForestIndex`] | Loader, best-first forest search, query API |
//!
//! A query seeds one max-heap with every tree root, descends best-first by
//! split-plane margin, collects candidate items from the leaves, then
//! re-ranks the candidates under the exact metric and returns the top k.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use canopy::{DistanceMetric, ForestConfig, ForestIndex};
//!
//! fn main() -> canopy::Result<()> {
//!     let config = ForestConfig {
//!         dimensions: 40,
//!         metric: DistanceMetric::Angular,
//!         ..Default::default()
//!     };
//!     let index = ForestIndex::open("tree.annoy", config)?;
//!
//!     // Query with an indexed item's own vector
//!     let query = index.item_vector(123)?;
//!     let neighbors = index.nearest(&query, 10)?;
//!     for item in neighbors {
//!         println!("{}", item);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## What Canopy is not
//!
//! Canopy never builds or mutates an index. There is no insert, no delete,
//! no rebalancing; files come from the Annoy builder and are treated as
//! immutable. Items the builder marked deleted (all-zero vectors) are
//! filtered out of every result.

pub mod block;
pub mod distance;
pub mod error;
pub mod forest;
pub mod node;

// Re-export the public surface
pub use distance::DistanceMetric;
pub use error::{CanopyError, Result};
pub use forest::{ForestConfig, ForestIndex};
