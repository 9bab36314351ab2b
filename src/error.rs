//! Error types for Canopy index operations.
//!
//! This module provides:
//! - [`CanopyError`] - The main error enum
//! - [`Result<T>`] - A type alias for `std::result::Result<T, CanopyError>`

/// Result type alias for Canopy operations.
///
/// This is equivalent to `std::result::Result<T, CanopyError>`.
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Errors surfaced while loading or querying an index.
///
/// # Examples
///
/// ```rust,no_run
/// use canopy::{CanopyError, DistanceMetric, ForestConfig, ForestIndex};
///
/// fn example() -> canopy::Result<()> {
///     let config = ForestConfig {
///         dimensions: 8,
///         metric: DistanceMetric::Angular,
///         ..Default::default()
///     };
///     match ForestIndex::open("points.annoy", config) {
///         Err(CanopyError::InvalidIndex(reason)) => eprintln!("bad index: {}", reason),
///         Err(e) => return Err(e),
///         Ok(_) => {}
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CanopyError {
    /// I/O error while opening or mapping the index file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file on disk is not a loadable index.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Query vector length does not match the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimensionality the index was opened with
        expected: usize,
        /// Length of the vector the caller supplied
        got: usize,
    },

    /// Item id falls outside the file.
    #[error("Item {item} out of range: index holds {count} nodes")]
    OutOfRange {
        /// Requested item id
        item: usize,
        /// Number of nodes in the file (every item is a node)
        count: usize,
    },

    /// Operation attempted after [`close`](crate::ForestIndex::close).
    #[error("Index is closed")]
    Closed,
}
