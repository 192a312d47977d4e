// Error taxonomy for the engine

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the reading and writing pipelines.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying source or sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dialect configuration is contradictory.
    #[error("invalid dialect: {0}")]
    Dialect(&'static str),

    /// A record did not have the expected number of fields.
    #[error("record at position {position} has {actual} fields, expected {expected}")]
    FieldCount {
        /// Absolute element offset of the record start in the source.
        position: u64,
        expected: usize,
        actual: usize,
    },

    /// Operation on a writer that has already been completed or aborted.
    #[error("writer has been completed")]
    Disposed,
}
