//! Defines [`EncodingError`], representing all errors returned by this crate.

use std::error::Error;
use std::fmt::Debug;

use geozero::error::GeozeroError;
use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EncodingError {
    /// [std::io::Error] raised by the downstream sink.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Error raised while driving a geozero processor.
    #[error(transparent)]
    Geozero(#[from] GeozeroError),

    /// CRS error
    #[error("CRS related error: {0}")]
    Crs(String),

    /// Incorrect geometry type for operation
    #[error("Incorrect geometry type for operation: {0}")]
    IncorrectGeometryType(String),

    /// Geometry failed a validity check and could not be used as is.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Repairing an invalid geometry did not yield a usable geometry.
    #[error("Geometry repair failed: {0}")]
    GeometryRepair(String),

    /// A property value does not fit the type declared for its column.
    #[error("Value of column '{column}' cannot be written as {expected}: {found}")]
    ColumnTypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    /// The property scratch buffer is too small for the current feature.
    ///
    /// This is recovered internally by growing the buffer and never leaves the encoder.
    #[error("Overflow: {needed} bytes needed but only {available} available in property buffer")]
    BufferOverflow { needed: usize, available: usize },

    /// Inconsistent feature schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// The markup document cannot be kept well-formed.
    #[error("Markup error: {0}")]
    Markup(String),

    /// An encoder callback was invoked out of order.
    #[error("Encoder lifecycle violated: {0}")]
    State(String),

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Wraps an external error.
    #[error("External error: {0}")]
    External(#[from] Box<dyn Error + Send + Sync>),
}

impl EncodingError {
    /// Returns `true` if the stream cannot continue after this error.
    ///
    /// Everything else is scoped to a single feature, which encoders with independently framed
    /// records may skip.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EncodingError::IOError(_)
                | EncodingError::Markup(_)
                | EncodingError::State(_)
                | EncodingError::External(_)
        )
    }
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, EncodingError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fatal_classification() {
        let io = EncodingError::IOError(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "closed",
        ));
        assert!(io.is_fatal());
        assert!(EncodingError::Markup("unbalanced".to_string()).is_fatal());

        let mismatch = EncodingError::ColumnTypeMismatch {
            column: "population".to_string(),
            expected: "int",
            found: "abc".to_string(),
        };
        assert!(!mismatch.is_fatal());
        assert!(!EncodingError::GeometryRepair("empty".to_string()).is_fatal());
    }
}
