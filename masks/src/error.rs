//! Mask composition result and error types.

use std::sync::Arc;

use arcstr::ArcStr;

use crate::layers::LayerId;

/// The [`MaskError`] result type.
pub type Result<T> = std::result::Result<T, MaskError>;

/// A mask composition error.
#[derive(thiserror::Error, Debug)]
pub enum MaskError {
    /// A layer name that is not part of the registry.
    #[error("unknown layer: {0}")]
    UnknownLayer(ArcStr),
    /// A layer identifier that is not part of the registry.
    #[error("unregistered layer identifier: {0}")]
    UnregisteredLayer(LayerId),
    /// Two registry entries share a name or an identifier.
    #[error("duplicate layer `{name}` {id}")]
    DuplicateLayer {
        /// The name of the offending entry.
        name: ArcStr,
        /// The identifier of the offending entry.
        id: LayerId,
    },
    /// A cell factory failed.
    ///
    /// Nothing is cached for the failing parameters.
    #[error("failed to build cell `{cell}`")]
    Factory {
        /// The name of the factory that failed.
        cell: ArcStr,
        /// The underlying failure.
        #[source]
        source: Arc<MaskError>,
    },
    /// An offset distance that is not a finite number.
    #[error("invalid offset distance: {0}")]
    InvalidOffset(f64),
    /// A reticle was requested without any image layers.
    #[error("no image layers given for reticle `{0}`")]
    EmptyReticle(ArcStr),
    /// A coordinate that cannot be represented on the GDS database grid.
    #[error("coordinate {0} does not fit the GDS database grid")]
    CoordinateOutOfRange(f64),
    /// An error writing a GDS file.
    #[error("error writing GDS file: {0}")]
    Gds(String),
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An invalid build configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An error raised by the cell cache.
    #[error("cache error: {0}")]
    Cache(#[from] cache::error::Error),
}

impl From<toml::de::Error> for MaskError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<gds21::GdsError> for MaskError {
    fn from(e: gds21::GdsError) -> Self {
        Self::Gds(format!("{e:?}"))
    }
}
