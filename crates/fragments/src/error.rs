//! Error taxonomy of the fragment store.

use thiserror::Error;

use crate::{group::GroupId, pool::ShapeId};

#[derive(Debug, Error)]
pub enum FragmentError {
    /// Malformed, truncated or version-mismatched `.frag` bytes.
    #[error("corrupt fragment data: {0}")]
    CorruptData(String),
    #[error("shape {0} not found in pool")]
    NotFound(ShapeId),
    #[error("shape {0} is not known to the pool")]
    InvalidShape(ShapeId),
    #[error("operation on a disposed fragment or group")]
    Disposed,
    #[error("bounding box is empty")]
    Empty,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("unknown fragment group {0}")]
    UnknownGroup(GroupId),
    #[error("group was built against a different geometry pool")]
    ForeignPool,
    #[error("failed to encode fragments: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, FragmentError>;
