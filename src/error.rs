//! Error taxonomy for editing operations.
//!
//! None of these are fatal.  Every variant means "the request was not
//! applied"; the layer stack is left exactly as it was and no history
//! snapshot is recorded.

use thiserror::Error;

use crate::canvas::{LayerId, LayerKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    /// The operation would break a structural invariant of the stack
    /// (deleting the last or the base layer, merging without a neighbour).
    #[error("refused: {0}")]
    Refused(&'static str),

    /// The operation does not apply to this kind of layer.
    #[error("{op} is not supported on {kind} layers")]
    Unsupported { op: &'static str, kind: LayerKind },

    /// A numeric argument could not be clamped into range (NaN / infinite).
    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("no layer with id {0}")]
    UnknownLayer(LayerId),

    /// Image bytes could not be decoded; the pending import/filter is abandoned.
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

pub type EditResult<T> = Result<T, EditError>;
