use thiserror::Error;

/// The closed set of failures the graph reports. All of them are local and
/// recoverable; a failed call leaves the graph untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("frame '{0}' already exists")]
    DuplicateFrame(String),

    #[error("frame '{0}' does not exist")]
    UnknownFrame(String),

    #[error("transform {0} does not exist")]
    UnknownTransform(String),

    #[error("tree root '{0}' is not part of the graph")]
    InvalidRoot(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
