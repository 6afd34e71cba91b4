use lily_api_types::ClearanceError;
use lily_protocol::ChunkError;

/// Classified drive errors. The command layer maps each variant onto its
/// stable response code; anything reaching `Io` without a more specific
/// classification reports as an unknown filesystem error.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("no such path '{0}'")]
    NotFound(String),
    #[error("path '{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' is not a directory")]
    NotADirectory(String),
    #[error("'{0}' is not a file")]
    NotAFile(String),
    #[error("cannot move '{0}' into its own subtree")]
    MoveCycle(String),
    #[error("invalid byte range")]
    InvalidRange,
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(i64),
    #[error("insufficient clearance for '{0}'")]
    Clearance(String),
    #[error("invalid clearances: {0}")]
    Clearances(#[from] ClearanceError),
    #[error("invalid drive file: {0}")]
    DriveFile(String),
    #[error("chunk stream failed: {0}")]
    Chunk(#[from] ChunkError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
