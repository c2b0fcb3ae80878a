use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Input malformed: {0}")]
    InputMalformed(String),

    #[error("Invalid cache filename (path traversal detected): {0}")]
    PathTraversal(String),

    #[error("Cache store write failed: {0}")]
    StoreWrite(String),

    #[error("Columnar refresh failed: {0}")]
    ColumnarRefresh(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Ranker internal error: {0}")]
    RankerInternal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignalError>;
