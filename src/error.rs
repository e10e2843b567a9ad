use thiserror::Error;

/// Errors surfaced by the shared buffer.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BufferError {
    /// `insert_front` was attempted after `close()` had already been called.
    #[error("shared buffer is closed")]
    Closed,
}

/// Errors surfaced by the connection manager.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open listening socket on port {port}: {source}")]
    ListenFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("shared buffer closed unexpectedly")]
    BufferClosed,
}

/// Errors surfaced by the storage manager.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database connection: {0}")]
    Connect(#[source] rusqlite::Error),
    #[error("failed to initialise schema: {0}")]
    Schema(#[source] rusqlite::Error),
    #[error("lost connection to the database after {retries} retries: {source}")]
    ConnectionLost {
        retries: u32,
        #[source]
        source: rusqlite::Error,
    },
}

/// A fatal, process-terminating condition.
///
/// These mirror the original implementation's `ASSERT_ELSE_PERROR` aborts:
/// listen-open failure, allocation failure, mutex poisoning. There is no
/// recovery path; the process exits.
#[derive(Debug, Error)]
pub enum Fatal {
    #[error("{0}")]
    Conn(#[from] ConnError),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("shared buffer mutex was poisoned by a panicking thread")]
    MutexPoisoned,
}
