//! Unified error type.

use std::path::PathBuf;

/// A type-erased error, as returned by middleware and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by relay's fallible operations.
///
/// A missing route is *not* an error: the dispatcher answers it with a 404
/// [`Response`](crate::Response). This type covers transport failures and
/// misuse of the response helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// [`Response::send_file`](crate::Response::send_file) could not open the file.
    #[error("cannot open `{}`: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A terminal response method was called on a response already sent.
    #[error("response already sent")]
    AlreadySent,

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request body: {0}")]
    Body(#[source] BoxError),

    /// The response was dropped without a reply being sent.
    #[error("request finished without a response")]
    Unanswered,
}
