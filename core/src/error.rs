//! Fatal error taxonomy for a sync run.
//!
//! Only failures of the primary MDS source (or local I/O while materializing)
//! abort a run. Secondary-source failures never appear here; they are logged
//! at the call site and degrade that source to "absent".

use crate::fetch::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The primary MDS source was unreachable after the retry budget.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// The MDS JWT blob could not be decoded.
    #[error("failed to decode MDS JWT: {0}")]
    Jwt(String),

    /// The decoded MDS claims had an unexpected shape.
    #[error("unexpected MDS payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure while materializing the tree.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
