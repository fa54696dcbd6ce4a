//! Engine-wide error taxonomy.
//!
//! Three failure classes cover everything the synchronization engine can
//! hit: transport failures (network, dropped streams), server-reported
//! errors (non-2xx responses with a message), and validation failures
//! raised before any request leaves the client.

/// Errors surfaced by the synchronization engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Network or stream failure. Non-fatal for the push channel,
    /// fatal-to-channel for the poll channel.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend returned a non-2xx status code.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// A start action was rejected before any request was issued.
    #[error("Validation failed: {0}")]
    Validation(String),
}
