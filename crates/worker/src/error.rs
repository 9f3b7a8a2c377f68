use crate::transport::TransportError;

/// Errors from talking to the server or executing an operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
