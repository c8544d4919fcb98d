use thiserror::Error as ThisError;

/// Failures that can escape the authenticator core.
///
/// Recoverable protocol states (captcha needed, wrong activation code, bad
/// password) are never errors — they are reported back to the caller through
/// [`crate::enroll::EnrollState`]'s flags. Only transport and cryptographic
/// failures reach here.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("request to Steam failed")]
    Transport(#[from] TransportError),

    #[error("invalid response from Steam: {message}")]
    InvalidEnrollResponse {
        message: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("secret data has not been unlocked")]
    EncryptedSecretData,

    #[error("this authenticator has not been enrolled")]
    NotEnrolled,

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
}

impl Error {
    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Error::InvalidEnrollResponse {
            message: message.into(),
            source: None,
        }
    }
}

/// Failures from the [`crate::transport::HttpTransport`] boundary.
#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned non-success status {status}")]
    Status { url: String, status: u16 },
}
