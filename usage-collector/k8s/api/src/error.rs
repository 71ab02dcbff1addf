use thiserror::Error;

/// API failures, classified by how the caller should react to them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Throttling or a server-side failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Request(kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// === impl Error ===

impl Error {
    /// Permanent errors will fail the same way if the request is repeated.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Forbidden(_) | Self::Unauthorized(_)
        )
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(rsp) => match rsp.code {
                404 => Self::NotFound(rsp.message),
                403 => Self::Forbidden(rsp.message),
                401 => Self::Unauthorized(rsp.message),
                429 | 500..=599 => Self::Unavailable(rsp.message),
                _ => Self::Request(kube::Error::Api(rsp)),
            },
            error => Self::Request(error),
        }
    }
}
