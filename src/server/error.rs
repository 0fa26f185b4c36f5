use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// no usable `url` query parameter
    #[error("Missing or invalid 'url' parameter")]
    MissingParameter,

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// upstream answered, just not with a 2xx. the status is forwarded as is
    #[error("upstream responded with {0}")]
    UpstreamHttpError(StatusCode),

    /// dns, refused connections, tls, timeouts, bodies cut off halfway
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamHttpError(status) => *status,
            Self::UpstreamUnreachable(_) | Self::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("relay request failed ({}): {}", status, self);
        } else {
            warn!("relay request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
