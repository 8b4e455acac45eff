use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ranger_core::Error as CoreError;
use ranger_core::site::SiteError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(err) => match err {
                CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::Site(SiteError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                CoreError::Site(_) | CoreError::Hub(_) => StatusCode::BAD_GATEWAY,
                CoreError::Backend { .. } | CoreError::BackendMessage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}
