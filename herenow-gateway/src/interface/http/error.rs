use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use herenow_core::error::{ErrorCode, HereNowError};
use tracing::error;

/// HTTP 错误响应，响应体为纯文本错误信息
#[derive(Debug)]
pub struct ApiError(pub HereNowError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.code() {
            ErrorCode::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InvalidRequest | ErrorCode::ProtocolError => StatusCode::BAD_REQUEST,
            ErrorCode::StoreError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HereNowError> for ApiError {
    fn from(err: HereNowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = %self.0.code(), error = %self.0, "request failed");
        }
        (status, self.0.message().to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_status() {
        let cases = [
            (HereNowError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (HereNowError::forbidden("x"), StatusCode::FORBIDDEN),
            (HereNowError::not_found("x"), StatusCode::NOT_FOUND),
            (HereNowError::unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
            (HereNowError::bad_request("x"), StatusCode::BAD_REQUEST),
            (HereNowError::store("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
