//! Mapping of failures onto HTTP responses.

use axum::extract::multipart::MultipartError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::messages::{ErrorCode, ErrorMessage};

use crate::files::FileError;

/// Realm announced with 401 responses.
pub const AUTH_REALM: &str = r#"Basic realm="Restricted""#;

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A repository operation failed.
    File(FileError),
    /// The request itself was malformed.
    BadRequest(String),
    /// A multipart body could not be read to the end.
    Multipart(MultipartError),
    /// Missing or wrong credentials.
    Unauthorized,
    /// Anything else that went wrong on our side.
    Internal(String),
}

impl ApiError {
    /// Status code sent for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::File(err) => file_error_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(err) => multipart_status(err),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent for this error.
    pub fn body(&self) -> ErrorMessage {
        match self {
            ApiError::File(err) => {
                let message = ErrorMessage::new(error_code(err), err.to_string());
                match err.path() {
                    Some(path) => message.with_context(path),
                    None => message,
                }
            }
            ApiError::BadRequest(msg) => ErrorMessage::new(ErrorCode::InvalidRequest, msg.as_str()),
            ApiError::Multipart(err) => ErrorMessage::new(
                ErrorCode::InvalidRequest,
                format!("malformed multipart body: {}", err.body_text()),
            ),
            ApiError::Unauthorized => ErrorMessage::new(ErrorCode::Unauthorized, "unauthorized"),
            ApiError::Internal(msg) => ErrorMessage::new(ErrorCode::InternalError, msg.as_str()),
        }
    }
}

/// Status code for a repository failure.
pub fn file_error_status(err: &FileError) -> StatusCode {
    match err {
        FileError::InvalidPath { .. } => StatusCode::FORBIDDEN,
        FileError::NotFound(_) => StatusCode::NOT_FOUND,
        FileError::NotADirectory(_) => StatusCode::BAD_REQUEST,
        FileError::IsADirectory(_) => StatusCode::CONFLICT,
        FileError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status for a broken multipart body. An over-limit body is 413; a body
/// that stopped arriving is still the client's fault.
fn multipart_status(err: &MultipartError) -> StatusCode {
    let status = err.status();
    if status.is_client_error() {
        status
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Wire error code for a repository failure.
pub fn error_code(err: &FileError) -> ErrorCode {
    match err {
        FileError::InvalidPath { .. } => ErrorCode::InvalidPath,
        FileError::NotFound(_) => ErrorCode::NotFound,
        FileError::NotADirectory(_) => ErrorCode::NotADirectory,
        FileError::IsADirectory(_) => ErrorCode::IsADirectory,
        FileError::Io(_) => ErrorCode::InternalError,
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        ApiError::File(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(self.body());

        if let ApiError::Unauthorized = self {
            return (
                status,
                [(header::WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM))],
                body,
            )
                .into_response();
        }
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_file_error_statuses() {
        let cases = [
            (
                FileError::InvalidPath {
                    path: "..".to_string(),
                    reason: "parent directory segment",
                },
                StatusCode::FORBIDDEN,
                ErrorCode::InvalidPath,
            ),
            (
                FileError::NotFound("/a".to_string()),
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
            ),
            (
                FileError::NotADirectory("/a".to_string()),
                StatusCode::BAD_REQUEST,
                ErrorCode::NotADirectory,
            ),
            (
                FileError::IsADirectory("/a".to_string()),
                StatusCode::CONFLICT,
                ErrorCode::IsADirectory,
            ),
            (
                FileError::Io(io::Error::new(io::ErrorKind::Other, "disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(file_error_status(&err), status);
            assert_eq!(error_code(&err), code);
        }
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            AUTH_REALM
        );
    }

    #[test]
    fn test_body_uses_error_message() {
        let err = ApiError::from(FileError::NotFound("/missing.txt".to_string()));
        let body = err.body();
        assert_eq!(body.code, ErrorCode::NotFound);
        assert_eq!(body.message, "path does not exist: /missing.txt");
        assert_eq!(body.context.as_deref(), Some("/missing.txt"));
    }

    #[test]
    fn test_io_error_body_has_no_context() {
        let err = ApiError::from(FileError::Io(io::Error::new(io::ErrorKind::Other, "disk")));
        assert_eq!(err.body().context, None);
    }
}
