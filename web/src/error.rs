//! Error handling for the web layer.
//! Errors from the `sse` layer are translated here so that handlers can
//! return appropriate HTTP status codes and JSON bodies to the client.
use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use sse::error::{Error as SseError, ErrorKind as SseErrorKind, HubErrorKind};

use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Sse(SseError),
    Web(WebErrorKind),
}

#[derive(Debug)]
pub enum WebErrorKind {
    Input(String),
    Auth,
    Other,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Sse(ref sse_error) => self.handle_sse_error(sse_error),
            Error::Web(ref web_error_kind) => self.handle_web_error(web_error_kind),
        }
    }
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Error::Web(WebErrorKind::Input(message.into()))
    }

    fn handle_sse_error(&self, sse_error: &SseError) -> Response {
        match &sse_error.error_kind {
            SseErrorKind::Hub(HubErrorKind::CapacityExceeded) => {
                warn!(
                    "HubErrorKind::CapacityExceeded: Responding with 503 Service Unavailable. Error: {self:?}"
                );
                error_response(StatusCode::SERVICE_UNAVAILABLE, "connection limit reached")
            }
            SseErrorKind::Hub(HubErrorKind::ShuttingDown) => {
                warn!(
                    "HubErrorKind::ShuttingDown: Responding with 503 Service Unavailable. Error: {self:?}"
                );
                error_response(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down")
            }
            SseErrorKind::Hub(HubErrorKind::WriteFailed) | SseErrorKind::Codec(_) => {
                warn!(
                    "Responding with 500 Internal Server Error. Error: {self:?}"
                );
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }

    fn handle_web_error(&self, web_error_kind: &WebErrorKind) -> Response {
        match web_error_kind {
            WebErrorKind::Input(message) => {
                warn!("WebErrorKind::Input: Responding with 400 Bad Request. Error: {self:?}");
                error_response(StatusCode::BAD_REQUEST, message)
            }
            WebErrorKind::Auth => {
                warn!("WebErrorKind::Auth: Responding with 401 Unauthorized. Error: {self:?}");
                error_response(StatusCode::UNAUTHORIZED, "authentication required")
            }
            WebErrorKind::Other => {
                warn!(
                    "WebErrorKind::Other: Responding with 500 Internal Server Error. Error: {self:?}"
                );
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

impl From<SseError> for Error {
    fn from(err: SseError) -> Self {
        Error::Sse(err)
    }
}
