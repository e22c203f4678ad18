use crate::error::AppError;
use axum::response::{IntoResponse, Response};
use std::any::Any;

/// Turn a handler panic into the same JSON 500 body every other failure uses.
///
/// Meant for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };

    AppError::InternalError(anyhow::anyhow!(details)).into_response()
}
