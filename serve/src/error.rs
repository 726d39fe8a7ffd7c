//! Wraps [`gasable_core::GasableError`] for axum handlers.
//!
//! Spec §7: error kinds are carried in response payloads, never mapped to
//! transport status codes — every handler that can fail returns `200 OK`
//! with a `{status:"error", error_kind, message}` body instead of a 4xx/5xx.
//! The one exception axum itself makes outside our control is malformed
//! JSON bodies, which the `Json` extractor rejects before a handler runs.

use axum::response::{IntoResponse, Response};
use axum::Json;
use gasable_core::GasableError;
use serde_json::json;

pub struct ApiError(pub GasableError);

impl From<GasableError> for ApiError {
    fn from(e: GasableError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        Json(json!({
            "status": "error",
            "error_kind": kind,
            "message": self.0.to_string(),
        }))
        .into_response()
    }
}
