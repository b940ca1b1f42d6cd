/*!
Interoperation between clients and the server.

(Not the service and the database; that's covered by `store`.)

Every response body this service produces is JSON. Errors all share one
shape, `{"message": <string>}`, with a 400 for anything wrong with the
request and a 500 for anything wrong on our end.
*/
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub mod api;

/// Respond 400 with the standard `{"message": ...}` error body.
pub fn respond_bad_request(msg: &str) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", msg);

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": msg }))
    ).into_response()
}

/// Respond 500 with the standard `{"message": ...}` error body.
pub fn respond_500(msg: &str) -> Response {
    log::trace!("respond_500( {:?} ) called.", msg);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": msg }))
    ).into_response()
}

/// Respond 204; successful writes carry no body.
pub fn respond_no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Health check for `GET /`.
pub async fn server_running() -> Response {
    log::trace!("server_running() called.");

    (
        StatusCode::OK,
        Json("Server is running")
    ).into_response()
}
