use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, catch, catchers};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body returned when a request is rejected before any handler runs.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

fn respond(status: Status, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        status: status.code,
        message: message.to_string(),
    })
}

#[catch(400)]
fn bad_request(_: &Request<'_>) -> Json<ErrorResponse> {
    respond(Status::BadRequest, "bad request")
}

#[catch(401)]
fn unauthorized(_: &Request<'_>) -> Json<ErrorResponse> {
    respond(Status::Unauthorized, "unauthorized")
}

#[catch(403)]
fn forbidden(_: &Request<'_>) -> Json<ErrorResponse> {
    respond(Status::Forbidden, "forbidden")
}

#[catch(404)]
fn not_found(_: &Request<'_>) -> Json<ErrorResponse> {
    respond(Status::NotFound, "not found")
}

#[catch(422)]
fn unprocessable(_: &Request<'_>) -> Json<ErrorResponse> {
    respond(Status::UnprocessableEntity, "request body could not be parsed")
}

#[catch(500)]
fn internal_error(request: &Request<'_>) -> Json<ErrorResponse> {
    log::error!("unhandled failure on {} {}", request.method(), request.uri());
    respond(Status::InternalServerError, "internal error")
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error
    ]
}
