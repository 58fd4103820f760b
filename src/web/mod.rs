//! HTTP/JSON interface to the registry.
//!
//! Each route maps onto one registry operation. Collections are streamed as
//! newline-delimited JSON.

pub mod handlers;
pub mod stream;

use crate::core::{Doctor, Patient, RegistryError, Technician};
use crate::facade::Registry;
use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{
        create_person, create_test, get_person, get_test, health, list_people, list_tests,
        patient_tests,
    };

    Router::new()
        .route("/health", get(health))
        .route(
            "/patients",
            get(list_people::<Patient>).post(create_person::<Patient>),
        )
        .route("/patients/:id", get(get_person::<Patient>))
        .route("/patients/:id/tests", get(patient_tests))
        .route(
            "/doctors",
            get(list_people::<Doctor>).post(create_person::<Doctor>),
        )
        .route("/doctors/:id", get(get_person::<Doctor>))
        .route(
            "/technicians",
            get(list_people::<Technician>).post(create_person::<Technician>),
        )
        .route("/technicians/:id", get(get_person::<Technician>))
        .route("/tests", get(list_tests).post(create_test))
        .route("/tests/:id", get(get_test))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
        )
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Registry(RegistryError),
    Input(String),
}

impl From<RegistryError> for WebError {
    fn from(err: RegistryError) -> Self {
        WebError::Registry(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Input(rejection.body_text())
    }
}

impl From<QueryRejection> for WebError {
    fn from(rejection: QueryRejection) -> Self {
        WebError::Input(rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Registry(err @ RegistryError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, err.to_string(), "not_found")
            }
            WebError::Registry(err @ RegistryError::Draining) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), "draining")
            }
            WebError::Registry(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "registry_error",
            ),
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
