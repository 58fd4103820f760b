use crate::core::{
    EntityKind, MedicalTest, NewMedicalTest, NewPerson, Parity, Role, TestCreation,
};
use crate::facade::RegistryStats;
use crate::storage::Stored;
use crate::web::stream::ndjson;
use crate::web::{AppState, Result, WebError};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct TestCreatedResponse {
    pub status: String,
    pub test: MedicalTest,
}

#[derive(Debug, Serialize)]
pub struct TestRejectedResponse {
    pub status: String,
    pub missing: Vec<EntityKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestsQuery {
    pub parity: Option<Parity>,
}

pub async fn health(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats().await)
}

pub async fn create_person<R>(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewPerson>, JsonRejection>,
) -> Result<(StatusCode, Json<R>)>
where
    R: Role + Stored + Serialize,
{
    let Json(fields) = payload?;
    let created = state.registry.create_person::<R>(fields).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_person<R>(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<R>>
where
    R: Role + Stored + Serialize,
{
    let id = parse_id(&id)?;
    info!(kind = %R::KIND, id, "fetch by id");
    Ok(Json(state.registry.get::<R>(id).await?))
}

pub async fn list_people<R>(State(state): State<AppState>) -> Result<Response>
where
    R: Role + Stored + Serialize,
{
    info!(kind = %R::KIND, "fetch all");
    let people = state.registry.list::<R>().await?;
    Ok(ndjson(people))
}

/// Submit test results. A submission naming unknown people is answered with
/// 422 and the list of every missing kind.
pub async fn create_test(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewMedicalTest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    let outcome = state.registry.create_test(request).await?;
    let status = outcome.status();
    let response = match outcome {
        TestCreation::Created(test) => (
            StatusCode::CREATED,
            Json(TestCreatedResponse { status, test }),
        )
            .into_response(),
        TestCreation::Rejected(missing) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(TestRejectedResponse {
                status,
                missing: missing.kinds,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn get_test(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MedicalTest>> {
    let id = parse_id(&id)?;
    info!(id, "fetch test");
    Ok(Json(state.registry.get::<MedicalTest>(id).await?))
}

pub async fn list_tests(
    State(state): State<AppState>,
    query: std::result::Result<Query<TestsQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query?;
    let tests = match query.parity {
        Some(parity) => {
            info!(?parity, "fetch tests on id parity");
            state.registry.tests_by_parity(parity).await?
        }
        None => {
            info!("fetch all tests");
            state.registry.list::<MedicalTest>().await?
        }
    };
    Ok(ndjson(tests))
}

pub async fn patient_tests(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let patient_id = parse_id(&id)?;
    info!(patient_id, "fetch tests for patient");
    let tests = state.registry.tests_for_patient(patient_id).await?;
    Ok(ndjson(tests))
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| WebError::Input(format!("invalid id: {raw}")))
}
