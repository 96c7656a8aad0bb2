// src/handlers/processes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{AdminOnly, BackOffice, RequireRole},
    },
    models::process::{BrandProcess, ProcessEvent, RpiIngestPayload, RpiReport, UpdateProcessPayload},
};

// GET /api/admin/processes
#[utoipa::path(
    get,
    path = "/api/admin/processes",
    tag = "Processos",
    responses((status = 200, description = "Processos da carteira", body = Vec<BrandProcess>)),
    security(("api_jwt" = []))
)]
pub async fn list_processes(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
) -> Result<impl IntoResponse, ApiError> {
    let processes = app_state
        .process_service
        .list(&user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(processes)))
}

// GET /api/admin/processes/{id}
#[utoipa::path(
    get,
    path = "/api/admin/processes/{id}",
    tag = "Processos",
    params(("id" = Uuid, Path, description = "ID do processo")),
    responses(
        (status = 200, description = "Processo", body = BrandProcess),
        (status = 404, description = "Processo não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_process(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let process = app_state
        .process_service
        .get(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(process)))
}

// PUT /api/admin/processes/{id}
#[utoipa::path(
    put,
    path = "/api/admin/processes/{id}",
    tag = "Processos",
    params(("id" = Uuid, Path, description = "ID do processo")),
    request_body = UpdateProcessPayload,
    responses(
        (status = 200, description = "Processo atualizado", body = BrandProcess),
        (status = 409, description = "Processo em estado final")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_process(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProcessPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let process = app_state
        .process_service
        .update(&user, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(process)))
}

// GET /api/admin/processes/{id}/events
#[utoipa::path(
    get,
    path = "/api/admin/processes/{id}/events",
    tag = "Processos",
    params(("id" = Uuid, Path, description = "ID do processo")),
    responses((status = 200, description = "Histórico de despachos", body = Vec<ProcessEvent>)),
    security(("api_jwt" = []))
)]
pub async fn list_events(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let events = app_state
        .process_service
        .events(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(events)))
}

// POST /api/admin/rpi/ingest
#[utoipa::path(
    post,
    path = "/api/admin/rpi/ingest",
    tag = "Processos",
    request_body = RpiIngestPayload,
    responses(
        (status = 200, description = "Resumo da leitura da RPI", body = RpiReport),
        (status = 400, description = "Texto vazio")
    ),
    security(("api_jwt" = []))
)]
pub async fn ingest_rpi(
    State(app_state): State<AppState>,
    locale: Locale,
    _admin: RequireRole<AdminOnly>,
    Json(payload): Json<RpiIngestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .process_service
        .ingest_rpi(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(report)))
}
