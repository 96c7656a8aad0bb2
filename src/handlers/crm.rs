// src/handlers/crm.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{AdminOnly, BackOffice, RequireRole},
    },
    models::{
        crm::{
            AssignClientPayload, ClientActivity, CreateActivityPayload, CreateLeadPayload, Lead, LeadStatus, Profile,
            UpdateLeadStatusPayload,
        },
        notification::NotificationLog,
    },
};

// =============================================================================
//  ÁREA 1: LEADS
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct LeadFilter {
    /// Filtra pelo estágio do funil
    pub status: Option<LeadStatus>,
}

// POST /api/admin/leads
#[utoipa::path(
    post,
    path = "/api/admin/leads",
    tag = "CRM",
    request_body = CreateLeadPayload,
    responses(
        (status = 201, description = "Lead criado", body = Lead),
        (status = 400, description = "Dados inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Json(payload): Json<CreateLeadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = app_state
        .crm_service
        .create_lead(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(lead)))
}

// GET /api/admin/leads
#[utoipa::path(
    get,
    path = "/api/admin/leads",
    tag = "CRM",
    params(LeadFilter),
    responses((status = 200, description = "Leads", body = Vec<Lead>)),
    security(("api_jwt" = []))
)]
pub async fn list_leads(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Query(filter): Query<LeadFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let leads = app_state
        .crm_service
        .list_leads(filter.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(leads)))
}

// PUT /api/admin/leads/{id}/status
#[utoipa::path(
    put,
    path = "/api/admin/leads/{id}/status",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body = UpdateLeadStatusPayload,
    responses(
        (status = 200, description = "Lead atualizado", body = Lead),
        (status = 409, description = "Lead convertido não muda de estágio")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_lead_status(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeadStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = app_state
        .crm_service
        .update_lead_status(id, payload.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(lead)))
}

// =============================================================================
//  ÁREA 2: CLIENTES
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClientFilter {
    /// Busca por nome, e-mail ou CPF/CNPJ
    pub search: Option<String>,
}

// GET /api/admin/clients
#[utoipa::path(
    get,
    path = "/api/admin/clients",
    tag = "CRM",
    params(ClientFilter),
    responses((status = 200, description = "Clientes visíveis para a sessão", body = Vec<Profile>)),
    security(("api_jwt" = []))
)]
pub async fn list_clients(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Query(filter): Query<ClientFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let clients = app_state
        .crm_service
        .list_clients(&user, filter.search.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(clients)))
}

// GET /api/admin/clients/{id}
#[utoipa::path(
    get,
    path = "/api/admin/clients/{id}",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    responses(
        (status = 200, description = "Cliente", body = Profile),
        (status = 404, description = "Cliente não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_client(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let client = app_state
        .crm_service
        .get_client(&user, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(client)))
}

// PUT /api/admin/clients/{id}/assignment
#[utoipa::path(
    put,
    path = "/api/admin/clients/{id}/assignment",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    request_body = AssignClientPayload,
    responses(
        (status = 200, description = "Responsável e prioridade atualizados", body = Profile),
        (status = 404, description = "Cliente não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_client(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(admin, _): RequireRole<AdminOnly>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignClientPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let client = app_state
        .crm_service
        .assign_client(&admin, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(client)))
}

// POST /api/admin/clients/{id}/activities
#[utoipa::path(
    post,
    path = "/api/admin/clients/{id}/activities",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    request_body = CreateActivityPayload,
    responses((status = 201, description = "Atividade registrada", body = ClientActivity)),
    security(("api_jwt" = []))
)]
pub async fn add_activity(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateActivityPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = app_state
        .crm_service
        .add_activity(&user, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(activity)))
}

// GET /api/admin/clients/{id}/activities
#[utoipa::path(
    get,
    path = "/api/admin/clients/{id}/activities",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    responses((status = 200, description = "Histórico do cliente", body = Vec<ClientActivity>)),
    security(("api_jwt" = []))
)]
pub async fn list_activities(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let activities = app_state
        .crm_service
        .list_activities(&user, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(activities)))
}

// GET /api/admin/clients/{id}/notifications
#[utoipa::path(
    get,
    path = "/api/admin/clients/{id}/notifications",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    responses((status = 200, description = "Envios de e-mail/WhatsApp para o cliente", body = Vec<NotificationLog>)),
    security(("api_jwt" = []))
)]
pub async fn list_notifications(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let client = app_state
        .crm_service
        .get_client(&user, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let history = app_state
        .notification_service
        .history(Some(client.id))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(history)))
}
