// src/handlers/portal.rs
//
// Área do cliente: só os registros do próprio usuário.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{ClientOnly, RequireRole},
    },
    models::{
        contract::Contract,
        crm::{ClientScope, PortalOverview},
        finance::Invoice,
        process::BrandProcess,
    },
};

// GET /api/portal
#[utoipa::path(
    get,
    path = "/api/portal",
    tag = "Portal",
    responses(
        (status = 200, description = "Cadastro, processos, contratos, faturas e documentos", body = PortalOverview),
        (status = 404, description = "Usuário sem cadastro de cliente")
    ),
    security(("api_jwt" = []))
)]
pub async fn overview(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<ClientOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = app_state
        .crm_service
        .portal_overview(&user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(overview)))
}

// GET /api/portal/processes
#[utoipa::path(
    get,
    path = "/api/portal/processes",
    tag = "Portal",
    responses((status = 200, description = "Processos do cliente", body = Vec<BrandProcess>)),
    security(("api_jwt" = []))
)]
pub async fn my_processes(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<ClientOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let processes = app_state
        .process_service
        .list(&user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(processes)))
}

// GET /api/portal/contracts
#[utoipa::path(
    get,
    path = "/api/portal/contracts",
    tag = "Portal",
    responses((status = 200, description = "Contratos do cliente", body = Vec<Contract>)),
    security(("api_jwt" = []))
)]
pub async fn my_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<ClientOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let contracts = app_state
        .contract_service
        .list(ClientScope::Own(user.id))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contracts)))
}

// GET /api/portal/invoices
#[utoipa::path(
    get,
    path = "/api/portal/invoices",
    tag = "Portal",
    responses((status = 200, description = "Faturas do cliente", body = Vec<Invoice>)),
    security(("api_jwt" = []))
)]
pub async fn my_invoices(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<ClientOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let invoices = app_state
        .crm_service
        .portal_invoices(&user)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(invoices)))
}
