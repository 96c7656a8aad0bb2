// src/handlers/contracts.rs

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{AdminOnly, BackOffice, RequireRole},
    },
    models::contract::{
        Contract, PriceGuardReport, PublicContractView, RenderContractPayload, RenderedContract, SignContractPayload,
        SignContractResponse, SignatureLinkPayload, SignatureLinkResponse, SignerContext, VerificationResponse,
    },
    services::crm_service::scope_for,
};

/// IP de quem assina: primeiro salto do x-forwarded-for, depois x-real-ip.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()).map(str::trim))
        .map(str::to_string)
}

// =============================================================================
//  ÁREA 1: ADMINISTRAÇÃO
// =============================================================================

// GET /api/admin/contracts
#[utoipa::path(
    get,
    path = "/api/admin/contracts",
    tag = "Contratos",
    responses((status = 200, description = "Contratos da carteira", body = Vec<Contract>)),
    security(("api_jwt" = []))
)]
pub async fn list_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<BackOffice>,
) -> Result<impl IntoResponse, ApiError> {
    let contracts = app_state
        .contract_service
        .list(scope_for(&user))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contracts)))
}

// GET /api/admin/contracts/{id}
#[utoipa::path(
    get,
    path = "/api/admin/contracts/{id}",
    tag = "Contratos",
    params(("id" = Uuid, Path, description = "ID do contrato")),
    responses(
        (status = 200, description = "Contrato", body = Contract),
        (status = 404, description = "Contrato não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = app_state
        .contract_service
        .get(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contract)))
}

// POST /api/admin/contracts/render
#[utoipa::path(
    post,
    path = "/api/admin/contracts/render",
    tag = "Contratos",
    request_body = RenderContractPayload,
    responses(
        (status = 200, description = "Documento preenchido com os dados do cliente", body = RenderedContract),
        (status = 404, description = "Cliente ou processo não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn render_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Json(payload): Json<RenderContractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let rendered = app_state
        .contract_service
        .render(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(rendered)))
}

// POST /api/admin/contracts/{id}/signature-link
#[utoipa::path(
    post,
    path = "/api/admin/contracts/{id}/signature-link",
    tag = "Contratos",
    params(("id" = Uuid, Path, description = "ID do contrato")),
    request_body = SignatureLinkPayload,
    responses(
        (status = 200, description = "Novo link de assinatura", body = SignatureLinkResponse),
        (status = 409, description = "Contrato já assinado")
    ),
    security(("api_jwt" = []))
)]
pub async fn issue_signature_link(
    State(app_state): State<AppState>,
    locale: Locale,
    _staff: RequireRole<BackOffice>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignatureLinkPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let link = app_state
        .contract_service
        .issue_signature_link(id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(link)))
}

// POST /api/admin/contracts/expire-promotions
#[utoipa::path(
    post,
    path = "/api/admin/contracts/expire-promotions",
    tag = "Contratos",
    responses((status = 200, description = "Contratos que saíram do preço promocional", body = PriceGuardReport)),
    security(("api_jwt" = []))
)]
pub async fn expire_promotions(
    State(app_state): State<AppState>,
    locale: Locale,
    _admin: RequireRole<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .contract_service
        .expire_promotions(Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(report)))
}

// =============================================================================
//  ÁREA 2: ASSINATURA PÚBLICA
// =============================================================================

// GET /api/public/contracts/{token}
#[utoipa::path(
    get,
    path = "/api/public/contracts/{token}",
    tag = "Assinatura",
    params(("token" = Uuid, Path, description = "Token do link de assinatura")),
    responses(
        (status = 200, description = "Contrato para leitura", body = PublicContractView),
        (status = 404, description = "Link inválido"),
        (status = 410, description = "Link expirado")
    )
)]
pub async fn view_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = app_state
        .contract_service
        .public_view(token)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(view)))
}

// POST /api/public/contracts/{token}/sign
#[utoipa::path(
    post,
    path = "/api/public/contracts/{token}/sign",
    tag = "Assinatura",
    params(("token" = Uuid, Path, description = "Token do link de assinatura")),
    request_body = SignContractPayload,
    responses(
        (status = 200, description = "Contrato assinado", body = SignContractResponse),
        (status = 409, description = "Contrato já assinado"),
        (status = 410, description = "Link expirado")
    )
)]
pub async fn sign_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    headers: HeaderMap,
    user_agent: Option<TypedHeader<UserAgent>>,
    Path(token): Path<Uuid>,
    Json(payload): Json<SignContractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let signer = SignerContext {
        ip: client_ip(&headers),
        user_agent: user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
        device_info: None,
    };

    let signed = app_state
        .signature_service
        .sign(token, payload, signer)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(signed)))
}

// GET /api/public/verify/{hash}
#[utoipa::path(
    get,
    path = "/api/public/verify/{hash}",
    tag = "Assinatura",
    params(("hash" = String, Path, description = "SHA-256 do documento assinado")),
    responses(
        (status = 200, description = "Prova de assinatura", body = VerificationResponse),
        (status = 404, description = "Hash desconhecido")
    )
)]
pub async fn verify_signature(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let proof = app_state
        .signature_service
        .verify(&hash)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(proof)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("200.1.2.3, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("200.1.2.3"));
    }
}
