// src/handlers/payments.rs

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        checkout::ConfirmCheckoutRequest,
        finance::{ConfirmationResponse, PaymentStatusResponse, WebhookAck, WebhookEvent},
    },
};

const WEBHOOK_TOKEN_HEADER: &str = "asaas-access-token";

// POST /api/payments/confirm
#[utoipa::path(
    post,
    path = "/api/payments/confirm",
    tag = "Pagamentos",
    request_body = ConfirmCheckoutRequest,
    responses(
        (status = 200, description = "Cliente, perfil e processo provisionados", body = ConfirmationResponse),
        (status = 404, description = "Contrato não encontrado"),
        (status = 409, description = "Fatura do contrato ainda não paga")
    )
)]
pub async fn confirm(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(req): Json<ConfirmCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = app_state
        .payment_service
        .confirm(req)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(response)))
}

// GET /api/payments/{invoice_id}/status
#[utoipa::path(
    get,
    path = "/api/payments/{invoice_id}/status",
    tag = "Pagamentos",
    params(("invoice_id" = Uuid, Path, description = "ID da fatura")),
    responses(
        (status = 200, description = "Status atual no gateway", body = PaymentStatusResponse),
        (status = 400, description = "Fatura sem cobrança no gateway"),
        (status = 404, description = "Fatura não encontrada")
    )
)]
pub async fn payment_status(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let status = app_state
        .payment_service
        .payment_status(invoice_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(status)))
}

/// Sem token configurado, qualquer chamada passa.
fn webhook_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    match expected {
        None => true,
        Some(expected) => headers
            .get(WEBHOOK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|received| received == expected),
    }
}

// POST /api/webhooks/asaas
#[utoipa::path(
    post,
    path = "/api/webhooks/asaas",
    tag = "Pagamentos",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Evento recebido", body = WebhookAck),
        (status = 401, description = "Token do webhook inválido")
    )
)]
pub async fn asaas_webhook(
    State(app_state): State<AppState>,
    locale: Locale,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<impl IntoResponse, ApiError> {
    if !webhook_authorized(app_state.config.asaas_webhook_token.as_deref(), &headers) {
        tracing::warn!("Webhook do gateway com token inválido");
        return Err(AppError::InvalidToken.to_api_error(&locale, &app_state.i18n_store));
    }

    let ack = app_state
        .payment_service
        .handle_webhook(event)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(ack)))
}
