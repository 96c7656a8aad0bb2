// src/handlers/checkout.rs
//
// Wizard público de contratação. A sessão vai e volta no corpo das requisições.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::i18n::Locale,
    models::{
        checkout::{AdvanceCheckoutRequest, BackCheckoutRequest, CheckoutSession, SubmitCheckoutRequest},
        finance::PaymentResponse,
    },
};

// POST /api/checkout/start
#[utoipa::path(
    post,
    path = "/api/checkout/start",
    tag = "Checkout",
    responses((status = 200, description = "Sessão nova na etapa de viabilidade", body = CheckoutSession))
)]
pub async fn start(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.checkout_service.start())
}

// POST /api/checkout/advance
#[utoipa::path(
    post,
    path = "/api/checkout/advance",
    tag = "Checkout",
    request_body = AdvanceCheckoutRequest,
    responses(
        (status = 200, description = "Sessão na próxima etapa", body = CheckoutSession),
        (status = 400, description = "Dados inválidos ou etapa fora de ordem")
    )
)]
pub async fn advance(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(req): Json<AdvanceCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = app_state
        .checkout_service
        .advance(req)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(session)))
}

// POST /api/checkout/back
#[utoipa::path(
    post,
    path = "/api/checkout/back",
    tag = "Checkout",
    request_body = BackCheckoutRequest,
    responses(
        (status = 200, description = "Sessão na etapa anterior", body = CheckoutSession),
        (status = 400, description = "Já está na primeira etapa")
    )
)]
pub async fn back(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(req): Json<BackCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = app_state
        .checkout_service
        .back(&req.session)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(session)))
}

// POST /api/checkout/submit
#[utoipa::path(
    post,
    path = "/api/checkout/submit",
    tag = "Checkout",
    request_body = SubmitCheckoutRequest,
    responses(
        (status = 201, description = "Cobrança criada e contrato pronto para assinatura", body = PaymentResponse),
        (status = 400, description = "Sessão incompleta ou valor divergente"),
        (status = 422, description = "Recusado pelo gateway"),
        (status = 502, description = "Gateway indisponível")
    )
)]
pub async fn submit(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(req): Json<SubmitCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = app_state
        .checkout_service
        .submit(req)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(response)))
}
