// src/handlers/imports.rs

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{AdminOnly, RequireRole},
    },
    models::import::{ColumnMapping, ImportPreview, ImportReport},
};

/// Campos do formulário de importação.
#[derive(Debug, Default)]
struct ImportForm {
    filename: String,
    bytes: Vec<u8>,
    mapping: Option<ColumnMapping>,
    update_existing: bool,
}

async fn read_form(mut multipart: Multipart) -> Result<ImportForm, AppError> {
    let mut form = ImportForm::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ImportParse(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                form.filename = field.file_name().unwrap_or_default().to_string();
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ImportParse(e.to_string()))?
                    .to_vec();
                has_file = true;
            }
            Some("mapping") => {
                let raw = field.text().await.map_err(|e| AppError::ImportParse(e.to_string()))?;
                if !raw.trim().is_empty() {
                    let mapping = serde_json::from_str(&raw)
                        .map_err(|e| AppError::ImportParse(format!("mapeamento inválido: {e}")))?;
                    form.mapping = Some(mapping);
                }
            }
            Some("updateExisting") => {
                let raw = field.text().await.map_err(|e| AppError::ImportParse(e.to_string()))?;
                form.update_existing = matches!(raw.trim(), "true" | "1" | "on");
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(AppError::MissingIdentifier("file"));
    }
    Ok(form)
}

// POST /api/admin/imports/preview
#[utoipa::path(
    post,
    path = "/api/admin/imports/preview",
    tag = "Importação",
    request_body(content_type = "multipart/form-data", description = "Campo `file` com a planilha"),
    responses(
        (status = 200, description = "Cabeçalhos, amostra e mapeamento sugerido", body = ImportPreview),
        (status = 400, description = "Arquivo ilegível ou formato não suportado")
    ),
    security(("api_jwt" = []))
)]
pub async fn preview_import(
    State(app_state): State<AppState>,
    locale: Locale,
    _admin: RequireRole<AdminOnly>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let preview = app_state
        .import_service
        .preview(&form.filename, &form.bytes)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(preview)))
}

// POST /api/admin/imports/clients
#[utoipa::path(
    post,
    path = "/api/admin/imports/clients",
    tag = "Importação",
    request_body(
        content_type = "multipart/form-data",
        description = "`file`, `mapping` (JSON coluna -> campo, opcional) e `updateExisting`"
    ),
    responses(
        (status = 200, description = "Relatório da importação", body = ImportReport),
        (status = 400, description = "Arquivo ilegível ou formato não suportado")
    ),
    security(("api_jwt" = []))
)]
pub async fn import_clients(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(admin, _): RequireRole<AdminOnly>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tracing::info!(by = %admin.id, file = %form.filename, "📥 Importação de clientes iniciada");

    let report = app_state
        .import_service
        .import_clients(&form.filename, &form.bytes, form.mapping, form.update_existing)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(report)))
}

fn csv_download(filename: &str, bytes: Vec<u8>) -> Response {
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
    ];
    (headers, bytes).into_response()
}

// GET /api/admin/exports/clients
#[utoipa::path(
    get,
    path = "/api/admin/exports/clients",
    tag = "Importação",
    responses((status = 200, description = "CSV de clientes (;)", content_type = "text/csv")),
    security(("api_jwt" = []))
)]
pub async fn export_clients(
    State(app_state): State<AppState>,
    locale: Locale,
    _admin: RequireRole<AdminOnly>,
) -> Result<Response, ApiError> {
    let bytes = app_state
        .import_service
        .export_clients_csv()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(csv_download("clientes.csv", bytes))
}

// GET /api/admin/exports/processes
#[utoipa::path(
    get,
    path = "/api/admin/exports/processes",
    tag = "Importação",
    responses((status = 200, description = "CSV de processos (;)", content_type = "text/csv")),
    security(("api_jwt" = []))
)]
pub async fn export_processes(
    State(app_state): State<AppState>,
    locale: Locale,
    _admin: RequireRole<AdminOnly>,
) -> Result<Response, ApiError> {
    let bytes = app_state
        .import_service
        .export_processes_csv()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(csv_download("processos.csv", bytes))
}
