// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// Erro de domínio. Os handlers convertem para ApiError (já traduzido).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Recurso não encontrado: {0}")]
    NotFound(&'static str),

    #[error("Etapa inválida: esperado {expected}, recebido {received}")]
    InvalidStepTransition { expected: String, received: String },

    #[error("Não existe etapa anterior")]
    NoPreviousStep,

    #[error("Checkout incompleto: {0}")]
    CheckoutIncomplete(&'static str),

    #[error("Valor não corresponde à forma de pagamento")]
    PriceMismatch,

    #[error("Identificador obrigatório ausente: {0}")]
    MissingIdentifier(&'static str),

    // Mensagens do provedor de pagamento, repassadas sem alteração
    #[error("Erro no provedor de pagamento: {0:?}")]
    PaymentRejected(Vec<String>),

    #[error("Pagamento ainda não confirmado")]
    PaymentNotConfirmed,

    #[error("Provedor externo indisponível: {0}")]
    ProviderUnavailable(String),

    #[error("Link de assinatura expirado")]
    SignatureLinkExpired,

    #[error("Contrato já assinado")]
    AlreadySigned,

    #[error("Transição de status inválida: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Formato de importação não suportado: {0}")]
    UnsupportedImportFormat(String),

    #[error("Falha ao ler arquivo de importação: {0}")]
    ImportParse(String),

    #[error("Violação de unicidade: {0}")]
    UniqueConstraintViolation(String),

    #[error("Fonte não encontrada: {0}")]
    FontNotFound(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Chave usada na busca da mensagem traduzida.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_error",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidToken => "invalid_token",
            AppError::Forbidden => "forbidden",
            AppError::UserNotFound => "user_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidStepTransition { .. } => "invalid_step",
            AppError::NoPreviousStep => "no_previous_step",
            AppError::CheckoutIncomplete(_) => "checkout_incomplete",
            AppError::PriceMismatch => "price_mismatch",
            AppError::MissingIdentifier(_) => "missing_identifier",
            AppError::PaymentRejected(_) => "payment_rejected",
            AppError::PaymentNotConfirmed => "payment_not_confirmed",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::SignatureLinkExpired => "signature_link_expired",
            AppError::AlreadySigned => "already_signed",
            AppError::InvalidStatusTransition { .. } => "invalid_status_transition",
            AppError::UnsupportedImportFormat(_) => "unsupported_import_format",
            AppError::ImportParse(_) => "import_parse",
            AppError::UniqueConstraintViolation(_) => "unique_violation",
            _ => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidStepTransition { .. }
            | AppError::NoPreviousStep
            | AppError::CheckoutIncomplete(_)
            | AppError::PriceMismatch
            | AppError::MissingIdentifier(_)
            | AppError::UnsupportedImportFormat(_)
            | AppError::ImportParse(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::SignatureLinkExpired => StatusCode::GONE,
            AppError::AlreadySigned
            | AppError::PaymentNotConfirmed
            | AppError::InvalidStatusTransition { .. }
            | AppError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converte o erro de domínio na resposta HTTP, no idioma do cliente.
    pub fn to_api_error(self, locale: &Locale, store: &I18nStore) -> ApiError {
        let status = self.status();
        let error = store.message(&locale.0, self.code());

        let details = match &self {
            AppError::ValidationError(errors) => {
                let mut fields: HashMap<String, Vec<String>> = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    fields.insert(field.to_string(), messages);
                }
                Some(json!(fields))
            }
            AppError::PaymentRejected(messages) => Some(json!(messages)),
            AppError::InvalidStepTransition { expected, received } => {
                Some(json!({ "expected": expected, "received": received }))
            }
            AppError::InvalidStatusTransition { from, to } => Some(json!({ "from": from, "to": to })),
            AppError::NotFound(what) | AppError::MissingIdentifier(what) | AppError::CheckoutIncomplete(what) => {
                Some(json!({ "field": what }))
            }
            AppError::UnsupportedImportFormat(msg)
            | AppError::ImportParse(msg)
            | AppError::UniqueConstraintViolation(msg) => Some(json!({ "reason": msg })),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!("Erro Interno do Servidor: {:?}", self);
        }

        ApiError { status, error, details }
    }
}

// A resposta de erro que sai para o cliente.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

// Rejeição de extratores (AuthenticatedUser, RequireRole) sem acesso ao Locale.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale("pt".into()), &I18nStore::new())
            .into_response()
    }
}
