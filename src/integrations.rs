// src/integrations.rs
//
// Clientes dos serviços externos. Cada um fica atrás de uma trait para que os
// serviços possam ser testados com implementações em memória.

pub mod asaas;
pub mod smtp;
pub mod storage;
pub mod timestamp;
pub mod whatsapp;

use thiserror::Error;

use crate::common::error::AppError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("falha de rede: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provedor recusou a requisição ({status}): {messages:?}")]
    Rejected { status: u16, messages: Vec<String> },

    #[error("resposta inesperada do provedor: {0}")]
    Decode(String),

    #[error("tempo esgotado aguardando o provedor")]
    Timeout,

    #[error("integração não configurada: {0}")]
    NotConfigured(&'static str),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            // Erros de validação do provedor vão para o cliente como vieram
            ProviderError::Rejected { status, messages } if (400..500).contains(&status) => {
                AppError::PaymentRejected(messages)
            }
            other => AppError::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Timeout padrão das chamadas HTTP às integrações.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 30;

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_surfaced_verbatim() {
        let err: AppError = ProviderError::Rejected {
            status: 400,
            messages: vec!["CPF/CNPJ inválido".into()],
        }
        .into();
        match err {
            AppError::PaymentRejected(messages) => assert_eq!(messages, vec!["CPF/CNPJ inválido"]),
            other => panic!("erro inesperado: {other:?}"),
        }
    }

    #[test]
    fn server_errors_become_unavailable() {
        let err: AppError = ProviderError::Rejected { status: 503, messages: vec![] }.into();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
        let err: AppError = ProviderError::Timeout.into();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
    }
}
