// src/common/i18n.rs

use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_LANG: &str = "pt";

// (chave, português, inglês)
const MESSAGES: &[(&str, &str, &str)] = &[
    ("validation_error", "Um ou mais campos são inválidos.", "One or more fields are invalid."),
    ("invalid_credentials", "E-mail ou senha inválidos.", "Invalid e-mail or password."),
    ("invalid_token", "Token de autenticação inválido ou ausente.", "Missing or invalid authentication token."),
    ("forbidden", "Você não tem permissão para esta ação.", "You are not allowed to perform this action."),
    ("user_not_found", "Usuário não encontrado.", "User not found."),
    ("not_found", "Registro não encontrado.", "Record not found."),
    ("invalid_step", "Esta etapa do cadastro não é a etapa atual.", "This checkout step is not the current one."),
    ("no_previous_step", "Você já está na primeira etapa.", "You are already at the first step."),
    ("checkout_incomplete", "Preencha todas as etapas antes de finalizar.", "Complete every step before submitting."),
    ("price_mismatch", "O valor informado não corresponde à forma de pagamento.", "The amount does not match the payment method."),
    ("missing_identifier", "Identificador obrigatório ausente.", "A required identifier is missing."),
    ("payment_not_confirmed", "O pagamento deste contrato ainda não foi confirmado.", "Payment for this contract has not been confirmed yet."),
    ("payment_rejected", "O provedor de pagamento recusou a solicitação.", "The payment provider rejected the request."),
    ("provider_unavailable", "Serviço externo indisponível. Tente novamente.", "External service unavailable. Please retry."),
    ("signature_link_expired", "Este link de assinatura expirou.", "This signature link has expired."),
    ("already_signed", "Este documento já foi assinado.", "This document has already been signed."),
    ("invalid_status_transition", "Mudança de status não permitida.", "Status change not allowed."),
    ("unsupported_import_format", "Formato de arquivo não suportado.", "Unsupported file format."),
    ("import_parse", "Não foi possível ler o arquivo.", "The file could not be read."),
    ("unique_violation", "Registro duplicado.", "Duplicate record."),
    ("internal_error", "Ocorreu um erro inesperado.", "An unexpected error occurred."),
];

/// Catálogo de mensagens por idioma. Idiomas desconhecidos caem no português.
#[derive(Clone)]
pub struct I18nStore {
    messages: Arc<HashMap<(&'static str, &'static str), &'static str>>,
}

impl I18nStore {
    pub fn new() -> Self {
        let mut messages = HashMap::new();
        for (key, pt, en) in MESSAGES {
            messages.insert(("pt", *key), *pt);
            messages.insert(("en", *key), *en);
        }
        Self { messages: Arc::new(messages) }
    }

    pub fn message(&self, lang: &str, key: &str) -> String {
        self.messages
            .get(&(lang_key(lang), key))
            .or_else(|| self.messages.get(&(DEFAULT_LANG, key)))
            .or_else(|| self.messages.get(&(DEFAULT_LANG, "internal_error")))
            .map(|m| m.to_string())
            .unwrap_or_default()
    }
}

fn lang_key(lang: &str) -> &'static str {
    match lang {
        "en" => "en",
        _ => DEFAULT_LANG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_portuguese() {
        let store = I18nStore::new();
        assert_eq!(store.message("es", "not_found"), "Registro não encontrado.");
        assert_eq!(store.message("en", "not_found"), "Record not found.");
    }

    #[test]
    fn unknown_key_uses_generic_message() {
        let store = I18nStore::new();
        assert_eq!(store.message("pt", "nope"), "Ocorreu um erro inesperado.");
    }
}
