// src/models/crm.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- ENUMS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Novo,
    Contatado,
    Qualificado,
    Negociacao,
    Convertido,
    Perdido,
}

impl LeadStatus {
    /// Lead convertido não volta para o funil. Os demais podem ir e voltar.
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        self != LeadStatus::Convertido && self != next
    }
}

// --- LEAD ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    #[schema(example = "Maria da Silva")]
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf_cnpj: Option<String>,
    pub brand_name: Option<String>,
    #[schema(example = "site")]
    pub origin: String,
    pub status: LeadStatus,
    pub estimated_value: Option<Decimal>,
    pub converted_profile_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadPayload {
    #[validate(length(min = 3, message = "O nome deve ter no mínimo 3 caracteres"))]
    pub full_name: String,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub brand_name: Option<String>,
    pub origin: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadStatusPayload {
    pub status: LeadStatus,
}

// --- CLIENTE (PERFIL) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cpf_cnpj: Option<String>,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub origin: Option<String>,
    #[schema(example = "normal")]
    pub priority: String,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campos de um cliente a ser inserido ou atualizado (checkout e importação).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProfile {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cpf_cnpj: Option<String>,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub origin: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignClientPayload {
    pub assigned_to: Option<Uuid>,
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "alta")]
    pub priority: String,
}

// Quem está consultando a carteira de clientes.
#[derive(Debug, Clone, Copy)]
pub enum ClientScope {
    All,
    AssignedTo(Uuid),
    Own(Uuid),
}

// --- HISTÓRICO (append-only) ---

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientActivity {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    #[schema(example = "login")]
    pub activity_type: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Anotação manual da equipe no histórico do cliente.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityPayload {
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "ligacao")]
    pub activity_type: String,
    #[validate(length(min = 1, message = "required"))]
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
}

/// Tudo o que o cliente vê na área dele.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalOverview {
    pub profile: Profile,
    pub processes: Vec<crate::models::process::BrandProcess>,
    pub contracts: Vec<crate::models::contract::Contract>,
    pub invoices: Vec<crate::models::finance::Invoice>,
    pub documents: Vec<crate::models::contract::StoredDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_lead_is_final() {
        assert!(!LeadStatus::Convertido.can_transition_to(LeadStatus::Novo));
        assert!(!LeadStatus::Convertido.can_transition_to(LeadStatus::Perdido));
    }

    #[test]
    fn lost_lead_can_be_reopened() {
        assert!(LeadStatus::Perdido.can_transition_to(LeadStatus::Contatado));
        assert!(LeadStatus::Novo.can_transition_to(LeadStatus::Convertido));
        assert!(!LeadStatus::Novo.can_transition_to(LeadStatus::Novo));
    }
}
