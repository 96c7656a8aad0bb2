// src/models/process.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Etapas do processo no INPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "process_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    EmAndamento,
    PublicadoRpi,
    Oposicao,
    EmExame,
    Deferido,
    Concedido,
    Indeferido,
    Arquivado,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Concedido | ProcessStatus::Indeferido | ProcessStatus::Arquivado)
    }

    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        !self.is_terminal() && self != next
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::EmAndamento => "em_andamento",
            ProcessStatus::PublicadoRpi => "publicado_rpi",
            ProcessStatus::Oposicao => "oposicao",
            ProcessStatus::EmExame => "em_exame",
            ProcessStatus::Deferido => "deferido",
            ProcessStatus::Concedido => "concedido",
            ProcessStatus::Indeferido => "indeferido",
            ProcessStatus::Arquivado => "arquivado",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::EmAndamento => "Em andamento",
            ProcessStatus::PublicadoRpi => "Publicado na RPI",
            ProcessStatus::Oposicao => "Em oposição",
            ProcessStatus::EmExame => "Em exame",
            ProcessStatus::Deferido => "Deferido",
            ProcessStatus::Concedido => "Concedido",
            ProcessStatus::Indeferido => "Indeferido",
            ProcessStatus::Arquivado => "Arquivado",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrandProcess {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    #[schema(example = "Café Bom")]
    pub brand_name: String,
    #[schema(example = "Cafeteria")]
    pub business_area: Option<String>,
    pub status: ProcessStatus,
    #[schema(example = "912345678")]
    pub process_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProcessPayload {
    pub status: Option<ProcessStatus>,
    #[validate(length(equal = 9, message = "O número do processo tem 9 dígitos"))]
    pub process_number: Option<String>,
    pub notes: Option<String>,
}

// Histórico de despachos (append-only)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEvent {
    pub id: Uuid,
    pub process_id: Uuid,
    pub rpi_number: Option<String>,
    pub dispatch_text: String,
    pub previous_status: ProcessStatus,
    pub new_status: ProcessStatus,
    pub created_at: DateTime<Utc>,
}

/// Linha da exportação de processos (processo + titular).
#[derive(Debug, Clone, FromRow)]
pub struct ProcessExportRow {
    pub process_number: Option<String>,
    pub brand_name: String,
    pub business_area: Option<String>,
    pub status: ProcessStatus,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RpiIngestPayload {
    #[schema(example = "2857")]
    pub rpi_number: Option<String>,
    #[validate(length(min = 1, message = "required"))]
    pub content: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RpiReport {
    pub entries_found: usize,
    pub processes_matched: usize,
    pub updated: usize,
    pub unchanged: usize,
}
