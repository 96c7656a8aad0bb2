// src/models/contract.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::finance::{PaymentMethod, PROMOTIONAL_PRICE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "document_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Contract,
    Procuracao,
    Distrato,
}

impl DocumentType {
    pub fn title(self) -> &'static str {
        match self {
            DocumentType::Contract => "Contrato de Prestação de Serviços",
            DocumentType::Procuracao => "Procuração",
            DocumentType::Distrato => "Distrato",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "signature_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    NotSigned,
    Pending,
    Signed,
}

impl SignatureStatus {
    /// A assinatura só anda para frente: nada sai de `signed`.
    pub fn can_transition_to(self, next: SignatureStatus) -> bool {
        match (self, next) {
            (SignatureStatus::Signed, _) => false,
            (SignatureStatus::NotSigned, SignatureStatus::NotSigned) => false,
            (SignatureStatus::Pending, SignatureStatus::NotSigned) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub process_id: Option<Uuid>,
    pub document_type: DocumentType,
    #[schema(example = "Registro de marca: Café Bom")]
    pub subject: String,
    #[schema(example = "699.00")]
    pub contract_value: Decimal,
    #[schema(example = "avista")]
    pub payment_method: String,
    pub contract_html: Option<String>,

    pub signature_status: SignatureStatus,
    #[serde(skip_serializing)]
    pub signature_token: Option<Uuid>,
    pub signature_expires_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub client_signature_image: Option<String>,

    pub blockchain_hash: Option<String>,
    pub blockchain_tx_id: Option<String>,
    pub blockchain_timestamp: Option<DateTime<Utc>>,
    pub blockchain_network: Option<String>,
    #[serde(skip_serializing)]
    pub blockchain_proof: Option<String>,
    pub signature_ip: Option<String>,
    pub signature_user_agent: Option<String>,
    #[schema(value_type = Object)]
    pub device_info: Option<Value>,

    pub asaas_payment_id: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Regra de integridade do preço: a promoção de 699,00 à vista expira
    /// quando o contrato segue sem assinatura depois do prazo.
    pub fn promotion_expired(&self, now: DateTime<Utc>, deadline: chrono::Duration) -> bool {
        self.payment_method == PaymentMethod::Avista.as_str()
            && self.signature_status == SignatureStatus::NotSigned
            && self.signed_at.is_none()
            && self.contract_value == PROMOTIONAL_PRICE
            && self.created_at + deadline <= now
    }

    pub fn signature_link_expired(&self, now: DateTime<Utc>) -> bool {
        self.signature_expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Contrato criado junto com a cobrança no checkout.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub lead_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
    pub document_type: DocumentType,
    pub subject: String,
    pub contract_value: Decimal,
    pub payment_method: PaymentMethod,
    pub contract_html: Option<String>,
    pub signature_token: Uuid,
    pub signature_expires_at: DateTime<Utc>,
    pub asaas_payment_id: String,
}

/// Prova de assinatura gravada no contrato.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProof {
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub hash: String,
    pub tx_id: String,
    pub network: String,
    #[serde(skip_serializing)]
    pub proof: String,
    pub calendar_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub confirmed: bool,
}

/// Metadados do dispositivo no momento da assinatura.
#[derive(Debug, Clone, Default)]
pub struct SignerContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<Value>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
    pub process_id: Option<Uuid>,
    pub name: String,
    pub document_type: DocumentType,
    pub file_url: String,
    pub storage_path: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ContractTemplate {
    pub id: Uuid,
    pub name: String,
    pub document_type: DocumentType,
    pub content: String,
}

// --- PAYLOADS ---

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignContractPayload {
    /// Imagem da assinatura desenhada (data URL PNG)
    pub signature_image: Option<String>,
    #[schema(value_type = Object)]
    pub device_info: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureLinkPayload {
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub send_whatsapp: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureLinkResponse {
    #[schema(example = "https://webmarcas.net/assinar/3f0c...")]
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicContractView {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub subject: String,
    pub contract_html: String,
    pub signature_status: SignatureStatus,
    pub signature_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignContractResponse {
    pub contract_id: Uuid,
    pub signed_at: DateTime<Utc>,
    pub proof: SignatureProof,
    pub verification_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub contract_id: Uuid,
    pub subject: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub hash: String,
    pub tx_id: Option<String>,
    pub network: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub confirmed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderContractPayload {
    pub document_type: DocumentType,
    pub profile_id: Uuid,
    pub process_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderedContract {
    pub document_type: DocumentType,
    pub html: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceGuardReport {
    pub expired: u64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn contract(created_at: DateTime<Utc>) -> Contract {
        Contract {
            id: Uuid::new_v4(),
            profile_id: None,
            lead_id: None,
            process_id: None,
            document_type: DocumentType::Contract,
            subject: "Registro de marca: Café Bom".into(),
            contract_value: PROMOTIONAL_PRICE,
            payment_method: "avista".into(),
            contract_html: Some("<p>Contrato</p>".into()),
            signature_status: SignatureStatus::NotSigned,
            signature_token: Some(Uuid::new_v4()),
            signature_expires_at: Some(created_at + chrono::Duration::days(7)),
            signed_at: None,
            client_signature_image: None,
            blockchain_hash: None,
            blockchain_tx_id: None,
            blockchain_timestamp: None,
            blockchain_network: None,
            blockchain_proof: None,
            signature_ip: None,
            signature_user_agent: None,
            device_info: None,
            asaas_payment_id: Some("pay_123".into()),
            confirmed_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn signature_never_moves_backward() {
        assert!(SignatureStatus::NotSigned.can_transition_to(SignatureStatus::Pending));
        assert!(SignatureStatus::NotSigned.can_transition_to(SignatureStatus::Signed));
        assert!(SignatureStatus::Pending.can_transition_to(SignatureStatus::Signed));
        assert!(SignatureStatus::Pending.can_transition_to(SignatureStatus::Pending));
        assert!(!SignatureStatus::Pending.can_transition_to(SignatureStatus::NotSigned));
        assert!(!SignatureStatus::Signed.can_transition_to(SignatureStatus::Pending));
        assert!(!SignatureStatus::Signed.can_transition_to(SignatureStatus::NotSigned));
    }

    #[test]
    fn promotion_expires_only_for_unsigned_avista_contracts() {
        let now = Utc::now();
        let deadline = Duration::days(7);
        let old = fixtures::contract(now - Duration::days(8));
        assert!(old.promotion_expired(now, deadline));

        let recent = fixtures::contract(now - Duration::days(2));
        assert!(!recent.promotion_expired(now, deadline));

        let mut signed = fixtures::contract(now - Duration::days(8));
        signed.signature_status = SignatureStatus::Signed;
        signed.signed_at = Some(now - Duration::days(1));
        assert!(!signed.promotion_expired(now, deadline));

        let mut card = fixtures::contract(now - Duration::days(8));
        card.payment_method = "cartao6x".into();
        assert!(!card.promotion_expired(now, deadline));

        let mut already_standard = fixtures::contract(now - Duration::days(8));
        already_standard.contract_value = Decimal::from_str("1194.00").unwrap();
        assert!(!already_standard.promotion_expired(now, deadline));

        let mut pending = fixtures::contract(now - Duration::days(8));
        pending.signature_status = SignatureStatus::Pending;
        assert!(!pending.promotion_expired(now, deadline));
    }

    #[test]
    fn link_expiry() {
        let now = Utc::now();
        let c = fixtures::contract(now - Duration::days(8));
        assert!(c.signature_link_expired(now));
        let c = fixtures::contract(now);
        assert!(!c.signature_link_expired(now));
    }
}
