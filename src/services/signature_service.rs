// src/services/signature_service.rs
//
// Assinatura pública do contrato: hash SHA-256 de html + imagem, carimbo de
// tempo e gravação da prova. O PDF é gerado e enviado depois da resposta.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    integrations::{
        storage::{signed_contract_path, ObjectStore},
        timestamp::TimestampCalendar,
    },
    models::contract::{
        Contract, SignContractPayload, SignContractResponse, SignatureProof, SignatureStatus, SignerContext,
        VerificationResponse,
    },
    services::{
        contract_service::{verification_url, ContractStore},
        document_service::DocumentService,
    },
};

pub const NETWORK_OPENTIMESTAMPS: &str = "bitcoin-opentimestamps";
pub const NETWORK_PENDING: &str = "pending";

pub fn signature_digest(html: &str, signature_image: Option<&str>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    hasher.update(signature_image.unwrap_or_default().as_bytes());
    hasher.finalize().into()
}

/// Carimba o digest. Se nenhum calendário responder, a assinatura segue com prova pendente.
pub async fn stamp_digest(calendar: &dyn TimestampCalendar, digest: [u8; 32], now: DateTime<Utc>) -> SignatureProof {
    let hash = hex::encode(digest);

    match calendar.stamp(digest).await {
        Ok(receipt) => {
            let receipt_id = hex::encode(Sha256::digest(&receipt.proof));
            SignatureProof {
                tx_id: format!("OTS_{}", &receipt_id[..32]),
                network: NETWORK_OPENTIMESTAMPS.to_string(),
                proof: STANDARD.encode(&receipt.proof),
                calendar_url: Some(receipt.calendar_url),
                timestamp: now,
                confirmed: true,
                hash,
            }
        }
        Err(e) => {
            tracing::warn!("⚠️ Nenhum calendário respondeu, prova pendente: {}", e);
            let pending = format!("PENDING_{}", &hash[..16]);
            SignatureProof {
                tx_id: pending.clone(),
                network: NETWORK_PENDING.to_string(),
                proof: pending,
                calendar_url: None,
                timestamp: now,
                confirmed: false,
                hash,
            }
        }
    }
}

pub fn ensure_can_sign(contract: &Contract, now: DateTime<Utc>) -> Result<(), AppError> {
    if contract.signature_status == SignatureStatus::Signed {
        return Err(AppError::AlreadySigned);
    }
    if contract.signature_link_expired(now) {
        return Err(AppError::SignatureLinkExpired);
    }
    Ok(())
}

#[derive(Clone)]
pub struct SignatureService {
    store: Arc<dyn ContractStore>,
    calendar: Arc<dyn TimestampCalendar>,
    storage: Option<Arc<dyn ObjectStore>>,
    documents: DocumentService,
    public_base_url: String,
}

impl SignatureService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        calendar: Arc<dyn TimestampCalendar>,
        storage: Option<Arc<dyn ObjectStore>>,
        documents: DocumentService,
        public_base_url: String,
    ) -> Self {
        Self { store, calendar, storage, documents, public_base_url }
    }

    pub async fn sign(
        &self,
        token: Uuid,
        payload: SignContractPayload,
        mut signer: SignerContext,
    ) -> Result<SignContractResponse, AppError> {
        let now = Utc::now();
        let contract = self
            .store
            .find_by_token(token)
            .await?
            .ok_or(AppError::NotFound("contract"))?;

        ensure_can_sign(&contract, now)?;

        let html = contract
            .contract_html
            .as_deref()
            .ok_or(AppError::NotFound("contract_html"))?;

        let digest = signature_digest(html, payload.signature_image.as_deref());
        let proof = stamp_digest(self.calendar.as_ref(), digest, now).await;

        if signer.device_info.is_none() {
            signer.device_info = payload.device_info.clone();
        }

        // O WHERE do UPDATE barra duas assinaturas simultâneas
        let signed = self
            .store
            .mark_signed(contract.id, payload.signature_image.as_deref(), &proof, &signer)
            .await?
            .ok_or(AppError::AlreadySigned)?;

        tracing::info!(contract_id = %signed.id, network = %proof.network, "✍️ Contrato assinado");

        let verification = verification_url(&self.public_base_url, &proof.hash);

        let service = self.clone();
        let pdf_contract = signed.clone();
        let pdf_url = verification.clone();
        tokio::spawn(async move {
            if let Err(e) = service.store_signed_pdf(pdf_contract, pdf_url).await {
                tracing::error!("Falha ao gerar/enviar PDF assinado: {:?}", e);
            }
        });

        Ok(SignContractResponse {
            contract_id: signed.id,
            signed_at: signed.signed_at.unwrap_or(now),
            proof,
            verification_url: verification,
        })
    }

    async fn store_signed_pdf(&self, contract: Contract, verification: String) -> Result<(), AppError> {
        let Some(storage) = self.storage.clone() else {
            tracing::warn!(contract_id = %contract.id, "Storage não configurado, PDF assinado não enviado");
            return Ok(());
        };

        let documents = self.documents.clone();
        let render_contract = contract.clone();
        let pdf = tokio::task::spawn_blocking(move || documents.signed_contract_pdf(&render_contract, &verification))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de geração do PDF: {}", e))??;

        let filename = format!("{}_assinado", contract.document_type.title());
        let path = signed_contract_path(contract.id, Utc::now().timestamp_millis(), &filename);
        let url = storage.upload(&path, pdf, "application/pdf").await?;

        let name = format!("{} - {}", contract.document_type.title(), contract.subject);
        self.store.save_signed_document(&contract, &name, &url, &path).await?;

        tracing::info!(contract_id = %contract.id, "📄 PDF assinado armazenado em {}", path);
        Ok(())
    }

    pub async fn verify(&self, hash: &str) -> Result<VerificationResponse, AppError> {
        let hash = hash.trim().to_ascii_lowercase();
        let contract = self
            .store
            .find_by_hash(&hash)
            .await?
            .ok_or(AppError::NotFound("signature"))?;

        Ok(VerificationResponse {
            contract_id: contract.id,
            subject: contract.subject,
            signed_at: contract.signed_at,
            hash,
            confirmed: contract
                .blockchain_network
                .as_deref()
                .is_some_and(|n| n != NETWORK_PENDING),
            tx_id: contract.blockchain_tx_id,
            network: contract.blockchain_network,
            timestamp: contract.blockchain_timestamp,
        })
    }
}
