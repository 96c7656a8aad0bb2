// src/db/contract_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::crm_repo::scope_filters,
    models::{
        contract::{Contract, ContractTemplate, DocumentType, NewContract, SignatureProof, SignerContext, StoredDocument},
        crm::ClientScope,
    },
};

#[derive(Clone)]
pub struct ContractRepository {
    pool: PgPool,
}

impl ContractRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    pub async fn insert<'e, E>(&self, executor: E, data: &NewContract) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            INSERT INTO contracts (
                lead_id, profile_id, document_type, subject, contract_value, payment_method,
                contract_html, signature_token, signature_expires_at, asaas_payment_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(data.lead_id)
        .bind(data.profile_id)
        .bind(data.document_type)
        .bind(&data.subject)
        .bind(data.contract_value)
        .bind(data.payment_method.as_str())
        .bind(&data.contract_html)
        .bind(data.signature_token)
        .bind(data.signature_expires_at)
        .bind(&data.asaas_payment_id)
        .fetch_one(executor)
        .await?;
        Ok(contract)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(contract)
    }

    pub async fn find_by_token(&self, token: Uuid) -> Result<Option<Contract>, AppError> {
        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE signature_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contract)
    }

    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<Contract>, AppError> {
        let contract = sqlx::query_as::<_, Contract>(
            "SELECT * FROM contracts WHERE blockchain_hash = $1 ORDER BY signed_at DESC LIMIT 1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contract)
    }

    pub async fn list(&self, scope: ClientScope) -> Result<Vec<Contract>, AppError> {
        let (assigned_to, owner) = scope_filters(scope);
        let contracts = sqlx::query_as::<_, Contract>(
            r#"
            SELECT c.*
            FROM contracts c
            LEFT JOIN profiles p ON p.id = c.profile_id
            WHERE ($1::uuid IS NULL OR p.assigned_to = $1)
              AND ($2::uuid IS NULL OR p.user_id = $2)
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(assigned_to)
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(contracts)
    }

    /// Novo link de assinatura. `not_signed` passa a `pending`; contrato assinado não muda.
    pub async fn set_signature_link<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        token: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET
                signature_token = $2,
                signature_expires_at = $3,
                signature_status = 'pending',
                updated_at = NOW()
            WHERE id = $1 AND signature_status <> 'signed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .fetch_optional(executor)
        .await?;
        Ok(contract)
    }

    /// Grava assinatura + prova. A condição no WHERE impede assinar duas vezes.
    pub async fn mark_signed<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        signature_image: Option<&str>,
        proof: &SignatureProof,
        signer: &SignerContext,
    ) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET
                signature_status = 'signed',
                signed_at = $3,
                client_signature_image = $2,
                blockchain_hash = $4,
                blockchain_tx_id = $5,
                blockchain_timestamp = $3,
                blockchain_network = $6,
                blockchain_proof = $7,
                signature_ip = $8,
                signature_user_agent = $9,
                device_info = $10,
                updated_at = NOW()
            WHERE id = $1 AND signature_status <> 'signed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(signature_image)
        .bind(proof.timestamp)
        .bind(&proof.hash)
        .bind(&proof.tx_id)
        .bind(&proof.network)
        .bind(&proof.proof)
        .bind(&signer.ip)
        .bind(&signer.user_agent)
        .bind(&signer.device_info)
        .fetch_optional(executor)
        .await?;
        Ok(contract)
    }

    pub async fn link_confirmation<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        profile_id: Uuid,
        process_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE contracts
            SET profile_id = $2, process_id = $3, confirmed_at = COALESCE(confirmed_at, NOW()), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(profile_id)
        .bind(process_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Regra de preço: promoção à vista vencida sem assinatura volta ao preço cheio.
    pub async fn expire_promotions<'e, E>(
        &self,
        executor: E,
        created_before: DateTime<Utc>,
        promotional: Decimal,
        standard: Decimal,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET contract_value = $3, updated_at = NOW()
            WHERE payment_method = 'avista'
              AND signature_status = 'not_signed'
              AND signed_at IS NULL
              AND contract_value = $2
              AND created_at <= $1
            "#,
        )
        .bind(created_before)
        .bind(promotional)
        .bind(standard)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    //  MODELOS E DOCUMENTOS
    // =========================================================================

    pub async fn active_template(&self, document_type: DocumentType) -> Result<Option<ContractTemplate>, AppError> {
        let template = sqlx::query_as::<_, ContractTemplate>(
            r#"
            SELECT id, name, document_type, content
            FROM contract_templates
            WHERE document_type = $1 AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(document_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    pub async fn upsert_document<'e, E>(
        &self,
        executor: E,
        contract: &Contract,
        name: &str,
        file_url: &str,
        storage_path: &str,
    ) -> Result<StoredDocument, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, StoredDocument>(
            r#"
            INSERT INTO documents (contract_id, profile_id, process_id, name, document_type, file_url, storage_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (contract_id) DO UPDATE SET
                name = EXCLUDED.name,
                file_url = EXCLUDED.file_url,
                storage_path = EXCLUDED.storage_path,
                profile_id = COALESCE(EXCLUDED.profile_id, documents.profile_id),
                process_id = COALESCE(EXCLUDED.process_id, documents.process_id),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(contract.id)
        .bind(contract.profile_id)
        .bind(contract.process_id)
        .bind(name)
        .bind(contract.document_type)
        .bind(file_url)
        .bind(storage_path)
        .fetch_one(executor)
        .await?;
        Ok(document)
    }

    pub async fn list_documents(&self, profile_id: Uuid) -> Result<Vec<StoredDocument>, AppError> {
        let documents = sqlx::query_as::<_, StoredDocument>(
            "SELECT * FROM documents WHERE profile_id = $1 ORDER BY created_at DESC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }
}
