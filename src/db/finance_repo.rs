// src/db/finance_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::map_unique_violation, error::AppError},
    models::finance::{Invoice, InvoiceStatus, NewInvoice},
};

#[derive(Clone)]
pub struct FinanceRepository {
    pool: PgPool,
}

impl FinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_invoice<'e, E>(
        &self,
        executor: E,
        data: &NewInvoice,
        contract_id: Uuid,
    ) -> Result<Invoice, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                profile_id, contract_id, description, amount, due_date, billing_type,
                installment_count, installment_value, asaas_payment_id,
                invoice_url, bank_slip_url, pix_payload, pix_qr_code
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(data.profile_id)
        .bind(contract_id)
        .bind(&data.description)
        .bind(data.amount)
        .bind(data.due_date)
        .bind(data.billing_type.as_str())
        .bind(data.installment_count as i32)
        .bind(data.installment_value)
        .bind(&data.asaas_payment_id)
        .bind(&data.invoice_url)
        .bind(&data.bank_slip_url)
        .bind(&data.pix_payload)
        .bind(&data.pix_qr_code)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "invoice.asaas_payment_id"))
    }

    pub async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    pub async fn find_by_contract(&self, contract_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE contract_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invoice)
    }

    /// Atualiza pelo id do gateway. Fatura paga não volta para outro status.
    pub async fn update_status_by_external<'e, E>(
        &self,
        executor: E,
        asaas_payment_id: &str,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices SET status = $2, paid_at = COALESCE($3, paid_at)
            WHERE asaas_payment_id = $1 AND status <> 'paid'
            RETURNING *
            "#,
        )
        .bind(asaas_payment_id)
        .bind(status)
        .bind(paid_at)
        .fetch_optional(executor)
        .await?;
        Ok(invoice)
    }

    /// Na confirmação a fatura ganha dono e processo.
    pub async fn link_to_profile<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        profile_id: Uuid,
        process_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE invoices SET profile_id = $2, process_id = $3 WHERE contract_id = $1",
        )
        .bind(contract_id)
        .bind(profile_id)
        .bind(process_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_by_profile(&self, profile_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE profile_id = $1 ORDER BY due_date DESC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }
}
