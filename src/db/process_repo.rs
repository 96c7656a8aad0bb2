// src/db/process_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::crm_repo::scope_filters,
    models::{
        crm::ClientScope,
        process::{BrandProcess, ProcessEvent, ProcessExportRow, ProcessStatus},
    },
};

#[derive(Clone)]
pub struct ProcessRepository {
    pool: PgPool,
}

impl ProcessRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Um processo por contrato. Se já existir, devolve None (ON CONFLICT DO NOTHING).
    pub async fn create_for_contract<'e, E>(
        &self,
        executor: E,
        profile_id: Uuid,
        contract_id: Uuid,
        brand_name: &str,
        business_area: Option<&str>,
    ) -> Result<Option<BrandProcess>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>(
            r#"
            INSERT INTO brand_processes (profile_id, contract_id, brand_name, business_area)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contract_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(contract_id)
        .bind(brand_name)
        .bind(business_area)
        .fetch_optional(executor)
        .await?;
        Ok(process)
    }

    pub async fn find_by_contract<'e, E>(&self, executor: E, contract_id: Uuid) -> Result<Option<BrandProcess>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>("SELECT * FROM brand_processes WHERE contract_id = $1")
            .bind(contract_id)
            .fetch_optional(executor)
            .await?;
        Ok(process)
    }

    /// Processo vindo de importação (sem contrato).
    pub async fn create_imported<'e, E>(
        &self,
        executor: E,
        profile_id: Uuid,
        brand_name: &str,
        business_area: Option<&str>,
        process_number: Option<&str>,
    ) -> Result<BrandProcess, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>(
            r#"
            INSERT INTO brand_processes (profile_id, brand_name, business_area, process_number)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(brand_name)
        .bind(business_area)
        .bind(process_number)
        .fetch_one(executor)
        .await?;
        Ok(process)
    }

    pub async fn find_by_profile_and_brand<'e, E>(
        &self,
        executor: E,
        profile_id: Uuid,
        brand_name: &str,
    ) -> Result<Option<BrandProcess>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>(
            "SELECT * FROM brand_processes WHERE profile_id = $1 AND lower(brand_name) = lower($2) LIMIT 1",
        )
        .bind(profile_id)
        .bind(brand_name)
        .fetch_optional(executor)
        .await?;
        Ok(process)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<BrandProcess>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>("SELECT * FROM brand_processes WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(process)
    }

    /// Trava a linha até o fim da transação.
    pub async fn lock_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<BrandProcess>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>("SELECT * FROM brand_processes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(process)
    }

    pub async fn list(&self, scope: ClientScope) -> Result<Vec<BrandProcess>, AppError> {
        let (assigned_to, owner) = scope_filters(scope);
        let processes = sqlx::query_as::<_, BrandProcess>(
            r#"
            SELECT bp.*
            FROM brand_processes bp
            LEFT JOIN profiles p ON p.id = bp.profile_id
            WHERE ($1::uuid IS NULL OR p.assigned_to = $1)
              AND ($2::uuid IS NULL OR p.user_id = $2)
            ORDER BY bp.created_at DESC
            "#,
        )
        .bind(assigned_to)
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(processes)
    }

    pub async fn find_by_numbers(&self, numbers: &[String]) -> Result<Vec<BrandProcess>, AppError> {
        let processes = sqlx::query_as::<_, BrandProcess>(
            "SELECT * FROM brand_processes WHERE process_number = ANY($1)",
        )
        .bind(numbers)
        .fetch_all(&self.pool)
        .await?;
        Ok(processes)
    }

    pub async fn update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: ProcessStatus,
        process_number: Option<&str>,
        notes: Option<&str>,
    ) -> Result<BrandProcess, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let process = sqlx::query_as::<_, BrandProcess>(
            r#"
            UPDATE brand_processes SET
                status = $2,
                process_number = COALESCE($3, process_number),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(process_number)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(process)
    }

    pub async fn insert_event<'e, E>(
        &self,
        executor: E,
        process_id: Uuid,
        rpi_number: Option<&str>,
        dispatch_text: &str,
        previous_status: ProcessStatus,
        new_status: ProcessStatus,
    ) -> Result<ProcessEvent, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let event = sqlx::query_as::<_, ProcessEvent>(
            r#"
            INSERT INTO process_events (process_id, rpi_number, dispatch_text, previous_status, new_status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(process_id)
        .bind(rpi_number)
        .bind(dispatch_text)
        .bind(previous_status)
        .bind(new_status)
        .fetch_one(executor)
        .await?;
        Ok(event)
    }

    pub async fn list_events(&self, process_id: Uuid) -> Result<Vec<ProcessEvent>, AppError> {
        let events = sqlx::query_as::<_, ProcessEvent>(
            "SELECT * FROM process_events WHERE process_id = $1 ORDER BY created_at DESC",
        )
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn list_for_export(&self) -> Result<Vec<ProcessExportRow>, AppError> {
        let rows = sqlx::query_as::<_, ProcessExportRow>(
            r#"
            SELECT
                bp.process_number, bp.brand_name, bp.business_area, bp.status,
                p.full_name AS client_name, p.email AS client_email, bp.created_at
            FROM brand_processes bp
            LEFT JOIN profiles p ON p.id = bp.profile_id
            ORDER BY bp.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
