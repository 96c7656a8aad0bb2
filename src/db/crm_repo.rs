// src/db/crm_repo.rs

use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::map_unique_violation, error::AppError},
    models::crm::{ClientActivity, ClientScope, Lead, LeadStatus, NewProfile, Profile},
};

#[derive(Clone)]
pub struct CrmRepository {
    pool: PgPool,
}

impl CrmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  LEADS
    // =========================================================================

    pub async fn create_lead<'e, E>(
        &self,
        executor: E,
        full_name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        brand_name: Option<&str>,
        origin: &str,
        estimated_value: Option<Decimal>,
        notes: Option<&str>,
    ) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (full_name, email, phone, brand_name, origin, estimated_value, notes)
            VALUES ($1, lower($2), $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(full_name)
        .bind(email)
        .bind(phone)
        .bind(brand_name)
        .bind(origin)
        .bind(estimated_value)
        .bind(notes)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "lead.email"))
    }

    /// Cria ou atualiza o lead do checkout pelo e-mail. O status não é tocado.
    pub async fn upsert_lead_by_email<'e, E>(
        &self,
        executor: E,
        full_name: &str,
        email: &str,
        phone: Option<&str>,
        cpf_cnpj: Option<&str>,
        brand_name: Option<&str>,
        estimated_value: Option<Decimal>,
    ) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (full_name, email, phone, cpf_cnpj, brand_name, origin, estimated_value)
            VALUES ($1, lower($2), $3, $4, $5, 'checkout', $6)
            ON CONFLICT ((lower(email))) WHERE email IS NOT NULL
            DO UPDATE SET
                full_name = EXCLUDED.full_name,
                phone = COALESCE(EXCLUDED.phone, leads.phone),
                cpf_cnpj = COALESCE(EXCLUDED.cpf_cnpj, leads.cpf_cnpj),
                brand_name = COALESCE(EXCLUDED.brand_name, leads.brand_name),
                estimated_value = COALESCE(EXCLUDED.estimated_value, leads.estimated_value),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(full_name)
        .bind(email)
        .bind(phone)
        .bind(cpf_cnpj)
        .bind(brand_name)
        .bind(estimated_value)
        .fetch_one(executor)
        .await?;
        Ok(lead)
    }

    pub async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE ($1::lead_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(leads)
    }

    pub async fn find_lead<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Lead>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(lead)
    }

    pub async fn update_lead_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lead = sqlx::query_as::<_, Lead>(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(executor)
        .await?;
        Ok(lead)
    }

    /// Marca o lead como convertido e aponta para o cliente criado.
    pub async fn convert_lead<'e, E>(&self, executor: E, id: Uuid, profile_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = 'convertido', converted_profile_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(profile_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    //  CLIENTES (profiles)
    // =========================================================================

    pub async fn find_profile_by_email<'e, E>(&self, executor: E, email: &str) -> Result<Option<Profile>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(executor)
            .await?;
        Ok(profile)
    }

    pub async fn find_profile_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Profile>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(profile)
    }

    pub async fn find_profile_by_user(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    pub async fn insert_profile<'e, E>(
        &self,
        executor: E,
        data: &NewProfile,
        user_id: Option<Uuid>,
    ) -> Result<Profile, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (
                user_id, full_name, email, phone, cpf_cnpj, company_name,
                address, neighborhood, city, state, zip_code, origin, priority
            )
            VALUES ($1, $2, lower($3), $4, $5, $6, $7, $8, $9, $10, $11, $12, COALESCE($13, 'normal'))
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&data.full_name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.cpf_cnpj)
        .bind(&data.company_name)
        .bind(&data.address)
        .bind(&data.neighborhood)
        .bind(&data.city)
        .bind(&data.state)
        .bind(&data.zip_code)
        .bind(&data.origin)
        .bind(&data.priority)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "profile.email"))
    }

    /// Atualiza apenas os campos informados; os vazios mantêm o valor atual.
    pub async fn update_profile<'e, E>(&self, executor: E, id: Uuid, data: &NewProfile) -> Result<Profile, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                full_name = COALESCE(NULLIF($2, ''), full_name),
                phone = COALESCE($3, phone),
                cpf_cnpj = COALESCE($4, cpf_cnpj),
                company_name = COALESCE($5, company_name),
                address = COALESCE($6, address),
                neighborhood = COALESCE($7, neighborhood),
                city = COALESCE($8, city),
                state = COALESCE($9, state),
                zip_code = COALESCE($10, zip_code),
                origin = COALESCE($11, origin),
                priority = COALESCE($12, priority),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.full_name)
        .bind(&data.phone)
        .bind(&data.cpf_cnpj)
        .bind(&data.company_name)
        .bind(&data.address)
        .bind(&data.neighborhood)
        .bind(&data.city)
        .bind(&data.state)
        .bind(&data.zip_code)
        .bind(&data.origin)
        .bind(&data.priority)
        .fetch_one(executor)
        .await?;
        Ok(profile)
    }

    pub async fn link_profile_user<'e, E>(&self, executor: E, profile_id: Uuid, user_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE profiles SET user_id = $2, updated_at = NOW() WHERE id = $1 AND user_id IS NULL")
            .bind(profile_id)
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn list_profiles(&self, scope: ClientScope, search: Option<&str>) -> Result<Vec<Profile>, AppError> {
        let (assigned_to, owner) = scope_filters(scope);
        let pattern = search.map(|s| format!("%{}%", s.trim()));

        let profiles = sqlx::query_as::<_, Profile>(
            r#"
            SELECT * FROM profiles
            WHERE ($1::uuid IS NULL OR assigned_to = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR full_name ILIKE $3 OR email ILIKE $3 OR cpf_cnpj ILIKE $3)
            ORDER BY full_name
            "#,
        )
        .bind(assigned_to)
        .bind(owner)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    pub async fn assign_profile<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        assigned_to: Option<Uuid>,
        priority: &str,
    ) -> Result<Option<Profile>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET assigned_to = $2, priority = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(assigned_to)
        .bind(priority)
        .fetch_optional(executor)
        .await?;
        Ok(profile)
    }

    // =========================================================================
    //  HISTÓRICO
    // =========================================================================

    pub async fn insert_activity<'e, E>(
        &self,
        executor: E,
        profile_id: Option<Uuid>,
        activity_type: &str,
        description: &str,
        metadata: Option<&Value>,
    ) -> Result<ClientActivity, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let activity = sqlx::query_as::<_, ClientActivity>(
            r#"
            INSERT INTO client_activities (profile_id, activity_type, description, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(activity_type)
        .bind(description)
        .bind(metadata)
        .fetch_one(executor)
        .await?;
        Ok(activity)
    }

    pub async fn list_activities(&self, profile_id: Uuid) -> Result<Vec<ClientActivity>, AppError> {
        let activities = sqlx::query_as::<_, ClientActivity>(
            "SELECT * FROM client_activities WHERE profile_id = $1 ORDER BY created_at DESC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(activities)
    }
}

/// (assigned_to, user_id) usados nos filtros de carteira.
pub(crate) fn scope_filters(scope: ClientScope) -> (Option<Uuid>, Option<Uuid>) {
    match scope {
        ClientScope::All => (None, None),
        ClientScope::AssignedTo(staff) => (Some(staff), None),
        ClientScope::Own(user) => (None, Some(user)),
    }
}
