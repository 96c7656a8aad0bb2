// src/services/crm_service.rs

use uuid::Uuid;
use validator::Validate;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::{ContractRepository, CrmRepository, FinanceRepository, ProcessRepository},
    middleware::auth::AuthenticatedUser,
    models::{
        auth::UserRole,
        finance::Invoice,
        crm::{
            AssignClientPayload, ClientActivity, ClientScope, CreateActivityPayload, CreateLeadPayload, Lead,
            LeadStatus, PortalOverview, Profile,
        },
    },
};

/// Carteira visível para a sessão: admin vê tudo, equipe vê os atribuídos,
/// cliente vê só o próprio cadastro.
pub fn scope_for(user: &AuthenticatedUser) -> ClientScope {
    match user.role {
        UserRole::Admin => ClientScope::All,
        UserRole::Staff => ClientScope::AssignedTo(user.id),
        UserRole::Client => ClientScope::Own(user.id),
    }
}

pub fn can_see(scope: ClientScope, profile: &Profile) -> bool {
    match scope {
        ClientScope::All => true,
        ClientScope::AssignedTo(staff) => profile.assigned_to == Some(staff),
        ClientScope::Own(user) => profile.user_id == Some(user),
    }
}

fn status_name(status: LeadStatus) -> String {
    format!("{status:?}").to_lowercase()
}

#[derive(Clone)]
pub struct CrmService {
    pool: PgPool,
    crm_repo: CrmRepository,
    process_repo: ProcessRepository,
    contract_repo: ContractRepository,
    finance_repo: FinanceRepository,
}

impl CrmService {
    pub fn new(
        pool: PgPool,
        crm_repo: CrmRepository,
        process_repo: ProcessRepository,
        contract_repo: ContractRepository,
        finance_repo: FinanceRepository,
    ) -> Self {
        Self { pool, crm_repo, process_repo, contract_repo, finance_repo }
    }

    // =========================================================================
    //  LEADS
    // =========================================================================

    pub async fn create_lead(&self, payload: &CreateLeadPayload) -> Result<Lead, AppError> {
        payload.validate()?;
        self.crm_repo
            .create_lead(
                &self.pool,
                payload.full_name.trim(),
                payload.email.as_deref().map(str::trim),
                payload.phone.as_deref(),
                payload.brand_name.as_deref(),
                payload.origin.as_deref().unwrap_or("manual"),
                payload.estimated_value,
                payload.notes.as_deref(),
            )
            .await
    }

    pub async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>, AppError> {
        self.crm_repo.list_leads(status).await
    }

    pub async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        let lead = self
            .crm_repo
            .find_lead(&self.pool, id)
            .await?
            .ok_or(AppError::NotFound("lead"))?;

        if !lead.status.can_transition_to(status) {
            return Err(AppError::InvalidStatusTransition {
                from: status_name(lead.status),
                to: status_name(status),
            });
        }

        self.crm_repo.update_lead_status(&self.pool, id, status).await
    }

    // =========================================================================
    //  CLIENTES
    // =========================================================================

    pub async fn list_clients(&self, user: &AuthenticatedUser, search: Option<&str>) -> Result<Vec<Profile>, AppError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        self.crm_repo.list_profiles(scope_for(user), search).await
    }

    pub async fn get_client(&self, user: &AuthenticatedUser, id: Uuid) -> Result<Profile, AppError> {
        let profile = self
            .crm_repo
            .find_profile_by_id(&self.pool, id)
            .await?
            .ok_or(AppError::NotFound("profile"))?;

        // Fora da carteira responde como inexistente
        if !can_see(scope_for(user), &profile) {
            return Err(AppError::NotFound("profile"));
        }
        Ok(profile)
    }

    pub async fn assign_client(
        &self,
        actor: &AuthenticatedUser,
        id: Uuid,
        payload: &AssignClientPayload,
    ) -> Result<Profile, AppError> {
        payload.validate()?;

        let mut tx = self.pool.begin().await?;
        let profile = self
            .crm_repo
            .assign_profile(&mut *tx, id, payload.assigned_to, &payload.priority)
            .await?
            .ok_or(AppError::NotFound("profile"))?;

        let metadata = serde_json::json!({
            "assignedTo": payload.assigned_to,
            "priority": payload.priority,
            "by": actor.id,
        });
        self.crm_repo
            .insert_activity(&mut *tx, Some(profile.id), "atribuicao", "Responsável/prioridade alterados", Some(&metadata))
            .await?;
        tx.commit().await?;

        tracing::info!(profile_id = %profile.id, by = %actor.id, "Cliente atribuído");
        Ok(profile)
    }

    pub async fn add_activity(
        &self,
        user: &AuthenticatedUser,
        profile_id: Uuid,
        payload: &CreateActivityPayload,
    ) -> Result<ClientActivity, AppError> {
        payload.validate()?;
        let profile = self.get_client(user, profile_id).await?;
        self.crm_repo
            .insert_activity(
                &self.pool,
                Some(profile.id),
                payload.activity_type.trim(),
                payload.description.trim(),
                payload.metadata.as_ref(),
            )
            .await
    }

    pub async fn list_activities(&self, user: &AuthenticatedUser, profile_id: Uuid) -> Result<Vec<ClientActivity>, AppError> {
        let profile = self.get_client(user, profile_id).await?;
        self.crm_repo.list_activities(profile.id).await
    }

    // =========================================================================
    //  ÁREA DO CLIENTE
    // =========================================================================

    async fn own_profile(&self, user: &AuthenticatedUser) -> Result<Profile, AppError> {
        self.crm_repo
            .find_profile_by_user(user.id)
            .await?
            .ok_or(AppError::NotFound("profile"))
    }

    pub async fn portal_overview(&self, user: &AuthenticatedUser) -> Result<PortalOverview, AppError> {
        let profile = self.own_profile(user).await?;

        let scope = ClientScope::Own(user.id);
        let processes = self.process_repo.list(scope).await?;
        let contracts = self.contract_repo.list(scope).await?;
        let invoices = self.finance_repo.list_by_profile(profile.id).await?;
        let documents = self.contract_repo.list_documents(profile.id).await?;

        Ok(PortalOverview { profile, processes, contracts, invoices, documents })
    }

    pub async fn portal_invoices(&self, user: &AuthenticatedUser) -> Result<Vec<Invoice>, AppError> {
        let profile = self.own_profile(user).await?;
        self.finance_repo.list_by_profile(profile.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser { id: Uuid::new_v4(), email: "x@webmarcas.net".into(), role }
    }

    fn profile(user_id: Option<Uuid>, assigned_to: Option<Uuid>) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            user_id,
            full_name: "Maria".into(),
            email: "maria@email.com".into(),
            phone: None,
            cpf_cnpj: None,
            company_name: None,
            address: None,
            neighborhood: None,
            city: None,
            state: None,
            zip_code: None,
            origin: None,
            priority: "normal".into(),
            assigned_to,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn scope_follows_role() {
        let admin = session(UserRole::Admin);
        let staff = session(UserRole::Staff);
        let client = session(UserRole::Client);

        assert!(matches!(scope_for(&admin), ClientScope::All));
        assert!(matches!(scope_for(&staff), ClientScope::AssignedTo(id) if id == staff.id));
        assert!(matches!(scope_for(&client), ClientScope::Own(id) if id == client.id));
    }

    #[test]
    fn visibility_rules() {
        let staff = session(UserRole::Staff);
        let client = session(UserRole::Client);

        let assigned = profile(None, Some(staff.id));
        let someone_else = profile(Some(Uuid::new_v4()), Some(Uuid::new_v4()));
        let own = profile(Some(client.id), None);

        assert!(can_see(ClientScope::All, &someone_else));
        assert!(can_see(scope_for(&staff), &assigned));
        assert!(!can_see(scope_for(&staff), &someone_else));
        assert!(can_see(scope_for(&client), &own));
        assert!(!can_see(scope_for(&client), &assigned));
    }

    #[test]
    fn lead_status_names_match_the_database() {
        assert_eq!(status_name(LeadStatus::Negociacao), "negociacao");
        assert_eq!(status_name(LeadStatus::Convertido), "convertido");
    }
}
