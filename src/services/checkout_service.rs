// src/services/checkout_service.rs

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text},
    db::CrmRepository,
    models::{
        checkout::{AdvanceCheckoutRequest, CheckoutSession, CheckoutSubmission, SubmitCheckoutRequest},
        finance::PaymentResponse,
    },
    services::payment_service::{CreatePaymentCommand, PaymentService},
};

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Cria ou atualiza o lead pelo e-mail e devolve o id.
    async fn upsert_checkout_lead(&self, submission: &CheckoutSubmission) -> Result<Uuid, AppError>;
}

pub struct PgLeadStore {
    pool: PgPool,
    crm_repo: CrmRepository,
}

impl PgLeadStore {
    pub fn new(pool: PgPool, crm_repo: CrmRepository) -> Self {
        Self { pool, crm_repo }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn upsert_checkout_lead(&self, submission: &CheckoutSubmission) -> Result<Uuid, AppError> {
        let personal = &submission.personal_data;
        let tax_id = text::only_digits(&personal.cpf_cnpj);
        let lead = self
            .crm_repo
            .upsert_lead_by_email(
                &self.pool,
                personal.full_name.trim(),
                personal.email.trim(),
                Some(personal.phone.as_str()),
                Some(tax_id.as_str()),
                Some(submission.brand_data.brand_name.as_str()),
                Some(submission.payment.value),
            )
            .await?;
        Ok(lead.id)
    }
}

/// Wizard sem estado no servidor: a sessão vai e volta com o cliente.
#[derive(Clone)]
pub struct CheckoutService {
    leads: Arc<dyn LeadStore>,
    payments: PaymentService,
}

impl CheckoutService {
    pub fn new(leads: Arc<dyn LeadStore>, payments: PaymentService) -> Self {
        Self { leads, payments }
    }

    pub fn start(&self) -> CheckoutSession {
        CheckoutSession::new()
    }

    pub fn advance(&self, req: AdvanceCheckoutRequest) -> Result<CheckoutSession, AppError> {
        req.session.advance(req.input)
    }

    pub fn back(&self, session: &CheckoutSession) -> Result<CheckoutSession, AppError> {
        session.back()
    }

    /// Único ponto de escrita do checkout: lead + cobrança.
    pub async fn submit(&self, req: SubmitCheckoutRequest) -> Result<PaymentResponse, AppError> {
        let submission = req.session.submission()?;
        let lead_id = self.leads.upsert_checkout_lead(&submission).await?;
        tracing::info!(%lead_id, brand = %submission.brand_data.brand_name, "🛒 Checkout enviado");

        self.payments
            .create_payment(CreatePaymentCommand {
                lead_id: Some(lead_id),
                personal_data: submission.personal_data,
                brand_data: submission.brand_data,
                payment_method: submission.payment.method,
                payment_value: submission.payment.value,
                contract_html: req.contract_html,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::{fixtures, CheckoutStep, StepInput};
    use crate::services::notification_service::fakes::{service as notifications, MemoryLedger, MemoryMailer};
    use crate::services::payment_service::{
        fakes::{MemoryChargeStore, MemoryConfirmationStore, MemoryGateway},
        PaymentSettings,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLeads {
        upserts: Mutex<Vec<(String, Uuid)>>,
    }

    #[async_trait]
    impl LeadStore for MemoryLeads {
        async fn upsert_checkout_lead(&self, submission: &CheckoutSubmission) -> Result<Uuid, AppError> {
            let id = Uuid::new_v4();
            self.upserts
                .lock()
                .unwrap()
                .push((submission.personal_data.email.clone(), id));
            Ok(id)
        }
    }

    fn checkout() -> (CheckoutService, Arc<MemoryLeads>, Arc<MemoryGateway>, Arc<MemoryChargeStore>) {
        let leads = Arc::new(MemoryLeads::default());
        let gateway = Arc::new(MemoryGateway::default());
        let charges = Arc::new(MemoryChargeStore::default());
        let payments = PaymentService::new(
            gateway.clone(),
            charges.clone(),
            Arc::new(MemoryConfirmationStore::default()),
            notifications(Arc::new(MemoryMailer::default()), Arc::new(MemoryLedger::default())),
            PaymentSettings {
                due_days: 3,
                card_timeout: std::time::Duration::from_secs(60),
                token_ttl: chrono::Duration::days(7),
                public_base_url: "https://webmarcas.net".into(),
            },
        );
        (CheckoutService::new(leads.clone(), payments), leads, gateway, charges)
    }

    #[test]
    fn advance_and_back_are_pure() {
        let (svc, ..) = checkout();
        let start = svc.start();
        let next = svc
            .advance(AdvanceCheckoutRequest { session: start.clone(), input: StepInput::Viability(fixtures::viability()) })
            .unwrap();

        assert_eq!(start.step, CheckoutStep::Viability);
        assert_eq!(next.step, CheckoutStep::PersonalData);
        assert_eq!(next.brand_data.as_ref().unwrap().brand_name, "Café Bom");

        let back = svc.back(&next).unwrap();
        assert_eq!(back.step, CheckoutStep::Viability);
        assert!(back.viability.is_some());
        assert!(matches!(svc.back(&back), Err(AppError::NoPreviousStep)));
    }

    #[tokio::test]
    async fn submit_records_lead_before_charging() {
        let (svc, leads, gateway, charges) = checkout();

        let response = svc
            .submit(SubmitCheckoutRequest { session: fixtures::completed_session(), contract_html: None })
            .await
            .unwrap();

        let upserts = leads.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].0, "maria@email.com");
        assert_eq!(response.lead_id, Some(upserts[0].1));
        assert_eq!(gateway.charges.lock().unwrap().len(), 1);
        assert_eq!(charges.contracts.lock().unwrap()[0].lead_id, Some(upserts[0].1));
    }

    #[tokio::test]
    async fn incomplete_session_writes_nothing() {
        let (svc, leads, gateway, _) = checkout();
        let halfway = svc
            .advance(AdvanceCheckoutRequest {
                session: CheckoutSession::new(),
                input: StepInput::Viability(fixtures::viability()),
            })
            .unwrap();

        let err = svc
            .submit(SubmitCheckoutRequest { session: halfway, contract_html: None })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidStepTransition { .. }));
        assert!(leads.upserts.lock().unwrap().is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn custom_contract_html_is_kept() {
        let (svc, _, _, charges) = checkout();

        svc.submit(SubmitCheckoutRequest {
            session: fixtures::completed_session(),
            contract_html: Some("<p>Contrato revisado</p>".into()),
        })
        .await
        .unwrap();

        assert_eq!(
            charges.contracts.lock().unwrap()[0].contract_html.as_deref(),
            Some("<p>Contrato revisado</p>")
        );
    }
}
