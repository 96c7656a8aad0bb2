// src/services/payment_service.rs
//
// Cobrança no gateway, gravação do contrato/fatura, confirmação pós-pagamento
// (usuário + perfil + processo) e sincronização de status.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{error::AppError, text},
    db::{ContractRepository, CrmRepository, FinanceRepository, ProcessRepository, UserRepository},
    integrations::{
        asaas::{is_paid_status, BillingGateway, ChargeRequest, NewCustomer},
        ProviderError,
    },
    models::{
        auth::UserRole,
        checkout::{BrandData, ConfirmCheckoutRequest, PersonalData},
        contract::{Contract, DocumentType, NewContract},
        crm::{Lead, NewProfile, Profile},
        finance::{
            installment_value, BillingType, ConfirmationResponse, Invoice, InvoiceStatus, NewInvoice, PaymentMethod,
            PaymentResponse, PaymentStatusResponse, WebhookAck, WebhookEvent,
        },
        notification::{Channel, TemplateKey},
    },
    services::{
        auth::hash_password,
        contract_service::{brand_from_subject, checkout_contract_html, signature_url},
        notification_service::{NotificationService, Recipient},
    },
};

/// Status do gateway -> status da fatura. None para os que não mudam nada (PENDING etc).
pub fn invoice_status_from_provider(status: &str) -> Option<InvoiceStatus> {
    if is_paid_status(status) {
        return Some(InvoiceStatus::Paid);
    }
    match status {
        "OVERDUE" => Some(InvoiceStatus::Overdue),
        "REFUNDED" | "DELETED" | "REFUND_REQUESTED" => Some(InvoiceStatus::Cancelled),
        _ => None,
    }
}

fn temporary_password() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

// --- ENTRADAS ---

#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub lead_id: Option<Uuid>,
    pub personal_data: PersonalData,
    pub brand_data: BrandData,
    pub payment_method: PaymentMethod,
    pub payment_value: Decimal,
    pub contract_html: Option<String>,
}

/// Tudo o que a confirmação grava numa transação.
#[derive(Debug, Clone)]
pub struct Provisioning {
    pub contract_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub profile: NewProfile,
    pub password_hash: String,
    pub brand_name: String,
    pub business_area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub process_id: Uuid,
    pub user_created: bool,
    pub process_created: bool,
}

// --- PERSISTÊNCIA ---

#[async_trait]
pub trait ChargeStore: Send + Sync {
    /// Contrato e fatura entram juntos ou nenhum entra.
    async fn record_charge(&self, contract: NewContract, invoice: NewInvoice) -> Result<(Contract, Invoice), AppError>;
    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn find_contract_invoice(&self, contract_id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn update_invoice_status(
        &self,
        external_id: &str,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError>;
    async fn payer_contact(&self, invoice: &Invoice) -> Result<Option<Recipient>, AppError>;
}

#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    async fn find_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError>;
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError>;
    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError>;
    async fn provision(&self, data: Provisioning) -> Result<ProvisionOutcome, AppError>;
}

pub struct PgChargeStore {
    pool: PgPool,
    contract_repo: ContractRepository,
    finance_repo: FinanceRepository,
    crm_repo: CrmRepository,
}

impl PgChargeStore {
    pub fn new(
        pool: PgPool,
        contract_repo: ContractRepository,
        finance_repo: FinanceRepository,
        crm_repo: CrmRepository,
    ) -> Self {
        Self { pool, contract_repo, finance_repo, crm_repo }
    }
}

#[async_trait]
impl ChargeStore for PgChargeStore {
    async fn record_charge(&self, contract: NewContract, invoice: NewInvoice) -> Result<(Contract, Invoice), AppError> {
        let mut tx = self.pool.begin().await?;
        let contract = self.contract_repo.insert(&mut *tx, &contract).await?;
        let invoice = self
            .finance_repo
            .insert_invoice(&mut *tx, &invoice, contract.id)
            .await?;
        tx.commit().await?;
        Ok((contract, invoice))
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.finance_repo.find_invoice(id).await
    }

    async fn find_contract_invoice(&self, contract_id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.finance_repo.find_by_contract(contract_id).await
    }

    async fn update_invoice_status(
        &self,
        external_id: &str,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError> {
        self.finance_repo
            .update_status_by_external(&self.pool, external_id, status, paid_at)
            .await
    }

    async fn payer_contact(&self, invoice: &Invoice) -> Result<Option<Recipient>, AppError> {
        if let Some(profile_id) = invoice.profile_id {
            let profile = self.crm_repo.find_profile_by_id(&self.pool, profile_id).await?;
            return Ok(profile.map(|p| Recipient {
                profile_id: Some(p.id),
                name: p.full_name,
                email: Some(p.email),
                phone: p.phone,
            }));
        }

        // Antes da confirmação só existe o lead do checkout
        let Some(contract_id) = invoice.contract_id else {
            return Ok(None);
        };
        let Some(lead_id) = self
            .contract_repo
            .find_by_id(&self.pool, contract_id)
            .await?
            .and_then(|c| c.lead_id)
        else {
            return Ok(None);
        };
        let lead = self.crm_repo.find_lead(&self.pool, lead_id).await?;
        Ok(lead.map(|l| Recipient { profile_id: None, name: l.full_name, email: l.email, phone: l.phone }))
    }
}

pub struct PgConfirmationStore {
    pool: PgPool,
    user_repo: UserRepository,
    crm_repo: CrmRepository,
    process_repo: ProcessRepository,
    contract_repo: ContractRepository,
    finance_repo: FinanceRepository,
}

impl PgConfirmationStore {
    pub fn new(
        pool: PgPool,
        user_repo: UserRepository,
        crm_repo: CrmRepository,
        process_repo: ProcessRepository,
        contract_repo: ContractRepository,
        finance_repo: FinanceRepository,
    ) -> Self {
        Self { pool, user_repo, crm_repo, process_repo, contract_repo, finance_repo }
    }
}

#[async_trait]
impl ConfirmationStore for PgConfirmationStore {
    async fn find_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
        self.contract_repo.find_by_id(&self.pool, id).await
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        self.crm_repo.find_profile_by_id(&self.pool, id).await
    }

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        self.crm_repo.find_lead(&self.pool, id).await
    }

    async fn provision(&self, data: Provisioning) -> Result<ProvisionOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        let email = data.profile.email.as_str();

        let (user, user_created) = match self.user_repo.find_by_email(&mut *tx, email).await? {
            Some(user) => (user, false),
            None => {
                let user = self
                    .user_repo
                    .create_user(&mut *tx, email, &data.password_hash, UserRole::Client)
                    .await?;
                (user, true)
            }
        };

        // Perfil existente é só vinculado; o cadastro dele não muda aqui
        let profile = match self.crm_repo.find_profile_by_email(&mut *tx, email).await? {
            Some(existing) if existing.user_id.is_some() => existing,
            Some(mut existing) => {
                self.crm_repo.link_profile_user(&mut *tx, existing.id, user.id).await?;
                existing.user_id = Some(user.id);
                existing
            }
            None => self.crm_repo.insert_profile(&mut *tx, &data.profile, Some(user.id)).await?,
        };

        let created = self
            .process_repo
            .create_for_contract(&mut *tx, profile.id, data.contract_id, &data.brand_name, data.business_area.as_deref())
            .await?;
        let (process, process_created) = match created {
            Some(process) => (process, true),
            None => {
                let existing = self
                    .process_repo
                    .find_by_contract(&mut *tx, data.contract_id)
                    .await?
                    .ok_or(AppError::NotFound("process"))?;
                (existing, false)
            }
        };

        if let Some(lead_id) = data.lead_id {
            self.crm_repo.convert_lead(&mut *tx, lead_id, profile.id).await?;
        }
        self.contract_repo
            .link_confirmation(&mut *tx, data.contract_id, profile.id, process.id)
            .await?;
        self.finance_repo
            .link_to_profile(&mut *tx, data.contract_id, profile.id, process.id)
            .await?;

        if process_created {
            let metadata = json!({ "contractId": data.contract_id, "processId": process.id });
            self.crm_repo
                .insert_activity(
                    &mut *tx,
                    Some(profile.id),
                    "contrato_confirmado",
                    &format!("Processo da marca {} aberto após o pagamento", data.brand_name),
                    Some(&metadata),
                )
                .await?;
        }

        tx.commit().await?;

        Ok(ProvisionOutcome {
            user_id: profile.user_id.unwrap_or(user.id),
            profile_id: profile.id,
            process_id: process.id,
            user_created,
            process_created,
        })
    }
}

// --- SERVIÇO ---

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub due_days: i64,
    pub card_timeout: std::time::Duration,
    pub token_ttl: chrono::Duration,
    pub public_base_url: String,
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn BillingGateway>,
    charges: Arc<dyn ChargeStore>,
    confirmations: Arc<dyn ConfirmationStore>,
    notifications: NotificationService,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        charges: Arc<dyn ChargeStore>,
        confirmations: Arc<dyn ConfirmationStore>,
        notifications: NotificationService,
        settings: PaymentSettings,
    ) -> Self {
        Self { gateway, charges, confirmations, notifications, settings }
    }

    /// Cria a cobrança no gateway e só então grava contrato + fatura.
    /// Se o gateway falhar nada é gravado.
    pub async fn create_payment(&self, cmd: CreatePaymentCommand) -> Result<PaymentResponse, AppError> {
        cmd.personal_data.validate()?;
        cmd.brand_data.validate()?;
        if cmd.payment_value != cmd.payment_method.list_price() {
            return Err(AppError::PriceMismatch);
        }

        let tax_id = text::only_digits(&cmd.personal_data.cpf_cnpj);
        if tax_id.is_empty() {
            return Err(AppError::MissingIdentifier("cpfCnpj"));
        }

        let customer_id = self.customer_for(&cmd.personal_data, &tax_id).await?;
        if customer_id.trim().is_empty() {
            return Err(AppError::MissingIdentifier("customer"));
        }

        let method = cmd.payment_method;
        let billing_type = method.billing_type();
        let installments = method.installments();
        let per_installment = installment_value(cmd.payment_value, installments);
        let now = Utc::now();
        let due_date = now.date_naive() + chrono::Duration::days(self.settings.due_days);
        let description = format!("Registro de marca: {}", cmd.brand_data.brand_name);

        let request = ChargeRequest::new(
            customer_id,
            billing_type,
            cmd.payment_value,
            installments,
            per_installment,
            due_date,
            description.clone(),
        );

        let charge = match billing_type {
            BillingType::CreditCard => tokio::time::timeout(self.settings.card_timeout, self.gateway.create_charge(&request))
                .await
                .map_err(|_| ProviderError::Timeout)??,
            _ => self.gateway.create_charge(&request).await?,
        };
        tracing::info!(charge_id = %charge.id, billing_type = billing_type.as_str(), "💳 Cobrança criada");

        let (pix_payload, pix_qr_code) = if billing_type == BillingType::Pix {
            match self.gateway.pix_qr_code(&charge.id).await {
                Ok(qr) => (Some(qr.payload), Some(qr.encoded_image)),
                Err(e) => {
                    tracing::warn!(charge_id = %charge.id, "QR code PIX indisponível: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let contract_html = cmd
            .contract_html
            .filter(|html| !html.trim().is_empty())
            .unwrap_or_else(|| {
                checkout_contract_html(&cmd.personal_data, &cmd.brand_data, method, cmd.payment_value, now.date_naive())
            });

        let token = Uuid::new_v4();
        let new_contract = NewContract {
            lead_id: cmd.lead_id,
            profile_id: None,
            document_type: DocumentType::Contract,
            subject: description.clone(),
            contract_value: cmd.payment_value,
            payment_method: method,
            contract_html: Some(contract_html),
            signature_token: token,
            signature_expires_at: now + self.settings.token_ttl,
            asaas_payment_id: charge.id.clone(),
        };
        let new_invoice = NewInvoice {
            profile_id: None,
            description,
            amount: cmd.payment_value,
            due_date,
            billing_type,
            installment_count: installments,
            installment_value: per_installment,
            asaas_payment_id: charge.id.clone(),
            invoice_url: charge.invoice_url.clone(),
            bank_slip_url: charge.bank_slip_url.clone(),
            pix_payload,
            pix_qr_code,
        };

        let (contract, invoice) = self
            .charges
            .record_charge(new_contract, new_invoice)
            .await
            .inspect_err(|e| tracing::error!(charge_id = %charge.id, "Cobrança criada mas não gravada: {:?}", e))?;

        Ok(PaymentResponse {
            lead_id: cmd.lead_id,
            contract_id: contract.id,
            invoice_id: invoice.id,
            payment_id: charge.id,
            billing_type,
            value: cmd.payment_value,
            installment_count: installments,
            installment_value: per_installment,
            due_date,
            invoice_url: invoice.invoice_url,
            bank_slip_url: invoice.bank_slip_url,
            pix_payload: invoice.pix_payload,
            pix_qr_code: invoice.pix_qr_code,
            signature_url: signature_url(&self.settings.public_base_url, token),
        })
    }

    async fn customer_for(&self, personal: &PersonalData, tax_id: &str) -> Result<String, AppError> {
        if let Some(existing) = self.gateway.find_customer(tax_id).await? {
            return Ok(existing.id);
        }

        let customer = NewCustomer {
            name: personal.full_name.trim().to_string(),
            email: personal.email.trim().to_lowercase(),
            cpf_cnpj: tax_id.to_string(),
            mobile_phone: Some(text::only_digits(&personal.phone)),
            postal_code: Some(text::only_digits(&personal.cep)),
            address: Some(personal.address.clone()),
            address_number: Some(personal.number.clone()),
            complement: personal.complement.clone(),
            province: Some(personal.neighborhood.clone()),
        };
        let created = self.gateway.create_customer(&customer).await?;
        tracing::info!(customer_id = %created.id, "Cliente criado no gateway");
        Ok(created.id)
    }

    /// Pós-pagamento: cria acesso do cliente e abre o processo. Repetir é seguro.
    /// A fatura do contrato precisa estar paga; a identidade vem do lead gravado no checkout.
    pub async fn confirm(&self, req: ConfirmCheckoutRequest) -> Result<ConfirmationResponse, AppError> {
        req.personal_data.validate()?;
        req.brand_data.validate()?;
        if req.payment_value != req.payment_method.list_price() {
            return Err(AppError::PriceMismatch);
        }

        let contract = self
            .confirmations
            .find_contract(req.contract_id)
            .await?
            .ok_or(AppError::NotFound("contract"))?;

        if let (Some(profile_id), Some(process_id)) = (contract.profile_id, contract.process_id) {
            let profile = self
                .confirmations
                .find_profile(profile_id)
                .await?
                .ok_or(AppError::NotFound("profile"))?;
            let user_id = profile.user_id.ok_or(AppError::UserNotFound)?;
            tracing::info!(contract_id = %contract.id, "Confirmação repetida, nada a fazer");
            return Ok(ConfirmationResponse {
                user_id,
                profile_id,
                process_id,
                contract_id: contract.id,
                already_confirmed: true,
            });
        }

        self.ensure_paid(contract.id).await?;

        let lead = match contract.lead_id {
            Some(lead_id) => self.confirmations.find_lead(lead_id).await?,
            None => None,
        };

        let personal = &req.personal_data;
        let password = temporary_password();
        let password_hash = hash_password(password.clone()).await?;

        let profile = NewProfile {
            full_name: lead
                .as_ref()
                .map(|l| l.full_name.trim().to_string())
                .unwrap_or_else(|| personal.full_name.trim().to_string()),
            email: lead
                .as_ref()
                .and_then(|l| l.email.as_deref())
                .unwrap_or(personal.email.as_str())
                .trim()
                .to_lowercase(),
            phone: lead
                .as_ref()
                .and_then(|l| l.phone.clone())
                .or_else(|| Some(personal.phone.clone())),
            cpf_cnpj: lead
                .as_ref()
                .and_then(|l| l.cpf_cnpj.clone())
                .or_else(|| Some(personal.cpf_cnpj.clone())),
            company_name: req.brand_data.company_name.clone(),
            address: Some(personal.full_address()),
            neighborhood: Some(personal.neighborhood.clone()),
            city: Some(personal.city.clone()),
            state: Some(personal.state.to_uppercase()),
            zip_code: Some(personal.cep.clone()),
            origin: Some("checkout".to_string()),
            priority: None,
        };

        let outcome = self
            .confirmations
            .provision(Provisioning {
                contract_id: contract.id,
                lead_id: contract.lead_id,
                profile: profile.clone(),
                password_hash,
                brand_name: req.brand_data.brand_name.clone(),
                business_area: Some(req.brand_data.business_area.clone()),
            })
            .await?;

        tracing::info!(
            contract_id = %contract.id,
            profile_id = %outcome.profile_id,
            process_id = %outcome.process_id,
            "✅ Checkout confirmado"
        );

        if outcome.user_created {
            let recipient = Recipient {
                profile_id: Some(outcome.profile_id),
                name: profile.full_name.clone(),
                email: Some(profile.email.clone()),
                phone: profile.phone.clone(),
            };
            let mut vars = HashMap::new();
            vars.insert("senha", password);
            vars.insert("marca", req.brand_data.brand_name.clone());
            self.notifications
                .notify(TemplateKey::BoasVindas, &recipient, &[Channel::Email, Channel::Whatsapp], vars)
                .await;
        }

        Ok(ConfirmationResponse {
            user_id: outcome.user_id,
            profile_id: outcome.profile_id,
            process_id: outcome.process_id,
            contract_id: contract.id,
            already_confirmed: !outcome.process_created,
        })
    }

    /// Fatura já paga passa direto; pendente é conferida no gateway antes de recusar.
    async fn ensure_paid(&self, contract_id: Uuid) -> Result<(), AppError> {
        let invoice = self
            .charges
            .find_contract_invoice(contract_id)
            .await?
            .ok_or(AppError::NotFound("invoice"))?;
        if invoice.status == InvoiceStatus::Paid {
            return Ok(());
        }

        let status = self.payment_status(invoice.id).await?;
        if !status.paid {
            tracing::warn!(%contract_id, provider_status = %status.provider_status, "Confirmação recusada: pagamento pendente");
            return Err(AppError::PaymentNotConfirmed);
        }
        Ok(())
    }

    /// Consulta o gateway e atualiza a fatura se o status mudou.
    pub async fn payment_status(&self, invoice_id: Uuid) -> Result<PaymentStatusResponse, AppError> {
        let invoice = self
            .charges
            .find_invoice(invoice_id)
            .await?
            .ok_or(AppError::NotFound("invoice"))?;

        let external_id = invoice
            .asaas_payment_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AppError::MissingIdentifier("asaasPaymentId"))?;

        let charge = self.gateway.get_charge(&external_id).await?;

        let mut status = invoice.status;
        if let Some(next) = invoice_status_from_provider(&charge.status).filter(|next| *next != invoice.status) {
            if let Some(updated) = self.apply_status(&external_id, next).await? {
                status = updated;
            }
        }

        Ok(PaymentStatusResponse {
            invoice_id: invoice.id,
            status,
            provider_status: charge.status,
            paid: status == InvoiceStatus::Paid,
        })
    }

    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<WebhookAck, AppError> {
        let Some(payment) = event.payment else {
            tracing::info!(event = %event.event, "Webhook sem pagamento ignorado");
            return Ok(WebhookAck { received: true, updated: false });
        };

        let Some(status) = invoice_status_from_provider(&payment.status) else {
            return Ok(WebhookAck { received: true, updated: false });
        };

        let updated = self.apply_status(&payment.id, status).await?.is_some();
        tracing::info!(event = %event.event, payment_id = %payment.id, updated, "Webhook do gateway processado");
        Ok(WebhookAck { received: true, updated })
    }

    async fn apply_status(&self, external_id: &str, status: InvoiceStatus) -> Result<Option<InvoiceStatus>, AppError> {
        let paid_at = (status == InvoiceStatus::Paid).then(Utc::now);
        let Some(invoice) = self.charges.update_invoice_status(external_id, status, paid_at).await? else {
            return Ok(None);
        };

        if invoice.status == InvoiceStatus::Paid {
            self.notify_paid(&invoice).await;
        }
        Ok(Some(invoice.status))
    }

    async fn notify_paid(&self, invoice: &Invoice) {
        let recipient = match self.charges.payer_contact(invoice).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(invoice_id = %invoice.id, "Contato do pagador indisponível: {:?}", e);
                return;
            }
        };

        let mut vars = HashMap::new();
        vars.insert("valor", text::format_brl(invoice.amount));
        vars.insert("marca", brand_from_subject(&invoice.description));
        self.notifications
            .notify(TemplateKey::PagamentoConfirmado, &recipient, &[Channel::Email, Channel::Whatsapp], vars)
            .await;
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::integrations::asaas::{Charge, Customer, PixQrCode};
    use crate::models::contract::SignatureStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryGateway {
        pub existing_customer: Option<String>,
        pub reject_with: Option<Vec<String>>,
        pub charge_delay: Option<std::time::Duration>,
        pub provider_status: Option<String>,
        pub calls: Mutex<Vec<String>>,
        pub charges: Mutex<Vec<ChargeRequest>>,
    }

    impl MemoryGateway {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BillingGateway for MemoryGateway {
        async fn find_customer(&self, cpf_cnpj: &str) -> Result<Option<Customer>, ProviderError> {
            self.calls.lock().unwrap().push(format!("find_customer:{cpf_cnpj}"));
            Ok(self
                .existing_customer
                .clone()
                .map(|id| Customer { id, name: None, cpf_cnpj: Some(cpf_cnpj.into()) }))
        }

        async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ProviderError> {
            self.calls.lock().unwrap().push("create_customer".into());
            Ok(Customer { id: "cus_novo".into(), name: Some(customer.name.clone()), cpf_cnpj: Some(customer.cpf_cnpj.clone()) })
        }

        async fn create_charge(&self, charge: &ChargeRequest) -> Result<Charge, ProviderError> {
            self.calls.lock().unwrap().push("create_charge".into());
            if let Some(delay) = self.charge_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(messages) = &self.reject_with {
                return Err(ProviderError::Rejected { status: 400, messages: messages.clone() });
            }
            self.charges.lock().unwrap().push(charge.clone());
            Ok(Charge {
                id: "pay_123".into(),
                status: "PENDING".into(),
                value: charge.value,
                invoice_url: Some("https://www.asaas.com/i/123".into()),
                bank_slip_url: None,
                installment: None,
            })
        }

        async fn get_charge(&self, id: &str) -> Result<Charge, ProviderError> {
            self.calls.lock().unwrap().push(format!("get_charge:{id}"));
            Ok(Charge {
                id: id.into(),
                status: self.provider_status.clone().unwrap_or_else(|| "PENDING".into()),
                value: None,
                invoice_url: None,
                bank_slip_url: None,
                installment: None,
            })
        }

        async fn pix_qr_code(&self, charge_id: &str) -> Result<PixQrCode, ProviderError> {
            self.calls.lock().unwrap().push(format!("pix_qr_code:{charge_id}"));
            Ok(PixQrCode { encoded_image: "iVBORw0KGgo=".into(), payload: "00020126pix".into(), expiration_date: None })
        }
    }

    pub fn stored_contract(data: &NewContract) -> Contract {
        let now = Utc::now();
        Contract {
            id: Uuid::new_v4(),
            profile_id: data.profile_id,
            lead_id: data.lead_id,
            process_id: None,
            document_type: data.document_type,
            subject: data.subject.clone(),
            contract_value: data.contract_value,
            payment_method: data.payment_method.as_str().into(),
            contract_html: data.contract_html.clone(),
            signature_status: SignatureStatus::NotSigned,
            signature_token: Some(data.signature_token),
            signature_expires_at: Some(data.signature_expires_at),
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
            asaas_payment_id: Some(data.asaas_payment_id.clone()),
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Default)]
    pub struct MemoryChargeStore {
        pub contracts: Mutex<Vec<Contract>>,
        pub invoices: Mutex<Vec<Invoice>>,
        pub payer: Option<Recipient>,
    }

    #[async_trait]
    impl ChargeStore for MemoryChargeStore {
        async fn record_charge(&self, contract: NewContract, invoice: NewInvoice) -> Result<(Contract, Invoice), AppError> {
            let contract = stored_contract(&contract);
            let invoice = Invoice {
                id: Uuid::new_v4(),
                profile_id: invoice.profile_id,
                process_id: None,
                contract_id: Some(contract.id),
                description: invoice.description,
                amount: invoice.amount,
                due_date: invoice.due_date,
                status: InvoiceStatus::Pending,
                billing_type: invoice.billing_type.as_str().into(),
                installment_count: invoice.installment_count as i32,
                installment_value: invoice.installment_value,
                asaas_payment_id: Some(invoice.asaas_payment_id),
                invoice_url: invoice.invoice_url,
                bank_slip_url: invoice.bank_slip_url,
                pix_payload: invoice.pix_payload,
                pix_qr_code: invoice.pix_qr_code,
                paid_at: None,
                created_at: Utc::now(),
            };
            self.contracts.lock().unwrap().push(contract.clone());
            self.invoices.lock().unwrap().push(invoice.clone());
            Ok((contract, invoice))
        }

        async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
            Ok(self.invoices.lock().unwrap().iter().find(|i| i.id == id).cloned())
        }

        async fn find_contract_invoice(&self, contract_id: Uuid) -> Result<Option<Invoice>, AppError> {
            Ok(self.invoices.lock().unwrap().iter().find(|i| i.contract_id == Some(contract_id)).cloned())
        }

        async fn update_invoice_status(
            &self,
            external_id: &str,
            status: InvoiceStatus,
            paid_at: Option<DateTime<Utc>>,
        ) -> Result<Option<Invoice>, AppError> {
            let mut invoices = self.invoices.lock().unwrap();
            let found = invoices.iter_mut().find(|i| {
                i.asaas_payment_id.as_deref() == Some(external_id) && i.status != InvoiceStatus::Paid
            });
            Ok(found.map(|invoice| {
                invoice.status = status;
                invoice.paid_at = paid_at.or(invoice.paid_at);
                invoice.clone()
            }))
        }

        async fn payer_contact(&self, _invoice: &Invoice) -> Result<Option<Recipient>, AppError> {
            Ok(self.payer.clone())
        }
    }

    #[derive(Default)]
    pub struct MemoryConfirmationStore {
        pub contracts: Mutex<Vec<Contract>>,
        pub profiles: Mutex<Vec<Profile>>,
        pub leads: Mutex<Vec<Lead>>,
        pub provisioned: Mutex<Vec<Provisioning>>,
        pub existing_user: bool,
    }

    #[async_trait]
    impl ConfirmationStore for MemoryConfirmationStore {
        async fn find_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
            Ok(self.contracts.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }

        async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
            Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
            Ok(self.leads.lock().unwrap().iter().find(|l| l.id == id).cloned())
        }

        async fn provision(&self, data: Provisioning) -> Result<ProvisionOutcome, AppError> {
            let outcome = ProvisionOutcome {
                user_id: Uuid::new_v4(),
                profile_id: Uuid::new_v4(),
                process_id: Uuid::new_v4(),
                user_created: !self.existing_user,
                process_created: true,
            };
            let mut contracts = self.contracts.lock().unwrap();
            if let Some(contract) = contracts.iter_mut().find(|c| c.id == data.contract_id) {
                contract.profile_id = Some(outcome.profile_id);
                contract.process_id = Some(outcome.process_id);
            }
            let now = Utc::now();
            self.profiles.lock().unwrap().push(Profile {
                id: outcome.profile_id,
                user_id: Some(outcome.user_id),
                full_name: data.profile.full_name.clone(),
                email: data.profile.email.clone(),
                phone: data.profile.phone.clone(),
                cpf_cnpj: data.profile.cpf_cnpj.clone(),
                company_name: None,
                address: data.profile.address.clone(),
                neighborhood: None,
                city: None,
                state: None,
                zip_code: None,
                origin: data.profile.origin.clone(),
                priority: "normal".into(),
                assigned_to: None,
                created_at: now,
                updated_at: now,
            });
            self.provisioned.lock().unwrap().push(data);
            Ok(outcome)
        }
    }
}
