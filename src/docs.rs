// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::middleware;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,
        handlers::auth::change_password,

        // --- Admin ---
        handlers::auth::list_team,
        handlers::auth::create_staff,

        // --- Checkout ---
        handlers::checkout::start,
        handlers::checkout::advance,
        handlers::checkout::back,
        handlers::checkout::submit,

        // --- Pagamentos ---
        handlers::payments::confirm,
        handlers::payments::payment_status,
        handlers::payments::asaas_webhook,

        // --- Contratos ---
        handlers::contracts::list_contracts,
        handlers::contracts::get_contract,
        handlers::contracts::render_contract,
        handlers::contracts::issue_signature_link,
        handlers::contracts::expire_promotions,

        // --- Assinatura ---
        handlers::contracts::view_contract,
        handlers::contracts::sign_contract,
        handlers::contracts::verify_signature,

        // --- Importação ---
        handlers::imports::preview_import,
        handlers::imports::import_clients,
        handlers::imports::export_clients,
        handlers::imports::export_processes,

        // --- CRM ---
        handlers::crm::create_lead,
        handlers::crm::list_leads,
        handlers::crm::update_lead_status,
        handlers::crm::list_clients,
        handlers::crm::get_client,
        handlers::crm::assign_client,
        handlers::crm::add_activity,
        handlers::crm::list_activities,
        handlers::crm::list_notifications,

        // --- Processos ---
        handlers::processes::list_processes,
        handlers::processes::get_process,
        handlers::processes::update_process,
        handlers::processes::list_events,
        handlers::processes::ingest_rpi,

        // --- Portal ---
        handlers::portal::overview,
        handlers::portal::my_processes,
        handlers::portal::my_contracts,
        handlers::portal::my_invoices,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::UserRole,
            models::auth::User,
            models::auth::LoginUserPayload,
            models::auth::CreateStaffPayload,
            models::auth::ChangePasswordPayload,
            models::auth::AuthResponse,
            middleware::auth::AuthenticatedUser,

            // --- Checkout ---
            models::checkout::CheckoutStep,
            models::checkout::ViabilityData,
            models::checkout::PersonalData,
            models::checkout::BrandData,
            models::checkout::PaymentSelection,
            models::checkout::StepInput,
            models::checkout::CheckoutSession,
            models::checkout::AdvanceCheckoutRequest,
            models::checkout::BackCheckoutRequest,
            models::checkout::SubmitCheckoutRequest,
            models::checkout::ConfirmCheckoutRequest,

            // --- Financeiro ---
            models::finance::InvoiceStatus,
            models::finance::PaymentMethod,
            models::finance::BillingType,
            models::finance::Invoice,
            models::finance::PaymentResponse,
            models::finance::PaymentStatusResponse,
            models::finance::ConfirmationResponse,
            models::finance::WebhookEvent,
            models::finance::WebhookPayment,
            models::finance::WebhookAck,

            // --- Contratos ---
            models::contract::DocumentType,
            models::contract::SignatureStatus,
            models::contract::Contract,
            models::contract::SignatureProof,
            models::contract::StoredDocument,
            models::contract::SignContractPayload,
            models::contract::SignatureLinkPayload,
            models::contract::SignatureLinkResponse,
            models::contract::PublicContractView,
            models::contract::SignContractResponse,
            models::contract::VerificationResponse,
            models::contract::RenderContractPayload,
            models::contract::RenderedContract,
            models::contract::PriceGuardReport,

            // --- CRM ---
            models::crm::LeadStatus,
            models::crm::Lead,
            models::crm::CreateLeadPayload,
            models::crm::UpdateLeadStatusPayload,
            models::crm::Profile,
            models::crm::AssignClientPayload,
            models::crm::ClientActivity,
            models::crm::CreateActivityPayload,
            models::crm::PortalOverview,
            models::notification::NotificationLog,

            // --- Processos ---
            models::process::ProcessStatus,
            models::process::BrandProcess,
            models::process::UpdateProcessPayload,
            models::process::ProcessEvent,
            models::process::RpiIngestPayload,
            models::process::RpiReport,

            // --- Importação ---
            models::import::ImportFormat,
            models::import::ImportField,
            models::import::MappingSuggestion,
            models::import::ImportPreview,
            models::import::RowError,
            models::import::ImportReport,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação"),
        (name = "Users", description = "Dados do usuário logado"),
        (name = "Admin", description = "Equipe e permissões"),
        (name = "Checkout", description = "Wizard público de contratação"),
        (name = "Pagamentos", description = "Cobranças, confirmação e webhook do gateway"),
        (name = "Contratos", description = "Modelos, links de assinatura e preço promocional"),
        (name = "Assinatura", description = "Assinatura pública e verificação da prova"),
        (name = "Importação", description = "Importação e exportação de clientes"),
        (name = "CRM", description = "Leads, clientes e histórico"),
        (name = "Processos", description = "Processos no INPI e leitura da RPI"),
        (name = "Portal", description = "Área do cliente")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_public_and_admin_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/api/checkout/submit", "/api/webhooks/asaas", "/api/admin/rpi/ingest", "/api/portal/invoices"] {
            assert!(doc.paths.paths.contains_key(path), "rota ausente na documentação: {path}");
        }
    }
}
