// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::i18n::I18nStore,
    db::{ContractRepository, CrmRepository, FinanceRepository, LogRepository, ProcessRepository, UserRepository},
    integrations::{
        asaas::{AsaasClient, BillingGateway, DisabledGateway},
        smtp::{EmailSender, SmtpMailer, SmtpSettings},
        storage::{ObjectStore, SupabaseStorage},
        timestamp::OpenTimestampsClient,
        whatsapp::{EvolutionClient, WhatsAppSender},
    },
    services::{
        auth::AuthService,
        checkout_service::{CheckoutService, PgLeadStore},
        contract_service::{resolve_public_base_url, ContractService, ContractSettings, PgContractStore},
        crm_service::CrmService,
        document_service::DocumentService,
        import_service::{ImportService, PgClientDirectory},
        notification_service::{NotificationService, PgNotificationLedger},
        payment_service::{PaymentService, PaymentSettings, PgChargeStore, PgConfirmationStore},
        process_service::{PgProcessStore, ProcessService},
        signature_service::SignatureService,
    },
};

/// Configuração lida do ambiente (com suporte a .env).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,

    pub asaas_api_url: String,
    pub asaas_api_key: Option<String>,
    pub asaas_webhook_token: Option<String>,

    pub public_base_url: String,
    pub signature_token_ttl_days: i64,
    pub payment_due_days: i64,
    pub card_payment_timeout_secs: u64,
    pub promo_deadline_days: i64,
    pub price_guard_interval_secs: u64,

    pub storage_url: Option<String>,
    pub storage_service_key: Option<String>,
    pub storage_bucket: String,

    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub evolution_instance: Option<String>,

    pub smtp: Option<SmtpSettings>,

    pub fonts_dir: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} com valor inválido: {raw}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Variáveis vazias contam como ausentes.
    pub fn from_lookup(raw: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let lookup = |key: &str| raw(key).filter(|v| !v.trim().is_empty());

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let smtp = match (lookup("SMTP_HOST"), lookup("SMTP_FROM")) {
            (Some(host), Some(from)) => Some(SmtpSettings {
                host,
                port: parse_or(&lookup, "SMTP_PORT", 587)?,
                user: lookup("SMTP_USER").unwrap_or_default(),
                password: lookup("SMTP_PASSWORD").unwrap_or_default(),
                from,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            asaas_api_url: lookup("ASAAS_API_URL").unwrap_or_else(|| "https://api.asaas.com/v3".to_string()),
            asaas_api_key: lookup("ASAAS_API_KEY"),
            asaas_webhook_token: lookup("ASAAS_WEBHOOK_TOKEN"),
            public_base_url: resolve_public_base_url(lookup("SIGNATURE_BASE_URL").as_deref()),
            signature_token_ttl_days: parse_or(&lookup, "SIGNATURE_TOKEN_TTL_DAYS", 7)?,
            payment_due_days: parse_or(&lookup, "PAYMENT_DUE_DAYS", 3)?,
            card_payment_timeout_secs: parse_or(&lookup, "CARD_PAYMENT_TIMEOUT_SECS", 60)?,
            promo_deadline_days: parse_or(&lookup, "PROMO_DEADLINE_DAYS", 7)?,
            price_guard_interval_secs: parse_or(&lookup, "PRICE_GUARD_INTERVAL_SECS", 3600)?,
            storage_url: lookup("STORAGE_URL"),
            storage_service_key: lookup("STORAGE_SERVICE_KEY"),
            storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "documents".to_string()),
            evolution_api_url: lookup("EVOLUTION_API_URL"),
            evolution_api_key: lookup("EVOLUTION_API_KEY"),
            evolution_instance: lookup("EVOLUTION_INSTANCE"),
            smtp,
            fonts_dir: lookup("FONTS_DIR").unwrap_or_else(|| "./fonts".to_string()),
            admin_email: lookup("ADMIN_EMAIL"),
            admin_password: lookup("ADMIN_PASSWORD"),
        })
    }

    pub fn portal_url(&self) -> String {
        format!("{}/cliente", self.public_base_url)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub i18n_store: I18nStore,
    pub auth_service: AuthService,
    pub notification_service: NotificationService,
    pub checkout_service: CheckoutService,
    pub payment_service: PaymentService,
    pub contract_service: ContractService,
    pub signature_service: SignatureService,
    pub crm_service: CrmService,
    pub process_service: ProcessService,
    pub import_service: ImportService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Integrações ---
        let gateway: Arc<dyn BillingGateway> = match &config.asaas_api_key {
            Some(key) => Arc::new(AsaasClient::new(config.asaas_api_url.clone(), key.clone())?),
            None => {
                tracing::warn!("ASAAS_API_KEY ausente: checkout vai recusar cobranças");
                Arc::new(DisabledGateway)
            }
        };

        let email: Option<Arc<dyn EmailSender>> = match &config.smtp {
            Some(settings) => Some(Arc::new(SmtpMailer::new(settings)?)),
            None => {
                tracing::warn!("SMTP não configurado: e-mails serão ignorados");
                None
            }
        };

        let whatsapp: Option<Arc<dyn WhatsAppSender>> =
            match (&config.evolution_api_url, &config.evolution_api_key, &config.evolution_instance) {
                (Some(url), Some(key), Some(instance)) => {
                    Some(Arc::new(EvolutionClient::new(url.clone(), key.clone(), instance.clone())?))
                }
                _ => {
                    tracing::warn!("Evolution API não configurada: WhatsApp será ignorado");
                    None
                }
            };

        let storage: Option<Arc<dyn ObjectStore>> = match (&config.storage_url, &config.storage_service_key) {
            (Some(url), Some(key)) => Some(Arc::new(SupabaseStorage::new(
                url.clone(),
                config.storage_bucket.clone(),
                key.clone(),
            )?)),
            _ => {
                tracing::warn!("Storage não configurado: PDFs assinados não serão enviados");
                None
            }
        };

        let calendar = Arc::new(OpenTimestampsClient::with_default_calendars()?);

        // --- Monta o gráfico de dependências ---
        let user_repo = UserRepository::new(db_pool.clone());
        let crm_repo = CrmRepository::new(db_pool.clone());
        let process_repo = ProcessRepository::new(db_pool.clone());
        let contract_repo = ContractRepository::new(db_pool.clone());
        let finance_repo = FinanceRepository::new(db_pool.clone());
        let log_repo = LogRepository::new(db_pool.clone());

        let token_ttl = chrono::Duration::days(config.signature_token_ttl_days);

        let notification_service = NotificationService::new(
            email,
            whatsapp,
            Arc::new(PgNotificationLedger::new(db_pool.clone(), log_repo.clone())),
            config.portal_url(),
        )
        .with_history(log_repo);

        let payment_service = PaymentService::new(
            gateway,
            Arc::new(PgChargeStore::new(
                db_pool.clone(),
                contract_repo.clone(),
                finance_repo.clone(),
                crm_repo.clone(),
            )),
            Arc::new(PgConfirmationStore::new(
                db_pool.clone(),
                user_repo.clone(),
                crm_repo.clone(),
                process_repo.clone(),
                contract_repo.clone(),
                finance_repo.clone(),
            )),
            notification_service.clone(),
            PaymentSettings {
                due_days: config.payment_due_days,
                card_timeout: Duration::from_secs(config.card_payment_timeout_secs),
                token_ttl,
                public_base_url: config.public_base_url.clone(),
            },
        );

        let checkout_service = CheckoutService::new(
            Arc::new(PgLeadStore::new(db_pool.clone(), crm_repo.clone())),
            payment_service.clone(),
        );

        let contract_store = Arc::new(PgContractStore::new(
            db_pool.clone(),
            contract_repo.clone(),
            crm_repo.clone(),
            process_repo.clone(),
        ));

        let contract_service = ContractService::new(
            contract_store.clone(),
            notification_service.clone(),
            ContractSettings {
                public_base_url: config.public_base_url.clone(),
                token_ttl,
                promo_deadline: chrono::Duration::days(config.promo_deadline_days),
            },
        );

        let signature_service = SignatureService::new(
            contract_store,
            calendar,
            storage,
            DocumentService::new(config.fonts_dir.clone()),
            config.public_base_url.clone(),
        );

        let crm_service = CrmService::new(
            db_pool.clone(),
            crm_repo.clone(),
            process_repo.clone(),
            contract_repo,
            finance_repo,
        );

        let process_service = ProcessService::new(
            Arc::new(PgProcessStore::new(db_pool.clone(), process_repo.clone(), crm_repo.clone())),
            notification_service.clone(),
        );

        let import_service = ImportService::new(Arc::new(PgClientDirectory::new(db_pool.clone(), crm_repo, process_repo)));

        let auth_service = AuthService::new(user_repo, config.jwt_secret.clone(), db_pool.clone());

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            i18n_store: I18nStore::new(),
            auth_service,
            notification_service,
            checkout_service,
            payment_service,
            contract_service,
            signature_service,
            crm_service,
            process_service,
            import_service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db"), ("JWT_SECRET", "s")])).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.asaas_api_url, "https://api.asaas.com/v3");
        assert_eq!(config.signature_token_ttl_days, 7);
        assert_eq!(config.payment_due_days, 3);
        assert_eq!(config.card_payment_timeout_secs, 60);
        assert_eq!(config.price_guard_interval_secs, 3600);
        assert_eq!(config.storage_bucket, "documents");
        assert_eq!(config.public_base_url, "https://webmarcas.net");
        assert!(config.smtp.is_none());
        assert!(config.asaas_webhook_token.is_none());
    }

    #[test]
    fn required_and_malformed_vars_fail() {
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "s")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db"), ("JWT_SECRET", "  ")])).is_err());

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("JWT_SECRET", "s"),
            ("PAYMENT_DUE_DAYS", "três"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PAYMENT_DUE_DAYS"));
    }

    #[test]
    fn smtp_needs_host_and_sender() {
        let base = [("DATABASE_URL", "postgres://db"), ("JWT_SECRET", "s")];

        let only_host = Config::from_lookup(lookup(&[base[0], base[1], ("SMTP_HOST", "smtp.x")])).unwrap();
        assert!(only_host.smtp.is_none());

        let full = Config::from_lookup(lookup(&[
            base[0],
            base[1],
            ("SMTP_HOST", "smtp.x"),
            ("SMTP_FROM", "WebMarcas <no-reply@webmarcas.net>"),
            ("SMTP_PORT", "465"),
        ]))
        .unwrap();
        assert_eq!(full.smtp.unwrap().port, 465);
    }

    #[test]
    fn preview_urls_never_reach_clients() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("JWT_SECRET", "s"),
            ("SIGNATURE_BASE_URL", "http://localhost:5173"),
        ]))
        .unwrap();
        assert_eq!(config.portal_url(), "https://webmarcas.net/cliente");
    }
}
