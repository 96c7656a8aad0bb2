// src/services/contract_service.rs

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text},
    db::{ContractRepository, CrmRepository, ProcessRepository},
    models::{
        checkout::{BrandData, PersonalData},
        contract::{
            Contract, DocumentType, PriceGuardReport, PublicContractView, RenderContractPayload, RenderedContract,
            SignatureLinkPayload, SignatureLinkResponse, SignatureProof, SignatureStatus, SignerContext,
        },
        crm::{ClientScope, Profile},
        finance::{PaymentMethod, PROMOTIONAL_PRICE, STANDARD_PRICE},
        notification::{Channel, TemplateKey},
        process::BrandProcess,
    },
    services::notification_service::{NotificationService, Recipient},
};

/// Site público usado quando a URL configurada não serve para o cliente final.
pub const PRODUCTION_SITE_URL: &str = "https://webmarcas.net";

/// URLs de preview/localhost nunca vão para o cliente.
pub fn resolve_public_base_url(configured: Option<&str>) -> String {
    match configured.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) if !url.contains("preview") && !url.contains("localhost") => url.trim_end_matches('/').to_string(),
        _ => PRODUCTION_SITE_URL.to_string(),
    }
}

pub fn signature_url(base_url: &str, token: Uuid) -> String {
    format!("{base_url}/assinar/{token}")
}

pub fn verification_url(base_url: &str, hash: &str) -> String {
    format!("{base_url}/verificar/{hash}")
}

// --- MODELOS PADRÃO ---

const DEFAULT_CONTRACT: &str = "CONTRATO DE PRESTAÇÃO DE SERVIÇOS DE REGISTRO DE MARCA

CONTRATANTE: {{nome}}, inscrito(a) no CPF/CNPJ sob o nº {{cpf_cnpj}}, residente em {{endereco}}, {{cidade}}/{{estado}}, CEP {{cep}}, e-mail {{email}}, telefone {{telefone}}.

CONTRATADA: WebMarcas Registro de Marcas, doravante denominada CONTRATADA.

CLÁUSULA 1ª - DO OBJETO
A CONTRATADA prestará os serviços de assessoria para o pedido de registro da marca \"{{marca}}\" junto ao Instituto Nacional da Propriedade Industrial (INPI), no ramo de atividade {{ramo_atividade}}.

CLÁUSULA 2ª - DO PREÇO E DA FORMA DE PAGAMENTO
Pelos serviços, o CONTRATANTE pagará o valor total de {{valor}}, na modalidade {{forma_pagamento}}.

CLÁUSULA 3ª - DAS OBRIGAÇÕES DA CONTRATADA
Protocolar o pedido, acompanhar as publicações na Revista da Propriedade Industrial (RPI) e informar o CONTRATANTE sobre cada despacho.

CLÁUSULA 4ª - DAS TAXAS OFICIAIS
As taxas federais (GRU) do INPI não estão incluídas no valor deste contrato.

CLÁUSULA 5ª - DO FORO
Fica eleito o foro da comarca de São Paulo/SP para dirimir quaisquer dúvidas oriundas deste contrato.

São Paulo, {{data_extenso}}.";

const DEFAULT_PROCURACAO: &str = "PROCURAÇÃO

OUTORGANTE: {{nome}}, CPF/CNPJ {{cpf_cnpj}}, com endereço em {{endereco}}, {{cidade}}/{{estado}}, CEP {{cep}}.

OUTORGADA: WebMarcas Registro de Marcas.

PODERES: representar o OUTORGANTE perante o Instituto Nacional da Propriedade Industrial (INPI) em tudo o que se relacionar ao pedido de registro da marca \"{{marca}}\", podendo protocolar petições, cumprir exigências, apresentar recursos e manifestações, e receber notificações.

{{cidade}}, {{data_extenso}}.";

const DEFAULT_DISTRATO: &str = "DISTRATO DE CONTRATO DE PRESTAÇÃO DE SERVIÇOS

DISTRATANTE: {{nome}}, CPF/CNPJ {{cpf_cnpj}}, e-mail {{email}}.

DISTRATADA: WebMarcas Registro de Marcas.

As partes resolvem, de comum acordo, encerrar o contrato de assessoria para o registro da marca \"{{marca}}\", dando plena e geral quitação das obrigações até esta data, em {{data}}.

{{cidade}}, {{data_extenso}}.";

pub fn default_template(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Contract => DEFAULT_CONTRACT,
        DocumentType::Procuracao => DEFAULT_PROCURACAO,
        DocumentType::Distrato => DEFAULT_DISTRATO,
    }
}

/// Parte contratante, de onde saem as variáveis do modelo.
#[derive(Debug, Clone, Default)]
pub struct ContractParty {
    pub name: String,
    pub cpf_cnpj: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub email: String,
    pub phone: String,
}

impl ContractParty {
    pub fn from_checkout(data: &PersonalData) -> Self {
        Self {
            name: data.full_name.clone(),
            cpf_cnpj: data.cpf_cnpj.clone(),
            address: format!("{}, {}", data.full_address(), data.neighborhood),
            city: data.city.clone(),
            state: data.state.to_uppercase(),
            zip_code: data.cep.clone(),
            email: data.email.clone(),
            phone: data.phone.clone(),
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        let address = match (&profile.address, &profile.neighborhood) {
            (Some(a), Some(n)) => format!("{a}, {n}"),
            (Some(a), None) => a.clone(),
            (None, Some(n)) => n.clone(),
            (None, None) => String::new(),
        };
        Self {
            name: profile.full_name.clone(),
            cpf_cnpj: profile.cpf_cnpj.clone().unwrap_or_default(),
            address,
            city: profile.city.clone().unwrap_or_default(),
            state: profile.state.clone().unwrap_or_default(),
            zip_code: profile.zip_code.clone().unwrap_or_default(),
            email: profile.email.clone(),
            phone: profile.phone.clone().unwrap_or_default(),
        }
    }
}

pub fn contract_variables(
    party: &ContractParty,
    brand_name: &str,
    business_area: &str,
    value: Option<Decimal>,
    method: Option<PaymentMethod>,
    date: NaiveDate,
) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("nome", party.name.clone());
    vars.insert("cpf_cnpj", party.cpf_cnpj.clone());
    vars.insert("endereco", party.address.clone());
    vars.insert("cidade", party.city.clone());
    vars.insert("estado", party.state.clone());
    vars.insert("cep", party.zip_code.clone());
    vars.insert("email", party.email.clone());
    vars.insert("telefone", party.phone.clone());
    vars.insert("marca", brand_name.to_string());
    vars.insert("ramo_atividade", business_area.to_string());
    if let Some(value) = value {
        vars.insert("valor", text::format_brl(value));
    }
    if let Some(method) = method {
        vars.insert("forma_pagamento", method.label().to_string());
    }
    vars.insert("data", date.format("%d/%m/%Y").to_string());
    vars.insert("data_extenso", text::date_long_pt(date));
    vars
}

/// Modelos em HTML recebem valores escapados; texto puro vira HTML depois da troca.
pub fn render_document(template: &str, vars: &HashMap<&str, String>) -> String {
    let looks_like_html = template.contains("<p") || template.contains("<div") || template.contains("<br");
    if looks_like_html {
        let escaped: HashMap<&str, String> = vars.iter().map(|(k, v)| (*k, text::escape_html(v))).collect();
        text::render_template(template, &escaped)
    } else {
        text::text_to_html(&text::render_template(template, vars))
    }
}

/// HTML do contrato gerado no checkout, quando o cliente não manda o seu.
pub fn checkout_contract_html(
    personal: &PersonalData,
    brand: &BrandData,
    method: PaymentMethod,
    value: Decimal,
    date: NaiveDate,
) -> String {
    let party = ContractParty::from_checkout(personal);
    let vars = contract_variables(&party, &brand.brand_name, &brand.business_area, Some(value), Some(method), date);
    render_document(DEFAULT_CONTRACT, &vars)
}

// --- PERSISTÊNCIA ---

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn list(&self, scope: ClientScope) -> Result<Vec<Contract>, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<Contract>, AppError>;
    async fn find_by_token(&self, token: Uuid) -> Result<Option<Contract>, AppError>;
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Contract>, AppError>;
    async fn active_template(&self, document_type: DocumentType) -> Result<Option<String>, AppError>;
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError>;
    async fn find_process(&self, id: Uuid) -> Result<Option<BrandProcess>, AppError>;
    /// Contrato assinado não recebe link novo (None).
    async fn set_signature_link(&self, id: Uuid, token: Uuid, expires_at: DateTime<Utc>)
        -> Result<Option<Contract>, AppError>;
    /// None quando o contrato já estava assinado.
    async fn mark_signed(
        &self,
        id: Uuid,
        signature_image: Option<&str>,
        proof: &SignatureProof,
        signer: &SignerContext,
    ) -> Result<Option<Contract>, AppError>;
    async fn save_signed_document(&self, contract: &Contract, name: &str, url: &str, path: &str) -> Result<(), AppError>;
    /// Cliente vinculado ou, antes da confirmação, o lead do checkout.
    async fn contact_for(&self, contract: &Contract) -> Result<Option<Recipient>, AppError>;
    /// Mesmo critério de `Contract::promotion_expired`.
    async fn expire_promotions(&self, now: DateTime<Utc>, deadline: Duration) -> Result<u64, AppError>;
}

pub struct PgContractStore {
    pool: PgPool,
    contract_repo: ContractRepository,
    crm_repo: CrmRepository,
    process_repo: ProcessRepository,
}

impl PgContractStore {
    pub fn new(
        pool: PgPool,
        contract_repo: ContractRepository,
        crm_repo: CrmRepository,
        process_repo: ProcessRepository,
    ) -> Self {
        Self { pool, contract_repo, crm_repo, process_repo }
    }
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn list(&self, scope: ClientScope) -> Result<Vec<Contract>, AppError> {
        self.contract_repo.list(scope).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
        self.contract_repo.find_by_id(&self.pool, id).await
    }

    async fn find_by_token(&self, token: Uuid) -> Result<Option<Contract>, AppError> {
        self.contract_repo.find_by_token(token).await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Contract>, AppError> {
        self.contract_repo.find_by_hash(hash).await
    }

    async fn active_template(&self, document_type: DocumentType) -> Result<Option<String>, AppError> {
        Ok(self
            .contract_repo
            .active_template(document_type)
            .await?
            .map(|template| template.content))
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        self.crm_repo.find_profile_by_id(&self.pool, id).await
    }

    async fn find_process(&self, id: Uuid) -> Result<Option<BrandProcess>, AppError> {
        self.process_repo.find_by_id(&self.pool, id).await
    }

    async fn set_signature_link(
        &self,
        id: Uuid,
        token: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Contract>, AppError> {
        self.contract_repo
            .set_signature_link(&self.pool, id, token, expires_at)
            .await
    }

    async fn mark_signed(
        &self,
        id: Uuid,
        signature_image: Option<&str>,
        proof: &SignatureProof,
        signer: &SignerContext,
    ) -> Result<Option<Contract>, AppError> {
        self.contract_repo
            .mark_signed(&self.pool, id, signature_image, proof, signer)
            .await
    }

    async fn save_signed_document(&self, contract: &Contract, name: &str, url: &str, path: &str) -> Result<(), AppError> {
        self.contract_repo
            .upsert_document(&self.pool, contract, name, url, path)
            .await?;
        Ok(())
    }

    async fn contact_for(&self, contract: &Contract) -> Result<Option<Recipient>, AppError> {
        if let Some(profile_id) = contract.profile_id {
            if let Some(p) = self.crm_repo.find_profile_by_id(&self.pool, profile_id).await? {
                return Ok(Some(Recipient {
                    profile_id: Some(p.id),
                    name: p.full_name,
                    email: Some(p.email),
                    phone: p.phone,
                }));
            }
        }
        if let Some(lead_id) = contract.lead_id {
            if let Some(lead) = self.crm_repo.find_lead(&self.pool, lead_id).await? {
                return Ok(Some(Recipient {
                    profile_id: None,
                    name: lead.full_name,
                    email: lead.email,
                    phone: lead.phone,
                }));
            }
        }
        Ok(None)
    }

    async fn expire_promotions(&self, now: DateTime<Utc>, deadline: Duration) -> Result<u64, AppError> {
        self.contract_repo
            .expire_promotions(&self.pool, now - deadline, PROMOTIONAL_PRICE, STANDARD_PRICE)
            .await
    }
}

// --- SERVIÇO ---

#[derive(Debug, Clone)]
pub struct ContractSettings {
    pub public_base_url: String,
    pub token_ttl: Duration,
    pub promo_deadline: Duration,
}

#[derive(Clone)]
pub struct ContractService {
    store: Arc<dyn ContractStore>,
    notifications: NotificationService,
    settings: ContractSettings,
}

impl ContractService {
    pub fn new(store: Arc<dyn ContractStore>, notifications: NotificationService, settings: ContractSettings) -> Self {
        Self { store, notifications, settings }
    }

    pub async fn list(&self, scope: ClientScope) -> Result<Vec<Contract>, AppError> {
        self.store.list(scope).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Contract, AppError> {
        self.store.find(id).await?.ok_or(AppError::NotFound("contract"))
    }

    async fn template_for(&self, document_type: DocumentType) -> Result<String, AppError> {
        Ok(match self.store.active_template(document_type).await? {
            Some(content) => content,
            None => default_template(document_type).to_string(),
        })
    }

    /// Gera o documento de um cliente a partir do modelo ativo (ou do padrão).
    pub async fn render(&self, payload: &RenderContractPayload) -> Result<RenderedContract, AppError> {
        let profile = self
            .store
            .find_profile(payload.profile_id)
            .await?
            .ok_or(AppError::NotFound("profile"))?;

        let process = match payload.process_id {
            Some(id) => Some(self.store.find_process(id).await?.ok_or(AppError::NotFound("process"))?),
            None => None,
        };

        let (brand_name, business_area) = process
            .as_ref()
            .map(|p| (p.brand_name.clone(), p.business_area.clone().unwrap_or_default()))
            .unwrap_or_default();

        let template = self.template_for(payload.document_type).await?;
        let vars = contract_variables(
            &ContractParty::from_profile(&profile),
            &brand_name,
            &business_area,
            payload.payment_method.map(|m| m.list_price()),
            payload.payment_method,
            Utc::now().date_naive(),
        );

        Ok(RenderedContract {
            document_type: payload.document_type,
            html: render_document(&template, &vars),
        })
    }

    /// Novo token de assinatura com validade. Opcionalmente avisa o cliente.
    pub async fn issue_signature_link(
        &self,
        contract_id: Uuid,
        payload: &SignatureLinkPayload,
    ) -> Result<SignatureLinkResponse, AppError> {
        let token = Uuid::new_v4();
        let expires_at = Utc::now() + self.settings.token_ttl;

        let contract = match self.store.set_signature_link(contract_id, token, expires_at).await? {
            Some(contract) => contract,
            None => {
                // Ou não existe, ou já foi assinado
                return match self.store.find(contract_id).await? {
                    Some(_) => Err(AppError::AlreadySigned),
                    None => Err(AppError::NotFound("contract")),
                };
            }
        };

        let url = signature_url(&self.settings.public_base_url, token);

        let mut channels = Vec::new();
        if payload.send_email {
            channels.push(Channel::Email);
        }
        if payload.send_whatsapp {
            channels.push(Channel::Whatsapp);
        }

        if !channels.is_empty() {
            if let Some(recipient) = self.store.contact_for(&contract).await? {
                let mut vars = HashMap::new();
                vars.insert("link_assinatura", url.clone());
                vars.insert("validade", expires_at.format("%d/%m/%Y").to_string());
                vars.insert("marca", brand_from_subject(&contract.subject));
                self.notifications
                    .notify(TemplateKey::LinkAssinatura, &recipient, &channels, vars)
                    .await;
            } else {
                tracing::warn!(contract_id = %contract.id, "Contrato sem contato para envio do link");
            }
        }

        Ok(SignatureLinkResponse { url, expires_at })
    }

    /// Visão pública pelo token do link.
    pub async fn public_view(&self, token: Uuid) -> Result<PublicContractView, AppError> {
        let contract = self
            .store
            .find_by_token(token)
            .await?
            .ok_or(AppError::NotFound("contract"))?;

        ensure_signable_view(&contract, Utc::now())?;

        Ok(PublicContractView {
            id: contract.id,
            document_type: contract.document_type,
            subject: contract.subject,
            contract_html: contract.contract_html.unwrap_or_default(),
            signature_status: contract.signature_status,
            signature_expires_at: contract.signature_expires_at,
        })
    }

    pub async fn expire_promotions(&self, now: DateTime<Utc>) -> Result<PriceGuardReport, AppError> {
        let expired = self.store.expire_promotions(now, self.settings.promo_deadline).await?;

        if expired > 0 {
            tracing::info!("💲 {} contrato(s) saíram do preço promocional", expired);
        }
        Ok(PriceGuardReport { expired })
    }
}

/// Link expirado só bloqueia contrato que ainda não foi assinado.
pub fn ensure_signable_view(contract: &Contract, now: DateTime<Utc>) -> Result<(), AppError> {
    if contract.signature_status != SignatureStatus::Signed && contract.signature_link_expired(now) {
        return Err(AppError::SignatureLinkExpired);
    }
    Ok(())
}

/// "Registro de marca: Café Bom" -> "Café Bom"
pub fn brand_from_subject(subject: &str) -> String {
    subject
        .split_once(':')
        .map(|(_, brand)| brand.trim().to_string())
        .unwrap_or_else(|| subject.to_string())
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Contratos em memória, com as mesmas guardas dos UPDATEs condicionais.
    #[derive(Default)]
    pub struct MemoryContractStore {
        pub contracts: Mutex<Vec<Contract>>,
        pub documents: Mutex<Vec<(Uuid, String)>>,
        pub contact: Option<Recipient>,
    }

    impl MemoryContractStore {
        pub fn with(contracts: Vec<Contract>) -> Self {
            Self { contracts: Mutex::new(contracts), ..Default::default() }
        }

        pub fn get(&self, id: Uuid) -> Contract {
            self.contracts.lock().unwrap().iter().find(|c| c.id == id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl ContractStore for MemoryContractStore {
        async fn list(&self, _scope: ClientScope) -> Result<Vec<Contract>, AppError> {
            Ok(self.contracts.lock().unwrap().clone())
        }

        async fn find(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
            Ok(self.contracts.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }

        async fn find_by_token(&self, token: Uuid) -> Result<Option<Contract>, AppError> {
            Ok(self
                .contracts
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.signature_token == Some(token))
                .cloned())
        }

        async fn find_by_hash(&self, hash: &str) -> Result<Option<Contract>, AppError> {
            Ok(self
                .contracts
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.blockchain_hash.as_deref() == Some(hash))
                .cloned())
        }

        async fn active_template(&self, _document_type: DocumentType) -> Result<Option<String>, AppError> {
            Ok(None)
        }

        async fn find_profile(&self, _id: Uuid) -> Result<Option<Profile>, AppError> {
            Ok(None)
        }

        async fn find_process(&self, _id: Uuid) -> Result<Option<BrandProcess>, AppError> {
            Ok(None)
        }

        async fn set_signature_link(
            &self,
            id: Uuid,
            token: Uuid,
            expires_at: DateTime<Utc>,
        ) -> Result<Option<Contract>, AppError> {
            let mut contracts = self.contracts.lock().unwrap();
            let found = contracts
                .iter_mut()
                .find(|c| c.id == id && c.signature_status.can_transition_to(SignatureStatus::Pending));
            Ok(found.map(|contract| {
                contract.signature_token = Some(token);
                contract.signature_expires_at = Some(expires_at);
                contract.signature_status = SignatureStatus::Pending;
                contract.clone()
            }))
        }

        async fn mark_signed(
            &self,
            id: Uuid,
            signature_image: Option<&str>,
            proof: &SignatureProof,
            signer: &SignerContext,
        ) -> Result<Option<Contract>, AppError> {
            let mut contracts = self.contracts.lock().unwrap();
            let found = contracts
                .iter_mut()
                .find(|c| c.id == id && c.signature_status.can_transition_to(SignatureStatus::Signed));
            Ok(found.map(|contract| {
                contract.signature_status = SignatureStatus::Signed;
                contract.signed_at = Some(proof.timestamp);
                contract.client_signature_image = signature_image.map(str::to_string);
                contract.blockchain_hash = Some(proof.hash.clone());
                contract.blockchain_tx_id = Some(proof.tx_id.clone());
                contract.blockchain_timestamp = Some(proof.timestamp);
                contract.blockchain_network = Some(proof.network.clone());
                contract.blockchain_proof = Some(proof.proof.clone());
                contract.signature_ip = signer.ip.clone();
                contract.signature_user_agent = signer.user_agent.clone();
                contract.device_info = signer.device_info.clone();
                contract.clone()
            }))
        }

        async fn save_signed_document(&self, contract: &Contract, _name: &str, url: &str, _path: &str) -> Result<(), AppError> {
            self.documents.lock().unwrap().push((contract.id, url.to_string()));
            Ok(())
        }

        async fn contact_for(&self, _contract: &Contract) -> Result<Option<Recipient>, AppError> {
            Ok(self.contact.clone())
        }

        async fn expire_promotions(&self, now: DateTime<Utc>, deadline: Duration) -> Result<u64, AppError> {
            let mut expired = 0;
            for contract in self.contracts.lock().unwrap().iter_mut() {
                if contract.promotion_expired(now, deadline) {
                    contract.contract_value = STANDARD_PRICE;
                    expired += 1;
                }
            }
            Ok(expired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::fixtures;
    use super::fakes::MemoryContractStore;
    use crate::models::contract::fixtures as contract_fixtures;
    use crate::services::notification_service::fakes::{service as notifications, MemoryLedger, MemoryMailer};
    use std::str::FromStr;

    fn service(store: Arc<MemoryContractStore>, mailer: Arc<MemoryMailer>) -> ContractService {
        ContractService::new(
            store,
            notifications(mailer, Arc::new(MemoryLedger::default())),
            ContractSettings {
                public_base_url: PRODUCTION_SITE_URL.into(),
                token_ttl: Duration::days(7),
                promo_deadline: Duration::days(7),
            },
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn base_url_falls_back_to_production() {
        assert_eq!(resolve_public_base_url(None), PRODUCTION_SITE_URL);
        assert_eq!(resolve_public_base_url(Some("")), PRODUCTION_SITE_URL);
        assert_eq!(resolve_public_base_url(Some("https://id-preview--abc.app")), PRODUCTION_SITE_URL);
        assert_eq!(resolve_public_base_url(Some("http://localhost:5173")), PRODUCTION_SITE_URL);
        assert_eq!(resolve_public_base_url(Some("https://app.webmarcas.net/")), "https://app.webmarcas.net");
    }

    #[test]
    fn checkout_contract_fills_every_variable() {
        let html = checkout_contract_html(
            &fixtures::personal(),
            &fixtures::brand(),
            PaymentMethod::Avista,
            PROMOTIONAL_PRICE,
            date(),
        );

        assert!(html.contains("Maria da Silva"));
        assert!(html.contains("123.456.789-09"));
        assert!(html.contains("Av. Paulista, 1000 - Sala 5, Bela Vista"));
        assert!(html.contains("&quot;Café Bom&quot;"));
        assert!(html.contains("R$ 699,00"));
        assert!(html.contains("PIX à vista"));
        assert!(html.contains("19 de outubro de 2026"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn html_templates_escape_values() {
        let mut vars = HashMap::new();
        vars.insert("nome", "<script>x</script>".to_string());
        let out = render_document("<p>Cliente: {{nome}} {{desconhecida}}</p>", &vars);
        assert_eq!(out, "<p>Cliente: &lt;script&gt;x&lt;/script&gt; {{desconhecida}}</p>");
    }

    #[test]
    fn every_document_type_has_a_fallback() {
        let party = ContractParty { name: "João".into(), city: "Campinas".into(), ..Default::default() };
        let vars = contract_variables(&party, "Marca X", "Varejo", Some(STANDARD_PRICE), Some(PaymentMethod::Cartao6x), date());

        for document_type in [DocumentType::Contract, DocumentType::Procuracao, DocumentType::Distrato] {
            let html = render_document(default_template(document_type), &vars);
            assert!(html.starts_with("<p>"), "{document_type:?}");
            assert!(html.contains("João"));
            assert!(!html.contains("{{"), "{document_type:?} ficou com marcador");
        }
    }

    #[test]
    fn expired_link_blocks_unsigned_only() {
        let now = Utc::now();
        let old = contract_fixtures::contract(now - Duration::days(10));
        assert!(matches!(ensure_signable_view(&old, now), Err(AppError::SignatureLinkExpired)));

        let mut signed = contract_fixtures::contract(now - Duration::days(10));
        signed.signature_status = SignatureStatus::Signed;
        assert!(ensure_signable_view(&signed, now).is_ok());

        let fresh = contract_fixtures::contract(now);
        assert!(ensure_signable_view(&fresh, now).is_ok());
    }

    #[test]
    fn brand_is_taken_from_subject() {
        assert_eq!(brand_from_subject("Registro de marca: Café Bom"), "Café Bom");
        assert_eq!(brand_from_subject("Café Bom"), "Café Bom");
    }

    #[tokio::test]
    async fn price_guard_only_touches_stale_promotions() {
        let now = Utc::now();
        let stale = contract_fixtures::contract(now - Duration::days(8));

        let mut signed = contract_fixtures::contract(now - Duration::days(8));
        signed.signature_status = SignatureStatus::Signed;
        signed.signed_at = Some(now - Duration::days(3));

        let mut card = contract_fixtures::contract(now - Duration::days(8));
        card.payment_method = "cartao6x".into();

        let mut standard = contract_fixtures::contract(now - Duration::days(8));
        standard.contract_value = STANDARD_PRICE;

        let recent = contract_fixtures::contract(now - Duration::days(2));

        let ids = [stale.id, signed.id, card.id, standard.id, recent.id];
        let store = Arc::new(MemoryContractStore::with(vec![stale, signed, card, standard, recent]));
        let service = service(store.clone(), Arc::new(MemoryMailer::default()));

        let report = service.expire_promotions(now).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(store.get(ids[0]).contract_value, Decimal::from_str("1194.00").unwrap());
        assert_eq!(store.get(ids[1]).contract_value, PROMOTIONAL_PRICE);
        assert_eq!(store.get(ids[2]).contract_value, PROMOTIONAL_PRICE);
        assert_eq!(store.get(ids[3]).contract_value, STANDARD_PRICE);
        assert_eq!(store.get(ids[4]).contract_value, PROMOTIONAL_PRICE);

        // Segunda passada não acha mais nada
        assert_eq!(service.expire_promotions(now).await.unwrap().expired, 0);
    }

    #[tokio::test]
    async fn signature_link_is_sent_and_marks_pending() {
        let contract = contract_fixtures::contract(Utc::now());
        let id = contract.id;
        let store = Arc::new(MemoryContractStore {
            contact: Some(Recipient { name: "Maria".into(), email: Some("maria@email.com".into()), ..Default::default() }),
            ..MemoryContractStore::with(vec![contract])
        });
        let mailer = Arc::new(MemoryMailer::default());
        let service = service(store.clone(), mailer.clone());

        let link = service
            .issue_signature_link(id, &SignatureLinkPayload { send_email: true, send_whatsapp: false })
            .await
            .unwrap();

        let stored = store.get(id);
        assert_eq!(stored.signature_status, SignatureStatus::Pending);
        assert_eq!(link.url, format!("{PRODUCTION_SITE_URL}/assinar/{}", stored.signature_token.unwrap()));
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains(&link.url));
    }

    #[tokio::test]
    async fn signed_contract_gets_no_new_link() {
        let mut contract = contract_fixtures::contract(Utc::now());
        contract.signature_status = SignatureStatus::Signed;
        let (id, token) = (contract.id, contract.signature_token);
        let store = Arc::new(MemoryContractStore::with(vec![contract]));
        let service = service(store.clone(), Arc::new(MemoryMailer::default()));

        let err = service
            .issue_signature_link(id, &SignatureLinkPayload { send_email: false, send_whatsapp: false })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadySigned));
        assert_eq!(store.get(id).signature_status, SignatureStatus::Signed);
        assert_eq!(store.get(id).signature_token, token);

        let missing = service
            .issue_signature_link(Uuid::new_v4(), &SignatureLinkPayload { send_email: false, send_whatsapp: false })
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound("contract")));
    }
}
