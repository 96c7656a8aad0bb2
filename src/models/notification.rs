// src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    LinkAssinatura,
    PagamentoConfirmado,
    BoasVindas,
    AtualizacaoProcesso,
}

impl TemplateKey {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKey::LinkAssinatura => "link_assinatura",
            TemplateKey::PagamentoConfirmado => "pagamento_confirmado",
            TemplateKey::BoasVindas => "boas_vindas",
            TemplateKey::AtualizacaoProcesso => "atualizacao_processo",
        }
    }

    pub fn subject(self) -> &'static str {
        match self {
            TemplateKey::LinkAssinatura => "Assine seu contrato - WebMarcas",
            TemplateKey::PagamentoConfirmado => "Pagamento confirmado - WebMarcas",
            TemplateKey::BoasVindas => "Bem-vindo(a) à WebMarcas",
            TemplateKey::AtualizacaoProcesso => "Atualização do processo da sua marca",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            TemplateKey::LinkAssinatura => {
                "Olá {{nome}},\n\nSeu contrato para o registro da marca {{marca}} está pronto.\n\
                 Assine pelo link: {{link_assinatura}}\n\nO link é válido até {{validade}}."
            }
            TemplateKey::PagamentoConfirmado => {
                "Olá {{nome}},\n\nConfirmamos o pagamento de {{valor}} referente à marca {{marca}}.\n\
                 Nossa equipe já iniciou o protocolo junto ao INPI."
            }
            TemplateKey::BoasVindas => {
                "Olá {{nome}},\n\nSua área do cliente foi criada.\n\
                 Acesse {{link_portal}} com o e-mail {{email}} e a senha provisória {{senha}}.\n\
                 Recomendamos trocar a senha no primeiro acesso."
            }
            TemplateKey::AtualizacaoProcesso => {
                "Olá {{nome}},\n\nO processo da marca {{marca}} mudou para: {{status}}.\n\
                 Acompanhe os detalhes em {{link_portal}}."
            }
        }
    }
}

// Histórico de envios (append-only)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    pub channel: String,
    pub recipient: String,
    pub template_key: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Mensagem pronta para despacho.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub profile_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    pub template: TemplateKey,
    pub subject: String,
    pub body: String,
}
