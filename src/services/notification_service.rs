// src/services/notification_service.rs
//
// Envio de e-mail/WhatsApp com base nos modelos fixos. Todo envio (ou
// tentativa) vira uma linha em notification_logs.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text},
    db::LogRepository,
    integrations::{smtp::EmailSender, whatsapp::WhatsAppSender},
    models::notification::{Channel, NotificationLog, OutgoingMessage, TemplateKey},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Skipped => "skipped",
        }
    }
}

/// Destino de uma notificação.
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub profile_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    async fn record(&self, message: &OutgoingMessage, status: DeliveryStatus, error: Option<&str>) -> Result<(), AppError>;
}

pub struct PgNotificationLedger {
    pool: PgPool,
    repo: LogRepository,
}

impl PgNotificationLedger {
    pub fn new(pool: PgPool, repo: LogRepository) -> Self {
        Self { pool, repo }
    }
}

#[async_trait]
impl NotificationLedger for PgNotificationLedger {
    async fn record(&self, message: &OutgoingMessage, status: DeliveryStatus, error: Option<&str>) -> Result<(), AppError> {
        self.repo
            .insert_notification(&self.pool, message, status.as_str(), error)
            .await?;
        Ok(())
    }
}

pub fn compose(
    template: TemplateKey,
    channel: Channel,
    recipient: &str,
    profile_id: Option<Uuid>,
    vars: &HashMap<&str, String>,
) -> OutgoingMessage {
    OutgoingMessage {
        profile_id,
        channel,
        recipient: recipient.to_string(),
        template,
        subject: text::render_template(template.subject(), vars),
        body: text::render_template(template.body(), vars),
    }
}

#[derive(Clone)]
pub struct NotificationService {
    email: Option<Arc<dyn EmailSender>>,
    whatsapp: Option<Arc<dyn WhatsAppSender>>,
    ledger: Arc<dyn NotificationLedger>,
    log_repo: Option<LogRepository>,
    portal_url: String,
}

impl NotificationService {
    pub fn new(
        email: Option<Arc<dyn EmailSender>>,
        whatsapp: Option<Arc<dyn WhatsAppSender>>,
        ledger: Arc<dyn NotificationLedger>,
        portal_url: String,
    ) -> Self {
        Self { email, whatsapp, ledger, log_repo: None, portal_url }
    }

    pub fn with_history(mut self, log_repo: LogRepository) -> Self {
        self.log_repo = Some(log_repo);
        self
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    /// Renderiza e envia pelos canais pedidos. Falhas não sobem para quem chamou.
    pub async fn notify(
        &self,
        template: TemplateKey,
        recipient: &Recipient,
        channels: &[Channel],
        mut vars: HashMap<&str, String>,
    ) -> Vec<DeliveryStatus> {
        vars.entry("nome").or_insert_with(|| recipient.name.clone());
        vars.entry("link_portal").or_insert_with(|| self.portal_url.clone());
        if let Some(email) = &recipient.email {
            vars.entry("email").or_insert_with(|| email.clone());
        }

        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let address = match channel {
                Channel::Email => recipient.email.as_deref(),
                Channel::Whatsapp => recipient.phone.as_deref(),
            };
            let Some(address) = address.filter(|a| !a.trim().is_empty()) else {
                continue;
            };
            let message = compose(template, *channel, address, recipient.profile_id, &vars);
            results.push(self.dispatch(message).await);
        }
        results
    }

    pub async fn dispatch(&self, message: OutgoingMessage) -> DeliveryStatus {
        let outcome = match message.channel {
            Channel::Email => match &self.email {
                Some(sender) => Some(
                    sender
                        .send(&message.recipient, &message.subject, &text::text_to_html(&message.body))
                        .await,
                ),
                None => None,
            },
            Channel::Whatsapp => match &self.whatsapp {
                Some(sender) => Some(
                    sender
                        .send_text(&message.recipient, &format!("*{}*\n\n{}", message.subject, message.body))
                        .await,
                ),
                None => None,
            },
        };

        let (status, error) = match outcome {
            Some(Ok(())) => (DeliveryStatus::Sent, None),
            Some(Err(e)) => {
                tracing::warn!(
                    channel = message.channel.as_str(),
                    template = message.template.as_str(),
                    "Falha ao enviar notificação: {}",
                    e
                );
                (DeliveryStatus::Failed, Some(e.to_string()))
            }
            None => {
                tracing::warn!(channel = message.channel.as_str(), "Canal não configurado, notificação ignorada");
                (DeliveryStatus::Skipped, Some("canal não configurado".to_string()))
            }
        };

        if let Err(e) = self.ledger.record(&message, status, error.as_deref()).await {
            tracing::error!("Falha ao registrar notificação: {:?}", e);
        }
        status
    }

    pub async fn history(&self, profile_id: Option<Uuid>) -> Result<Vec<NotificationLog>, AppError> {
        match &self.log_repo {
            Some(repo) => repo.list_notifications(profile_id, 200).await,
            None => Ok(Vec::new()),
        }
    }
}
