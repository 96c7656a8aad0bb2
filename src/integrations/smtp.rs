// src/integrations/smtp.rs

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::ProviderError;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, ProviderError> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| ProviderError::Decode(format!("SMTP_FROM inválido: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| ProviderError::Decode(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(settings.user.clone(), settings.password.clone()))
            .build();

        Ok(Self { transport, from })
    }
}

pub fn build_message(from: &Mailbox, to: &str, subject: &str, html: &str) -> Result<Message, ProviderError> {
    let to = to
        .parse::<Mailbox>()
        .map_err(|e| ProviderError::Decode(format!("destinatário inválido: {e}")))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html.to_string())
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ProviderError> {
        let message = build_message(&self.from, to, subject, html)?;
        self.transport.send(message).await.map_err(|e| ProviderError::Rejected {
            status: 0,
            messages: vec![e.to_string()],
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Mailbox {
        "WebMarcas <contato@webmarcas.net>".parse().unwrap()
    }

    #[test]
    fn builds_html_message() {
        let message = build_message(&from(), "maria@email.com", "Assine seu contrato", "<p>Olá</p>").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: maria@email.com"));
        assert!(raw.contains("Subject: Assine seu contrato"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        assert!(build_message(&from(), "não é email", "x", "y").is_err());
    }
}
