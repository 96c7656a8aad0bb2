// src/integrations/whatsapp.rs
//
// Envio de mensagens pela Evolution API.

use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, ProviderError, HTTP_TIMEOUT_SECS};
use crate::common::text::only_digits;

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), ProviderError>;
}

#[derive(Serialize)]
struct SendTextBody<'a> {
    number: String,
    text: &'a str,
}

#[derive(Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    instance: String,
}

impl EvolutionClient {
    pub fn new(base_url: String, api_key: String, instance: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(HTTP_TIMEOUT_SECS)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            instance,
        })
    }
}

/// Número no formato internacional sem símbolos; DDI 55 quando vier só com DDD.
pub fn normalize_phone(phone: &str) -> String {
    let digits = only_digits(phone);
    match digits.len() {
        10 | 11 => format!("55{digits}"),
        _ => digits,
    }
}

#[async_trait]
impl WhatsAppSender for EvolutionClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!("{}/message/sendText/{}", self.base_url, self.instance))
            .header("apikey", &self.api_key)
            .json(&SendTextBody { number: normalize_phone(phone), text })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::Rejected { status: status.as_u16(), messages: vec![body] })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn phones_get_country_code() {
        assert_eq!(normalize_phone("(11) 98888-7777"), "5511988887777");
        assert_eq!(normalize_phone("+55 11 98888-7777"), "5511988887777");
    }

    #[tokio::test]
    async fn sends_text_to_instance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/webmarcas"))
            .and(header("apikey", "evo-key"))
            .and(body_json(json!({ "number": "5511988887777", "text": "Olá" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "key": { "id": "ABC" } })))
            .expect(1)
            .mount(&server)
            .await;

        let client = EvolutionClient::new(server.uri(), "evo-key".into(), "webmarcas".into()).unwrap();
        client.send_text("(11) 98888-7777", "Olá").await.unwrap();
    }

    #[tokio::test]
    async fn provider_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = EvolutionClient::new(server.uri(), "k".into(), "i".into()).unwrap();
        assert!(client.send_text("11988887777", "x").await.is_err());
    }
}
