// src/integrations/timestamp.rs
//
// Carimbo de tempo via servidores de calendário OpenTimestamps.
// O digest vai para todos os calendários ao mesmo tempo; vale a primeira resposta 2xx.

use async_trait::async_trait;
use futures::future::{select_ok, BoxFuture, FutureExt};

use super::{http_client, ProviderError};

pub const DEFAULT_CALENDARS: [&str; 4] = [
    "https://a.pool.opentimestamps.org",
    "https://b.pool.opentimestamps.org",
    "https://a.pool.eternitywall.com",
    "https://ots.btc.catallaxy.com",
];

const CALENDAR_TIMEOUT_SECS: u64 = 15;

/// Recibo devolvido pelo calendário que respondeu primeiro.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarReceipt {
    pub calendar_url: String,
    pub proof: Vec<u8>,
}

#[async_trait]
pub trait TimestampCalendar: Send + Sync {
    async fn stamp(&self, digest: [u8; 32]) -> Result<CalendarReceipt, ProviderError>;
}

#[derive(Clone)]
pub struct OpenTimestampsClient {
    client: reqwest::Client,
    calendars: Vec<String>,
}

impl OpenTimestampsClient {
    pub fn new(calendars: Vec<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(CALENDAR_TIMEOUT_SECS)?,
            calendars: calendars
                .into_iter()
                .map(|c| c.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    pub fn with_default_calendars() -> Result<Self, ProviderError> {
        Self::new(DEFAULT_CALENDARS.iter().map(|c| c.to_string()).collect())
    }

    async fn submit(client: reqwest::Client, calendar: String, digest: [u8; 32]) -> Result<CalendarReceipt, ProviderError> {
        let response = client
            .post(format!("{calendar}/digest"))
            .header("Accept", "application/vnd.opentimestamps.v1")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(digest.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                messages: vec![format!("{calendar} respondeu {status}")],
            });
        }

        let proof = response.bytes().await?.to_vec();
        Ok(CalendarReceipt { calendar_url: calendar, proof })
    }
}

#[async_trait]
impl TimestampCalendar for OpenTimestampsClient {
    async fn stamp(&self, digest: [u8; 32]) -> Result<CalendarReceipt, ProviderError> {
        if self.calendars.is_empty() {
            return Err(ProviderError::NotConfigured("calendários de timestamp"));
        }

        let attempts: Vec<BoxFuture<'static, Result<CalendarReceipt, ProviderError>>> = self
            .calendars
            .iter()
            .map(|calendar| Self::submit(self.client.clone(), calendar.clone(), digest).boxed())
            .collect();

        // As tentativas restantes são descartadas junto com o vetor
        let (receipt, _pending) = select_ok(attempts).await?;
        tracing::info!(calendar = %receipt.calendar_url, "Digest carimbado");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn first_successful_calendar_wins() {
        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/digest"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&failing)
            .await;

        let slow = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/digest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0xAA; 8])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&slow)
            .await;

        let fast = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/digest"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xF0, 0x0D]))
            .mount(&fast)
            .await;

        let client = OpenTimestampsClient::new(vec![failing.uri(), slow.uri(), fast.uri()]).unwrap();
        let receipt = client.stamp([7u8; 32]).await.unwrap();

        assert_eq!(receipt.calendar_url, fast.uri());
        assert_eq!(receipt.proof, vec![0xF0, 0x0D]);
    }

    #[tokio::test]
    async fn fails_when_every_calendar_fails() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        for server in [&a, &b] {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .mount(server)
                .await;
        }

        let client = OpenTimestampsClient::new(vec![a.uri(), b.uri()]).unwrap();
        assert!(client.stamp([1u8; 32]).await.is_err());
    }

    #[tokio::test]
    async fn empty_calendar_list_is_an_error() {
        let client = OpenTimestampsClient::new(vec![]).unwrap();
        assert!(matches!(client.stamp([0u8; 32]).await, Err(ProviderError::NotConfigured(_))));
    }
}
