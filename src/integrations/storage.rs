// src/integrations/storage.rs
//
// Armazenamento de objetos (API REST de storage do Supabase).

use async_trait::async_trait;
use uuid::Uuid;

use super::{http_client, ProviderError, HTTP_TIMEOUT_SECS};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Grava (ou substitui) o objeto e devolve a URL pública.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ProviderError>;
}

#[derive(Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(base_url: String, bucket: String, service_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(HTTP_TIMEOUT_SECS)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            service_key,
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ProviderError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status: status.as_u16(), messages: vec![body] });
        }

        Ok(self.public_url(path))
    }
}

/// `signed-contracts/{contrato}/{timestamp}_{arquivo}.pdf`
pub fn signed_contract_path(contract_id: Uuid, timestamp_ms: i64, filename: &str) -> String {
    let safe: String = filename
        .trim_end_matches(".pdf")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("signed-contracts/{contract_id}/{timestamp_ms}_{safe}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn builds_signed_contract_path() {
        let id = Uuid::nil();
        assert_eq!(
            signed_contract_path(id, 1760000000000, "contrato café.pdf"),
            format!("signed-contracts/{id}/1760000000000_contrato_caf_.pdf")
        );
    }

    #[tokio::test]
    async fn upload_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/documents/signed-contracts/x/1_a.pdf"))
            .and(header("x-upsert", "true"))
            .and(header("apikey", "service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Key": "documents/signed-contracts/x/1_a.pdf" })))
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(server.uri(), "documents".into(), "service".into()).unwrap();
        let url = storage
            .upload("signed-contracts/x/1_a.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();

        assert_eq!(url, format!("{}/storage/v1/object/public/documents/signed-contracts/x/1_a.pdf", server.uri()));
    }

    #[tokio::test]
    async fn upload_failure_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(server.uri(), "documents".into(), "bad".into()).unwrap();
        let err = storage.upload("a.pdf", vec![], "application/pdf").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: 403, .. }));
    }
}
