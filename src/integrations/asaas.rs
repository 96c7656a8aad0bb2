// src/integrations/asaas.rs
//
// Cliente REST do gateway de cobrança (Asaas v3).

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, RequestBuilder};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{http_client, ProviderError, HTTP_TIMEOUT_SECS};
use crate::models::finance::BillingType;

// Status em que o dinheiro já está garantido
const PAID_STATUSES: [&str; 3] = ["RECEIVED", "CONFIRMED", "RECEIVED_IN_CASH"];

pub fn is_paid_status(status: &str) -> bool {
    PAID_STATUSES.contains(&status)
}

// --- Tipos da API ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub cpf_cnpj: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub cpf_cnpj: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerList {
    data: Vec<Customer>,
}

/// Cobrança a criar. Parcelado manda `installmentCount` + `installmentValue` no lugar de `value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub customer: String,
    pub billing_type: BillingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_value: Option<Decimal>,
    pub due_date: NaiveDate,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}

impl ChargeRequest {
    pub fn new(
        customer: String,
        billing_type: BillingType,
        total: Decimal,
        installments: u32,
        installment_value: Decimal,
        due_date: NaiveDate,
        description: String,
    ) -> Self {
        let (value, installment_count, installment_value) = if installments > 1 {
            (None, Some(installments), Some(installment_value))
        } else {
            (Some(total), None, None)
        };
        Self {
            customer,
            billing_type,
            value,
            installment_count,
            installment_value,
            due_date,
            description,
            external_reference: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub id: String,
    pub status: String,
    pub value: Option<Decimal>,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub installment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixQrCode {
    /// PNG em base64
    pub encoded_image: String,
    /// Copia e cola
    pub payload: String,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[allow(dead_code)]
    code: Option<String>,
    description: String,
}

// --- Trait ---

#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn find_customer(&self, cpf_cnpj: &str) -> Result<Option<Customer>, ProviderError>;
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ProviderError>;
    async fn create_charge(&self, charge: &ChargeRequest) -> Result<Charge, ProviderError>;
    async fn get_charge(&self, id: &str) -> Result<Charge, ProviderError>;
    async fn pix_qr_code(&self, charge_id: &str) -> Result<PixQrCode, ProviderError>;
}

// --- Cliente HTTP ---

#[derive(Clone)]
pub struct AsaasClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AsaasClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("ASAAS_API_KEY"));
        }
        Ok(Self {
            client: http_client(HTTP_TIMEOUT_SECS)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .header("access_token", &self.api_key)
            .header(header::USER_AGENT, "webmarcas-backend")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let messages = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) if !parsed.errors.is_empty() => {
                parsed.errors.into_iter().map(|e| e.description).collect()
            }
            _ if body.trim().is_empty() => vec![format!("HTTP {}", status.as_u16())],
            _ => vec![body],
        };

        tracing::warn!(status = status.as_u16(), ?messages, "Asaas recusou a requisição");
        Err(ProviderError::Rejected { status: status.as_u16(), messages })
    }
}

#[async_trait]
impl BillingGateway for AsaasClient {
    async fn find_customer(&self, cpf_cnpj: &str) -> Result<Option<Customer>, ProviderError> {
        let list: CustomerList = self
            .send(self.client.get(self.url("/customers")).query(&[("cpfCnpj", cpf_cnpj)]))
            .await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ProviderError> {
        self.send(self.client.post(self.url("/customers")).json(customer)).await
    }

    async fn create_charge(&self, charge: &ChargeRequest) -> Result<Charge, ProviderError> {
        self.send(self.client.post(self.url("/payments")).json(charge)).await
    }

    async fn get_charge(&self, id: &str) -> Result<Charge, ProviderError> {
        self.send(self.client.get(self.url(&format!("/payments/{id}")))).await
    }

    async fn pix_qr_code(&self, charge_id: &str) -> Result<PixQrCode, ProviderError> {
        self.send(self.client.get(self.url(&format!("/payments/{charge_id}/pixQrCode"))))
            .await
    }
}

/// Usado quando não há ASAAS_API_KEY: o servidor sobe, mas toda cobrança falha.
pub struct DisabledGateway;

#[async_trait]
impl BillingGateway for DisabledGateway {
    async fn find_customer(&self, _cpf_cnpj: &str) -> Result<Option<Customer>, ProviderError> {
        Err(ProviderError::NotConfigured("ASAAS_API_KEY"))
    }

    async fn create_customer(&self, _customer: &NewCustomer) -> Result<Customer, ProviderError> {
        Err(ProviderError::NotConfigured("ASAAS_API_KEY"))
    }

    async fn create_charge(&self, _charge: &ChargeRequest) -> Result<Charge, ProviderError> {
        Err(ProviderError::NotConfigured("ASAAS_API_KEY"))
    }

    async fn get_charge(&self, _id: &str) -> Result<Charge, ProviderError> {
        Err(ProviderError::NotConfigured("ASAAS_API_KEY"))
    }

    async fn pix_qr_code(&self, _charge_id: &str) -> Result<PixQrCode, ProviderError> {
        Err(ProviderError::NotConfigured("ASAAS_API_KEY"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AsaasClient {
        AsaasClient::new(server.uri(), "test-key".into()).unwrap()
    }

    fn due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 22).unwrap()
    }

    #[test]
    fn paid_statuses() {
        assert!(is_paid_status("RECEIVED"));
        assert!(is_paid_status("CONFIRMED"));
        assert!(is_paid_status("RECEIVED_IN_CASH"));
        assert!(!is_paid_status("PENDING"));
        assert!(!is_paid_status("OVERDUE"));
    }

    #[test]
    fn single_payment_sends_value_only() {
        let req = ChargeRequest::new("cus_1".into(), BillingType::Pix, Decimal::from(699), 1, Decimal::from(699), due(), "x".into());
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["billingType"], "PIX");
        assert_eq!(body["value"], json!(699.0));
        assert_eq!(body["dueDate"], "2026-10-22");
        assert!(body.get("installmentCount").is_none());
    }

    #[test]
    fn installments_replace_value() {
        let req = ChargeRequest::new("cus_1".into(), BillingType::CreditCard, Decimal::from(1194), 6, Decimal::from(199), due(), "x".into());
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["billingType"], "CREDIT_CARD");
        assert_eq!(body["installmentCount"], 6);
        assert_eq!(body["installmentValue"], json!(199.0));
        assert!(body.get("value").is_none());
    }

    #[test]
    fn missing_key_is_not_configured() {
        assert!(matches!(
            AsaasClient::new("http://localhost".into(), " ".into()),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn finds_customer_by_tax_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("cpfCnpj", "12345678909"))
            .and(header("access_token", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "cus_000001", "name": "Maria", "cpfCnpj": "12345678909" }]
            })))
            .mount(&server)
            .await;

        let found = client(&server).find_customer("12345678909").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some("cus_000001".to_string()));
    }

    #[tokio::test]
    async fn empty_customer_list_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        assert!(client(&server).find_customer("00000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creates_charge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(body_partial_json(json!({ "customer": "cus_1", "billingType": "PIX" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pay_123",
                "status": "PENDING",
                "value": 699.0,
                "invoiceUrl": "https://asaas.test/i/pay_123"
            })))
            .mount(&server)
            .await;

        let req = ChargeRequest::new("cus_1".into(), BillingType::Pix, Decimal::from(699), 1, Decimal::from(699), due(), "Registro".into());
        let charge = client(&server).create_charge(&req).await.unwrap();
        assert_eq!(charge.id, "pay_123");
        assert_eq!(charge.status, "PENDING");
        assert_eq!(charge.invoice_url.as_deref(), Some("https://asaas.test/i/pay_123"));
    }

    #[tokio::test]
    async fn provider_error_descriptions_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{ "code": "invalid_cpfCnpj", "description": "O CPF/CNPJ informado é inválido." }]
            })))
            .mount(&server)
            .await;

        let customer = NewCustomer {
            name: "Maria".into(),
            email: "maria@email.com".into(),
            cpf_cnpj: "11111111111".into(),
            mobile_phone: None,
            postal_code: None,
            address: None,
            address_number: None,
            complement: None,
            province: None,
        };
        let err = client(&server).create_customer(&customer).await.unwrap_err();
        match err {
            ProviderError::Rejected { status, messages } => {
                assert_eq!(status, 400);
                assert_eq!(messages, vec!["O CPF/CNPJ informado é inválido."]);
            }
            other => panic!("erro inesperado: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetches_pix_qr_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_123/pixQrCode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "encodedImage": "iVBORw0KGgo=",
                "payload": "00020101021226...",
                "expirationDate": "2026-10-22 23:59:59"
            })))
            .mount(&server)
            .await;

        let qr = client(&server).pix_qr_code("pay_123").await.unwrap();
        assert_eq!(qr.payload, "00020101021226...");
        assert_eq!(qr.encoded_image, "iVBORw0KGgo=");
    }
}
