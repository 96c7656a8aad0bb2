// src/models/finance.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

/// Forma de pagamento escolhida no checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// PIX à vista, preço promocional
    Avista,
    /// Cartão de crédito em 6x
    Cartao6x,
    /// Boleto em 3x
    Boleto3x,
}

/// Tipo de cobrança no gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Pix,
    Boleto,
    CreditCard,
}

pub const PROMOTIONAL_PRICE: Decimal = Decimal::from_parts(69900, 0, 0, false, 2);
pub const STANDARD_PRICE: Decimal = Decimal::from_parts(119400, 0, 0, false, 2);
pub const BOLETO_PRICE: Decimal = Decimal::from_parts(119700, 0, 0, false, 2);

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Avista => "avista",
            PaymentMethod::Cartao6x => "cartao6x",
            PaymentMethod::Boleto3x => "boleto3x",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Avista => "PIX à vista",
            PaymentMethod::Cartao6x => "Cartão de crédito em 6x",
            PaymentMethod::Boleto3x => "Boleto bancário em 3x",
        }
    }

    pub fn billing_type(self) -> BillingType {
        match self {
            PaymentMethod::Avista => BillingType::Pix,
            PaymentMethod::Cartao6x => BillingType::CreditCard,
            PaymentMethod::Boleto3x => BillingType::Boleto,
        }
    }

    pub fn installments(self) -> u32 {
        match self {
            PaymentMethod::Avista => 1,
            PaymentMethod::Cartao6x => 6,
            PaymentMethod::Boleto3x => 3,
        }
    }

    pub fn list_price(self) -> Decimal {
        match self {
            PaymentMethod::Avista => PROMOTIONAL_PRICE,
            PaymentMethod::Cartao6x => STANDARD_PRICE,
            PaymentMethod::Boleto3x => BOLETO_PRICE,
        }
    }
}

impl BillingType {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingType::Pix => "PIX",
            BillingType::Boleto => "BOLETO",
            BillingType::CreditCard => "CREDIT_CARD",
        }
    }
}

/// Valor da parcela arredondado para cima no centavo: ceil(total / n * 100) / 100.
/// A soma das parcelas nunca fica abaixo do total.
pub fn installment_value(total: Decimal, count: u32) -> Decimal {
    let count = Decimal::from(count.max(1));
    let cents = (total * Decimal::ONE_HUNDRED / count).ceil();
    (cents / Decimal::ONE_HUNDRED).round_dp(2)
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    pub process_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,

    #[schema(example = "Registro de marca: Café Bom")]
    pub description: String,

    #[schema(example = "699.00")]
    pub amount: Decimal,

    #[schema(value_type = String, format = Date, example = "2026-10-22")]
    pub due_date: NaiveDate,

    pub status: InvoiceStatus,

    #[schema(example = "PIX")]
    pub billing_type: String,
    pub installment_count: i32,
    pub installment_value: Decimal,

    pub asaas_payment_id: Option<String>,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_payload: Option<String>,
    pub pix_qr_code: Option<String>,

    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Dados da fatura antes de existir no banco.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub profile_id: Option<Uuid>,
    pub description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub billing_type: BillingType,
    pub installment_count: u32,
    pub installment_value: Decimal,
    pub asaas_payment_id: String,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_payload: Option<String>,
    pub pix_qr_code: Option<String>,
}

// --- RESPOSTAS ---

/// Resultado do checkout: cobrança criada + contrato pronto para assinar.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub lead_id: Option<Uuid>,
    pub contract_id: Uuid,
    pub invoice_id: Uuid,
    #[schema(example = "pay_080225913252")]
    pub payment_id: String,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub installment_count: u32,
    pub installment_value: Decimal,
    #[schema(value_type = String, format = Date)]
    pub due_date: NaiveDate,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    /// PIX copia e cola
    pub pix_payload: Option<String>,
    /// QR code PIX (PNG em base64)
    pub pix_qr_code: Option<String>,
    pub signature_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub invoice_id: Uuid,
    pub status: InvoiceStatus,
    #[schema(example = "RECEIVED")]
    pub provider_status: String,
    pub paid: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub process_id: Uuid,
    pub contract_id: Uuid,
    /// true quando a confirmação já tinha sido feita antes
    pub already_confirmed: bool,
}

/// Evento enviado pelo gateway (`PAYMENT_RECEIVED`, `PAYMENT_OVERDUE`...).
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub event: String,
    pub payment: Option<WebhookPayment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookPayment {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub updated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    #[test]
    fn list_prices() {
        assert_eq!(PaymentMethod::Avista.list_price(), Decimal::from_str("699.00").unwrap());
        assert_eq!(PaymentMethod::Cartao6x.list_price(), Decimal::from_str("1194.00").unwrap());
        assert_eq!(PaymentMethod::Boleto3x.list_price(), Decimal::from_str("1197.00").unwrap());
    }

    #[test]
    fn exact_splits_have_no_remainder() {
        assert_eq!(installment_value(Decimal::from(1194), 6), Decimal::from(199));
        assert_eq!(installment_value(Decimal::from(1197), 3), Decimal::from(399));
        assert_eq!(installment_value(Decimal::from(699), 1), Decimal::from(699));
    }

    #[test]
    fn remainder_rounds_up_to_the_cent() {
        assert_eq!(installment_value(Decimal::from(100), 3), Decimal::from_str("33.34").unwrap());
    }

    proptest! {
        #[test]
        fn installments_cover_total_within_count_cents(cents in 1i64..10_000_000, count in 1u32..=24) {
            let total = Decimal::new(cents, 2);
            let value = installment_value(total, count);
            let sum = value * Decimal::from(count);

            prop_assert!(sum >= total);
            prop_assert!(sum - total <= Decimal::new(count as i64, 2));
        }
    }
}
