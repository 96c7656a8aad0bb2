// src/models/checkout.rs
//
// Wizard de contratação: Viabilidade -> Dados pessoais -> Dados da marca -> Pagamento -> Revisão.
// A sessão é serializável e fica com o cliente; nada é gravado antes do submit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::{error::AppError, text},
    models::finance::PaymentMethod,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStep {
    Viability,
    PersonalData,
    BrandData,
    Payment,
    ContractReview,
}

impl CheckoutStep {
    const ORDER: [CheckoutStep; 5] = [
        CheckoutStep::Viability,
        CheckoutStep::PersonalData,
        CheckoutStep::BrandData,
        CheckoutStep::Payment,
        CheckoutStep::ContractReview,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn next(self) -> Option<Self> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.position().checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutStep::Viability => "viability",
            CheckoutStep::PersonalData => "personalData",
            CheckoutStep::BrandData => "brandData",
            CheckoutStep::Payment => "payment",
            CheckoutStep::ContractReview => "contractReview",
        }
    }
}

// --- VALIDADORES ---

fn validate_tax_id(value: &str) -> Result<(), ValidationError> {
    if text::is_tax_id_length(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_cpf_cnpj"))
    }
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    match text::only_digits(value).len() {
        10 | 11 => Ok(()),
        _ => Err(ValidationError::new("invalid_phone")),
    }
}

fn validate_cep(value: &str) -> Result<(), ValidationError> {
    if text::only_digits(value).len() == 8 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_cep"))
    }
}

fn validate_uf(value: &str) -> Result<(), ValidationError> {
    if value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_state"))
    }
}

fn validate_brand_cnpj(data: &BrandData) -> Result<(), ValidationError> {
    if !data.has_cnpj {
        return Ok(());
    }
    match data.cnpj.as_deref().map(text::only_digits) {
        Some(digits) if digits.len() == 14 => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_cnpj");
            err.message = Some("Informe o CNPJ com 14 dígitos".into());
            Err(err)
        }
    }
}

// --- PAYLOADS DE CADA ETAPA ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViabilityData {
    #[validate(length(min = 2, message = "Informe o nome da marca"))]
    #[schema(example = "Café Bom")]
    pub brand_name: String,

    #[validate(length(min = 2, message = "Informe o ramo de atividade"))]
    #[schema(example = "Cafeteria")]
    pub business_area: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonalData {
    #[validate(length(min = 3, message = "O nome deve ter no mínimo 3 caracteres"))]
    #[schema(example = "Maria da Silva")]
    pub full_name: String,

    #[validate(email(message = "invalid_email"))]
    #[schema(example = "maria@email.com")]
    pub email: String,

    #[validate(custom(function = "validate_phone", message = "Telefone deve ter DDD + número"))]
    #[schema(example = "(11) 98888-7777")]
    pub phone: String,

    #[validate(custom(function = "validate_tax_id", message = "CPF ou CNPJ inválido"))]
    #[schema(example = "123.456.789-09")]
    pub cpf_cnpj: String,

    #[validate(custom(function = "validate_cep", message = "CEP inválido"))]
    #[schema(example = "01310-100")]
    pub cep: String,

    #[validate(length(min = 3, message = "required"))]
    pub address: String,

    #[validate(length(min = 1, message = "required"))]
    pub number: String,

    pub complement: Option<String>,

    #[validate(length(min = 2, message = "required"))]
    pub neighborhood: String,

    #[validate(length(min = 2, message = "required"))]
    pub city: String,

    #[validate(custom(function = "validate_uf", message = "UF inválida"))]
    #[schema(example = "SP")]
    pub state: String,
}

impl PersonalData {
    pub fn full_address(&self) -> String {
        match self.complement.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(complement) => format!("{}, {} - {}", self.address, self.number, complement),
            None => format!("{}, {}", self.address, self.number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_brand_cnpj"))]
pub struct BrandData {
    #[validate(length(min = 2, message = "Informe o nome da marca"))]
    pub brand_name: String,

    #[validate(length(min = 2, message = "Informe o ramo de atividade"))]
    pub business_area: String,

    #[serde(default)]
    pub has_cnpj: bool,
    pub cnpj: Option<String>,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSelection {
    pub method: PaymentMethod,
    #[schema(example = "699.00")]
    pub value: Decimal,
}

impl PaymentSelection {
    fn check_price(&self) -> Result<(), AppError> {
        if self.value == self.method.list_price() {
            Ok(())
        } else {
            Err(AppError::PriceMismatch)
        }
    }
}

/// Entrada de uma etapa: `{ "step": "personalData", "data": {...} }`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "step", content = "data", rename_all = "camelCase")]
pub enum StepInput {
    Viability(ViabilityData),
    PersonalData(PersonalData),
    BrandData(BrandData),
    Payment(PaymentSelection),
}

impl StepInput {
    pub fn step(&self) -> CheckoutStep {
        match self {
            StepInput::Viability(_) => CheckoutStep::Viability,
            StepInput::PersonalData(_) => CheckoutStep::PersonalData,
            StepInput::BrandData(_) => CheckoutStep::BrandData,
            StepInput::Payment(_) => CheckoutStep::Payment,
        }
    }
}

// --- SESSÃO ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub step: CheckoutStep,
    pub viability: Option<ViabilityData>,
    pub personal_data: Option<PersonalData>,
    pub brand_data: Option<BrandData>,
    pub payment: Option<PaymentSelection>,
}

/// Tudo o que o submit precisa, já validado.
#[derive(Debug, Clone)]
pub struct CheckoutSubmission {
    pub viability: ViabilityData,
    pub personal_data: PersonalData,
    pub brand_data: BrandData,
    pub payment: PaymentSelection,
}

impl Default for CheckoutSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self {
            step: CheckoutStep::Viability,
            viability: None,
            personal_data: None,
            brand_data: None,
            payment: None,
        }
    }

    /// Valida a entrada da etapa atual e avança uma etapa.
    /// Em caso de erro a sessão original continua valendo.
    pub fn advance(&self, input: StepInput) -> Result<Self, AppError> {
        if input.step() != self.step {
            return Err(AppError::InvalidStepTransition {
                expected: self.step.as_str().to_string(),
                received: input.step().as_str().to_string(),
            });
        }

        let mut next = self.clone();
        match input {
            StepInput::Viability(data) => {
                data.validate()?;
                // A marca consultada pré-preenche a etapa de dados da marca
                if next.brand_data.is_none() {
                    next.brand_data = Some(BrandData {
                        brand_name: data.brand_name.clone(),
                        business_area: data.business_area.clone(),
                        has_cnpj: false,
                        cnpj: None,
                        company_name: None,
                    });
                }
                next.viability = Some(data);
            }
            StepInput::PersonalData(data) => {
                data.validate()?;
                next.personal_data = Some(data);
            }
            StepInput::BrandData(data) => {
                data.validate()?;
                next.brand_data = Some(data);
            }
            StepInput::Payment(selection) => {
                selection.check_price()?;
                next.payment = Some(selection);
            }
        }

        next.step = self.step.next().unwrap_or(CheckoutStep::ContractReview);
        Ok(next)
    }

    /// Volta exatamente uma etapa. Os dados já preenchidos são mantidos.
    pub fn back(&self) -> Result<Self, AppError> {
        let previous = self.step.previous().ok_or(AppError::NoPreviousStep)?;
        Ok(Self { step: previous, ..self.clone() })
    }

    /// A sessão vem do cliente, então tudo é validado de novo antes do envio.
    pub fn submission(&self) -> Result<CheckoutSubmission, AppError> {
        if self.step != CheckoutStep::ContractReview {
            return Err(AppError::InvalidStepTransition {
                expected: CheckoutStep::ContractReview.as_str().to_string(),
                received: self.step.as_str().to_string(),
            });
        }

        let viability = self.viability.clone().ok_or(AppError::CheckoutIncomplete("viability"))?;
        let personal_data = self.personal_data.clone().ok_or(AppError::CheckoutIncomplete("personalData"))?;
        let brand_data = self.brand_data.clone().ok_or(AppError::CheckoutIncomplete("brandData"))?;
        let payment = self.payment.clone().ok_or(AppError::CheckoutIncomplete("payment"))?;

        viability.validate()?;
        personal_data.validate()?;
        brand_data.validate()?;
        payment.check_price()?;

        Ok(CheckoutSubmission { viability, personal_data, brand_data, payment })
    }
}

// --- REQUESTS / RESPONSES ---

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceCheckoutRequest {
    pub session: CheckoutSession,
    pub input: StepInput,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackCheckoutRequest {
    pub session: CheckoutSession,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCheckoutRequest {
    pub session: CheckoutSession,
    pub contract_html: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutRequest {
    /// Informativo: o lead convertido é sempre o gravado no contrato.
    pub lead_id: Option<Uuid>,
    pub contract_id: Uuid,
    pub personal_data: PersonalData,
    pub brand_data: BrandData,
    pub payment_method: PaymentMethod,
    pub payment_value: Decimal,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn steps_are_linear() {
        assert_eq!(CheckoutStep::Viability.next(), Some(CheckoutStep::PersonalData));
        assert_eq!(CheckoutStep::Payment.next(), Some(CheckoutStep::ContractReview));
        assert_eq!(CheckoutStep::ContractReview.next(), None);
        assert_eq!(CheckoutStep::Viability.previous(), None);
        assert_eq!(CheckoutStep::BrandData.previous(), Some(CheckoutStep::PersonalData));
    }

    #[test]
    fn full_flow_reaches_contract_review() {
        let session = completed_session();
        assert_eq!(session.step, CheckoutStep::ContractReview);
        let submission = session.submission().unwrap();
        assert_eq!(submission.payment.method, PaymentMethod::Avista);
        assert_eq!(submission.personal_data.full_address(), "Av. Paulista, 1000 - Sala 5");
    }

    #[test]
    fn cannot_skip_ahead() {
        let err = CheckoutSession::new()
            .advance(StepInput::Payment(pix()))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStepTransition { .. }));
    }

    #[test]
    fn invalid_fields_block_forward_transition() {
        let session = CheckoutSession::new().advance(StepInput::Viability(viability())).unwrap();
        let mut bad = personal();
        bad.email = "maria-at-email".into();
        bad.cpf_cnpj = "123".into();

        let err = session.advance(StepInput::PersonalData(bad)).unwrap_err();
        match err {
            AppError::ValidationError(errors) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("cpf_cnpj"));
            }
            other => panic!("erro inesperado: {other:?}"),
        }
        assert_eq!(session.step, CheckoutStep::PersonalData);
        assert!(session.personal_data.is_none());
    }

    #[test]
    fn back_goes_one_step_and_keeps_data() {
        let session = completed_session();
        let back = session.back().unwrap();
        assert_eq!(back.step, CheckoutStep::Payment);
        assert!(back.personal_data.is_some());
        assert!(back.payment.is_some());
        assert!(matches!(CheckoutSession::new().back(), Err(AppError::NoPreviousStep)));
    }

    #[test]
    fn viability_prefills_brand_data() {
        let session = CheckoutSession::new().advance(StepInput::Viability(viability())).unwrap();
        assert_eq!(session.brand_data.unwrap().brand_name, "Café Bom");
    }

    #[test]
    fn brand_with_cnpj_requires_fourteen_digits() {
        let mut brand = brand();
        brand.has_cnpj = true;
        brand.cnpj = Some("12.345.678".into());
        assert!(brand.validate().is_err());
        brand.cnpj = Some("12.345.678/0001-90".into());
        assert!(brand.validate().is_ok());
    }

    #[test]
    fn payment_value_must_match_price_table() {
        let session = CheckoutSession::new()
            .advance(StepInput::Viability(viability()))
            .and_then(|s| s.advance(StepInput::PersonalData(personal())))
            .and_then(|s| s.advance(StepInput::BrandData(brand())))
            .unwrap();

        let cheap = PaymentSelection { method: PaymentMethod::Cartao6x, value: PaymentMethod::Avista.list_price() };
        assert!(matches!(session.advance(StepInput::Payment(cheap)), Err(AppError::PriceMismatch)));
    }

    #[test]
    fn tampered_session_is_rejected_on_submit() {
        let mut session = completed_session();
        session.personal_data.as_mut().unwrap().email = "invalido".into();
        assert!(matches!(session.submission(), Err(AppError::ValidationError(_))));

        let mut early = completed_session();
        early.step = CheckoutStep::Payment;
        assert!(matches!(early.submission(), Err(AppError::InvalidStepTransition { .. })));
    }

    #[test]
    fn session_survives_serialization() {
        let session = completed_session();
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"step\":\"contractReview\""));
        let restored: CheckoutSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn step_input_wire_format() {
        let input: StepInput = serde_json::from_value(serde_json::json!({
            "step": "viability",
            "data": { "brandName": "Café Bom", "businessArea": "Cafeteria" }
        }))
        .unwrap();
        assert_eq!(input.step(), CheckoutStep::Viability);
    }
}
