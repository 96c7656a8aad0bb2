// src/models/import.rs

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::crm::NewProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Xlsx,
    Xml,
    Pdf,
}

impl ImportFormat {
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(ImportFormat::Csv),
            "xlsx" | "xls" => Some(ImportFormat::Xlsx),
            "xml" => Some(ImportFormat::Xml),
            "pdf" => Some(ImportFormat::Pdf),
            _ => None,
        }
    }
}

/// Planilha já lida: cabeçalho + linhas como texto.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Campos de destino da importação de clientes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ImportField {
    FullName,
    Email,
    Phone,
    CpfCnpj,
    CompanyName,
    Address,
    Neighborhood,
    City,
    State,
    ZipCode,
    BrandName,
    BusinessArea,
    ProcessNumber,
    ContractValue,
    ClientSince,
    Origin,
    Priority,
}

impl ImportField {
    pub const ALL: [ImportField; 17] = [
        ImportField::FullName,
        ImportField::Email,
        ImportField::Phone,
        ImportField::CpfCnpj,
        ImportField::CompanyName,
        ImportField::Address,
        ImportField::Neighborhood,
        ImportField::City,
        ImportField::State,
        ImportField::ZipCode,
        ImportField::BrandName,
        ImportField::BusinessArea,
        ImportField::ProcessNumber,
        ImportField::ContractValue,
        ImportField::ClientSince,
        ImportField::Origin,
        ImportField::Priority,
    ];

    /// Apelidos já normalizados (minúsculas, sem acento, só letras e números).
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ImportField::FullName => &["nome", "nomecompleto", "name", "fullname", "cliente", "titular", "responsavel"],
            ImportField::Email => &["email", "mail", "correioeletronico", "emailcliente"],
            ImportField::Phone => &["telefone", "fone", "celular", "whatsapp", "phone", "mobile", "tel"],
            ImportField::CpfCnpj => &["cpfcnpj", "cpf", "cnpj", "documento", "taxid", "document"],
            ImportField::CompanyName => &["empresa", "razaosocial", "company", "companyname", "nomeempresa"],
            ImportField::Address => &["endereco", "logradouro", "rua", "address", "street"],
            ImportField::Neighborhood => &["bairro", "neighborhood", "district"],
            ImportField::City => &["cidade", "municipio", "city"],
            ImportField::State => &["estado", "uf", "state"],
            ImportField::ZipCode => &["cep", "zipcode", "zip", "codigopostal", "postalcode"],
            ImportField::BrandName => &["marca", "nomemarca", "brand", "brandname", "nomedamarca"],
            ImportField::BusinessArea => &["ramo", "ramoatividade", "ramodeatividade", "atividade", "segmento", "businessarea"],
            ImportField::ProcessNumber => &["processo", "numeroprocesso", "nprocesso", "processnumber", "protocolo"],
            ImportField::ContractValue => &["valor", "valorcontrato", "preco", "value", "amount", "contractvalue"],
            ImportField::ClientSince => &["datacadastro", "cadastro", "data", "criadoem", "createdat", "clientesince"],
            ImportField::Origin => &["origem", "canal", "origin", "source"],
            ImportField::Priority => &["prioridade", "priority"],
        }
    }
}

/// coluna -> campo
pub type ColumnMapping = BTreeMap<usize, ImportField>;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    pub column: usize,
    pub header: String,
    pub field: Option<ImportField>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub format: ImportFormat,
    pub headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub suggested_mapping: Vec<MappingSuggestion>,
}

/// Linha já convertida e validada, pronta para gravar.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub row: usize,
    pub profile: NewProfile,
    pub brand_name: Option<String>,
    pub business_area: Option<String>,
    pub process_number: Option<String>,
    pub contract_value: Option<Decimal>,
    pub client_since: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// Número da linha na planilha (1 = primeira linha de dados)
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub row_errors: Vec<RowError>,
}

impl ImportReport {
    pub fn is_balanced(&self) -> bool {
        self.imported + self.updated + self.skipped + self.errors == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(ImportFormat::from_filename("clientes.CSV"), Some(ImportFormat::Csv));
        assert_eq!(ImportFormat::from_filename("base.xlsx"), Some(ImportFormat::Xlsx));
        assert_eq!(ImportFormat::from_filename("export.xml"), Some(ImportFormat::Xml));
        assert_eq!(ImportFormat::from_filename("rpi.pdf"), Some(ImportFormat::Pdf));
        assert_eq!(ImportFormat::from_filename("semextensao"), None);
    }

    #[test]
    fn mapping_round_trips_through_json() {
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, ImportField::FullName);
        mapping.insert(3, ImportField::Email);
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"0":"fullName","3":"email"}"#);
        let back: ColumnMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping);
    }
}
