// src/services/import_parser.rs
//
// Leitura de planilhas (CSV/XLSX/XML), sugestão de mapeamento de colunas e
// conversão das linhas em ClientRecord. Nada aqui toca o banco.

use std::{
    collections::{HashMap, HashSet},
    io::Cursor,
};

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use quick_xml::{events::Event, Reader as XmlReader};
use rust_decimal::Decimal;
use std::str::FromStr;
use validator::ValidateEmail;

use crate::{
    common::{error::AppError, text},
    models::{
        crm::NewProfile,
        import::{ClientRecord, ColumnMapping, ImportField, ImportFormat, MappingSuggestion, ParsedSheet, RowError},
    },
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const FUZZY_THRESHOLD: f64 = 0.88;

pub fn parse_file(format: ImportFormat, bytes: &[u8]) -> Result<ParsedSheet, AppError> {
    let sheet = match format {
        ImportFormat::Csv => parse_csv(bytes)?,
        ImportFormat::Xlsx => parse_xlsx(bytes)?,
        ImportFormat::Xml => parse_xml(bytes)?,
        ImportFormat::Pdf => return Err(AppError::UnsupportedImportFormat("pdf".into())),
    };

    if sheet.headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::ImportParse("arquivo sem cabeçalho".into()));
    }
    Ok(sheet)
}

// --- CSV ---

fn sniff_delimiter(first_line: &str) -> u8 {
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons >= commas && semicolons > 0 { b';' } else { b',' }
}

/// CSV exportado em Latin-1/Windows-1252 é recusado em vez de ter os acentos trocados.
fn decode_utf8(bytes: &[u8]) -> Result<&str, AppError> {
    std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        AppError::ImportParse(format!(
            "arquivo não está em UTF-8 (linha {line}); salve a planilha como \"CSV UTF-8\" e envie de novo"
        ))
    })
}

pub fn parse_csv(bytes: &[u8]) -> Result<ParsedSheet, AppError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let content = decode_utf8(bytes)?;
    let delimiter = sniff_delimiter(content.lines().next().unwrap_or_default());

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => record
            .map_err(|e| AppError::ImportParse(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
        None => return Ok(ParsedSheet::default()),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| AppError::ImportParse(e.to_string()))?;
        let row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
        if row.iter().any(|v| !v.is_empty()) {
            rows.push(row);
        }
    }

    Ok(ParsedSheet { headers, rows })
}

// --- XLSX ---

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        // Serial do Excel; parse_date sabe converter
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

pub fn parse_xlsx(bytes: &[u8]) -> Result<ParsedSheet, AppError> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes.to_vec())).map_err(|e: calamine::XlsxError| AppError::ImportParse(e.to_string()))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AppError::ImportParse("planilha sem abas".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| AppError::ImportParse(e.to_string()))?;

    let mut rows = range.rows().map(|r| r.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    let rows = rows.filter(|r| r.iter().any(|v| !v.is_empty())).collect();

    Ok(ParsedSheet { headers, rows })
}

// --- XML ---

/// O elemento de registro é o filho mais frequente da raiz. Cada filho dele
/// (ou atributo) vira uma coluna.
pub fn parse_xml(bytes: &[u8]) -> Result<ParsedSheet, AppError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = XmlReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut records: Vec<(String, Vec<(String, String)>)> = Vec::new();
    let mut depth = 0usize;
    let mut current_field: Option<String> = None;
    let mut buf = Vec::new();

    let xml_err = |e: quick_xml::Error| AppError::ImportParse(format!("XML inválido: {e}"));

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match depth {
                    2 => {
                        let attributes = e
                            .attributes()
                            .flatten()
                            .map(|a| {
                                let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
                                let value = a.unescape_value().map(|v| v.into_owned()).unwrap_or_default();
                                (key, value)
                            })
                            .collect();
                        records.push((name, attributes));
                    }
                    3 => current_field = Some(name),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if depth == 1 {
                    records.push((String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), Vec::new()));
                } else if depth == 2 {
                    if let Some((_, fields)) = records.last_mut() {
                        fields.push((String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), String::new()));
                    }
                }
            }
            Event::Text(t) => {
                if depth == 3 {
                    if let (Some(field), Some((_, fields))) = (current_field.as_ref(), records.last_mut()) {
                        let value = t.unescape().map_err(xml_err)?.trim().to_string();
                        fields.push((field.clone(), value));
                    }
                }
            }
            Event::CData(c) => {
                if depth == 3 {
                    if let (Some(field), Some((_, fields))) = (current_field.as_ref(), records.last_mut()) {
                        fields.push((field.clone(), String::from_utf8_lossy(&c.into_inner()).trim().to_string()));
                    }
                }
            }
            Event::End(_) => {
                if depth == 3 {
                    // <campo></campo> sem texto ainda é uma coluna
                    if let (Some(field), Some((_, fields))) = (current_field.take(), records.last_mut()) {
                        if !fields.iter().any(|(name, _)| *name == field) {
                            fields.push((field, String::new()));
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for (name, _) in &records {
        *frequency.entry(name.as_str()).or_default() += 1;
    }
    let Some(record_name) = frequency
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string())
    else {
        return Ok(ParsedSheet::default());
    };

    let records: Vec<_> = records.into_iter().filter(|(name, _)| *name == record_name).collect();

    let mut headers: Vec<String> = Vec::new();
    for (_, fields) in &records {
        for (field, _) in fields {
            if !headers.contains(field) {
                headers.push(field.clone());
            }
        }
    }

    let rows = records
        .into_iter()
        .map(|(_, fields)| {
            headers
                .iter()
                .map(|h| {
                    fields
                        .iter()
                        .find(|(name, _)| name == h)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    Ok(ParsedSheet { headers, rows })
}

// --- MAPEAMENTO ---

fn match_header(normalized: &str, used: &[ImportField]) -> Option<ImportField> {
    if normalized.is_empty() {
        return None;
    }
    let free = move || ImportField::ALL.into_iter().filter(move |f| !used.contains(f));

    if let Some(field) = free().find(|f| f.aliases().contains(&normalized)) {
        return Some(field);
    }

    // Contenção: fica com o apelido mais longo encontrado
    let contained = free()
        .flat_map(|f| f.aliases().iter().map(move |a| (f, *a)))
        .filter(|(_, alias)| alias.len() >= 4 && (normalized.contains(alias) || alias.contains(normalized)))
        .max_by_key(|(_, alias)| alias.len());
    if let Some((field, _)) = contained {
        return Some(field);
    }

    free()
        .flat_map(|f| f.aliases().iter().map(move |a| (f, strsim::jaro_winkler(normalized, a))))
        .filter(|(_, score)| *score >= FUZZY_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(field, _)| field)
}

/// Cada campo é sugerido para no máximo uma coluna (a primeira que casar).
pub fn suggest_mapping(headers: &[String]) -> Vec<MappingSuggestion> {
    let mut used = Vec::new();
    headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            let field = match_header(&text::normalize_key(header), &used);
            if let Some(f) = field {
                used.push(f);
            }
            MappingSuggestion { column, header: header.clone(), field }
        })
        .collect()
}

pub fn mapping_from_suggestions(suggestions: &[MappingSuggestion]) -> ColumnMapping {
    suggestions
        .iter()
        .filter_map(|s| s.field.map(|f| (s.column, f)))
        .collect()
}

// --- CONVERSÃO ---

/// "R$ 1.194,50", "1,194.50", "699" -> Decimal.
pub fn parse_currency(value: &str) -> Option<Decimal> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && decimals <= 2 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(d)) => {
            let decimals = cleaned.len() - d - 1;
            if cleaned.matches('.').count() > 1 || decimals == 3 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    Decimal::from_str(&normalized).ok().map(|d| d.round_dp(2))
}

const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Datas em texto ou serial do Excel (dias desde 1899-12-30).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.split(['T', ' ']).next().unwrap_or(value);

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
    {
        return Some(date);
    }

    let serial = value.parse::<f64>().ok()?;
    if !(1.0..=100_000.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Converte uma linha. `row` é 1 para a primeira linha de dados.
pub fn build_record(row: usize, values: &[String], mapping: &ColumnMapping) -> Result<ClientRecord, String> {
    let mut fields: HashMap<ImportField, String> = HashMap::new();
    for (column, field) in mapping {
        if let Some(value) = non_empty(values.get(*column)) {
            fields.entry(*field).or_insert(value);
        }
    }
    let get = |field: ImportField| fields.get(&field).cloned();

    let full_name = get(ImportField::FullName).ok_or("nome ausente")?;
    if full_name.chars().count() < 2 {
        return Err(format!("nome inválido: {full_name}"));
    }

    let email = get(ImportField::Email).ok_or("e-mail ausente")?.to_lowercase();
    if !email.validate_email() {
        return Err(format!("e-mail inválido: {email}"));
    }

    let cpf_cnpj = match get(ImportField::CpfCnpj) {
        Some(doc) if text::is_tax_id_length(&doc) => Some(text::only_digits(&doc)),
        Some(doc) => return Err(format!("CPF/CNPJ inválido: {doc}")),
        None => None,
    };

    let contract_value = match get(ImportField::ContractValue) {
        Some(raw) => Some(parse_currency(&raw).ok_or(format!("valor inválido: {raw}"))?),
        None => None,
    };

    let client_since = match get(ImportField::ClientSince) {
        Some(raw) => Some(parse_date(&raw).ok_or(format!("data inválida: {raw}"))?),
        None => None,
    };

    let process_number = get(ImportField::ProcessNumber)
        .map(|n| text::only_digits(&n))
        .filter(|n| !n.is_empty());

    let profile = NewProfile {
        full_name,
        email,
        phone: get(ImportField::Phone),
        cpf_cnpj,
        company_name: get(ImportField::CompanyName),
        address: get(ImportField::Address),
        neighborhood: get(ImportField::Neighborhood),
        city: get(ImportField::City),
        state: get(ImportField::State).map(|s| s.to_uppercase()),
        zip_code: get(ImportField::ZipCode).map(|z| text::only_digits(&z)),
        origin: get(ImportField::Origin).or_else(|| Some("importacao".to_string())),
        priority: get(ImportField::Priority).map(|p| p.to_lowercase()),
    };

    Ok(ClientRecord {
        row,
        profile,
        brand_name: get(ImportField::BrandName),
        business_area: get(ImportField::BusinessArea),
        process_number,
        contract_value,
        client_since,
    })
}

/// Valida todas as linhas em sequência; erros não interrompem as demais.
pub fn validate_rows(sheet: &ParsedSheet, mapping: &ColumnMapping) -> (Vec<ClientRecord>, Vec<RowError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut seen_emails = HashSet::new();

    for (index, values) in sheet.rows.iter().enumerate() {
        let row = index + 1;
        match build_record(row, values, mapping) {
            Ok(record) if !seen_emails.insert(record.profile.email.to_lowercase()) => errors.push(RowError {
                row,
                message: format!("e-mail duplicado no arquivo: {}", record.profile.email),
            }),
            Ok(record) => records.push(record),
            Err(message) => errors.push(RowError { row, message }),
        }
    }
    (records, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn csv_with_bom_and_semicolons() {
        let data = "\u{feff}Nome;E-mail;Valor\nMaria;maria@email.com;\"R$ 1.194,00\"\n;;\nJoão;joao@email.com;699\n";
        let sheet = parse_csv(data.as_bytes()).unwrap();

        assert_eq!(sheet.headers, headers(&["Nome", "E-mail", "Valor"]));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0][2], "R$ 1.194,00");
        assert_eq!(sheet.rows[1][0], "João");
    }

    #[test]
    fn csv_with_commas() {
        let sheet = parse_csv(b"name,email\nAna,ana@x.com\n").unwrap();
        assert_eq!(sheet.headers, headers(&["name", "email"]));
        assert_eq!(sheet.rows, vec![headers(&["Ana", "ana@x.com"])]);
    }

    #[test]
    fn latin1_csv_is_rejected_not_mangled() {
        // "João" em Windows-1252: 0xE3 sozinho não é UTF-8 válido
        let data = b"Nome;E-mail\nMaria;maria@email.com\nJo\xE3o;joao@email.com\n";

        let err = parse_csv(data).unwrap_err();

        match err {
            AppError::ImportParse(message) => {
                assert!(message.contains("UTF-8"));
                assert!(message.contains("linha 3"));
            }
            other => panic!("erro inesperado: {other:?}"),
        }
        assert!(matches!(parse_file(ImportFormat::Csv, data), Err(AppError::ImportParse(_))));
    }

    #[test]
    fn xml_uses_most_frequent_child() {
        let xml = r#"<?xml version="1.0"?>
            <clientes>
              <meta><gerado>2026-01-01</gerado></meta>
              <cliente id="1"><nome>Maria</nome><email>maria@email.com</email></cliente>
              <cliente id="2"><nome>João &amp; Filhos</nome><cidade>Santos</cidade></cliente>
            </clientes>"#;
        let sheet = parse_xml(xml.as_bytes()).unwrap();

        assert_eq!(sheet.headers, headers(&["id", "nome", "email", "cidade"]));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], headers(&["1", "Maria", "maria@email.com", ""]));
        assert_eq!(sheet.rows[1], headers(&["2", "João & Filhos", "", "Santos"]));
    }

    #[test]
    fn broken_xml_is_a_parse_error() {
        assert!(matches!(parse_xml(b"<a><b></a>"), Err(AppError::ImportParse(_))));
    }

    #[test]
    fn pdf_is_rejected() {
        assert!(matches!(
            parse_file(ImportFormat::Pdf, b"%PDF-1.4"),
            Err(AppError::UnsupportedImportFormat(_))
        ));
    }

    #[test]
    fn garbage_xlsx_is_a_parse_error() {
        assert!(matches!(parse_xlsx(b"isso nao e um zip"), Err(AppError::ImportParse(_))));
    }

    #[test]
    fn suggests_mapping_by_alias_containment_and_similarity() {
        let suggestions = suggest_mapping(&headers(&[
            "Nome Completo",
            "E-mail do Cliente",
            "Telefone",
            "CPF",
            "Nome da Marca",
            "Cidde",
            "Coluna X",
        ]));
        let fields: Vec<_> = suggestions.iter().map(|s| s.field).collect();

        assert_eq!(
            fields,
            vec![
                Some(ImportField::FullName),
                Some(ImportField::Email),
                Some(ImportField::Phone),
                Some(ImportField::CpfCnpj),
                Some(ImportField::BrandName),
                Some(ImportField::City),
                None,
            ]
        );
    }

    #[test]
    fn a_field_is_suggested_once() {
        let suggestions = suggest_mapping(&headers(&["email", "e-mail"]));
        assert_eq!(suggestions[0].field, Some(ImportField::Email));
        assert_eq!(suggestions[1].field, None);
    }

    #[test]
    fn currency_formats() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(parse_currency("R$ 1.194,00"), Some(d("1194.00")));
        assert_eq!(parse_currency("1,194.50"), Some(d("1194.50")));
        assert_eq!(parse_currency("699,9"), Some(d("699.9")));
        assert_eq!(parse_currency("1.194"), Some(d("1194")));
        assert_eq!(parse_currency("699.00"), Some(d("699.00")));
        assert_eq!(parse_currency("abc"), None);
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date("15/03/2024"), expected);
        assert_eq!(parse_date("2024-03-15"), expected);
        assert_eq!(parse_date("15-03-2024"), expected);
        assert_eq!(parse_date("2024-03-15T10:00:00"), expected);
        assert_eq!(parse_date("45366"), expected);
        assert_eq!(parse_date("amanhã"), None);
    }

    fn mapping() -> ColumnMapping {
        let mut m = ColumnMapping::new();
        m.insert(0, ImportField::FullName);
        m.insert(1, ImportField::Email);
        m.insert(2, ImportField::CpfCnpj);
        m.insert(3, ImportField::ContractValue);
        m.insert(4, ImportField::State);
        m
    }

    #[test]
    fn builds_record_with_coercion() {
        let record = build_record(
            1,
            &headers(&["Maria", "Maria@Email.com", "123.456.789-09", "R$ 699,00", "sp"]),
            &mapping(),
        )
        .unwrap();

        assert_eq!(record.profile.email, "maria@email.com");
        assert_eq!(record.profile.cpf_cnpj.as_deref(), Some("12345678909"));
        assert_eq!(record.profile.state.as_deref(), Some("SP"));
        assert_eq!(record.profile.origin.as_deref(), Some("importacao"));
        assert_eq!(record.contract_value, Some(Decimal::from(699)));
    }

    #[test]
    fn invalid_rows_are_reported_individually() {
        let sheet = ParsedSheet {
            headers: headers(&["nome", "email", "cpf", "valor", "uf"]),
            rows: vec![
                headers(&["Maria", "maria@email.com", "", "", ""]),
                headers(&["Pedro", "pedro-sem-arroba", "", "", ""]),
                headers(&["Ana", "ana@email.com", "123", "", ""]),
                headers(&["", "semnome@email.com", "", "", ""]),
                headers(&["Maria Souza", "MARIA@email.com", "", "", ""]),
            ],
        };

        let (records, errors) = validate_rows(&sheet, &mapping());

        assert_eq!(records.len(), 1);
        assert_eq!(errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        assert!(errors[0].message.contains("e-mail inválido"));
        assert!(errors[1].message.contains("CPF/CNPJ"));
        assert_eq!(errors[2].message, "nome ausente");
        assert!(errors[3].message.starts_with("e-mail duplicado"));
    }
}
