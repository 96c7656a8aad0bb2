// src/services/import_service.rs
//
// Importação de clientes a partir de planilhas e exportação em CSV.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::{CrmRepository, ProcessRepository},
    models::{
        crm::{ClientScope, Profile},
        import::{ClientRecord, ColumnMapping, ImportFormat, ImportPreview, ImportReport, RowError},
        process::ProcessExportRow,
    },
    services::import_parser,
};

const WRITE_BATCH: usize = 5;
const PREVIEW_ROWS: usize = 5;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Skipped,
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Grava um cliente (e a marca, se houver). Cliente existente é casado pelo e-mail.
    async fn write_client(&self, record: &ClientRecord, update_existing: bool) -> Result<WriteOutcome, AppError>;
    async fn all_clients(&self) -> Result<Vec<Profile>, AppError>;
    async fn all_processes(&self) -> Result<Vec<ProcessExportRow>, AppError>;
}

pub struct PgClientDirectory {
    pool: PgPool,
    crm_repo: CrmRepository,
    process_repo: ProcessRepository,
}

impl PgClientDirectory {
    pub fn new(pool: PgPool, crm_repo: CrmRepository, process_repo: ProcessRepository) -> Self {
        Self { pool, crm_repo, process_repo }
    }
}

#[async_trait]
impl ClientDirectory for PgClientDirectory {
    async fn write_client(&self, record: &ClientRecord, update_existing: bool) -> Result<WriteOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = self
            .crm_repo
            .find_profile_by_email(&mut *tx, &record.profile.email)
            .await?;

        let (profile, outcome) = match existing {
            Some(_) if !update_existing => return Ok(WriteOutcome::Skipped),
            Some(found) => {
                let profile = self.crm_repo.update_profile(&mut *tx, found.id, &record.profile).await?;
                (profile, WriteOutcome::Updated)
            }
            None => {
                let profile = self.crm_repo.insert_profile(&mut *tx, &record.profile, None).await?;
                (profile, WriteOutcome::Created)
            }
        };

        if let Some(brand) = record.brand_name.as_deref() {
            let known = self
                .process_repo
                .find_by_profile_and_brand(&mut *tx, profile.id, brand)
                .await?;
            if known.is_none() {
                self.process_repo
                    .create_imported(
                        &mut *tx,
                        profile.id,
                        brand,
                        record.business_area.as_deref(),
                        record.process_number.as_deref(),
                    )
                    .await?;
            }
        }

        let metadata = json!({
            "row": record.row,
            "contractValue": record.contract_value,
            "clientSince": record.client_since,
        });
        self.crm_repo
            .insert_activity(
                &mut *tx,
                Some(profile.id),
                "importacao",
                if outcome == WriteOutcome::Created { "Cliente importado" } else { "Cadastro atualizado por importação" },
                Some(&metadata),
            )
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn all_clients(&self) -> Result<Vec<Profile>, AppError> {
        self.crm_repo.list_profiles(ClientScope::All, None).await
    }

    async fn all_processes(&self) -> Result<Vec<ProcessExportRow>, AppError> {
        self.process_repo.list_for_export().await
    }
}

fn detect_format(filename: &str) -> Result<ImportFormat, AppError> {
    ImportFormat::from_filename(filename).ok_or_else(|| AppError::UnsupportedImportFormat(filename.to_string()))
}

#[derive(Clone)]
pub struct ImportService {
    directory: Arc<dyn ClientDirectory>,
}

impl ImportService {
    pub fn new(directory: Arc<dyn ClientDirectory>) -> Self {
        Self { directory }
    }

    pub fn preview(&self, filename: &str, bytes: &[u8]) -> Result<ImportPreview, AppError> {
        let format = detect_format(filename)?;
        let sheet = import_parser::parse_file(format, bytes)?;
        let suggested_mapping = import_parser::suggest_mapping(&sheet.headers);

        Ok(ImportPreview {
            format,
            total_rows: sheet.rows.len(),
            sample_rows: sheet.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
            headers: sheet.headers,
            suggested_mapping,
        })
    }

    /// Sem mapeamento explícito usa a sugestão automática.
    pub async fn import_clients(
        &self,
        filename: &str,
        bytes: &[u8],
        mapping: Option<ColumnMapping>,
        update_existing: bool,
    ) -> Result<ImportReport, AppError> {
        let format = detect_format(filename)?;
        let sheet = import_parser::parse_file(format, bytes)?;
        let mapping = match mapping {
            Some(m) if !m.is_empty() => m,
            _ => import_parser::mapping_from_suggestions(&import_parser::suggest_mapping(&sheet.headers)),
        };

        let (records, row_errors) = import_parser::validate_rows(&sheet, &mapping);
        let mut report = ImportReport {
            total: sheet.rows.len(),
            errors: row_errors.len(),
            row_errors,
            ..Default::default()
        };

        for batch in records.chunks(WRITE_BATCH) {
            let results = join_all(
                batch
                    .iter()
                    .map(|record| self.directory.write_client(record, update_existing)),
            )
            .await;

            for (record, result) in batch.iter().zip(results) {
                match result {
                    Ok(WriteOutcome::Created) => report.imported += 1,
                    Ok(WriteOutcome::Updated) => report.updated += 1,
                    Ok(WriteOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(row = record.row, "Falha ao importar linha: {:?}", e);
                        report.errors += 1;
                        report.row_errors.push(RowError { row: record.row, message: e.to_string() });
                    }
                }
            }
        }

        report.row_errors.sort_by_key(|e| e.row);
        tracing::info!(
            total = report.total,
            imported = report.imported,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "📥 Importação concluída"
        );
        Ok(report)
    }

    pub async fn export_clients_csv(&self) -> Result<Vec<u8>, AppError> {
        let clients = self.directory.all_clients().await?;
        let mut writer = csv_writer();
        writer
            .write_record([
                "Nome", "E-mail", "Telefone", "CPF/CNPJ", "Empresa", "Endereço", "Bairro", "Cidade", "UF", "CEP",
                "Origem", "Prioridade", "Cadastro",
            ])
            .map_err(csv_error)?;

        for c in clients {
            let created = c.created_at.format("%d/%m/%Y").to_string();
            writer
                .write_record([
                    c.full_name.as_str(),
                    c.email.as_str(),
                    c.phone.as_deref().unwrap_or_default(),
                    c.cpf_cnpj.as_deref().unwrap_or_default(),
                    c.company_name.as_deref().unwrap_or_default(),
                    c.address.as_deref().unwrap_or_default(),
                    c.neighborhood.as_deref().unwrap_or_default(),
                    c.city.as_deref().unwrap_or_default(),
                    c.state.as_deref().unwrap_or_default(),
                    c.zip_code.as_deref().unwrap_or_default(),
                    c.origin.as_deref().unwrap_or_default(),
                    c.priority.as_str(),
                    created.as_str(),
                ])
                .map_err(csv_error)?;
        }
        finish(writer)
    }

    pub async fn export_processes_csv(&self) -> Result<Vec<u8>, AppError> {
        let processes = self.directory.all_processes().await?;
        let mut writer = csv_writer();
        writer
            .write_record(["Processo", "Marca", "Ramo de atividade", "Status", "Cliente", "E-mail", "Criado em"])
            .map_err(csv_error)?;

        for p in processes {
            let created = p.created_at.format("%d/%m/%Y").to_string();
            writer
                .write_record([
                    p.process_number.as_deref().unwrap_or_default(),
                    p.brand_name.as_str(),
                    p.business_area.as_deref().unwrap_or_default(),
                    p.status.label(),
                    p.client_name.as_deref().unwrap_or_default(),
                    p.client_email.as_deref().unwrap_or_default(),
                    created.as_str(),
                ])
                .map_err(csv_error)?;
        }
        finish(writer)
    }
}

// BOM para o Excel abrir acentos corretamente
fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new().delimiter(b';').from_writer(UTF8_BOM.to_vec())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, AppError> {
    writer
        .into_inner()
        .map_err(|e| AppError::InternalServerError(anyhow::anyhow!("Falha ao gerar CSV: {}", e)))
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::InternalServerError(anyhow::anyhow!("Falha ao gerar CSV: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::process::ProcessStatus;
    use chrono::Utc;
    use std::{collections::HashMap, sync::Mutex};
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryDirectory {
        clients: Mutex<HashMap<String, ClientRecord>>,
        broken_email: Option<String>,
    }

    #[async_trait]
    impl ClientDirectory for MemoryDirectory {
        async fn write_client(&self, record: &ClientRecord, update_existing: bool) -> Result<WriteOutcome, AppError> {
            if self.broken_email.as_deref() == Some(record.profile.email.as_str()) {
                return Err(AppError::UniqueConstraintViolation("profile.cpf_cnpj".into()));
            }
            let mut clients = self.clients.lock().unwrap();
            let exists = clients.contains_key(&record.profile.email);
            if exists && !update_existing {
                return Ok(WriteOutcome::Skipped);
            }
            clients.insert(record.profile.email.clone(), record.clone());
            Ok(if exists { WriteOutcome::Updated } else { WriteOutcome::Created })
        }

        async fn all_clients(&self) -> Result<Vec<Profile>, AppError> {
            let now = Utc::now();
            Ok(vec![Profile {
                id: Uuid::new_v4(),
                user_id: None,
                full_name: "José; da Silva".into(),
                email: "jose@email.com".into(),
                phone: None,
                cpf_cnpj: Some("12345678909".into()),
                company_name: None,
                address: None,
                neighborhood: None,
                city: Some("São Paulo".into()),
                state: Some("SP".into()),
                zip_code: None,
                origin: Some("importacao".into()),
                priority: "normal".into(),
                assigned_to: None,
                created_at: now,
                updated_at: now,
            }])
        }

        async fn all_processes(&self) -> Result<Vec<ProcessExportRow>, AppError> {
            Ok(vec![ProcessExportRow {
                process_number: Some("912345678".into()),
                brand_name: "Café Bom".into(),
                business_area: None,
                status: ProcessStatus::PublicadoRpi,
                client_name: Some("Maria".into()),
                client_email: None,
                created_at: Utc::now(),
            }])
        }
    }

    fn ten_rows_one_bad() -> String {
        let mut csv = String::from("Nome;E-mail;Marca;Valor\n");
        for i in 1..=10 {
            let email = if i == 4 { "cliente4-sem-arroba".to_string() } else { format!("cliente{i}@email.com") };
            csv.push_str(&format!("Cliente {i};{email};Marca {i};\"R$ 699,00\"\n"));
        }
        csv
    }

    #[tokio::test]
    async fn imports_valid_rows_and_reports_the_bad_one() {
        let svc = ImportService::new(Arc::new(MemoryDirectory::default()));

        let report = svc
            .import_clients("clientes.csv", ten_rows_one_bad().as_bytes(), None, false)
            .await
            .unwrap();

        assert_eq!(report.total, 10);
        assert_eq!(report.imported, 9);
        assert_eq!(report.errors, 1);
        assert_eq!(report.row_errors[0].row, 4);
        assert!(report.is_balanced());
    }

    #[tokio::test]
    async fn second_run_skips_or_updates() {
        let svc = ImportService::new(Arc::new(MemoryDirectory::default()));
        let file = ten_rows_one_bad();
        svc.import_clients("clientes.csv", file.as_bytes(), None, false).await.unwrap();

        let skipped = svc.import_clients("clientes.csv", file.as_bytes(), None, false).await.unwrap();
        assert_eq!((skipped.imported, skipped.skipped, skipped.errors), (0, 9, 1));
        assert!(skipped.is_balanced());

        let updated = svc.import_clients("clientes.csv", file.as_bytes(), None, true).await.unwrap();
        assert_eq!((updated.imported, updated.updated), (0, 9));
        assert!(updated.is_balanced());
    }

    #[tokio::test]
    async fn one_failed_write_does_not_affect_the_batch() {
        let svc = ImportService::new(Arc::new(MemoryDirectory {
            broken_email: Some("cliente2@email.com".into()),
            ..Default::default()
        }));

        let report = svc
            .import_clients("clientes.csv", ten_rows_one_bad().as_bytes(), None, false)
            .await
            .unwrap();

        assert_eq!(report.imported, 8);
        assert_eq!(report.errors, 2);
        assert_eq!(report.row_errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![2, 4]);
        assert!(report.is_balanced());
    }

    #[tokio::test]
    async fn explicit_mapping_wins() {
        let directory = Arc::new(MemoryDirectory::default());
        let svc = ImportService::new(directory.clone());
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, crate::models::import::ImportField::FullName);
        mapping.insert(1, crate::models::import::ImportField::Email);

        let report = svc
            .import_clients("clientes.csv", b"a;b;c\nAna;ana@email.com;Marca X\n", Some(mapping), false)
            .await
            .unwrap();

        assert_eq!(report.imported, 1);
        let clients = directory.clients.lock().unwrap();
        assert_eq!(clients["ana@email.com"].brand_name, None);
    }

    #[test]
    fn preview_suggests_mapping() {
        let svc = ImportService::new(Arc::new(MemoryDirectory::default()));
        let preview = svc.preview("clientes.csv", ten_rows_one_bad().as_bytes()).unwrap();

        assert_eq!(preview.format, ImportFormat::Csv);
        assert_eq!(preview.total_rows, 10);
        assert_eq!(preview.sample_rows.len(), 5);
        assert!(preview.suggested_mapping.iter().all(|s| s.field.is_some()));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let svc = ImportService::new(Arc::new(MemoryDirectory::default()));
        assert!(matches!(svc.preview("clientes.docx", b"x"), Err(AppError::UnsupportedImportFormat(_))));
    }

    #[tokio::test]
    async fn exports_are_semicolon_csv_with_bom() {
        let svc = ImportService::new(Arc::new(MemoryDirectory::default()));

        let clients = svc.export_clients_csv().await.unwrap();
        assert!(clients.starts_with(UTF8_BOM));
        let text = String::from_utf8(clients[3..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Nome;E-mail;Telefone"));
        assert!(lines.next().unwrap().starts_with("\"José; da Silva\";jose@email.com;;12345678909"));

        let processes = svc.export_processes_csv().await.unwrap();
        let text = String::from_utf8(processes[3..].to_vec()).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("912345678;Café Bom;;Publicado na RPI;Maria;;"));
    }
}
