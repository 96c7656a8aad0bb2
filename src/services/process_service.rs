// src/services/process_service.rs

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{CrmRepository, ProcessRepository},
    middleware::auth::AuthenticatedUser,
    models::{
        crm::ClientScope,
        notification::{Channel, TemplateKey},
        process::{BrandProcess, ProcessEvent, ProcessStatus, RpiIngestPayload, RpiReport, UpdateProcessPayload},
    },
    services::{
        crm_service::scope_for,
        notification_service::{NotificationService, Recipient},
        rpi_parser,
    },
};

/// Próximo status de um processo, ou None quando fica como está.
/// Estados finais nunca mudam.
pub fn next_status(current: ProcessStatus, proposed: Option<ProcessStatus>) -> Option<ProcessStatus> {
    proposed.filter(|next| current.can_transition_to(*next))
}

fn manual_transition(current: ProcessStatus, requested: Option<ProcessStatus>) -> Result<ProcessStatus, AppError> {
    match requested {
        None => Ok(current),
        Some(next) if next == current => Ok(current),
        Some(next) if current.is_terminal() => Err(AppError::InvalidStatusTransition {
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        }),
        Some(next) => Ok(next),
    }
}

/// Como o novo status é decidido a partir do atual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Edição da equipe: processo encerrado só aceita o mesmo status.
    Manual(Option<ProcessStatus>),
    /// Despacho da RPI: processo encerrado fica como está.
    Gazette(Option<ProcessStatus>),
}

impl Transition {
    pub fn resolve(self, current: ProcessStatus) -> Result<ProcessStatus, AppError> {
        match self {
            Transition::Manual(requested) => manual_transition(current, requested),
            Transition::Gazette(proposed) => Ok(next_status(current, proposed).unwrap_or(current)),
        }
    }

    /// Toda entrada da RPI vira evento; edição manual só quando o status muda.
    pub fn records_event(self, previous: ProcessStatus, next: ProcessStatus) -> bool {
        matches!(self, Transition::Gazette(_)) || previous != next
    }
}

#[derive(Debug, Clone)]
pub struct ProcessChange {
    pub id: Uuid,
    pub transition: Transition,
    pub process_number: Option<String>,
    pub notes: Option<String>,
    pub rpi_number: Option<String>,
    pub dispatch_text: String,
}

#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub previous: ProcessStatus,
    pub process: BrandProcess,
}

impl AppliedChange {
    pub fn changed(&self) -> bool {
        self.previous != self.process.status
    }
}

// --- PERSISTÊNCIA ---

#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn list(&self, scope: ClientScope) -> Result<Vec<BrandProcess>, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<BrandProcess>, AppError>;
    async fn find_by_numbers(&self, numbers: &[String]) -> Result<Vec<BrandProcess>, AppError>;
    async fn list_events(&self, process_id: Uuid) -> Result<Vec<ProcessEvent>, AppError>;
    /// Lê o processo travado, decide o status e grava processo + evento juntos.
    /// None quando o processo não existe.
    async fn apply(&self, change: ProcessChange) -> Result<Option<AppliedChange>, AppError>;
    async fn owner_contact(&self, profile_id: Uuid) -> Result<Option<Recipient>, AppError>;
}

pub struct PgProcessStore {
    pool: PgPool,
    process_repo: ProcessRepository,
    crm_repo: CrmRepository,
}

impl PgProcessStore {
    pub fn new(pool: PgPool, process_repo: ProcessRepository, crm_repo: CrmRepository) -> Self {
        Self { pool, process_repo, crm_repo }
    }
}

#[async_trait]
impl ProcessStore for PgProcessStore {
    async fn list(&self, scope: ClientScope) -> Result<Vec<BrandProcess>, AppError> {
        self.process_repo.list(scope).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<BrandProcess>, AppError> {
        self.process_repo.find_by_id(&self.pool, id).await
    }

    async fn find_by_numbers(&self, numbers: &[String]) -> Result<Vec<BrandProcess>, AppError> {
        self.process_repo.find_by_numbers(numbers).await
    }

    async fn list_events(&self, process_id: Uuid) -> Result<Vec<ProcessEvent>, AppError> {
        self.process_repo.list_events(process_id).await
    }

    async fn apply(&self, change: ProcessChange) -> Result<Option<AppliedChange>, AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(current) = self.process_repo.lock_by_id(&mut *tx, change.id).await? else {
            return Ok(None);
        };

        let next = change.transition.resolve(current.status)?;
        let touched = next != current.status || change.process_number.is_some() || change.notes.is_some();
        let process = if touched {
            self.process_repo
                .update(&mut *tx, change.id, next, change.process_number.as_deref(), change.notes.as_deref())
                .await?
        } else {
            current.clone()
        };

        if change.transition.records_event(current.status, next) {
            self.process_repo
                .insert_event(&mut *tx, change.id, change.rpi_number.as_deref(), &change.dispatch_text, current.status, next)
                .await?;
        }
        tx.commit().await?;

        Ok(Some(AppliedChange { previous: current.status, process }))
    }

    async fn owner_contact(&self, profile_id: Uuid) -> Result<Option<Recipient>, AppError> {
        let profile = self.crm_repo.find_profile_by_id(&self.pool, profile_id).await?;
        Ok(profile.map(|p| Recipient {
            profile_id: Some(p.id),
            name: p.full_name,
            email: Some(p.email),
            phone: p.phone,
        }))
    }
}

// --- SERVIÇO ---

#[derive(Clone)]
pub struct ProcessService {
    store: Arc<dyn ProcessStore>,
    notifications: NotificationService,
}

impl ProcessService {
    pub fn new(store: Arc<dyn ProcessStore>, notifications: NotificationService) -> Self {
        Self { store, notifications }
    }

    pub async fn list(&self, user: &AuthenticatedUser) -> Result<Vec<BrandProcess>, AppError> {
        self.store.list(scope_for(user)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<BrandProcess, AppError> {
        self.store.find(id).await?.ok_or(AppError::NotFound("process"))
    }

    pub async fn events(&self, id: Uuid) -> Result<Vec<ProcessEvent>, AppError> {
        let process = self.get(id).await?;
        self.store.list_events(process.id).await
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        id: Uuid,
        payload: &UpdateProcessPayload,
    ) -> Result<BrandProcess, AppError> {
        payload.validate()?;

        let applied = self
            .store
            .apply(ProcessChange {
                id,
                transition: Transition::Manual(payload.status),
                process_number: payload.process_number.clone(),
                notes: payload.notes.clone(),
                rpi_number: None,
                dispatch_text: format!("Status alterado manualmente por {}", actor.email),
            })
            .await?
            .ok_or(AppError::NotFound("process"))?;

        tracing::info!(process_id = %id, status = applied.process.status.as_str(), by = %actor.id, "Processo atualizado");
        if applied.changed() {
            self.notify_client(&applied.process).await;
        }
        Ok(applied.process)
    }

    /// Aplica uma edição da RPI aos processos acompanhados.
    pub async fn ingest_rpi(&self, payload: &RpiIngestPayload) -> Result<RpiReport, AppError> {
        payload.validate()?;

        let entries = rpi_parser::parse_gazette(&payload.content);
        let mut report = RpiReport { entries_found: entries.len(), ..Default::default() };
        if entries.is_empty() {
            return Ok(report);
        }

        let numbers: Vec<String> = entries
            .iter()
            .map(|e| e.process_number.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut tracked: HashMap<String, BrandProcess> = self
            .store
            .find_by_numbers(&numbers)
            .await?
            .into_iter()
            .filter_map(|p| p.process_number.clone().map(|n| (n, p)))
            .collect();

        let rpi_number = payload
            .rpi_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let mut matched = HashSet::new();
        let mut changed = Vec::new();

        for entry in &entries {
            let Some(process) = tracked.get_mut(&entry.process_number) else {
                continue;
            };
            matched.insert(process.id);

            let applied = self
                .store
                .apply(ProcessChange {
                    id: process.id,
                    transition: Transition::Gazette(entry.status),
                    process_number: None,
                    notes: None,
                    rpi_number: rpi_number.clone(),
                    dispatch_text: entry.dispatch_text.clone(),
                })
                .await?
                .ok_or(AppError::NotFound("process"))?;

            if applied.changed() {
                report.updated += 1;
                changed.push(process.id);
            } else {
                report.unchanged += 1;
            }
            *process = applied.process;
        }
        report.processes_matched = matched.len();

        // Um aviso por processo, com o status final da edição
        let mut notified = HashSet::new();
        for id in changed {
            if !notified.insert(id) {
                continue;
            }
            if let Some(process) = tracked.values().find(|p| p.id == id) {
                self.notify_client(process).await;
            }
        }

        tracing::info!(
            rpi = rpi_number.as_deref().unwrap_or("-"),
            entries = report.entries_found,
            matched = report.processes_matched,
            updated = report.updated,
            "📰 RPI processada"
        );
        Ok(report)
    }

    async fn notify_client(&self, process: &BrandProcess) {
        let Some(profile_id) = process.profile_id else {
            return;
        };
        let recipient = match self.store.owner_contact(profile_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%profile_id, "Falha ao buscar titular do processo: {:?}", e);
                return;
            }
        };

        let vars = HashMap::from([
            ("marca", process.brand_name.clone()),
            ("status", process.status.label().to_string()),
        ]);
        self.notifications
            .notify(TemplateKey::AtualizacaoProcesso, &recipient, &[Channel::Email, Channel::Whatsapp], vars)
            .await;
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    pub fn process(number: &str, status: ProcessStatus) -> BrandProcess {
        let now = Utc::now();
        BrandProcess {
            id: Uuid::new_v4(),
            profile_id: Some(Uuid::new_v4()),
            contract_id: None,
            brand_name: "Café Bom".into(),
            business_area: Some("Cafeteria".into()),
            status,
            process_number: Some(number.into()),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Default)]
    pub struct MemoryProcessStore {
        pub processes: Mutex<Vec<BrandProcess>>,
        pub events: Mutex<Vec<ProcessEvent>>,
        pub contact: Option<Recipient>,
    }

    impl MemoryProcessStore {
        pub fn status_of(&self, id: Uuid) -> ProcessStatus {
            self.processes.lock().unwrap().iter().find(|p| p.id == id).unwrap().status
        }
    }

    #[async_trait]
    impl ProcessStore for MemoryProcessStore {
        async fn list(&self, _scope: ClientScope) -> Result<Vec<BrandProcess>, AppError> {
            Ok(self.processes.lock().unwrap().clone())
        }

        async fn find(&self, id: Uuid) -> Result<Option<BrandProcess>, AppError> {
            Ok(self.processes.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn find_by_numbers(&self, numbers: &[String]) -> Result<Vec<BrandProcess>, AppError> {
            Ok(self
                .processes
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.process_number.as_ref().is_some_and(|n| numbers.contains(n)))
                .cloned()
                .collect())
        }

        async fn list_events(&self, process_id: Uuid) -> Result<Vec<ProcessEvent>, AppError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.process_id == process_id)
                .cloned()
                .collect())
        }

        async fn apply(&self, change: ProcessChange) -> Result<Option<AppliedChange>, AppError> {
            let mut processes = self.processes.lock().unwrap();
            let Some(process) = processes.iter_mut().find(|p| p.id == change.id) else {
                return Ok(None);
            };

            let previous = process.status;
            let next = change.transition.resolve(previous)?;
            process.status = next;
            if let Some(number) = change.process_number {
                process.process_number = Some(number);
            }
            if let Some(notes) = change.notes {
                process.notes = Some(notes);
            }

            if change.transition.records_event(previous, next) {
                self.events.lock().unwrap().push(ProcessEvent {
                    id: Uuid::new_v4(),
                    process_id: process.id,
                    rpi_number: change.rpi_number,
                    dispatch_text: change.dispatch_text,
                    previous_status: previous,
                    new_status: next,
                    created_at: Utc::now(),
                });
            }
            Ok(Some(AppliedChange { previous, process: process.clone() }))
        }

        async fn owner_contact(&self, _profile_id: Uuid) -> Result<Option<Recipient>, AppError> {
            Ok(self.contact.clone())
        }
    }
}
