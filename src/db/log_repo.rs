// src/db/log_repo.rs
//
// Histórico de notificações. Só INSERT e SELECT.

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{NotificationLog, OutgoingMessage},
};

#[derive(Clone)]
pub struct LogRepository {
    pool: PgPool,
}

impl LogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_notification<'e, E>(
        &self,
        executor: E,
        message: &OutgoingMessage,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<NotificationLog, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let log = sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_logs (
                profile_id, channel, recipient, template_key, subject, body, status, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(message.profile_id)
        .bind(message.channel.as_str())
        .bind(&message.recipient)
        .bind(message.template.as_str())
        .bind(&message.subject)
        .bind(&message.body)
        .bind(status)
        .bind(error_message)
        .fetch_one(executor)
        .await?;
        Ok(log)
    }

    pub async fn list_notifications(&self, profile_id: Option<Uuid>, limit: i64) -> Result<Vec<NotificationLog>, AppError> {
        let logs = sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT * FROM notification_logs
            WHERE ($1::uuid IS NULL OR profile_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(profile_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
