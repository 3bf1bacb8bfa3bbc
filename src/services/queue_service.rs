//! services/queue_service.rs
//! Cola durable de destinatarios por campaña (`dispatch_queue`).
//!
//! Cada item pasa pending -> in_flight -> sent | dead. El reclamo es un UPDATE
//! condicional, así que dos workers nunca procesan el mismo item.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::{
    models::{
        dispatch_model::Recipient,
        queue_model::{QueueCounts, QueueItem, QueueItemStatus},
        send_model::{NewSendRecord, SendStatus},
    },
    services::ledger_service::{increment_sent_count, insert_send_record},
};

#[derive(Clone, Debug)]
pub struct DispatchQueue {
    db_pool: Pool<Sqlite>,
}

#[derive(FromRow)]
struct QueueRow {
    id: String,
    campaign_id: String,
    template_id: String,
    recipient_email: String,
    recipient_name: Option<String>,
    recipient_type: Option<String>,
    position: i64,
    attempts: i64,
    created_at: String,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = anyhow::Error;

    fn try_from(r: QueueRow) -> Result<Self> {
        Ok(QueueItem {
            created_at: r.created_at.parse()?,
            id: r.id,
            campaign_id: r.campaign_id,
            template_id: r.template_id,
            recipient: Recipient {
                email: r.recipient_email,
                name: r.recipient_name,
                kind: r.recipient_type,
            },
            position: r.position,
            attempts: r.attempts,
        })
    }
}

/// Clave de deduplicación: email sin espacios y en minúsculas.
pub fn dedupe_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl DispatchQueue {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        DispatchQueue { db_pool }
    }

    /// Encola los destinatarios. Los repetidos (misma campaña + email) se
    /// ignoran. Devuelve cuántos items nuevos entraron.
    pub async fn enqueue(
        &self,
        campaign_id: &str,
        template_id: &str,
        recipients: &[Recipient],
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open transaction")?;

        let next_position: i64 = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM dispatch_queue WHERE campaign_id = ?1",
        )
        .bind(campaign_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut inserted = 0u64;
        for (offset, recipient) in recipients.iter().enumerate() {
            let res = sqlx::query(
                r#"
                INSERT OR IGNORE INTO dispatch_queue (
                    id, campaign_id, template_id, recipient_email, recipient_name,
                    recipient_type, dedupe_key, position, status, attempts,
                    last_error, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, NULL, ?9, ?9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(campaign_id)
            .bind(template_id)
            .bind(recipient.email.trim())
            .bind(&recipient.name)
            .bind(&recipient.kind)
            .bind(dedupe_key(&recipient.email))
            .bind(next_position + offset as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .context("Error encolando destinatario")?;
            inserted += res.rows_affected();
        }

        tx.commit().await.context("Failed to commit enqueue")?;
        Ok(inserted)
    }

    /// Reclama el siguiente item pendiente (por posición) de la campaña.
    pub async fn claim_next(&self, campaign_id: &str) -> Result<Option<QueueItem>> {
        loop {
            let row = sqlx::query_as::<_, QueueRow>(
                r#"
                SELECT id, campaign_id, template_id, recipient_email, recipient_name,
                       recipient_type, position, attempts, created_at
                FROM dispatch_queue
                WHERE campaign_id = ?1 AND status = 'pending'
                ORDER BY position ASC
                LIMIT 1
                "#,
            )
            .bind(campaign_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Error buscando item pendiente")?;

            let Some(row) = row else {
                return Ok(None);
            };

            let now = Utc::now().to_rfc3339();
            let claimed = sqlx::query(
                r#"
                UPDATE dispatch_queue
                SET status = 'in_flight', updated_at = ?2
                WHERE id = ?1 AND status = 'pending'
                "#,
            )
            .bind(&row.id)
            .bind(&now)
            .execute(&self.db_pool)
            .await
            .context("Error reclamando item")?;

            // Otro worker se lo llevó; probamos con el siguiente
            if claimed.rows_affected() == 1 {
                return QueueItem::try_from(row).map(Some);
            }
        }
    }

    /// Cierra un item reclamado y deja su fila en `sends`, todo en una transacción.
    /// Un envío exitoso también suma 1 a `sent_count` para ver el avance.
    pub async fn finish(&self, item: &QueueItem, record: &NewSendRecord) -> Result<()> {
        let (status, last_error) = match record.status {
            SendStatus::Sent => (QueueItemStatus::Sent, None),
            SendStatus::Failed => (QueueItemStatus::Dead, record.error_message.as_deref()),
        };
        let now = Utc::now().to_rfc3339();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open transaction")?;

        let res = sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = ?2, attempts = attempts + ?3, last_error = ?4, updated_at = ?5
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(&item.id)
        .bind(status.as_str())
        .bind(record.attempts as i64)
        .bind(last_error)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .context("Error cerrando item de la cola")?;

        if res.rows_affected() == 0 {
            // Ya lo cerró otro (o la recuperación lo devolvió a pending): no duplicar auditoría
            log::warn!(
                "(queue.finish) Item {} ya no estaba in_flight; se descarta el resultado",
                item.id
            );
            tx.rollback().await.ok();
            return Ok(());
        }

        insert_send_record(&mut *tx, record).await?;
        if record.status == SendStatus::Sent {
            increment_sent_count(&mut *tx, &item.campaign_id).await?;
        }

        tx.commit().await.context("Failed to commit queue item")?;
        Ok(())
    }

    pub async fn counts(&self, campaign_id: &str) -> Result<QueueCounts> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*) FROM dispatch_queue
            WHERE campaign_id = ?1
            GROUP BY status
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Error contando la cola")?;

        let mut counts = QueueCounts::default();
        for (status, cnt) in rows {
            let cnt = cnt as u64;
            match status.as_str() {
                "pending" => counts.pending = cnt,
                "in_flight" => counts.in_flight = cnt,
                "sent" => counts.sent = cnt,
                "dead" => counts.dead = cnt,
                other => log::warn!("(queue.counts) Estado desconocido en cola: {}", other),
            }
        }
        Ok(counts)
    }

    /// Devuelve a `pending` lo que quedó `in_flight` tras una caída.
    /// Entrega "al menos una vez": esos destinatarios pueden recibir duplicado.
    pub async fn reset_in_flight(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let res = sqlx::query(
            "UPDATE dispatch_queue SET status = 'pending', updated_at = ?1 WHERE status = 'in_flight'",
        )
        .bind(&now)
        .execute(&self.db_pool)
        .await
        .context("Error liberando items in_flight")?;
        Ok(res.rows_affected())
    }
}
