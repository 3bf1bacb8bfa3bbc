//! services/ledger_service.rs
//! Persistencia de plantillas (lectura), campañas y auditoría de envíos.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::models::{
    campaign_model::{CampaignRecord, CampaignStatus},
    send_model::{ListSendsResponse, NewSendRecord, SendRecord, SendStatus},
    template_model::TemplateRecord,
};

/// Resultado de intentar pasar una campaña a `sending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStart {
    /// draft -> sending en esta llamada
    Started,
    /// Ya estaba en `sending` (reanudación)
    AlreadySending,
    AlreadyCompleted,
    NotFound,
}

#[derive(Clone, Debug)]
pub struct CampaignLedger {
    db_pool: Pool<Sqlite>,
}

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    subject: String,
    body: String,
    created_at: String,
}

#[derive(FromRow)]
struct CampaignRow {
    id: String,
    name: String,
    status: String,
    total_recipients: Option<i64>,
    sent_count: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

#[derive(FromRow)]
struct SendRow {
    id: String,
    campaign_id: Option<String>,
    template_id: String,
    recipient_email: String,
    recipient_name: Option<String>,
    recipient_type: Option<String>,
    status: String,
    provider_message_id: Option<String>,
    error_message: Option<String>,
    attempts: i64,
    created_at: String,
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse()
        .with_context(|| format!("Timestamp inválido: {}", raw))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

impl TryFrom<TemplateRow> for TemplateRecord {
    type Error = anyhow::Error;

    fn try_from(r: TemplateRow) -> Result<Self> {
        Ok(TemplateRecord {
            created_at: parse_ts(&r.created_at)?,
            id: r.id,
            name: r.name,
            subject: r.subject,
            body: r.body,
        })
    }
}

impl TryFrom<CampaignRow> for CampaignRecord {
    type Error = anyhow::Error;

    fn try_from(r: CampaignRow) -> Result<Self> {
        Ok(CampaignRecord {
            status: r.status.parse()?,
            started_at: parse_opt_ts(r.started_at)?,
            completed_at: parse_opt_ts(r.completed_at)?,
            created_at: parse_ts(&r.created_at)?,
            id: r.id,
            name: r.name,
            total_recipients: r.total_recipients,
            sent_count: r.sent_count,
        })
    }
}

impl TryFrom<SendRow> for SendRecord {
    type Error = anyhow::Error;

    fn try_from(r: SendRow) -> Result<Self> {
        let status = match r.status.as_str() {
            "sent" => SendStatus::Sent,
            _ => SendStatus::Failed,
        };
        Ok(SendRecord {
            created_at: parse_ts(&r.created_at)?,
            status,
            id: r.id,
            campaign_id: r.campaign_id,
            template_id: r.template_id,
            recipient_email: r.recipient_email,
            recipient_name: r.recipient_name,
            recipient_type: r.recipient_type,
            provider_message_id: r.provider_message_id,
            error_message: r.error_message,
            attempts: r.attempts,
        })
    }
}

/// Inserta una fila en `sends` dentro de la conexión/transacción recibida.
pub(crate) async fn insert_send_record(
    conn: &mut SqliteConnection,
    record: &NewSendRecord,
) -> Result<String> {
    let send_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO sends (
            id, campaign_id, template_id, recipient_email, recipient_name,
            recipient_type, status, provider_message_id, error_message,
            attempts, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&send_id)
    .bind(&record.campaign_id)
    .bind(&record.template_id)
    .bind(&record.recipient_email)
    .bind(&record.recipient_name)
    .bind(&record.recipient_type)
    .bind(record.status.as_str())
    .bind(&record.provider_message_id)
    .bind(&record.error_message)
    .bind(record.attempts as i64)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert send record")?;

    Ok(send_id)
}

/// `sent_count = sent_count + 1` en una sola sentencia (sin leer antes).
pub(crate) async fn increment_sent_count(
    conn: &mut SqliteConnection,
    campaign_id: &str,
) -> Result<bool> {
    let res = sqlx::query("UPDATE campaigns SET sent_count = sent_count + 1 WHERE id = ?1")
        .bind(campaign_id)
        .execute(&mut *conn)
        .await
        .context("Failed to increment sent_count")?;
    Ok(res.rows_affected() == 1)
}

impl CampaignLedger {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignLedger { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run campaign ledger migrations")?;
        Ok(())
    }

    // ----------------------------------------------------------------
    // Plantillas
    // ----------------------------------------------------------------

    /// Alta de plantilla. La autoría vive fuera de este servicio; esto es para
    /// semillas y pruebas.
    pub async fn create_template(
        &self,
        name: &str,
        subject: &str,
        body: &str,
    ) -> Result<TemplateRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO templates (id, name, subject, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(subject)
        .bind(body)
        .bind(now.to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Failed to insert template")?;

        Ok(TemplateRecord {
            id,
            name: name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    pub async fn get_template(&self, template_id: &str) -> Result<Option<TemplateRecord>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, subject, body, created_at FROM templates WHERE id = ?1",
        )
        .bind(template_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to load template")?;

        row.map(TemplateRecord::try_from).transpose()
    }

    // ----------------------------------------------------------------
    // Campañas
    // ----------------------------------------------------------------

    /// Crea la campaña en `draft`. En producción la crea otra pantalla.
    pub async fn create_campaign(&self, name: &str) -> Result<CampaignRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, name, status, sent_count, created_at)
            VALUES (?1, ?2, 'draft', 0, ?3)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Failed to insert campaign")?;

        Ok(CampaignRecord {
            id,
            name: name.to_string(),
            status: CampaignStatus::Draft,
            total_recipients: None,
            sent_count: 0,
            started_at: None,
            completed_at: None,
            created_at: now,
        })
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<CampaignRecord>> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, name, status, total_recipients, sent_count,
                   started_at, completed_at, created_at
            FROM campaigns
            WHERE id = ?1
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to load campaign")?;

        row.map(CampaignRecord::try_from).transpose()
    }

    /// draft -> sending. `total_recipients` solo se fija si aún no tenía valor.
    pub async fn begin_dispatch(
        &self,
        campaign_id: &str,
        total_recipients: u64,
    ) -> Result<DispatchStart> {
        let now = Utc::now().to_rfc3339();
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'sending',
                started_at = ?2,
                total_recipients = COALESCE(total_recipients, ?3)
            WHERE id = ?1 AND status = 'draft'
            "#,
        )
        .bind(campaign_id)
        .bind(&now)
        .bind(total_recipients as i64)
        .execute(&self.db_pool)
        .await
        .context("Failed to move campaign to sending")?;

        if res.rows_affected() == 1 {
            return Ok(DispatchStart::Started);
        }

        Ok(match self.get_campaign(campaign_id).await? {
            None => DispatchStart::NotFound,
            Some(c) if c.status == CampaignStatus::Completed => DispatchStart::AlreadyCompleted,
            Some(_) => DispatchStart::AlreadySending,
        })
    }

    /// sending -> completed, solo si ya no quedan items pendientes/en vuelo.
    /// `sent_count` se deriva de los `sends` exitosos de la campaña.
    pub async fn complete_if_drained(&self, campaign_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'completed',
                completed_at = ?2,
                sent_count = (
                    SELECT COUNT(*) FROM sends
                    WHERE sends.campaign_id = ?1 AND sends.status = 'sent'
                )
            WHERE id = ?1
              AND status = 'sending'
              AND NOT EXISTS (
                  SELECT 1 FROM dispatch_queue
                  WHERE dispatch_queue.campaign_id = ?1
                    AND dispatch_queue.status IN ('pending', 'in_flight')
              )
            "#,
        )
        .bind(campaign_id)
        .bind(&now)
        .execute(&self.db_pool)
        .await
        .context("Failed to complete campaign")?;

        Ok(res.rows_affected() == 1)
    }

    /// Campañas que quedaron en `sending` (p.ej. el proceso murió a mitad).
    pub async fn list_sending_campaigns(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM campaigns WHERE status = 'sending' ORDER BY started_at",
        )
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to list sending campaigns")?;
        Ok(ids)
    }

    // ----------------------------------------------------------------
    // Auditoría de envíos
    // ----------------------------------------------------------------

    /// Envío individual exitoso asociado a campaña: fila `sent` + contador,
    /// en la misma transacción.
    pub async fn record_single_delivery(&self, record: &NewSendRecord) -> Result<String> {
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open transaction")?;

        let send_id = insert_send_record(&mut *tx, record).await?;
        if let Some(campaign_id) = &record.campaign_id {
            if !increment_sent_count(&mut *tx, campaign_id).await? {
                log::warn!(
                    "(record_single_delivery) La campaña {} no existe; no se incrementa sent_count",
                    campaign_id
                );
            }
        }

        tx.commit().await.context("Failed to commit send record")?;
        Ok(send_id)
    }

    pub async fn count_sends(
        &self,
        campaign_id: &str,
        status: Option<SendStatus>,
    ) -> Result<u64> {
        let cnt: i64 = match status {
            Some(s) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sends WHERE campaign_id = ?1 AND status = ?2",
            )
            .bind(campaign_id)
            .bind(s.as_str())
            .fetch_one(&self.db_pool)
            .await?,
            None => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sends WHERE campaign_id = ?1")
                .bind(campaign_id)
                .fetch_one(&self.db_pool)
                .await?,
        };
        Ok(cnt as u64)
    }

    /// Total de filas en `sends` (todas las campañas y envíos sueltos).
    #[cfg(test)]
    pub async fn count_all_sends(&self) -> Result<u64> {
        let cnt = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sends")
            .fetch_one(&self.db_pool)
            .await?;
        Ok(cnt as u64)
    }

    /// Lista envíos de una campaña con paginación
    pub async fn list_sends(
        &self,
        campaign_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<ListSendsResponse> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let offset = (page - 1) * page_size;

        let total = self.count_sends(campaign_id, None).await?;

        let rows = sqlx::query_as::<_, SendRow>(
            r#"
            SELECT id, campaign_id, template_id, recipient_email, recipient_name,
                   recipient_type, status, provider_message_id, error_message,
                   attempts, created_at
            FROM sends
            WHERE campaign_id = ?1
            ORDER BY created_at ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(campaign_id)
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to list sends")?;

        let items = rows
            .into_iter()
            .map(SendRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListSendsResponse {
            total,
            page,
            page_size,
            items,
        })
    }
}
