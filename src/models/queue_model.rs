use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::dispatch_model::Recipient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    InFlight,
    Sent,
    /// Agotó los reintentos o el proveedor lo rechazó de forma permanente.
    Dead,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::InFlight => "in_flight",
            QueueItemStatus::Sent => "sent",
            QueueItemStatus::Dead => "dead",
        }
    }
}

/// Un destinatario encolado para una campaña. La clave de deduplicación es
/// (campaign_id, email normalizado).
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub campaign_id: String,
    pub template_id: String,
    pub recipient: Recipient,
    pub position: i64,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

/// Resumen de la cola de una campaña.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub sent: u64,
    pub dead: u64,
}

impl QueueCounts {
    pub fn unfinished(&self) -> u64 {
        self.pending + self.in_flight
    }
}
