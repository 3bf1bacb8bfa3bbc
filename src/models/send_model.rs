use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }
}

/// Fila de auditoría de la tabla `sends`. Nunca se modifica ni se borra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub id: String,
    pub campaign_id: Option<String>,
    pub template_id: String,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub recipient_type: Option<String>,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

/// Datos para insertar un `SendRecord` (id y fecha los pone el ledger).
#[derive(Debug, Clone)]
pub struct NewSendRecord {
    pub campaign_id: Option<String>,
    pub template_id: String,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub recipient_type: Option<String>,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub attempts: u32,
}

/// Para listar envíos con paginación
#[derive(Debug, Clone, Serialize)]
pub struct ListSendsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<SendRecord>,
}
