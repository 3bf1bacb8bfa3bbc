use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plantilla de mensaje (asunto + cuerpo HTML con placeholders `{{name}}`).
/// Se crea y edita fuera de este servicio; aquí solo se lee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
