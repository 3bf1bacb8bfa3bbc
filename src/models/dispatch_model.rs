//! models/dispatch_model.rs
//! Requests/responses del endpoint de envío (`POST /api/dispatch`).

use serde::{Deserialize, Serialize};

/// Destinatario efímero: no se persiste aparte, solo dentro de `sends` y la cola.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Etiqueta libre ("lead", "customer", ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
            kind: None,
        }
    }
}

/// Body del endpoint, enrutado por el campo `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchRequest {
    SendSingle(SendSingleRequest),
    SendBulk(SendBulkRequest),
    SendTest(SendTestRequest),
    ResumeBulk(ResumeBulkRequest),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSingleRequest {
    pub template_id: String,
    pub recipient_email: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkRequest {
    pub campaign_id: String,
    pub template_id: String,
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTestRequest {
    pub template_id: String,
    pub recipient_email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeBulkRequest {
    pub campaign_id: String,
}

/// Respuesta de `send_single` / `send_test`: el id asignado por el proveedor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub id: String,
}

/// Respuesta de `send_bulk` / `resume_bulk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSendResponse {
    pub success: bool,
    pub sent: u64,
    pub failed: u64,
    /// Emails de los destinatarios que fallaron, en orden de envío
    pub errors: Vec<String>,
}
