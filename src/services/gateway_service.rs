//! services/gateway_service.rs
//! Frontera con el proveedor de mensajes transaccionales.
//!
//! Ningún error de transporte sale de aquí sin convertirse en `GatewayError`.
//! Una llamada a `send` = una petición al proveedor; los reintentos se
//! deciden en el orquestador.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Deserialize;

use crate::config::dispatch_config::ProviderConfig;

/// Mensaje ya renderizado, listo para el proveedor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Aceptado por el proveedor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider rejected message ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Rechazo permanente (dirección inválida, buzón inexistente, ...)
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Errores que vale la pena reintentar (red, 429, 5xx, 408).
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::RateLimited { .. } => true,
            GatewayError::Provider { status, .. } => *status >= 500 || *status == 408,
            GatewayError::Rejected(_) | GatewayError::MalformedResponse(_) => false,
        }
    }

    /// Pausa pedida por el proveedor, si la hay.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Nombre corto para logs ("http", "smtp", ...)
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<GatewayReceipt, GatewayError>;
}

/// Gateway contra la API HTTP del proveedor (`POST {api_url}/emails`).
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Deserialize)]
struct ProviderSendResponse {
    id: String,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl HttpGateway {
    pub fn new(config: &ProviderConfig, from: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from,
        })
    }
}

#[async_trait]
impl MessageGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<GatewayReceipt, GatewayError> {
        let url = format!("{}/emails", self.api_url);
        let payload = serde_json::json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "html": message.html
        });

        log::debug!("(http_gateway) POST {} to={}", url, message.to);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(GatewayError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body_txt = resp.text().await.unwrap_or_default();
            log::warn!(
                "(http_gateway) Proveedor respondió {} para to={}: {}",
                status,
                message.to,
                body_txt
            );
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                message: provider_error_message(&body_txt),
            });
        }

        let body = resp
            .json::<ProviderSendResponse>()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        Ok(GatewayReceipt {
            message_id: body.id,
        })
    }
}

/// Extrae el mensaje de error del payload del proveedor; si no es JSON, el texto crudo.
fn provider_error_message(body: &str) -> String {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(ProviderErrorBody {
            message: Some(m), ..
        }) => m,
        Ok(ProviderErrorBody { error: Some(e), .. }) => e,
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}
