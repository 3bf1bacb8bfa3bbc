//! services/smtp_gateway.rs
//! Gateway alternativo: entrega por relay SMTP con lettre (TLS requerido).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::{
    config::dispatch_config::SmtpConfig,
    services::gateway_service::{GatewayError, GatewayReceipt, MessageGateway, OutboundMessage},
};

#[derive(Clone)]
pub struct SmtpGateway {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Duration,
}

impl SmtpGateway {
    pub fn new(config: &SmtpConfig, from: &str, timeout: Duration) -> Result<Self> {
        let from: Mailbox = from.parse().context("Invalid from address")?;

        let tls_params = TlsParameters::new(config.host.clone())?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
            .tls(Tls::Required(tls_params))
            .build();

        Ok(Self {
            mailer,
            from,
            timeout,
        })
    }

    /// `<uuid@dominio-del-remitente>`; es el id que devolvemos como receipt.
    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }
}

#[async_trait]
impl MessageGateway for SmtpGateway {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<GatewayReceipt, GatewayError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| GatewayError::Rejected(format!("Invalid recipient address: {e}")))?;

        let message_id = self.new_message_id();
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.mailer.send(email)).await {
            Err(_) => Err(GatewayError::Transport(format!(
                "smtp send timed out after {:?}",
                self.timeout
            ))),
            Ok(Err(e)) if e.is_permanent() => {
                let code = e.status().map(|c| c.to_string()).unwrap_or_default();
                Err(GatewayError::Rejected(format!("smtp {code}: {e}")))
            }
            Ok(Err(e)) => Err(GatewayError::Transport(e.to_string())),
            Ok(Ok(_)) => Ok(GatewayReceipt { message_id }),
        }
    }
}
