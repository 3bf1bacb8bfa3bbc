//! services/dispatch_service.rs
//! Orquestador de envíos: individual, masivo (por campaña) y de prueba.
//!
//! Compone renderer + throttle + gateway + ledger/cola. Los errores del gateway
//! en un envío masivo nunca cortan el lote; los errores de persistencia al
//! registrar un resultado se loguean y no tumban la respuesta.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::dispatch_config::{BulkSuccessPolicy, DeliveryConfig},
    models::{
        dispatch_model::{
            BulkSendResponse, Recipient, SendBulkRequest, SendResponse, SendSingleRequest,
            SendTestRequest,
        },
        campaign_model::CampaignStatus,
        send_model::{NewSendRecord, SendStatus},
        template_model::TemplateRecord,
    },
    services::{
        dispatch_error::DispatchError,
        gateway_service::{GatewayError, GatewayReceipt, MessageGateway, OutboundMessage},
        ledger_service::{CampaignLedger, DispatchStart},
        queue_service::DispatchQueue,
        retry_policy::RetryPolicy,
        template_renderer::{render_html, render_text},
        throttle::DispatchThrottle,
    },
};

/// Resultado de entregar un mensaje, tras los reintentos.
struct Delivery {
    result: Result<GatewayReceipt, GatewayError>,
    attempts: u32,
}

#[derive(Clone)]
pub struct DispatchService {
    ledger: CampaignLedger,
    queue: DispatchQueue,
    gateway: Arc<dyn MessageGateway>,
    throttle: Arc<DispatchThrottle>,
    retry: RetryPolicy,
    test_subject_prefix: String,
    bulk_success_policy: BulkSuccessPolicy,
}

impl DispatchService {
    pub fn new(
        ledger: CampaignLedger,
        queue: DispatchQueue,
        gateway: Arc<dyn MessageGateway>,
        delivery: &DeliveryConfig,
    ) -> Self {
        Self {
            ledger,
            queue,
            gateway,
            throttle: Arc::new(DispatchThrottle::new(
                delivery.rate_per_second,
                delivery.burst,
            )),
            retry: RetryPolicy::from(delivery),
            test_subject_prefix: delivery.test_subject_prefix.clone(),
            bulk_success_policy: delivery.bulk_success_policy,
        }
    }

    pub fn ledger(&self) -> &CampaignLedger {
        &self.ledger
    }

    // ========================================================================
    // Operaciones públicas
    // ========================================================================

    /// Envío a un destinatario. Con `campaign_id` (y fuera de modo prueba)
    /// deja su fila en `sends` y suma 1 al contador de la campaña.
    pub async fn send_single(&self, req: SendSingleRequest) -> Result<SendResponse, DispatchError> {
        let template = self.load_template(&req.template_id).await?;
        let recipient = Recipient::new(req.recipient_email, req.recipient_name);

        let message = compose(&template, &recipient, None);
        let delivery = self.deliver(&message).await;
        let receipt = delivery.result.map_err(|e| {
            log::warn!(
                "(send_single) Falló el envío a {} tras {} intento(s): {}",
                recipient.email,
                delivery.attempts,
                e
            );
            e
        })?;

        let campaign_id = match req.campaign_id {
            Some(id) if !req.test_mode => id,
            _ => {
                log::info!(
                    "(send_single) Envío a {} sin registro (test_mode={}, sin campaña o prueba)",
                    recipient.email,
                    req.test_mode
                );
                return Ok(SendResponse {
                    success: true,
                    id: receipt.message_id,
                });
            }
        };

        let record = NewSendRecord {
            campaign_id: Some(campaign_id.clone()),
            template_id: template.id.clone(),
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            recipient_type: recipient.kind.clone(),
            status: SendStatus::Sent,
            provider_message_id: Some(receipt.message_id.clone()),
            error_message: None,
            attempts: delivery.attempts,
        };
        if let Err(e) = self.ledger.record_single_delivery(&record).await {
            log::error!(
                "(send_single) No se pudo registrar el envío a {} (campaña {}): {:?}",
                recipient.email,
                campaign_id,
                e
            );
        }

        Ok(SendResponse {
            success: true,
            id: receipt.message_id,
        })
    }

    /// Igual que `send_single` pero con prefijo en el asunto y sin tocar nunca el ledger.
    pub async fn send_test(&self, req: SendTestRequest) -> Result<SendResponse, DispatchError> {
        let template = self.load_template(&req.template_id).await?;
        let recipient = Recipient::new(req.recipient_email, None);

        let message = compose(&template, &recipient, Some(&self.test_subject_prefix));
        let delivery = self.deliver(&message).await;
        let receipt = delivery.result?;

        log::info!(
            "(send_test) Prueba de plantilla {} enviada a {} (id={})",
            template.id,
            recipient.email,
            receipt.message_id
        );
        Ok(SendResponse {
            success: true,
            id: receipt.message_id,
        })
    }

    /// Envío masivo: encola a todos los destinatarios y drena la cola de la
    /// campaña en orden. La campaña queda `completed` cuando no quedan items.
    pub async fn send_bulk(&self, req: SendBulkRequest) -> Result<BulkSendResponse, DispatchError> {
        // La plantilla se valida antes de tocar la campaña
        let template = self.load_template(&req.template_id).await?;

        match self
            .ledger
            .begin_dispatch(&req.campaign_id, req.recipients.len() as u64)
            .await?
        {
            DispatchStart::Started => log::info!(
                "(send_bulk) Campaña {} -> sending con {} destinatarios",
                req.campaign_id,
                req.recipients.len()
            ),
            DispatchStart::AlreadySending => log::warn!(
                "(send_bulk) Campaña {} ya estaba en sending; se reanuda",
                req.campaign_id
            ),
            DispatchStart::AlreadyCompleted => {
                return Err(DispatchError::CampaignAlreadyCompleted(req.campaign_id))
            }
            DispatchStart::NotFound => return Err(DispatchError::CampaignNotFound(req.campaign_id)),
        }

        let inserted = self
            .queue
            .enqueue(&req.campaign_id, &template.id, &req.recipients)
            .await?;
        if (inserted as usize) < req.recipients.len() {
            log::info!(
                "(send_bulk) {} destinatario(s) duplicados ignorados en campaña {}",
                req.recipients.len() - inserted as usize,
                req.campaign_id
            );
        }

        let mut templates = HashMap::from([(template.id.clone(), template)]);
        Ok(self.drain(&req.campaign_id, &mut templates).await)
    }

    /// Termina una campaña que quedó en `sending` con items pendientes.
    pub async fn resume_bulk(&self, campaign_id: &str) -> Result<BulkSendResponse, DispatchError> {
        let campaign = self
            .ledger
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| DispatchError::CampaignNotFound(campaign_id.to_string()))?;

        match campaign.status {
            CampaignStatus::Completed => {
                return Err(DispatchError::CampaignAlreadyCompleted(
                    campaign_id.to_string(),
                ))
            }
            // Nunca arrancó: no hay nada que reanudar
            CampaignStatus::Draft => {
                log::info!(
                    "(resume_bulk) Campaña {} sigue en draft; nada que reanudar",
                    campaign_id
                );
                return Ok(BulkSendResponse {
                    success: true,
                    sent: 0,
                    failed: 0,
                    errors: vec![],
                });
            }
            CampaignStatus::Sending => {}
        }

        let mut templates = HashMap::new();
        Ok(self.drain(campaign_id, &mut templates).await)
    }

    /// Al arrancar: libera items `in_flight` y reanuda las campañas en `sending`.
    pub async fn recover_stalled(&self) -> anyhow::Result<usize> {
        let released = self.queue.reset_in_flight().await?;
        if released > 0 {
            log::warn!(
                "(recover_stalled) {} item(s) in_flight devueltos a pending",
                released
            );
        }

        let campaigns = self.ledger.list_sending_campaigns().await?;
        for campaign_id in &campaigns {
            log::info!("(recover_stalled) Reanudando campaña {}", campaign_id);
            match self.resume_bulk(campaign_id).await {
                Ok(summary) => log::info!(
                    "(recover_stalled) Campaña {}: sent={} failed={}",
                    campaign_id,
                    summary.sent,
                    summary.failed
                ),
                Err(e) => log::error!(
                    "(recover_stalled) No se pudo reanudar campaña {}: {}",
                    campaign_id,
                    e
                ),
            }
        }
        Ok(campaigns.len())
    }

    // ========================================================================
    // Internos
    // ========================================================================

    async fn load_template(&self, template_id: &str) -> Result<TemplateRecord, DispatchError> {
        self.ledger
            .get_template(template_id)
            .await?
            .ok_or_else(|| DispatchError::TemplateNotFound(template_id.to_string()))
    }

    /// Una entrega con reintentos: cada intento espera token del throttle;
    /// los errores transitorios esperan backoff exponencial.
    async fn deliver(&self, message: &OutboundMessage) -> Delivery {
        let mut attempts = 0u32;
        loop {
            self.throttle.acquire().await;
            attempts += 1;

            let err = match self.gateway.send(message).await {
                Ok(receipt) => {
                    return Delivery {
                        result: Ok(receipt),
                        attempts,
                    }
                }
                Err(e) => e,
            };

            if let Some(pause) = err.retry_after() {
                self.throttle.pause_for(pause);
            }

            if !err.is_retryable() || !self.retry.should_retry(attempts) {
                return Delivery {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.retry.delay_for(attempts);
            log::debug!(
                "(deliver) gateway={} to={} intento={} error={}; reintento en {:?}",
                self.gateway.name(),
                message.to,
                attempts,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Procesa la cola de la campaña de forma secuencial hasta vaciarla.
    async fn drain(
        &self,
        campaign_id: &str,
        templates: &mut HashMap<String, TemplateRecord>,
    ) -> BulkSendResponse {
        let mut sent = 0u64;
        let mut failed = 0u64;
        let mut errors = Vec::new();

        loop {
            let item = match self.queue.claim_next(campaign_id).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    log::error!(
                        "(send_bulk) Error leyendo la cola de {}; se corta el drenado: {:?}",
                        campaign_id,
                        e
                    );
                    break;
                }
            };

            let template = match templates.get(&item.template_id) {
                Some(t) => Some(t.clone()),
                None => match self.ledger.get_template(&item.template_id).await {
                    Ok(Some(t)) => {
                        templates.insert(t.id.clone(), t.clone());
                        Some(t)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        log::error!(
                            "(send_bulk) Error cargando plantilla {}: {:?}",
                            item.template_id,
                            e
                        );
                        None
                    }
                },
            };

            let delivery = match &template {
                Some(t) => {
                    let message = compose(t, &item.recipient, None);
                    self.deliver(&message).await
                }
                None => Delivery {
                    result: Err(GatewayError::Rejected(format!(
                        "template {} not available",
                        item.template_id
                    ))),
                    attempts: 0,
                },
            };

            let mut record = NewSendRecord {
                campaign_id: Some(campaign_id.to_string()),
                template_id: item.template_id.clone(),
                recipient_email: item.recipient.email.clone(),
                recipient_name: item.recipient.name.clone(),
                recipient_type: item.recipient.kind.clone(),
                status: SendStatus::Sent,
                provider_message_id: None,
                error_message: None,
                attempts: delivery.attempts,
            };

            match delivery.result {
                Ok(receipt) => {
                    sent += 1;
                    record.provider_message_id = Some(receipt.message_id);
                }
                Err(e) => {
                    failed += 1;
                    log::warn!(
                        "(send_bulk) Falló {} en campaña {} tras {} intento(s): {}",
                        item.recipient.email,
                        campaign_id,
                        delivery.attempts,
                        e
                    );
                    record.status = SendStatus::Failed;
                    record.error_message = Some(e.to_string());
                    errors.push(item.recipient.email.clone());
                }
            }

            if let Err(e) = self.queue.finish(&item, &record).await {
                log::error!(
                    "(send_bulk) No se pudo registrar el resultado de {} (campaña {}): {:?}",
                    item.recipient.email,
                    campaign_id,
                    e
                );
            }
        }

        match self.ledger.complete_if_drained(campaign_id).await {
            Ok(true) => log::info!(
                "(send_bulk) Campaña {} completed: sent={} failed={}",
                campaign_id,
                sent,
                failed
            ),
            Ok(false) => match self.queue.counts(campaign_id).await {
                Ok(counts) => log::warn!(
                    "(send_bulk) Campaña {} sigue en sending: {} item(s) sin terminar",
                    campaign_id,
                    counts.unfinished()
                ),
                Err(e) => log::warn!(
                    "(send_bulk) Campaña {} sigue en sending; no se pudo leer la cola: {:?}",
                    campaign_id,
                    e
                ),
            },
            Err(e) => log::error!(
                "(send_bulk) No se pudo cerrar la campaña {}: {:?}",
                campaign_id,
                e
            ),
        }

        let success = match self.bulk_success_policy {
            BulkSuccessPolicy::Unconditional => true,
            BulkSuccessPolicy::AllDelivered => failed == 0,
        };

        BulkSendResponse {
            success,
            sent,
            failed,
            errors,
        }
    }
}

/// Asunto en texto plano, cuerpo en HTML escapado. `subject_prefix` solo para pruebas.
fn compose(
    template: &TemplateRecord,
    recipient: &Recipient,
    subject_prefix: Option<&str>,
) -> OutboundMessage {
    let subject = render_text(&template.subject, recipient);
    OutboundMessage {
        to: recipient.email.trim().to_string(),
        subject: match subject_prefix {
            Some(prefix) => format!("{prefix}{subject}"),
            None => subject,
        },
        html: render_html(&template.body, recipient),
    }
}
