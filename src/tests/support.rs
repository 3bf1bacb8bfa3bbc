//! tests/support.rs
//! Helpers compartidos: pool en memoria, servicios y un gateway simulado.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::{
    config::dispatch_config::{BulkSuccessPolicy, DeliveryConfig},
    services::{
        dispatch_service::DispatchService,
        gateway_service::{GatewayError, GatewayReceipt, MessageGateway, OutboundMessage},
        ledger_service::CampaignLedger,
        queue_service::DispatchQueue,
    },
};

/// Una sola conexión que nunca se recicla: con `sqlite::memory:` cada
/// conexión nueva sería una base vacía.
pub async fn test_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite")
}

pub async fn test_ledger() -> (CampaignLedger, DispatchQueue) {
    let pool = test_pool().await;
    let ledger = CampaignLedger::new(pool.clone());
    ledger
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    (ledger, DispatchQueue::new(pool))
}

/// Sin esperas apreciables: cuota alta y backoff de milisegundos.
pub fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        rate_per_second: 10_000,
        burst: 10_000,
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        test_subject_prefix: "[TEST] ".to_string(),
        bulk_success_policy: BulkSuccessPolicy::Unconditional,
    }
}

pub struct TestHarness {
    pub service: DispatchService,
    pub ledger: CampaignLedger,
    pub queue: DispatchQueue,
    pub gateway: Arc<MockGateway>,
}

pub async fn harness_with(gateway: MockGateway, delivery: DeliveryConfig) -> TestHarness {
    let (ledger, queue) = test_ledger().await;
    let gateway = Arc::new(gateway);
    let service = DispatchService::new(ledger.clone(), queue.clone(), gateway.clone(), &delivery);
    TestHarness {
        service,
        ledger,
        queue,
        gateway,
    }
}

pub async fn harness(gateway: MockGateway) -> TestHarness {
    harness_with(gateway, fast_delivery()).await
}

/// Gateway en memoria.
/// - `failing`: emails que fallan siempre con `failure`
/// - `flaky`: emails que fallan N veces con error de transporte y luego pasan
#[derive(Default)]
pub struct MockGateway {
    failing: HashSet<String>,
    failure: Option<GatewayError>,
    flaky: Mutex<HashMap<String, u32>>,
    delivered: Mutex<Vec<OutboundMessage>>,
    calls: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(emails: &[&str]) -> Self {
        Self {
            failing: emails.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, err: GatewayError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn flaky(self, email: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(email.to_string(), failures);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<GatewayReceipt, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failing.contains(&message.to) {
            return Err(self
                .failure
                .clone()
                .unwrap_or_else(|| GatewayError::Transport("connection reset".to_string())));
        }

        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(&message.to) {
                if *left > 0 {
                    *left -= 1;
                    return Err(GatewayError::Transport("timeout".to_string()));
                }
            }
        }

        self.delivered.lock().unwrap().push(message.clone());
        Ok(GatewayReceipt {
            message_id: format!("msg-{}", n),
        })
    }
}
