//! services/throttle.rs
//! Limitador token-bucket (governor) compartido por todas las invocaciones.
//!
//! Además del ritmo fijo de la cuota, el proveedor puede pedir una pausa
//! (`Retry-After`); mientras dure, nadie saca tokens.

use std::{
    num::NonZeroU32,
    sync::Mutex,
    time::{Duration, Instant},
};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

pub struct DispatchThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    paused_until: Mutex<Option<Instant>>,
}

impl DispatchThrottle {
    pub fn new(rate_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            paused_until: Mutex::new(None),
        }
    }

    /// Espera a que haya token (y a que termine cualquier pausa del proveedor).
    pub async fn acquire(&self) {
        if let Some(wait) = self.remaining_pause() {
            log::info!("(throttle) Pausa del proveedor activa, esperando {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.limiter.until_ready().await;
    }

    /// Registra una pausa pedida por el proveedor. Nunca acorta una pausa ya activa.
    pub fn pause_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut guard = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *guard {
            Some(current) if current >= until => {}
            _ => *guard = Some(until),
        }
    }

    pub fn remaining_pause(&self) -> Option<Duration> {
        let guard = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }
}
