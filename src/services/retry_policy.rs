//! services/retry_policy.rs
//! Reintentos acotados con backoff exponencial por destinatario.

use std::time::Duration;

use crate::config::dispatch_config::DeliveryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Intentos totales, incluido el primero
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Espera antes del siguiente intento, después de `failed_attempts` fallos.
    /// base, 2*base, 4*base, ... con tope en `max_delay`.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(cfg: &DeliveryConfig) -> Self {
        RetryPolicy {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: cfg.backoff_base,
            max_delay: cfg.backoff_max,
        }
    }
}
