//! config/dispatch_config.rs
//! Configuración global del servicio de campañas (se lee del .env / entorno).

use std::{env, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Qué gateway se usa para entregar los mensajes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// API HTTP del proveedor transaccional
    Http,
    /// Relay SMTP (lettre)
    Smtp,
}

impl FromStr for GatewayKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(GatewayKind::Http),
            "smtp" => Ok(GatewayKind::Smtp),
            other => Err(anyhow!("GATEWAY_KIND desconocido: {}", other)),
        }
    }
}

/// Cómo se calcula el flag `success` de un envío masivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkSuccessPolicy {
    /// `success: true` siempre, aunque fallen todos los destinatarios.
    #[default]
    Unconditional,
    /// `success: false` si al menos un destinatario falló.
    AllDelivered,
}

impl FromStr for BulkSuccessPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unconditional" => Ok(BulkSuccessPolicy::Unconditional),
            "all_delivered" => Ok(BulkSuccessPolicy::AllDelivered),
            other => Err(anyhow!("BULK_SUCCESS_POLICY desconocida: {}", other)),
        }
    }
}

/// Datos de acceso al proveedor HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Datos del relay SMTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// Parámetros de entrega: ritmo, reintentos y prefijo de pruebas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub rate_per_second: u32,
    pub burst: u32,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub test_subject_prefix: String,
    pub bulk_success_policy: BulkSuccessPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            rate_per_second: 2,
            burst: 1,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
            test_subject_prefix: "[TEST] ".to_string(),
            bulk_success_policy: BulkSuccessPolicy::Unconditional,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub database_path: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub gateway_kind: GatewayKind,
    pub mail_from: String,
    pub provider: ProviderConfig,
    pub smtp: SmtpConfig,
    pub delivery: DeliveryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            database_path: "./data/campaigns.db".to_string(),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 5022,
            gateway_kind: GatewayKind::Http,
            mail_from: "Campaigns <no-reply@example.com>".to_string(),
            provider: ProviderConfig {
                api_url: "https://api.resend.com".to_string(),
                api_key: String::new(),
                timeout: Duration::from_secs(30),
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                user: String::new(),
                pass: String::new(),
            },
            delivery: DeliveryConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Construye la config desde variables de entorno; lo que falte queda en su default.
    pub fn from_env() -> Result<Self> {
        let mut cfg = DispatchConfig::default();

        if let Ok(v) = env::var("DATABASE_URL") {
            cfg.database_path = v.trim_start_matches("sqlite:").to_string();
        }
        if let Ok(v) = env::var("BIND_HOST") {
            cfg.bind_host = v;
        }
        cfg.bind_port = parse_var("BIND_PORT", cfg.bind_port)?;
        cfg.gateway_kind = parse_var("GATEWAY_KIND", cfg.gateway_kind)?;
        if let Ok(v) = env::var("MAIL_FROM") {
            cfg.mail_from = v;
        }

        if let Ok(v) = env::var("PROVIDER_API_URL") {
            cfg.provider.api_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("PROVIDER_API_KEY") {
            cfg.provider.api_key = v;
        }
        let timeout_secs = parse_var("GATEWAY_TIMEOUT_SECS", cfg.provider.timeout.as_secs())?;
        cfg.provider.timeout = Duration::from_secs(timeout_secs);

        if let Ok(v) = env::var("SMTP_HOST") {
            cfg.smtp.host = v;
        }
        cfg.smtp.port = parse_var("SMTP_PORT", cfg.smtp.port)?;
        if let Ok(v) = env::var("SMTP_USER") {
            cfg.smtp.user = v;
        }
        if let Ok(v) = env::var("SMTP_PASS") {
            cfg.smtp.pass = v;
        }

        let d = &mut cfg.delivery;
        d.rate_per_second = parse_var("DISPATCH_RATE_PER_SECOND", d.rate_per_second)?;
        d.burst = parse_var("DISPATCH_BURST", d.burst)?;
        d.max_attempts = parse_var("DISPATCH_MAX_ATTEMPTS", d.max_attempts)?;
        let base_ms = parse_var("DISPATCH_BACKOFF_BASE_MS", d.backoff_base.as_millis() as u64)?;
        d.backoff_base = Duration::from_millis(base_ms);
        let max_ms = parse_var("DISPATCH_BACKOFF_MAX_MS", d.backoff_max.as_millis() as u64)?;
        d.backoff_max = Duration::from_millis(max_ms);
        if let Ok(v) = env::var("TEST_SUBJECT_PREFIX") {
            d.test_subject_prefix = v;
        }
        d.bulk_success_policy = parse_var("BULK_SUCCESS_POLICY", d.bulk_success_policy)?;

        if d.rate_per_second == 0 || d.burst == 0 || d.max_attempts == 0 {
            return Err(anyhow!(
                "DISPATCH_RATE_PER_SECOND, DISPATCH_BURST y DISPATCH_MAX_ATTEMPTS deben ser > 0"
            ));
        }

        Ok(cfg)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Valor inválido para {}", name)),
        Err(_) => Ok(default),
    }
}
