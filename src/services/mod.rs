//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod dispatch_error;
pub mod dispatch_service;
pub mod gateway_service;
pub mod ledger_service;
pub mod queue_service;
pub mod retry_policy;
pub mod smtp_gateway;
pub mod template_renderer;
pub mod throttle;
