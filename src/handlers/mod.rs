//! handlers/mod.rs
//! Módulo que agrupa los handlers HTTP (envíos y consulta de campañas).
pub mod campaign_handler;
pub mod dispatch_handler;
