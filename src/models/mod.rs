//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod campaign_model;
pub mod dispatch_model;
pub mod queue_model;
pub mod send_model;
pub mod template_model;
