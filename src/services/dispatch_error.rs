//! services/dispatch_error.rs

use crate::services::gateway_service::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("campaign {0} is already completed")]
    CampaignAlreadyCompleted(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
