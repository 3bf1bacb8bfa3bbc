//! handlers/dispatch_handler.rs
//! Endpoint único de envío, enrutado por `action`.

use actix_web::{http::StatusCode, web, HttpResponse};
use serde_json::json;

use crate::{
    models::dispatch_model::DispatchRequest,
    services::{dispatch_error::DispatchError, dispatch_service::DispatchService},
};

/// POST /api/dispatch
pub async fn dispatch_endpoint(
    dispatch_service: web::Data<DispatchService>,
    body: web::Json<DispatchRequest>,
) -> HttpResponse {
    match body.into_inner() {
        DispatchRequest::SendSingle(req) => match dispatch_service.send_single(req).await {
            Ok(resp) => HttpResponse::Ok().json(resp),
            Err(e) => error_response("send_single", e),
        },
        DispatchRequest::SendTest(req) => match dispatch_service.send_test(req).await {
            Ok(resp) => HttpResponse::Ok().json(resp),
            Err(e) => error_response("send_test", e),
        },
        DispatchRequest::SendBulk(req) => match dispatch_service.send_bulk(req).await {
            Ok(summary) => HttpResponse::Ok().json(summary),
            Err(e) => error_response("send_bulk", e),
        },
        DispatchRequest::ResumeBulk(req) => {
            match dispatch_service.resume_bulk(&req.campaign_id).await {
                Ok(summary) => HttpResponse::Ok().json(summary),
                Err(e) => error_response("resume_bulk", e),
            }
        }
    }
}

fn status_for(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::TemplateNotFound(_) | DispatchError::CampaignNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DispatchError::CampaignAlreadyCompleted(_) => StatusCode::CONFLICT,
        DispatchError::Gateway(_) => StatusCode::BAD_GATEWAY,
        DispatchError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(action: &str, e: DispatchError) -> HttpResponse {
    let status = status_for(&e);
    if status.is_server_error() {
        log::error!("({}) {}", action, e);
    } else {
        log::warn!("({}) {}", action, e);
    }

    HttpResponse::build(status).json(json!({
        "success": false,
        "error": e.to_string()
    }))
}
