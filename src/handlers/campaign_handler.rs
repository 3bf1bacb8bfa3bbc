//! handlers/campaign_handler.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::services::dispatch_service::DispatchService;

#[derive(Deserialize)]
pub struct PaginationQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

/// GET /api/campaigns/{id}
pub async fn get_campaign_endpoint(
    dispatch_service: web::Data<DispatchService>,
    path: web::Path<String>,
) -> HttpResponse {
    let campaign_id = path.into_inner();

    match dispatch_service.ledger().get_campaign(&campaign_id).await {
        Ok(Some(campaign)) => HttpResponse::Ok().json(campaign),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": format!("campaign not found: {}", campaign_id)
        })),
        Err(e) => {
            log::error!("(get_campaign) {:?}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": e.to_string()
            }))
        }
    }
}

/// GET /api/campaigns/{id}/sends
pub async fn list_sends_endpoint(
    dispatch_service: web::Data<DispatchService>,
    path: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> HttpResponse {
    let campaign_id = path.into_inner();
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(50);

    match dispatch_service
        .ledger()
        .list_sends(&campaign_id, page, page_size)
        .await
    {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Internal server error",
            "details": format!("{:?}", e)
        })),
    }
}
