//! app.rs
use crate::handlers::{campaign_handler, dispatch_handler};
use actix_web::{error::InternalError, web, HttpResponse};
use serde_json::json;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    // Body mal formado -> 400 con el mismo formato de error que el resto
    let json_cfg = web::JsonConfig::default()
        .limit(4 * 1024 * 1024)
        .error_handler(|err, _req| {
            let resp = HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": err.to_string()
            }));
            InternalError::from_response(err, resp).into()
        });

    cfg.app_data(json_cfg).service(
        web::scope("/api")
            .route(
                "/dispatch",
                web::post().to(dispatch_handler::dispatch_endpoint),
            )
            .service(
                web::scope("/campaigns")
                    .route(
                        "/{id}",
                        web::get().to(campaign_handler::get_campaign_endpoint),
                    )
                    .route(
                        "/{id}/sends",
                        web::get().to(campaign_handler::list_sends_endpoint),
                    ),
            ),
    );
}
