use std::{path::Path, sync::Arc};

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::{Pool, Sqlite};

use crate::config::dispatch_config::{DispatchConfig, GatewayKind};
use crate::logger::init_logger;
use crate::services::dispatch_service::DispatchService;
use crate::services::gateway_service::{HttpGateway, MessageGateway};
use crate::services::ledger_service::CampaignLedger;
use crate::services::queue_service::DispatchQueue;
use crate::services::smtp_gateway::SmtpGateway;

mod app;
mod config;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(db_path: &str) -> Result<Pool<Sqlite>> {
    // Crear carpeta contenedora si no existe
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
        }
    }

    // mode=rwc: crea el archivo si no existe
    let db_url = format!("sqlite:{}?mode=rwc", db_path);
    log::info!("Conectando a SQLite en {}", db_url);

    Pool::<Sqlite>::connect(&db_url)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")
}

fn build_gateway(config: &DispatchConfig) -> Result<Arc<dyn MessageGateway>> {
    let gateway: Arc<dyn MessageGateway> = match config.gateway_kind {
        GatewayKind::Http => {
            if config.provider.api_key.is_empty() {
                log::warn!("PROVIDER_API_KEY vacío: el proveedor rechazará los envíos");
            }
            Arc::new(HttpGateway::new(&config.provider, config.mail_from.clone())?)
        }
        GatewayKind::Smtp => Arc::new(SmtpGateway::new(
            &config.smtp,
            &config.mail_from,
            config.provider.timeout,
        )?),
    };
    log::info!("Gateway de envío: {}", gateway.name());
    Ok(gateway)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = DispatchConfig::from_env().expect("Configuración inválida");

    let db_pool = setup_database(&config.database_path)
        .await
        .expect("No se pudo inicializar la base de datos");

    let ledger = CampaignLedger::new(db_pool.clone());
    if let Err(e) = ledger.run_migrations().await {
        panic!("Fallo en migraciones de campañas: {:?}", e);
    }
    let queue = DispatchQueue::new(db_pool.clone());

    let gateway = build_gateway(&config).expect("No se pudo inicializar el gateway");
    let dispatch_service = DispatchService::new(ledger, queue, gateway, &config.delivery);

    // Reanudar campañas que quedaron a medias en una ejecución anterior
    let recovery_service = dispatch_service.clone();
    tokio::spawn(async move {
        match recovery_service.recover_stalled().await {
            Ok(0) => {}
            Ok(n) => log::info!("(recover_stalled) {} campaña(s) reanudadas", n),
            Err(e) => log::error!("(recover_stalled) Error en recuperación: {:?}", e),
        }
    });

    log::info!(
        "Levantando servidor en {}:{}",
        config.bind_host,
        config.bind_port
    );
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(dispatch_service.clone()))
            .configure(app::init_app)
    })
    .workers(1)
    .bind((config.bind_host.as_str(), config.bind_port))?
    .run()
    .await
}
