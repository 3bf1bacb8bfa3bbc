//! logger.rs
//! Logger con env_logger. `RUST_LOG` manda; si no está, `info` para el
//! servicio y `warn` para sqlx (que es muy verboso en info).

pub fn init_logger() {
    let default_filter = "info,sqlx=warn";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}
