use log::info;
use tara_engine::api::server::start_server;
use tara_engine::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration first so LOG_LEVEL from .env applies
    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    // Initialize logger; RUST_LOG still takes precedence
    env_logger::init_from_env(
        env_logger::Env::new().default_filter_or(config.logging.log_level.as_str()),
    );

    info!("Starting TARA engine...");
    info!(
        "Analysis: parallelism {}, timeout {}s, {} paths per pair",
        config.analysis.max_parallelism,
        config.analysis.timeout_secs,
        config.analysis.max_paths_per_pair
    );

    start_server(config).await
}
