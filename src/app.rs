use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::bootstrap;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub fn run() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = AppConfig::load().map_err(|err| {
        error!(error = %err, "Failed to load configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
    })?;
    let state = bootstrap::setup(config).map_err(|err| {
        error!(error = %err, "Failed to initialize services");
        std::io::Error::new(std::io::ErrorKind::Other, err)
    })?;

    actix_web::rt::System::new().block_on(async move { start_server(state)?.await })
}
