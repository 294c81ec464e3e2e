use tracing::{error, info};

use service_module::{run_server, ServiceConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", err);
        }
        info!("shutting down");
    };

    if let Err(err) = run_server(config, shutdown).await {
        error!("server error: {}", err);
        std::process::exit(1);
    }
}
