use avgate_core::Config;
use avgate_infra::{init_telemetry, LogFormat};

// Use mimalloc as the global allocator for better performance and lower fragmentation,
// especially when running on musl-based systems inside containers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "avgate=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    init_telemetry(
        DEFAULT_LOG_FILTER,
        LogFormat::for_environment(config.is_production()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    // Initialize the application (storage, scanner, routes)
    let (_state, router) = avgate_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    avgate_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
