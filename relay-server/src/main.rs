use std::sync::Arc;

use relay_server::config::Config;
use relay_server::inference::OllamaGateway;
use relay_server::{routes, server, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: chat-relay [--config <path>] [--version]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("chat-relay {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(path),
                None => return Err(format!("--config needs a path\n{USAGE}").into()),
            },
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => return Err(format!("Unknown argument: {other}\n{USAGE}").into()),
        }
    }

    // Load configuration
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chat relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Serving assets from {} with model {} at {}",
        config.assets.root.display(),
        config.inference.model,
        config.inference.base_url
    );

    let gateway = Arc::new(OllamaGateway::new(
        &config.inference.base_url,
        &config.inference.model,
        config.inference.max_tokens,
    ));
    let state = AppState::new(config.clone(), gateway);

    // Model loading runs while the listener is already up.
    state.relay.spawn_readiness_loader();

    let app = routes::router(state);
    server::serve(&config, app).await?;

    Ok(())
}
