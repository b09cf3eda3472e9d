use std::sync::Arc;

use bellhost::configs::Settings;

#[tokio::main]
async fn main() {
    // Configuration problems are fatal and reported before any connection
    // attempt is made.
    let settings = match Settings::new() {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
            let level = settings.logger.level.as_str();

            format!("{app_name}={level},rumqttc=warn").into()
        }))
        .init();

    if let Err(e) = bellhost::run(settings).await {
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}
