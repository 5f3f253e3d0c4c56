use clap::Parser;
use gridrelay::{Application, Config, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Both reqwest and the MongoDB driver build rustls clients; pick the provider up front
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Parse CLI args
    let args = gridrelay::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;

    tracing::debug!("{:?}", args);

    // Both calls log their own failure and flush telemetry before returning it
    let app = Application::new(config).await?;
    let summary = app.run().await?;

    tracing::info!(
        relayed = summary.relayed,
        skipped = summary.skipped.len(),
        "Relay completed"
    );

    Ok(())
}
