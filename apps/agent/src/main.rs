use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wattline_agent::{AgentConfig, DeviceAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wattline_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AgentConfig::from_env()?;

    tracing::info!(
        server = %config.server_url,
        device_id = %config.device_id,
        device_type = %config.device_type,
        report_consumption = config.report_consumption,
        "Starting Wattline device agent"
    );

    let agent = DeviceAgent::new(config)?;

    tokio::select! {
        result = agent.run_until_disconnected() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Agent stopped");
    Ok(())
}
