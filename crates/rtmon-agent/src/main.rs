use anyhow::Result;
use rtmon_agent::{run_agent, AgentConfig};
use rtmon_common::shutdown::Shutdown;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rtmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        server = %config.address,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signed = config.key.is_some(),
        encrypted = config.crypto_key.is_some(),
        "rtmon-agent starting"
    );

    let shutdown = Shutdown::new();
    let mut agent = tokio::spawn(run_agent(config, shutdown.subscribe()));

    tokio::select! {
        finished = &mut agent => {
            // Only reachable when startup fails.
            return finished?;
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutting down gracefully");
            shutdown.trigger();
        }
    }

    agent.await??;
    tracing::info!("rtmon-agent stopped");
    Ok(())
}
