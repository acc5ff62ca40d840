//! Process entrypoint: parse CLI flags, merge them with a config file,
//! start one Bridge per device, and shut them all down on Ctrl-C.

use anyhow::Context;
use clap::Parser;
use modbus_proxy_core::cli::Cli;
use modbus_proxy_core::core::bridge::Bridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "fatal");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config().context("building configuration")?;

    tracing::info!(devices = config.devices.len(), "starting modbus-proxy");

    let mut handles = Vec::with_capacity(config.devices.len());
    for device in &config.devices {
        let bridge = Bridge::new(device).with_context(|| format!("configuring device {}", device.modbus.url))?;
        let handle = bridge
            .start()
            .await
            .with_context(|| format!("binding listener for device {}", device.modbus.url))?;
        tracing::info!(bind = %handle.listen_addr(), upstream = %device.modbus.url, "bridge started");
        handles.push(handle);
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");

    for handle in handles {
        handle.stop().await;
    }

    Ok(())
}
