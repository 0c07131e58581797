mod bootstrap;
mod health;
mod interactions;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use switchdesk_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use switchdesk_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    let mut routes: Router = health::router(app.platform.clone());
    if let Some(public_key) = &app.config.discord.public_key {
        let key = interactions::parse_public_key(public_key)
            .context("discord.public_key could not be loaded")?;
        routes = routes.merge(interactions::router(key, app.dispatcher.clone()));
    } else {
        tracing::info!(
            event_name = "system.server.interactions_disabled",
            correlation_id = "bootstrap",
            "no discord.public_key configured; /interactions is not served"
        );
    }

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        guild = %app.config.guild.name,
        "switchdesk-server started"
    );

    let gateway = app.gateway_runner;
    tokio::spawn(async move {
        if let Err(error) = gateway.start().await {
            tracing::error!(
                event_name = "system.gateway.error",
                correlation_id = "gateway",
                error = %error,
                "gateway runner terminated"
            );
        }
    });

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown(grace)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "switchdesk-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "could not listen for ctrl-c; shutting down");
    }
    tracing::info!(
        event_name = "system.server.draining",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown requested; draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(
            event_name = "system.server.forced_exit",
            correlation_id = "shutdown",
            "graceful shutdown window elapsed"
        );
        std::process::exit(0);
    });
}
