//! Kana Battle game server.
//!
//! Configured through the environment (see [`ServerConfig`]); log
//! verbosity follows `RUST_LOG` and defaults to `info`.

use kanabattle::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BattleError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        mailbox = config.session.mailbox_capacity,
        grace = ?config.rooms.grace_period,
        "starting kana battle server"
    );

    let server = BattleServerBuilder::new()
        .config(&config)
        .build(config.authenticator())
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
}
