use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

mod auth;
mod client;
mod config;
mod db;
mod matchmaking;
mod password;
mod registry;
mod session;
mod state;
#[cfg(test)]
mod test_util;

use auth::AuthHandler;
use config::Config;
use db::Database;
use password::PasswordPolicy;
use state::ServerState;

const CONFIG_PATH: &str = "dilemma-server.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("Dilemma server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default(Path::new(CONFIG_PATH))?;
    let db = Database::open(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))?;
    let auth = Arc::new(AuthHandler::new(db.clone(), PasswordPolicy::standard()));

    let (shutdown_handle, shutdown) = state::shutdown_channel();
    let state = ServerState::new(auth, db, shutdown);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    let pairing = tokio::spawn(matchmaking::pairing_loop(state.clone()));
    let signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!(%e, "failed to listen for interrupt"),
        }
        shutdown_handle.trigger();
    });

    let mut clients = JoinSet::new();
    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::info!(%peer, "client connected");
                    clients.spawn(client::handle_new_connection(state.clone(), socket));
                }
                Err(e) => tracing::error!(%e, "failed to accept connection"),
            },
            _ = shutdown.recv() => break,
        }

        // Reap finished handlers so the set doesn't grow without bound.
        while clients.try_join_next().is_some() {}
    }

    drop(listener);
    tracing::info!(clients = clients.len(), "draining client tasks");
    while clients.join_next().await.is_some() {}
    pairing
        .await
        .context("pairing task panicked")?;
    signal.await.context("signal task panicked")?;

    tracing::info!("server stopped");
    Ok(())
}
