/// MemeForge gateway: config loading, collaborator wiring, HTTP server.
pub mod api;
pub mod config;
pub mod rate_limit;
pub mod render;
pub mod server;
pub mod state;
pub mod token;
pub mod users;

use crate::state::AppState;

/// Load configuration, wire the collaborators, and serve until ctrl-c.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);

    // Signing-key misconfiguration is fatal at startup, never a
    // per-request error.
    let Some(secret) = config.token_secret.clone() else {
        log::error!("No token secret configured; set MEMEFORGE_TOKEN_SECRET");
        return Err("token secret not configured".into());
    };

    let state = AppState::from_config(&config, &secret);
    let port = server::spawn_server(state, &config.bind_address, config.port).await?;
    log::info!(
        "MemeForge gateway ready on {}:{} (limit {}/{}s)",
        config.bind_address,
        port,
        config.rate_limit.limit,
        config.rate_limit.window_secs
    );

    tokio::signal::ctrl_c().await?;
    log::info!("[memeforge.shutdown] Received ctrl-c, exiting");
    Ok(())
}
