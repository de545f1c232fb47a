//! Proxima Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use proxima_server::{config::ServerConfig, logging, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("PROXIMA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = ServerConfig::laden(&config_pfad)?;

    logging::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Proxima Server wird initialisiert"
    );

    let server = Server::neu(config);
    let laufend = server.starten().await?;

    tracing::info!("Warte auf Shutdown-Signal (Ctrl-C)...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

    laufend.stoppen().await;
    Ok(())
}
