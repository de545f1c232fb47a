//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Datei):
//! - `PROXIMA_LOG_LEVEL`: Filter-Ausdruck, z.B. `debug` oder
//!   `info,proxima_voice=trace`
//! - `PROXIMA_LOG_FORMAT`: `text` oder `json`

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Filter
pub const ENV_LEVEL: &str = "PROXIMA_LOG_LEVEL";
/// Umgebungsvariable fuer das Format
pub const ENV_FORMAT: &str = "PROXIMA_LOG_FORMAT";

/// Initialisiert das Logging-System (einmal pro Prozess).
///
/// Faellt auf `info` zurueck, wenn weder Umgebung noch Konfiguration einen
/// gueltigen Filter liefern.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Format aus der Umgebung, sonst der konfigurierte Wert
pub fn log_format(konfiguriert: &str) -> String {
    std::env::var(ENV_FORMAT).unwrap_or_else(|_| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
