//! Logging der Engine ueber tracing-subscriber
//!
//! Die Stufe aus [`LoggingEinstellungen`] gilt nur fuer die `iaxc_*`-Crates;
//! fremde Crates (Audio-Backend) bleiben auf `warn`. `IAXC_LOG` ersetzt die
//! Filterdirektiven vollstaendig, `IAXC_LOG_FORMAT` das Ausgabeformat.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingEinstellungen;

const ENGINE_CRATES: [&str; 4] = ["iaxc_core", "iaxc_protocol", "iaxc_audio", "iaxc_engine"];

/// Ausgabeformat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn aus_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Filterdirektiven fuer eine Stufe, `None` bei unbekannter Stufe
pub fn direktiven(level: &str) -> Option<String> {
    let level: Level = level.parse().ok()?;
    let stufe = level.to_string().to_lowercase();
    let mut teile = vec!["warn".to_string()];
    teile.extend(ENGINE_CRATES.iter().map(|c| format!("{c}={stufe}")));
    Some(teile.join(","))
}

fn filter(einstellungen: &LoggingEinstellungen) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("IAXC_LOG") {
        return filter;
    }
    let direktiven = direktiven(&einstellungen.level).unwrap_or_else(|| {
        eprintln!(
            "Unbekannte Log-Stufe {:?}, verwende info",
            einstellungen.level
        );
        direktiven("info").unwrap_or_default()
    });
    EnvFilter::new(direktiven)
}

/// Installiert den globalen Subscriber.
///
/// Gibt `false` zurueck, wenn bereits einer existiert.
pub fn logging_initialisieren(einstellungen: &LoggingEinstellungen) -> bool {
    let format = std::env::var("IAXC_LOG_FORMAT")
        .ok()
        .and_then(|f| LogFormat::aus_name(&f))
        .or_else(|| LogFormat::aus_name(&einstellungen.format))
        .unwrap_or(LogFormat::Text);

    // Thread-Namen zeigen, ob iaxc-service oder iaxc-events geloggt hat
    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter(einstellungen))
            .with_thread_names(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter(einstellungen))
            .with_thread_names(true)
            .try_init(),
    };
    ergebnis.is_ok()
}
