//! Fehlertypen fuer die Audio-Pipeline

use iaxc_core::{Format, IaxcError};
use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Pipeline
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Kein Codec fuer Format {0} verfuegbar")]
    CodecNichtVerfuegbar(Format),

    #[error("DSP-Fehler: {0}")]
    Dsp(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ring-Buffer-Kapazitaet {0} ist keine Zweierpotenz")]
    KeineZweierpotenz(usize),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for IaxcError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::CodecFehler(m) => IaxcError::Codec(m),
            AudioError::CodecNichtVerfuegbar(f) => {
                IaxcError::Codec(format!("Kein Codec fuer Format {f} verfuegbar"))
            }
            other => IaxcError::Audio(other.to_string()),
        }
    }
}
