//! Fehlertypen der Anruf-Engine
//!
//! Jeder Fehler ist auf Anruf-Ebene behebbar; kein Fehler eines einzelnen
//! Anrufs darf die Anruftabelle beschaedigen oder den Service-Thread beenden.
//! Zusaetzlich zur Rueckgabe wird jeder Fehler als Textereignis gemeldet,
//! die passende Art liefert [`IaxcError::text_art`].

use crate::event::TextKind;
use crate::types::{CallId, RegistrationId};
use thiserror::Error;

/// Result-Alias fuer die Engine
pub type Result<T> = std::result::Result<T, IaxcError>;

/// Alle moeglichen Fehler der Anruf-Engine
#[derive(Debug, Error)]
pub enum IaxcError {
    // --- Ressourcen ---
    #[error("No free call appearances")]
    KeineFreieLeitung,

    // --- Aushandlung ---
    #[error("Could not negotiate common codec")]
    KeinGemeinsamerCodec,

    // --- Transport ---
    #[error("Sitzungsfehler: {0}")]
    Sitzung(String),

    // --- Codec ---
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    // --- Protokoll ---
    #[error("Protokoll-Anomalie: {0}")]
    ProtokollAnomalie(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Bedienfehler ---
    #[error("Ungueltige Anrufnummer: {0}")]
    UngueltigerAnruf(CallId),

    #[error("Anruf {call} ist nicht im erforderlichen Zustand: {erwartet}")]
    UngueltigerZustand { call: CallId, erwartet: &'static str },

    #[error("Unbekannte Registrierung: {0}")]
    UnbekannteRegistrierung(RegistrationId),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    #[error("Audio-Geraet kann nicht geoeffnet werden")]
    AudioGeraetDefekt,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IaxcError {
    /// Textereignis-Art, mit der dieser Fehler der Anwendung gemeldet wird
    pub fn text_art(&self) -> TextKind {
        match self {
            Self::KeineFreieLeitung | Self::Zeitlimit(_) | Self::ProtokollAnomalie(_) => {
                TextKind::Status
            }
            Self::KeinGemeinsamerCodec => TextKind::Notice,
            Self::AudioGeraetDefekt => TextKind::FatalError,
            _ => TextKind::Error,
        }
    }
}
