//! Fehlertypen fuer Transport und Slicer

use crate::transport::SessionId;
use iaxc_core::IaxcError;
use thiserror::Error;

/// Alle Fehler der Protokollschicht
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unbekannte Sitzung: {0}")]
    UnbekannteSitzung(SessionId),

    #[error("Sitzung konnte nicht angelegt werden")]
    SitzungVerweigert,

    #[error("Ungueltiges Slice: {0}")]
    UngueltigesSlice(String),

    #[error("Frame zu gross: {groesse} Bytes (Maximum {max})")]
    FrameZuGross { groesse: usize, max: usize },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl From<ProtocolError> for IaxcError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::UngueltigesSlice(_) | ProtocolError::FrameZuGross { .. } => {
                IaxcError::ProtokollAnomalie(e.to_string())
            }
            _ => IaxcError::Sitzung(e.to_string()),
        }
    }
}
