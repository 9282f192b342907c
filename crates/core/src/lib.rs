//! iaxc-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Protokoll-, Audio- und
//! Engine-Crate gemeinsam nutzen: Formatmasken, Anrufzustand, die
//! Ereignisse an die Anwendung und die Fehler-Taxonomie.

pub mod error;
pub mod event;
pub mod state;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{IaxcError, Result};
pub use event::{CallSnapshot, IaxcEvent, TextKind, SILENCE_DB};
pub use state::{CallState, Direction, Lifecycle};
pub use types::{AudioPrefs, CallId, Filters, Format, RegistrationId};
