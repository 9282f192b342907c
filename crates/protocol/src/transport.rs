//! Transport-Schnittstelle
//!
//! Ein Transport verwaltet undurchsichtige Sitzungen (eine pro Anruf oder
//! Registrierung), sendet Protokollbefehle und liefert eingehende Ereignisse
//! ueber [`Transport::next_event`]. Alle Befehle kehren sofort zurueck; das
//! Ergebnis kommt spaeter als Ereignis.

use bytes::Bytes;
use iaxc_core::event::{NetStat, UrlKind};
use iaxc_core::Format;
use std::fmt;

use crate::error::ProtocolResult;

/// Undurchsichtiger Sitzungs-Handle des Transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Parameter fuer einen ausgehenden Anruf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSetup {
    pub cid_number: String,
    pub cid_name: String,
    /// Gewaehlte Nummer inklusive optionalem `name/` Praefix
    pub number: String,
    /// Bevorzugte Formate (Audio | Video)
    pub preferred: Format,
    /// Erlaubte Formate (Audio | Video)
    pub capability: Format,
}

/// Parameter einer Registrierungsanfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub host: String,
    pub user: String,
    pub pass: String,
    /// Gewuenschte Lease-Dauer in Sekunden
    pub refresh: u32,
}

/// Informationen eines eingehenden Anrufs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectInfo {
    /// Vom Anrufer bevorzugtes Format
    pub format: Format,
    /// Alle Formate des Anrufers
    pub capability: Format,
    pub called_number: Option<String>,
    pub called_context: Option<String>,
    pub calling_number: Option<String>,
    pub calling_name: Option<String>,
}

/// Netzwerkstatistik einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetStatsReport {
    pub rtt: i32,
    pub local: NetStat,
    pub remote: NetStat,
}

/// Art eines eingehenden Protokoll-Ereignisses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Connect(ConnectInfo),
    Accept { format: Format },
    Answer,
    Busy,
    Hangup,
    Reject,
    Voice { format: Format, data: Bytes },
    Video { format: Format, data: Bytes },
    Text(String),
    Ringing,
    Pong,
    Timeout,
    Transfer,
    TransferReleased,
    Dtmf(char),
    Url { kind: UrlKind, url: String },
    Cng,
    RegAck { msg_count: i32 },
    RegReject,
    RegRequest,
    /// Vom Transport nicht weiter interpretierter Ereignistyp
    Other(u8),
}

impl EventKind {
    /// Numerischer Ereignistyp fuer Logs und Statusmeldungen
    pub fn typ_nummer(&self) -> u8 {
        match self {
            Self::Connect(_) => 0,
            Self::Accept { .. } => 1,
            Self::Hangup => 2,
            Self::Reject => 3,
            Self::Voice { .. } => 4,
            Self::Dtmf(_) => 5,
            Self::Timeout => 6,
            Self::Ringing => 9,
            Self::Pong => 11,
            Self::Busy => 12,
            Self::Answer => 13,
            Self::RegRequest => 17,
            Self::RegAck { .. } => 18,
            Self::Url { .. } => 19,
            Self::Transfer => 21,
            Self::Text(_) => 29,
            Self::RegReject => 30,
            Self::Cng => 32,
            Self::TransferReleased => 37,
            Self::Video { .. } => 38,
            Self::Other(n) => *n,
        }
    }
}

/// Ein Ereignis einer bestimmten Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolEvent {
    pub session: SessionId,
    pub kind: EventKind,
}

impl ProtocolEvent {
    pub fn new(session: SessionId, kind: EventKind) -> Self {
        Self { session, kind }
    }
}

/// Signalisierungs-Transport (z.B. IAX2 ueber UDP)
///
/// Implementierungen muessen `Send` sein, weil der Service-Thread sie unter
/// der Engine-Sperre benutzt. Kein Befehl darf auf Netzwerk-I/O blockieren.
pub trait Transport: Send {
    fn new_session(&mut self) -> ProtocolResult<SessionId>;
    fn destroy_session(&mut self, session: SessionId);

    fn call(&mut self, session: SessionId, setup: &CallSetup) -> ProtocolResult<()>;
    fn accept(&mut self, session: SessionId, format: Format) -> ProtocolResult<()>;
    fn answer(&mut self, session: SessionId) -> ProtocolResult<()>;
    fn reject(&mut self, session: SessionId, reason: &str) -> ProtocolResult<()>;
    fn busy(&mut self, session: SessionId) -> ProtocolResult<()>;
    fn ring_announce(&mut self, session: SessionId) -> ProtocolResult<()>;
    fn hangup(&mut self, session: SessionId, reason: &str) -> ProtocolResult<()>;

    /// Blinde Weitervermittlung an `destination`
    fn transfer(&mut self, session: SessionId, destination: &str) -> ProtocolResult<()>;
    /// Verbindet zwei bestehende Sitzungen miteinander
    fn setup_transfer(&mut self, from: SessionId, to: SessionId) -> ProtocolResult<()>;
    fn quelch(&mut self, session: SessionId, music_on_hold: bool) -> ProtocolResult<()>;
    fn unquelch(&mut self, session: SessionId) -> ProtocolResult<()>;

    fn send_voice(
        &mut self,
        session: SessionId,
        format: Format,
        data: &[u8],
        samples: usize,
    ) -> ProtocolResult<()>;
    /// Comfort-Noise-Marker mit Rauschpegel in -dBov
    fn send_cng(&mut self, session: SessionId, level: u8) -> ProtocolResult<()>;
    fn send_video(&mut self, session: SessionId, format: Format, data: &[u8])
        -> ProtocolResult<()>;
    fn send_dtmf(&mut self, session: SessionId, digit: char) -> ProtocolResult<()>;
    fn send_text(&mut self, session: SessionId, text: &str) -> ProtocolResult<()>;
    fn send_url(&mut self, session: SessionId, url: &str, link: bool) -> ProtocolResult<()>;

    fn register(&mut self, session: SessionId, request: &RegistrationRequest)
        -> ProtocolResult<()>;

    /// Aktuelle Netzwerkstatistik, `None` wenn die Sitzung keine hat
    fn netstats(&self, session: SessionId) -> Option<NetStatsReport>;

    /// Naechstes eingehendes Ereignis, `None` wenn keines wartet
    fn next_event(&mut self) -> Option<ProtocolEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrierungs_antworten_haben_iax_nummern() {
        assert_eq!(EventKind::RegAck { msg_count: 0 }.typ_nummer(), 18);
        assert_eq!(EventKind::RegReject.typ_nummer(), 30);
        assert_eq!(EventKind::Timeout.typ_nummer(), 6);
        assert_eq!(EventKind::Other(42).typ_nummer(), 42);
    }

    #[test]
    fn session_anzeige() {
        assert_eq!(SessionId(7).to_string(), "session:7");
    }
}
