//! Anwendungs-Ereignisse
//!
//! Alles, was die Engine der Anwendung mitteilt, ist ein [`IaxcEvent`]. Die
//! Ereignisse werden ueber einen Kanal an einen Dispatcher-Thread gereicht und
//! dort ausserhalb jeder internen Sperre an den Callback uebergeben.

use crate::state::CallState;
use crate::types::{CallId, Format, RegistrationId};
use serde::{Deserialize, Serialize};

/// Pegel in dB, der fuer "kein Signal" gemeldet wird
pub const SILENCE_DB: f32 = -99.0;

/// Art einer Textmeldung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextKind {
    Status = 1,
    Notice = 2,
    Error = 3,
    FatalError = 4,
    /// Text, den die Gegenstelle geschickt hat
    Iax = 5,
}

/// Art einer URL-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlKind {
    Url = 1,
    LoadComplete = 2,
    LinkUrl = 3,
    LinkReject = 4,
    Unlink = 5,
}

/// Antwort des Servers auf eine Registrierung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationReply {
    Ack,
    Reject,
    Timeout,
}

/// Herkunft eines gemeldeten Audio-Puffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSource {
    Local,
    Remote,
}

/// Netzwerkstatistik einer Richtung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetStat {
    pub jitter: i32,
    pub loss_pct: i32,
    pub loss_count: i32,
    pub packets: i32,
    pub delay: i32,
    pub dropped: i32,
    pub out_of_order: i32,
}

/// Momentaufnahme eines Anrufs fuer Zustandsereignisse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub call: CallId,
    pub state: CallState,
    pub format: Format,
    pub video_format: Format,
    pub remote: String,
    pub remote_name: String,
    pub local: String,
    pub local_context: String,
}

/// Alle Ereignisse, die die Engine an die Anwendung meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IaxcEvent {
    Text {
        kind: TextKind,
        call: Option<CallId>,
        message: String,
    },
    Levels {
        input_db: f32,
        output_db: f32,
    },
    CallState(CallSnapshot),
    NetStats {
        call: CallId,
        rtt: i32,
        local: NetStat,
        remote: NetStat,
    },
    Url {
        call: CallId,
        kind: UrlKind,
        url: String,
    },
    Video {
        call: CallId,
        format: Format,
        data: Vec<u8>,
    },
    Audio {
        call: CallId,
        source: AudioSource,
        encoded: bool,
        format: Format,
        data: Vec<u8>,
    },
    Registration {
        id: RegistrationId,
        reply: RegistrationReply,
        msg_count: i32,
    },
    Dtmf {
        call: CallId,
        digit: char,
    },
}

impl IaxcEvent {
    /// Kurzform fuer eine Textmeldung ohne Anrufbezug
    pub fn text(kind: TextKind, message: impl Into<String>) -> Self {
        Self::Text {
            kind,
            call: None,
            message: message.into(),
        }
    }

    /// Stille-Pegel fuer beide Richtungen
    pub fn stille_pegel() -> Self {
        Self::Levels {
            input_db: SILENCE_DB,
            output_db: SILENCE_DB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Direction, Lifecycle};

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = IaxcEvent::CallState(CallSnapshot {
            call: CallId(1),
            state: CallState {
                lifecycle: Lifecycle::Ringing,
                direction: Direction::Incoming,
                is_selected: false,
                in_transfer: false,
            },
            format: Format::ULAW,
            video_format: Format::NONE,
            remote: "100".into(),
            remote_name: "Alice".into(),
            local: "200".into(),
            local_context: "default".into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let zurueck: IaxcEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, event);
    }

    #[test]
    fn stille_pegel_nutzt_untergrenze() {
        match IaxcEvent::stille_pegel() {
            IaxcEvent::Levels {
                input_db,
                output_db,
            } => {
                assert_eq!(input_db, SILENCE_DB);
                assert_eq!(output_db, SILENCE_DB);
            }
            other => panic!("Unerwartetes Ereignis: {other:?}"),
        }
    }
}
