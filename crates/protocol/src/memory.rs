//! In-Memory-Transport
//!
//! Zeichnet jeden gesendeten Befehl auf und liefert Ereignisse aus, die ueber
//! den [`MemoryTransportHandle`] eingespeist werden. Transport und Handle
//! teilen sich den Zustand; der Handle bleibt beim Test, waehrend der
//! Transport in die Engine wandert.

use iaxc_core::Format;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::{
    CallSetup, ConnectInfo, EventKind, NetStatsReport, ProtocolEvent, RegistrationRequest,
    SessionId, Transport,
};

/// Ein aufgezeichneter Protokollbefehl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewSession(SessionId),
    DestroySession(SessionId),
    Call { session: SessionId, setup: CallSetup },
    Accept { session: SessionId, format: Format },
    Answer(SessionId),
    Reject { session: SessionId, reason: String },
    Busy(SessionId),
    RingAnnounce(SessionId),
    Hangup { session: SessionId, reason: String },
    Transfer { session: SessionId, destination: String },
    SetupTransfer { from: SessionId, to: SessionId },
    Quelch { session: SessionId, music_on_hold: bool },
    Unquelch(SessionId),
    Voice { session: SessionId, format: Format, data: Vec<u8>, samples: usize },
    Cng { session: SessionId, level: u8 },
    Video { session: SessionId, format: Format, data: Vec<u8> },
    Dtmf { session: SessionId, digit: char },
    Text { session: SessionId, text: String },
    Url { session: SessionId, url: String, link: bool },
    Register { session: SessionId, request: RegistrationRequest },
}

#[derive(Default)]
struct MemoryState {
    next_session: u64,
    sessions: HashSet<SessionId>,
    commands: Vec<Command>,
    pending: VecDeque<ProtocolEvent>,
    refuse_sessions: bool,
    netstats: HashMap<SessionId, NetStatsReport>,
}

impl MemoryState {
    fn pruefen(&self, session: SessionId) -> ProtocolResult<()> {
        if self.sessions.contains(&session) {
            Ok(())
        } else {
            Err(ProtocolError::UnbekannteSitzung(session))
        }
    }
}

/// Transport-Seite (geht an die Engine)
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

/// Test-Seite: Ereignisse einspeisen, Befehle pruefen
#[derive(Clone)]
pub struct MemoryTransportHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Erstellt Transport und zugehoerigen Handle
    pub fn neu() -> (Self, MemoryTransportHandle) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MemoryTransportHandle { state },
        )
    }

    fn aufzeichnen(&self, session: SessionId, command: Command) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        state.pruefen(session)?;
        trace!(?command, "Befehl aufgezeichnet");
        state.commands.push(command);
        Ok(())
    }
}

impl MemoryTransportHandle {
    /// Reiht ein eingehendes Ereignis ein
    pub fn event_einspeisen(&self, session: SessionId, kind: EventKind) {
        self.state
            .lock()
            .pending
            .push_back(ProtocolEvent::new(session, kind));
    }

    /// Simuliert einen eingehenden Anruf: legt die Sitzung der Gegenstelle
    /// an und reiht das Connect-Ereignis ein
    pub fn anruf_einspeisen(&self, info: ConnectInfo) -> SessionId {
        let mut state = self.state.lock();
        let session = SessionId(state.next_session);
        state.next_session += 1;
        state.sessions.insert(session);
        state
            .pending
            .push_back(ProtocolEvent::new(session, EventKind::Connect(info)));
        session
    }

    /// Alle bisher gesendeten Befehle
    pub fn befehle(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Gibt die aufgezeichneten Befehle zurueck und leert die Liste
    pub fn befehle_abholen(&self) -> Vec<Command> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Laesst `new_session` fehlschlagen solange `true`
    pub fn sitzungen_verweigern(&self, verweigern: bool) {
        self.state.lock().refuse_sessions = verweigern;
    }

    pub fn aktive_sitzungen(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Entfernt eine Sitzung ohne Befehl, weitere Befehle darauf schlagen fehl
    pub fn sitzung_verlieren(&self, session: SessionId) {
        self.state.lock().sessions.remove(&session);
    }

    pub fn sitzung_aktiv(&self, session: SessionId) -> bool {
        self.state.lock().sessions.contains(&session)
    }

    /// Zuletzt angelegte Sitzung
    pub fn letzte_sitzung(&self) -> Option<SessionId> {
        let state = self.state.lock();
        state.next_session.checked_sub(1).map(SessionId)
    }

    pub fn netstats_setzen(&self, session: SessionId, report: NetStatsReport) {
        self.state.lock().netstats.insert(session, report);
    }
}

impl Transport for MemoryTransport {
    fn new_session(&mut self) -> ProtocolResult<SessionId> {
        let mut state = self.state.lock();
        if state.refuse_sessions {
            return Err(ProtocolError::SitzungVerweigert);
        }
        let session = SessionId(state.next_session);
        state.next_session += 1;
        state.sessions.insert(session);
        state.commands.push(Command::NewSession(session));
        Ok(session)
    }

    fn destroy_session(&mut self, session: SessionId) {
        let mut state = self.state.lock();
        if state.sessions.remove(&session) {
            state.commands.push(Command::DestroySession(session));
        }
    }

    fn call(&mut self, session: SessionId, setup: &CallSetup) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Call {
                session,
                setup: setup.clone(),
            },
        )
    }

    fn accept(&mut self, session: SessionId, format: Format) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Accept { session, format })
    }

    fn answer(&mut self, session: SessionId) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Answer(session))
    }

    fn reject(&mut self, session: SessionId, reason: &str) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Reject {
                session,
                reason: reason.to_string(),
            },
        )
    }

    fn busy(&mut self, session: SessionId) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Busy(session))
    }

    fn ring_announce(&mut self, session: SessionId) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::RingAnnounce(session))
    }

    fn hangup(&mut self, session: SessionId, reason: &str) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Hangup {
                session,
                reason: reason.to_string(),
            },
        )
    }

    fn transfer(&mut self, session: SessionId, destination: &str) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Transfer {
                session,
                destination: destination.to_string(),
            },
        )
    }

    fn setup_transfer(&mut self, from: SessionId, to: SessionId) -> ProtocolResult<()> {
        self.state.lock().pruefen(to)?;
        self.aufzeichnen(from, Command::SetupTransfer { from, to })
    }

    fn quelch(&mut self, session: SessionId, music_on_hold: bool) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Quelch {
                session,
                music_on_hold,
            },
        )
    }

    fn unquelch(&mut self, session: SessionId) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Unquelch(session))
    }

    fn send_voice(
        &mut self,
        session: SessionId,
        format: Format,
        data: &[u8],
        samples: usize,
    ) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Voice {
                session,
                format,
                data: data.to_vec(),
                samples,
            },
        )
    }

    fn send_cng(&mut self, session: SessionId, level: u8) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Cng { session, level })
    }

    fn send_video(
        &mut self,
        session: SessionId,
        format: Format,
        data: &[u8],
    ) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Video {
                session,
                format,
                data: data.to_vec(),
            },
        )
    }

    fn send_dtmf(&mut self, session: SessionId, digit: char) -> ProtocolResult<()> {
        self.aufzeichnen(session, Command::Dtmf { session, digit })
    }

    fn send_text(&mut self, session: SessionId, text: &str) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Text {
                session,
                text: text.to_string(),
            },
        )
    }

    fn send_url(&mut self, session: SessionId, url: &str, link: bool) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Url {
                session,
                url: url.to_string(),
                link,
            },
        )
    }

    fn register(
        &mut self,
        session: SessionId,
        request: &RegistrationRequest,
    ) -> ProtocolResult<()> {
        self.aufzeichnen(
            session,
            Command::Register {
                session,
                request: request.clone(),
            },
        )
    }

    fn netstats(&self, session: SessionId) -> Option<NetStatsReport> {
        self.state.lock().netstats.get(&session).copied()
    }

    fn next_event(&mut self) -> Option<ProtocolEvent> {
        self.state.lock().pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn befehle_werden_aufgezeichnet() {
        let (mut transport, handle) = MemoryTransport::neu();
        let s = transport.new_session().unwrap();
        transport.send_dtmf(s, '5').unwrap();
        transport.hangup(s, "Dumped Call").unwrap();
        transport.destroy_session(s);

        assert_eq!(
            handle.befehle(),
            vec![
                Command::NewSession(s),
                Command::Dtmf {
                    session: s,
                    digit: '5'
                },
                Command::Hangup {
                    session: s,
                    reason: "Dumped Call".into()
                },
                Command::DestroySession(s),
            ]
        );
        assert_eq!(handle.aktive_sitzungen(), 0);
    }

    #[test]
    fn unbekannte_sitzung_wird_abgelehnt() {
        let (mut transport, _handle) = MemoryTransport::neu();
        let err = transport.answer(SessionId(99)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnbekannteSitzung(SessionId(99))));
    }

    #[test]
    fn verweigerte_sitzungen() {
        let (mut transport, handle) = MemoryTransport::neu();
        handle.sitzungen_verweigern(true);
        assert!(matches!(
            transport.new_session(),
            Err(ProtocolError::SitzungVerweigert)
        ));
        assert!(handle.befehle().is_empty());
    }

    #[test]
    fn eingehender_anruf_hat_gueltige_sitzung() {
        let (mut transport, handle) = MemoryTransport::neu();
        let s = handle.anruf_einspeisen(ConnectInfo::default());
        assert!(handle.sitzung_aktiv(s));
        let ev = transport.next_event().unwrap();
        assert_eq!(ev.session, s);
        assert!(matches!(ev.kind, EventKind::Connect(_)));
        transport.accept(s, Format::ULAW).unwrap();
    }

    #[test]
    fn ereignisse_in_reihenfolge() {
        let (mut transport, handle) = MemoryTransport::neu();
        handle.event_einspeisen(SessionId(1), EventKind::Ringing);
        handle.event_einspeisen(SessionId(1), EventKind::Answer);
        assert_eq!(transport.next_event().unwrap().kind, EventKind::Ringing);
        assert_eq!(transport.next_event().unwrap().kind, EventKind::Answer);
        assert!(transport.next_event().is_none());
    }
}
