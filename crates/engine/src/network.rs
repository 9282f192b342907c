//! Verarbeitung eingehender Protokoll-Ereignisse
//!
//! Jedes Ereignis wird ueber seine Sitzung einem Anruf oder einer
//! Registrierung zugeordnet. Ereignisse fuer unbekannte Sitzungen werden
//! gemeldet und verworfen, nur ein Connect erzeugt einen neuen Anruf.

use std::time::Instant;

use iaxc_core::event::RegistrationReply;
use iaxc_core::{CallId, Direction, Format, IaxcError, IaxcEvent, Lifecycle, TextKind};
use iaxc_protocol::{ConnectInfo, EventKind, SessionId};
use tracing::{debug, info, trace, warn};

use crate::engine::EngineInner;
use crate::negotiate::{audio_aushandeln, video_aushandeln};

impl EngineInner {
    /// Holt alle wartenden Ereignisse vom Transport und verarbeitet sie
    pub(crate) fn service_network(&mut self, now: Instant) {
        while let Some(event) = self.transport.next_event() {
            trace!(session = %event.session, typ = event.kind.typ_nummer(), "Protokoll-Ereignis");
            match self.calls.find_by_session(event.session) {
                Some(id) => self.anruf_ereignis(id, event.kind, now),
                None => self.fremdes_ereignis(event.session, event.kind, now),
            }
        }
    }

    fn anruf_ereignis(&mut self, id: CallId, kind: EventKind, now: Instant) {
        if let Some(call) = self.calls.get_mut(id) {
            call.aktivitaet(now);
        }
        let nr = id.0;

        match kind {
            EventKind::Hangup => {
                self.text(TextKind::Status, Some(id), "Call disconnected by remote");
                self.clear_call(id);
            }
            EventKind::Reject => {
                self.text(TextKind::Status, Some(id), "Call rejected by remote");
                self.clear_call(id);
            }
            EventKind::Accept { format } => {
                if let Some(call) = self.calls.get_mut(id) {
                    call.format = format.audio();
                    call.video_format = format.video();
                }
                if format.video().is_empty() {
                    self.text(TextKind::Notice, Some(id), "Failed video codec negotiation.");
                }
                self.text(TextKind::Status, Some(id), format!("Call {nr} accepted"));
            }
            EventKind::Answer => {
                self.zustand_setzen(id, Lifecycle::Complete);
                self.text(TextKind::Status, Some(id), format!("Call {nr} answered"));
            }
            EventKind::Busy => {
                self.zustand_setzen(id, Lifecycle::Busy);
                self.text(TextKind::Status, Some(id), format!("Call {nr} busy"));
            }
            EventKind::Voice { data, .. } => {
                self.audio_empfangen(id, &data, now);
                // Fruehe Medien beenden das Klingeln, beantworten aber nicht
                let state = self.calls.get(id).map(|c| c.state).unwrap_or_default();
                if state.is_outgoing() && state.is_ringing() {
                    self.zustand_setzen(id, Lifecycle::Active);
                    self.text(TextKind::Status, Some(id), format!("Call {nr} progress"));
                }
            }
            EventKind::Video { format, data } => {
                self.video_empfangen(id, format, &data);
            }
            EventKind::Text(text) => {
                self.text(TextKind::Iax, Some(id), text);
            }
            EventKind::Ringing => {
                let state = self.calls.get(id).map(|c| c.state).unwrap_or_default();
                if state.is_complete() {
                    debug!(call = %id, "Verspaetetes Klingeln nach Antwort ignoriert");
                    return;
                }
                self.zustand_setzen(id, Lifecycle::Ringing);
                self.text(TextKind::Status, Some(id), format!("Call {nr} ringing"));
            }
            EventKind::Pong => {
                let report = self
                    .calls
                    .get(id)
                    .and_then(|c| c.session)
                    .and_then(|s| self.transport.netstats(s))
                    .unwrap_or_default();
                self.events.senden(IaxcEvent::NetStats {
                    call: id,
                    rtt: report.rtt,
                    local: report.local,
                    remote: report.remote,
                });
            }
            EventKind::Url { kind, url } => {
                self.events.senden(IaxcEvent::Url {
                    call: id,
                    kind,
                    url,
                });
            }
            EventKind::Cng => {}
            EventKind::Timeout => {
                if let Some(session) = self.calls.get(id).and_then(|c| c.session) {
                    if let Err(e) = self.transport.hangup(session, "Call timed out") {
                        debug!(call = %id, fehler = %e, "Auflegen nach Timeout fehlgeschlagen");
                    }
                }
                self.text(TextKind::Status, Some(id), format!("Call {nr} timed out."));
                self.clear_call(id);
            }
            EventKind::Transfer => {
                if let Some(call) = self.calls.get_mut(id) {
                    call.state.in_transfer = true;
                }
                self.state_event(id);
            }
            EventKind::TransferReleased => {
                if let Some(call) = self.calls.get_mut(id) {
                    call.state.in_transfer = false;
                }
                self.state_event(id);
                self.text(
                    TextKind::Status,
                    Some(id),
                    format!("Call {nr} transfer released"),
                );
            }
            EventKind::Dtmf(digit) => {
                self.events.senden(IaxcEvent::Dtmf { call: id, digit });
                self.text(
                    TextKind::Status,
                    Some(id),
                    format!("DTMF digit {digit} received"),
                );
            }
            other => {
                self.text(
                    TextKind::Status,
                    Some(id),
                    format!("Unknown event: {} for call {nr}", other.typ_nummer()),
                );
            }
        }
    }

    fn zustand_setzen(&mut self, id: CallId, lifecycle: Lifecycle) {
        if let Some(call) = self.calls.get_mut(id) {
            call.state.lifecycle = lifecycle;
        }
        self.state_event(id);
    }

    /// Ereignis einer Sitzung, die keinem Anruf gehoert
    fn fremdes_ereignis(&mut self, session: SessionId, kind: EventKind, now: Instant) {
        if let Some(reg) = self.registrations.find_by_session(session) {
            let antwort = match kind {
                EventKind::RegAck { msg_count } => Some((RegistrationReply::Ack, msg_count)),
                EventKind::RegReject => Some((RegistrationReply::Reject, 0)),
                EventKind::Timeout => Some((RegistrationReply::Timeout, 0)),
                _ => None,
            };
            let Some((reply, msg_count)) = antwort else {
                debug!(id = %reg.id, typ = kind.typ_nummer(), "Ereignis der Registrierungs-Sitzung ignoriert");
                return;
            };
            let id = reg.id;
            reg.session = None;
            self.transport.destroy_session(session);
            info!(%id, ?reply, msg_count, "Antwort auf Registrierung");
            self.events.senden(IaxcEvent::Registration {
                id,
                reply,
                msg_count,
            });
            if reply == RegistrationReply::Reject {
                self.registrations.entfernen(id);
            }
            return;
        }

        match kind {
            EventKind::RegAck { .. } | EventKind::RegReject => {
                self.text(TextKind::Error, None, "Unexpected registration reply");
            }
            EventKind::RegRequest => {
                self.text(
                    TextKind::Error,
                    None,
                    "Registration request for a non-existent session",
                );
            }
            EventKind::Connect(info) => self.eingehender_anruf(session, info, now),
            EventKind::Timeout => {
                self.text(
                    TextKind::Status,
                    None,
                    "Timeout for a non-existant session. Dropping",
                );
            }
            other => {
                self.text(
                    TextKind::Status,
                    None,
                    format!(
                        "Event (type {}) for a non-existant session. Dropping",
                        other.typ_nummer()
                    ),
                );
            }
        }
    }

    fn eingehender_anruf(&mut self, session: SessionId, info: ConnectInfo, now: Instant) {
        let Some(id) = self.calls.first_free() else {
            self.text(
                TextKind::Status,
                None,
                "Incoming call, but no free call appearances",
            );
            let format = self.audio_politik.bevorzugt & info.capability;
            if let Err(e) = self
                .transport
                .accept(session, format)
                .and_then(|()| self.transport.busy(session))
            {
                warn!(%session, fehler = %e, "Besetzt-Signal fehlgeschlagen");
            }
            return;
        };

        let Some(format) = audio_aushandeln(self.audio_politik, info.format, info.capability)
        else {
            let fehler = IaxcError::KeinGemeinsamerCodec;
            self.fehler_melden(None, &fehler);
            if let Err(e) = self.transport.reject(session, &fehler.to_string()) {
                warn!(%session, fehler = %e, "Ablehnen fehlgeschlagen");
            }
            return;
        };

        let mut video_format = Format::NONE;
        if !(info.format | info.capability).video().is_empty() {
            match video_aushandeln(self.video_politik, info.format, info.capability) {
                Some(v) => video_format = v,
                None => {
                    self.text(
                        TextKind::Notice,
                        None,
                        "could not negotiate common video codec",
                    );
                    self.text(TextKind::Notice, None, "switching to audio-only call");
                }
            }
        }

        let Some(call) = self.calls.get_mut(id) else {
            return;
        };
        call.codecs_freigeben();
        call.format = format;
        call.video_format = video_format;
        call.local = info.called_number.unwrap_or_else(|| "unknown".into());
        call.local_context = info.called_context.unwrap_or_default();
        call.remote = info.calling_number.unwrap_or_else(|| "unknown".into());
        call.remote_name = info.calling_name.unwrap_or_else(|| "unknown".into());
        call.session = Some(session);
        call.tx_silent = false;
        call.state.lifecycle = Lifecycle::Ringing;
        call.state.direction = Direction::Incoming;
        call.state.in_transfer = false;
        call.aktivitaet(now);
        call.last_ping = now;
        let remote = call.remote.clone();

        self.text(TextKind::Status, Some(id), format!("Call from ({remote})"));
        info!(call = %id, %format, video = %video_format, "Eingehender Anruf");

        if let Err(e) = self
            .transport
            .accept(session, format | video_format)
            .and_then(|()| self.transport.ring_announce(session))
        {
            let fehler = IaxcError::from(e);
            self.fehler_melden(Some(id), &fehler);
        }
        self.state_event(id);
        self.text(
            TextKind::Status,
            Some(id),
            format!("Incoming call on line {}", id.0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::Engine;
    use iaxc_audio::MemoryDriver;
    use iaxc_protocol::{Command, MemoryTransport};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn ereignis_ohne_anruf_wird_verworfen() {
        let (transport, handle) = MemoryTransport::neu();
        let (driver, _) = MemoryDriver::neu(8000);
        let engine =
            Engine::neu(&EngineConfig::default(), Box::new(transport), Box::new(driver)).unwrap();
        let empfangen = Arc::new(Mutex::new(Vec::new()));
        let ziel = Arc::clone(&empfangen);
        engine.set_event_callback(move |e| ziel.lock().push(e));

        handle.event_einspeisen(SessionId(42), EventKind::Answer);
        handle.event_einspeisen(SessionId(42), EventKind::Timeout);
        engine.process_calls();
        engine.flush_events();

        let texte: Vec<String> = empfangen
            .lock()
            .iter()
            .filter_map(|e| match e {
                IaxcEvent::Text { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert!(texte.contains(&"Event (type 13) for a non-existant session. Dropping".into()));
        assert!(texte.contains(&"Timeout for a non-existant session. Dropping".into()));
        assert!(handle.befehle().is_empty());
    }

    #[test]
    fn volle_tabelle_signalisiert_besetzt() {
        let mut config = EngineConfig::default();
        config.anrufe.max_anrufe = 1;
        let (transport, handle) = MemoryTransport::neu();
        let (driver, _) = MemoryDriver::neu(8000);
        let engine = Engine::neu(&config, Box::new(transport), Box::new(driver)).unwrap();
        engine.dial("100").unwrap();
        handle.befehle_abholen();

        let info = ConnectInfo {
            format: Format::ULAW,
            capability: Format::ULAW | Format::GSM,
            ..ConnectInfo::default()
        };
        let session = handle.anruf_einspeisen(info);
        engine.process_calls();

        assert_eq!(
            handle.befehle(),
            vec![
                Command::Accept {
                    session,
                    format: Format::ULAW
                },
                Command::Busy(session),
            ]
        );
        assert_eq!(engine.first_free_call(), None);
    }
}
