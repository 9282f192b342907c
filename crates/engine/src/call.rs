//! Anruf-Slots und Anruftabelle
//!
//! Die Tabelle wird einmal mit fester Groesse angelegt; Slots werden nie
//! verschoben, nur zwischen `Free` und den aktiven Zustaenden umgeschaltet.
//! Jeder Slot besitzt hoechstens einen Encoder und einen Decoder. Ein
//! Formatwechsel ersetzt den alten Codec, beim Leeren werden beide verworfen.

use std::time::Instant;

use iaxc_audio::{AudioError, AudioResult, Codec, CodecRegistry};
use iaxc_core::{CallId, CallSnapshot, CallState, Format};
use iaxc_protocol::{FrameAssembler, SessionId};
use tracing::debug;

/// Ein Anruf-Slot
pub struct Call {
    pub(crate) id: CallId,
    pub(crate) state: CallState,
    pub(crate) format: Format,
    pub(crate) video_format: Format,
    pub(crate) remote: String,
    pub(crate) remote_name: String,
    pub(crate) local: String,
    pub(crate) local_context: String,
    pub(crate) callerid_name: String,
    pub(crate) callerid_number: String,
    pub(crate) session: Option<SessionId>,
    encoder: Option<Box<dyn Codec>>,
    decoder: Option<Box<dyn Codec>>,
    pub(crate) last_activity: Instant,
    pub(crate) last_ping: Instant,
    /// Zuletzt gesendeter Rahmen war Stille
    pub(crate) tx_silent: bool,
    pub(crate) video_empfang: Option<FrameAssembler>,
}

impl Call {
    fn new(id: CallId, now: Instant) -> Self {
        Self {
            id,
            state: CallState::frei(),
            format: Format::NONE,
            video_format: Format::NONE,
            remote: String::new(),
            remote_name: String::new(),
            local: String::new(),
            local_context: String::new(),
            callerid_name: String::new(),
            callerid_number: String::new(),
            session: None,
            encoder: None,
            decoder: None,
            last_activity: now,
            last_ping: now,
            tx_silent: false,
            video_empfang: None,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call: self.id,
            state: self.state,
            format: self.format,
            video_format: self.video_format,
            remote: self.remote.clone(),
            remote_name: self.remote_name.clone(),
            local: self.local.clone(),
            local_context: self.local_context.clone(),
        }
    }

    pub(crate) fn aktivitaet(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub(crate) fn codecs_freigeben(&mut self) {
        let encoder = self.encoder.take();
        let decoder = self.decoder.take();
        if encoder.is_some() || decoder.is_some() {
            debug!(call = %self.id, "Codecs freigegeben");
        }
        self.video_empfang = None;
    }

    pub fn hat_codecs(&self) -> bool {
        self.encoder.is_some() || self.decoder.is_some()
    }

    /// Setzt den Slot auf `Free` zurueck; die Auswahl bleibt bestehen
    pub(crate) fn leeren(&mut self) {
        let selected = self.state.is_selected;
        self.state = CallState {
            is_selected: selected,
            ..CallState::frei()
        };
        self.format = Format::NONE;
        self.video_format = Format::NONE;
        self.session = None;
        self.tx_silent = false;
        self.codecs_freigeben();
    }

    /// Encoder fuer `format`, ein vorhandener anderer Encoder wird ersetzt
    pub(crate) fn encoder_fuer(
        &mut self,
        format: Format,
        codecs: &CodecRegistry,
    ) -> AudioResult<&mut Box<dyn Codec>> {
        if self.encoder.as_ref().map(|c| c.format()) != Some(format) {
            debug!(call = %self.id, %format, "Encoder angelegt");
            self.encoder = Some(codecs.erzeugen(format)?);
        }
        self.encoder
            .as_mut()
            .ok_or(AudioError::CodecNichtVerfuegbar(format))
    }

    pub(crate) fn decoder_fuer(
        &mut self,
        format: Format,
        codecs: &CodecRegistry,
    ) -> AudioResult<&mut Box<dyn Codec>> {
        if self.decoder.as_ref().map(|c| c.format()) != Some(format) {
            debug!(call = %self.id, %format, "Decoder angelegt");
            self.decoder = Some(codecs.erzeugen(format)?);
        }
        self.decoder
            .as_mut()
            .ok_or(AudioError::CodecNichtVerfuegbar(format))
    }
}

/// Feste Tabelle aller Anruf-Slots
pub struct CallTable {
    calls: Vec<Call>,
    selected: Option<CallId>,
}

impl CallTable {
    pub fn new(anzahl: usize, now: Instant) -> Self {
        Self {
            calls: (0..anzahl.max(1)).map(|i| Call::new(CallId(i), now)).collect(),
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, id: CallId) -> Option<&Call> {
        self.calls.get(id.index())
    }

    pub fn get_mut(&mut self, id: CallId) -> Option<&mut Call> {
        self.calls.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Call> {
        self.calls.iter_mut()
    }

    pub fn first_free(&self) -> Option<CallId> {
        self.calls
            .iter()
            .find(|c| c.state.is_free())
            .map(|c| c.id)
    }

    pub fn find_by_session(&self, session: SessionId) -> Option<CallId> {
        self.calls
            .iter()
            .find(|c| c.session == Some(session))
            .map(|c| c.id)
    }

    pub fn selected(&self) -> Option<CallId> {
        self.selected
    }

    /// Setzt die Auswahl und haelt die `is_selected`-Markierung synchron.
    /// Gibt die vorher ausgewaehlte Leitung zurueck.
    pub(crate) fn auswahl_setzen(&mut self, neu: Option<CallId>) -> Option<CallId> {
        let alt = self.selected;
        if let Some(call) = alt.and_then(|id| self.calls.get_mut(id.index())) {
            call.state.is_selected = false;
        }
        if let Some(call) = neu.and_then(|id| self.calls.get_mut(id.index())) {
            call.state.is_selected = true;
        }
        self.selected = neu.filter(|id| id.index() < self.calls.len());
        alt
    }
}
