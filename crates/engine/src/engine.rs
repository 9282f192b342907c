//! Anruf-Engine
//!
//! [`Engine`] besitzt Anruftabelle, Registrierungen, Formatpolitik,
//! Transport und Audio-Treiber hinter einer einzigen Sperre. Jede
//! Bedienoperation nimmt die Sperre fuer ihre ganze Dauer. Ereignisse
//! werden unter der Sperre nur eingereiht und vom Dispatcher-Thread
//! ausserhalb zugestellt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use iaxc_audio::{AudioDevice, AudioDriver, AudioPipeline, CodecRegistry, DeviceSelection, Sound};
use iaxc_core::{
    AudioPrefs, CallId, CallSnapshot, Direction, Filters, Format, IaxcError, IaxcEvent, Lifecycle,
    RegistrationId, Result, TextKind, SILENCE_DB,
};
use iaxc_protocol::{CallSetup, NetStatsReport, SessionId, Transport};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::audio_service::{AudioZustand, ERLAUBTE_PREFS};
use crate::call::CallTable;
use crate::config::{formate_aufloesen, EngineConfig};
use crate::events::{EventDispatcher, EventSender};
use crate::negotiate::FormatPolitik;
use crate::registration::Registrations;
use crate::service::ServiceThread;
use crate::video::VideoZustand;

/// Abstand zwischen zwei Pruefungen der Registrierungs-Leases
const REGISTRIERUNG_PRUEFINTERVALL: Duration = Duration::from_secs(1);

/// Gesamter veraenderlicher Zustand, geschuetzt durch die Engine-Sperre
pub(crate) struct EngineInner {
    pub(crate) calls: CallTable,
    pub(crate) registrations: Registrations,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) driver: Box<dyn AudioDriver>,
    pub(crate) codecs: CodecRegistry,
    pub(crate) audio_politik: FormatPolitik,
    pub(crate) video_politik: FormatPolitik,
    pub(crate) callerid_name: String,
    pub(crate) callerid_number: String,
    pub(crate) audio: AudioZustand,
    pub(crate) video: VideoZustand,
    pub(crate) events: EventSender,
    /// `None` = kein Inaktivitaets-Zeitlimit
    pub(crate) call_timeout: Option<Duration>,
    pub(crate) registrierung_refresh: u32,
    letzte_registrierungspruefung: Instant,
}

impl EngineInner {
    // -----------------------------------------------------------------------
    // Ereignis-Hilfen
    // -----------------------------------------------------------------------

    /// Textmeldung an die Anwendung, gespiegelt ins Log
    pub(crate) fn text(&self, kind: TextKind, call: Option<CallId>, message: impl Into<String>) {
        let message = message.into();
        match kind {
            TextKind::Status | TextKind::Notice => info!(?call, "{message}"),
            TextKind::Error => warn!(?call, "{message}"),
            TextKind::FatalError => error!(?call, "{message}"),
            TextKind::Iax => debug!(?call, "Text der Gegenstelle: {message}"),
        }
        self.events.senden(IaxcEvent::Text {
            kind,
            call,
            message,
        });
    }

    /// Meldet einen Fehler mit der zu ihm passenden Textart
    pub(crate) fn fehler_melden(&self, call: Option<CallId>, fehler: &IaxcError) {
        self.text(fehler.text_art(), call, fehler.to_string());
    }

    pub(crate) fn state_event(&self, id: CallId) {
        if let Some(call) = self.calls.get(id) {
            debug!(call = %id, bits = call.state.bits(), "Anrufzustand");
            self.events.senden(IaxcEvent::CallState(call.snapshot()));
        }
    }

    /// Gibt den Slot frei, verwirft seine Sitzung und meldet den Zustand
    pub(crate) fn clear_call(&mut self, id: CallId) {
        let Some(call) = self.calls.get_mut(id) else {
            return;
        };
        if let Some(session) = call.session {
            self.transport.destroy_session(session);
        }
        call.leeren();
        self.state_event(id);
    }

    // -----------------------------------------------------------------------
    // Pruefungen
    // -----------------------------------------------------------------------

    fn pruefen(&self, id: CallId) -> Result<()> {
        if id.index() < self.calls.len() {
            Ok(())
        } else {
            Err(IaxcError::UngueltigerAnruf(id))
        }
    }

    /// Sitzung eines belegten Slots
    fn sitzung(&self, id: CallId) -> Result<SessionId> {
        self.pruefen(id)?;
        self.calls
            .get(id)
            .filter(|c| c.state.is_active())
            .and_then(|c| c.session)
            .ok_or(IaxcError::UngueltigerZustand {
                call: id,
                erwartet: "aktiv",
            })
    }

    /// Ausgewaehlter Anruf, sofern er aktiv ist
    fn aktiver_ausgewaehlter(&self) -> Option<(CallId, SessionId)> {
        let id = self.calls.selected()?;
        self.sitzung(id).ok().map(|s| (id, s))
    }

    // -----------------------------------------------------------------------
    // Anrufsteuerung
    // -----------------------------------------------------------------------

    pub(crate) fn dial(
        &mut self,
        number: &str,
        callerid_name: Option<&str>,
        callerid_number: Option<&str>,
        video: bool,
        now: Instant,
    ) -> Result<CallId> {
        let slot = match self.calls.selected() {
            Some(sel) if self.calls.get(sel).is_some_and(|c| c.state.is_free()) => Some(sel),
            _ => self.calls.first_free(),
        };
        let Some(id) = slot else {
            let fehler = IaxcError::KeineFreieLeitung;
            self.fehler_melden(None, &fehler);
            return Err(fehler);
        };

        let session = match self.transport.new_session() {
            Ok(session) => session,
            Err(e) => {
                self.text(TextKind::Error, None, "Can't make new session");
                return Err(e.into());
            }
        };

        let (video_bevorzugt, video_erlaubt) = if video {
            (self.video_politik.bevorzugt, self.video_politik.erlaubt)
        } else {
            (Format::NONE, Format::NONE)
        };
        let setup = {
            let Some(call) = self.calls.get_mut(id) else {
                self.transport.destroy_session(session);
                return Err(IaxcError::UngueltigerAnruf(id));
            };
            call.codecs_freigeben();
            call.session = Some(session);
            match number.split_once('/') {
                Some((_, ext)) => call.remote = ext.to_string(),
                None => call.remote.clear(),
            }
            call.remote_name = number.to_string();
            call.callerid_name = callerid_name.unwrap_or(&self.callerid_name).to_string();
            call.callerid_number = callerid_number
                .unwrap_or(&self.callerid_number)
                .to_string();
            call.local = call.callerid_name.clone();
            call.local_context = "default".to_string();
            call.format = Format::NONE;
            call.video_format = Format::NONE;
            call.tx_silent = false;
            call.state.lifecycle = Lifecycle::Active;
            call.state.direction = Direction::Outgoing;
            call.state.in_transfer = false;
            call.aktivitaet(now);
            call.last_ping = now;

            CallSetup {
                cid_number: call.callerid_number.clone(),
                cid_name: call.callerid_name.clone(),
                number: number.to_string(),
                preferred: self.audio_politik.bevorzugt | video_bevorzugt,
                capability: self.audio_politik.erlaubt | video_erlaubt,
            }
        };

        let art = if video_bevorzugt.is_empty() {
            "audio only"
        } else {
            "audio+video"
        };
        self.text(
            TextKind::Notice,
            Some(id),
            format!("Originating an {art} call"),
        );

        if let Err(e) = self.transport.call(session, &setup) {
            let fehler = IaxcError::from(e);
            self.fehler_melden(Some(id), &fehler);
            self.clear_call(id);
            return Err(fehler);
        }
        info!(call = %id, nummer = number, "Anruf gewaehlt");

        self.select(Some(id))?;
        Ok(id)
    }

    /// Waehlt einen Anruf aus. Ein klingelnder eingehender Anruf wird dabei
    /// beantwortet.
    pub(crate) fn select(&mut self, id: Option<CallId>) -> Result<()> {
        let Some(id) = id else {
            self.calls.auswahl_setzen(None);
            return Ok(());
        };
        if self.pruefen(id).is_err() {
            self.text(
                TextKind::Error,
                None,
                format!("Error: tried to select out_of_range call {}", id.0),
            );
            return Err(IaxcError::UngueltigerAnruf(id));
        }

        if self.calls.selected() != Some(id) {
            if let Some(alt) = self.calls.auswahl_setzen(Some(id)) {
                self.state_event(alt);
            }
        }

        let state = self.calls.get(id).map(|c| c.state).unwrap_or_default();
        if !state.is_outgoing() && state.is_ringing() {
            self.answer(id)
        } else {
            self.state_event(id);
            Ok(())
        }
    }

    pub(crate) fn answer(&mut self, id: CallId) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.answer(session)?;
        if let Some(call) = self.calls.get_mut(id) {
            call.state.lifecycle = Lifecycle::Complete;
        }
        self.state_event(id);
        Ok(())
    }

    pub(crate) fn reject(&mut self, id: CallId) -> Result<()> {
        let session = self.sitzung(id)?;
        if let Err(e) = self.transport.reject(session, "Call rejected manually.") {
            warn!(call = %id, fehler = %e, "Ablehnen fehlgeschlagen");
        }
        self.clear_call(id);
        Ok(())
    }

    pub(crate) fn send_busy(&mut self, id: CallId) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.busy(session)?;
        Ok(())
    }

    /// Legt einen belegten Slot auf; freie Slots werden uebersprungen
    pub(crate) fn dump(&mut self, id: CallId) -> Result<()> {
        self.pruefen(id)?;
        let Some(session) = self
            .calls
            .get(id)
            .filter(|c| c.state.is_active())
            .and_then(|c| c.session)
        else {
            return Ok(());
        };
        if let Err(e) = self.transport.hangup(session, "Dumped Call") {
            warn!(call = %id, fehler = %e, "Auflegen fehlgeschlagen");
        }
        self.text(
            TextKind::Status,
            Some(id),
            format!("Hanging up call {}", id.0),
        );
        self.clear_call(id);
        Ok(())
    }

    pub(crate) fn dump_all(&mut self) {
        let belegt: Vec<CallId> = self
            .calls
            .iter()
            .filter(|c| c.state.is_active())
            .map(|c| c.id)
            .collect();
        for id in belegt {
            if let Err(e) = self.dump(id) {
                debug!(call = %id, fehler = %e, "Auflegen fehlgeschlagen");
            }
        }
    }

    pub(crate) fn blind_transfer(&mut self, id: CallId, destination: &str) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.transfer(session, destination)?;
        info!(call = %id, ziel = destination, "Weitervermittlung angefordert");
        Ok(())
    }

    pub(crate) fn setup_transfer(&mut self, from: CallId, to: CallId) -> Result<()> {
        let von = self.sitzung(from)?;
        let nach = self.sitzung(to)?;
        self.transport.setup_transfer(von, nach)?;
        Ok(())
    }

    pub(crate) fn quelch(&mut self, id: CallId, music_on_hold: bool) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.quelch(session, music_on_hold)?;
        Ok(())
    }

    pub(crate) fn unquelch(&mut self, id: CallId) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.unquelch(session)?;
        Ok(())
    }

    pub(crate) fn send_dtmf(&mut self, digit: char) -> Result<()> {
        if let Some((_, session)) = self.aktiver_ausgewaehlter() {
            self.transport.send_dtmf(session, digit)?;
        }
        Ok(())
    }

    pub(crate) fn send_text(&mut self, id: CallId, text: &str) -> Result<()> {
        let session = self.sitzung(id)?;
        self.transport.send_text(session, text)?;
        Ok(())
    }

    pub(crate) fn send_url(&mut self, url: &str, link: bool) -> Result<()> {
        if let Some((_, session)) = self.aktiver_ausgewaehlter() {
            self.transport.send_url(session, url, link)?;
        }
        Ok(())
    }

    pub(crate) fn set_callerid(&mut self, name: &str, number: &str) {
        self.callerid_name = name.to_string();
        self.callerid_number = number.to_string();
        for call in self.calls.iter_mut() {
            call.callerid_name = name.to_string();
            call.callerid_number = number.to_string();
        }
    }

    // -----------------------------------------------------------------------
    // Registrierungen
    // -----------------------------------------------------------------------

    pub(crate) fn register(
        &mut self,
        user: &str,
        pass: &str,
        host: &str,
        refresh: u32,
        now: Instant,
    ) -> Result<RegistrationId> {
        let session = match self.transport.new_session() {
            Ok(session) => session,
            Err(e) => {
                self.text(TextKind::Error, None, "Can't make new registration session");
                return Err(e.into());
            }
        };
        let id = self
            .registrations
            .hinzufuegen(user, pass, host, refresh, session, now);
        let anfrage = self
            .registrations
            .get(id)
            .map(|r| r.anfrage())
            .ok_or(IaxcError::UnbekannteRegistrierung(id))?;
        if let Err(e) = self.transport.register(session, &anfrage) {
            let fehler = IaxcError::from(e);
            self.fehler_melden(None, &fehler);
        }
        info!(%id, user, host, refresh, "Registrierung angelegt");
        Ok(id)
    }

    pub(crate) fn unregister(&mut self, id: RegistrationId) -> usize {
        let (anzahl, sitzungen) = self.registrations.entfernen(id);
        for session in sitzungen {
            self.transport.destroy_session(session);
        }
        if anzahl > 0 {
            info!(%id, "Registrierung entfernt");
        }
        anzahl
    }

    /// Erneuert faellige Leases, hoechstens einmal pro Sekunde
    fn registrierungen_pruefen(&mut self, now: Instant) {
        if now.saturating_duration_since(self.letzte_registrierungspruefung)
            < REGISTRIERUNG_PRUEFINTERVALL
        {
            return;
        }
        self.letzte_registrierungspruefung = now;

        let mut fehler = Vec::new();
        let transport = &mut self.transport;
        for reg in self.registrations.iter_mut() {
            if !reg.faellig(now) {
                continue;
            }
            if let Some(alt) = reg.session.take() {
                transport.destroy_session(alt);
            }
            let session = match transport.new_session() {
                Ok(session) => session,
                Err(_) => {
                    fehler.push(IaxcError::Sitzung(
                        "Can't make new registration session".into(),
                    ));
                    continue;
                }
            };
            reg.session = Some(session);
            reg.letzte = now;
            debug!(id = %reg.id, host = %reg.host, "Registrierung erneuert");
            if let Err(e) = transport.register(session, &reg.anfrage()) {
                fehler.push(e.into());
            }
        }
        for f in &fehler {
            self.fehler_melden(None, f);
        }
    }

    // -----------------------------------------------------------------------
    // Dienst
    // -----------------------------------------------------------------------

    /// Ein Takt des Dienstes: Netzwerk, Zeitlimits, Audio, Registrierungen
    pub(crate) fn process_calls(&mut self, now: Instant) {
        self.service_network(now);
        self.zeitlimits_pruefen(now);
        self.service_audio(now);
        self.registrierungen_pruefen(now);
    }

    /// Legt Anrufe ohne Aktivitaet innerhalb des Zeitlimits auf
    fn zeitlimits_pruefen(&mut self, now: Instant) {
        let Some(limit) = self.call_timeout else {
            return;
        };
        let abgelaufen: Vec<(CallId, Option<SessionId>)> = self
            .calls
            .iter()
            .filter(|c| c.state.is_active())
            .filter(|c| now.saturating_duration_since(c.last_activity) > limit)
            .map(|c| (c.id, c.session))
            .collect();

        for (id, session) in abgelaufen {
            if let Some(session) = session {
                if let Err(e) = self.transport.hangup(session, "Call timed out") {
                    debug!(call = %id, fehler = %e, "Auflegen nach Zeitlimit fehlgeschlagen");
                }
            }
            self.text(
                TextKind::Status,
                Some(id),
                format!("Call {} timed out.", id.0),
            );
            self.clear_call(id);
        }
    }

    fn herunterfahren(&mut self) {
        self.dump_all();
        let ids: Vec<RegistrationId> = self.registrations.iter_mut().map(|r| r.id).collect();
        for id in ids {
            self.unregister(id);
        }
        if let Err(e) = self.driver.stop() {
            warn!(fehler = %e, "Audio-Treiber liess sich nicht stoppen");
        }
    }
}

// ---------------------------------------------------------------------------
// Oeffentliche Schnittstelle
// ---------------------------------------------------------------------------

/// Die Anruf-Engine
///
/// Alle Methoden nehmen `&self` und sind aus beliebigen Threads aufrufbar,
/// auch aus dem Ereignis-Callback heraus.
pub struct Engine {
    inner: Arc<Mutex<EngineInner>>,
    dispatcher: EventDispatcher,
    service: Mutex<Option<ServiceThread>>,
}

impl Engine {
    /// Erstellt eine Engine mit den eingebauten Codecs
    pub fn neu(
        config: &EngineConfig,
        transport: Box<dyn Transport>,
        driver: Box<dyn AudioDriver>,
    ) -> Result<Self> {
        Self::mit_codecs(config, transport, driver, CodecRegistry::standard())
    }

    /// Erstellt eine Engine mit eigener Codec-Registry
    pub fn mit_codecs(
        config: &EngineConfig,
        transport: Box<dyn Transport>,
        driver: Box<dyn AudioDriver>,
        codecs: CodecRegistry,
    ) -> Result<Self> {
        let erlaubt = if config.formate.erlaubt.is_empty() {
            codecs.formate()
        } else {
            formate_aufloesen(&config.formate.erlaubt)?
        };
        let audio_politik = FormatPolitik {
            bevorzugt: formate_aufloesen(&config.formate.bevorzugt)?.audio(),
            erlaubt: erlaubt.audio(),
        };
        let video_politik = FormatPolitik {
            bevorzugt: formate_aufloesen(&config.formate.video_bevorzugt)?.video(),
            erlaubt: formate_aufloesen(&config.formate.video_erlaubt)?.video(),
        };

        if driver.sample_rate() != config.audio.abtastrate {
            warn!(
                treiber = driver.sample_rate(),
                konfiguriert = config.audio.abtastrate,
                "Abtastrate des Treibers weicht von der Konfiguration ab"
            );
        }

        let mut pipeline = AudioPipeline::new(config.filter()?, config.audio.echo_laenge);
        pipeline.set_silence_threshold(config.audio.stille_schwelle_db);
        let mut audio = AudioZustand::new(pipeline, config.audio.min_rahmen_groesse);
        audio.ausgabe_stumm = config.audio.ausgabe_stumm;

        let (dispatcher, events) = EventDispatcher::starten()?;
        let now = Instant::now();
        let zeitlimit = config.zeitlimit();

        let inner = EngineInner {
            calls: CallTable::new(config.max_anrufe(), now),
            registrations: Registrations::new(),
            transport,
            driver,
            codecs,
            audio_politik,
            video_politik,
            callerid_name: config.anrufer.name.clone(),
            callerid_number: config.anrufer.nummer.clone(),
            audio,
            video: VideoZustand::new(),
            events,
            call_timeout: (!zeitlimit.is_zero()).then_some(zeitlimit),
            registrierung_refresh: config.registrierung.erneuerung_sekunden,
            letzte_registrierungspruefung: now,
        };

        info!(
            leitungen = inner.calls.len(),
            formate = %audio_politik.erlaubt,
            bevorzugt = %audio_politik.bevorzugt,
            "Anruf-Engine initialisiert"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            dispatcher,
            service: Mutex::new(None),
        })
    }

    /// Erstellt eine Engine auf dem Standard-Audiogeraet des Systems
    #[cfg(feature = "cpal")]
    pub fn mit_cpal(config: &EngineConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let driver = iaxc_audio::CpalDriver::new(config.audio.abtastrate)?;
        Self::neu(config, transport, Box::new(driver))
    }

    /// Versionsstring dieser Bibliothek
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    // --- Ereignisse ---

    /// Setzt den Callback, der alle Ereignisse in Reihenfolge erhaelt
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: FnMut(IaxcEvent) + Send + 'static,
    {
        self.dispatcher.set_callback(Some(Box::new(callback)));
    }

    pub fn clear_event_callback(&self) {
        self.dispatcher.set_callback(None);
    }

    /// Wartet, bis alle bisher erzeugten Ereignisse zugestellt sind
    pub fn flush_events(&self) {
        self.dispatcher.abgleichen();
    }

    // --- Dienst ---

    /// Fuehrt einen Dienst-Takt mit der aktuellen Zeit aus
    pub fn process_calls(&self) {
        self.process_calls_at(Instant::now());
    }

    /// Fuehrt einen Dienst-Takt zum Zeitpunkt `now` aus
    pub fn process_calls_at(&self, now: Instant) {
        self.inner.lock().process_calls(now);
    }

    /// Startet den Hintergrund-Thread, der alle 5 ms einen Takt ausfuehrt
    pub fn start_processing_thread(&self) -> Result<()> {
        let mut service = self.service.lock();
        if service.is_some() {
            return Ok(());
        }
        *service = Some(ServiceThread::starten(Arc::clone(&self.inner))?);
        Ok(())
    }

    pub fn stop_processing_thread(&self) {
        if let Some(thread) = self.service.lock().take() {
            thread.stoppen();
        }
    }

    /// Stoppt den Dienst, legt alle Anrufe auf, beendet alle
    /// Registrierungen und schliesst das Audio-Geraet
    pub fn shutdown(&self) {
        self.stop_processing_thread();
        self.inner.lock().herunterfahren();
        self.flush_events();
        info!("Anruf-Engine heruntergefahren");
    }

    // --- Anrufsteuerung ---

    /// Waehlt `number` auf einer freien Leitung und waehlt den Anruf aus
    pub fn dial(&self, number: &str) -> Result<CallId> {
        self.dial_ex(number, None, None, false)
    }

    /// Wie [`Engine::dial`], mit eigener Rufnummernanzeige und optional Video
    pub fn dial_ex(
        &self,
        number: &str,
        callerid_name: Option<&str>,
        callerid_number: Option<&str>,
        video: bool,
    ) -> Result<CallId> {
        self.inner
            .lock()
            .dial(number, callerid_name, callerid_number, video, Instant::now())
    }

    pub fn answer_call(&self, call: CallId) -> Result<()> {
        self.inner.lock().answer(call)
    }

    /// Waehlt `call` aus (`None` hebt die Auswahl auf).
    ///
    /// Ist der Anruf ein noch klingelnder eingehender Anruf, wird er dabei
    /// beantwortet. Wer vor dem Annehmen ablehnen will, muss
    /// [`Engine::reject_call_number`] verwenden, ohne vorher auszuwaehlen.
    pub fn select_call(&self, call: Option<CallId>) -> Result<()> {
        self.inner.lock().select(call)
    }

    pub fn selected_call(&self) -> Option<CallId> {
        self.inner.lock().calls.selected()
    }

    pub fn first_free_call(&self) -> Option<CallId> {
        self.inner.lock().calls.first_free()
    }

    pub fn call_snapshot(&self, call: CallId) -> Result<CallSnapshot> {
        self.inner
            .lock()
            .calls
            .get(call)
            .map(|c| c.snapshot())
            .ok_or(IaxcError::UngueltigerAnruf(call))
    }

    /// `true` wenn der ausgewaehlte Anruf beantwortet ist
    pub fn was_call_answered(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .calls
            .selected()
            .and_then(|id| inner.calls.get(id))
            .is_some_and(|c| c.state.is_complete())
    }

    /// Lehnt den ausgewaehlten Anruf ab
    pub fn reject_call(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.calls.selected() {
            Some(id) => inner.reject(id),
            None => Ok(()),
        }
    }

    pub fn reject_call_number(&self, call: CallId) -> Result<()> {
        self.inner.lock().reject(call)
    }

    /// Signalisiert "besetzt", ohne den Anrufzustand zu aendern
    pub fn send_busy_on_incoming_call(&self, call: CallId) -> Result<()> {
        self.inner.lock().send_busy(call)
    }

    /// Legt den ausgewaehlten Anruf auf
    pub fn dump_call(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.calls.selected() {
            Some(id) => inner.dump(id),
            None => Ok(()),
        }
    }

    pub fn dump_call_number(&self, call: CallId) -> Result<()> {
        self.inner.lock().dump(call)
    }

    pub fn dump_all_calls(&self) {
        self.inner.lock().dump_all();
    }

    /// Blinde Weitervermittlung; den Abschluss meldet die Gegenstelle
    pub fn blind_transfer_call(&self, call: CallId, destination: &str) -> Result<()> {
        self.inner.lock().blind_transfer(call, destination)
    }

    /// Verbindet zwei aktive Anrufe miteinander
    pub fn setup_call_transfer(&self, from: CallId, to: CallId) -> Result<()> {
        self.inner.lock().setup_transfer(from, to)
    }

    pub fn quelch(&self, call: CallId, music_on_hold: bool) -> Result<()> {
        self.inner.lock().quelch(call, music_on_hold)
    }

    pub fn unquelch(&self, call: CallId) -> Result<()> {
        self.inner.lock().unquelch(call)
    }

    /// DTMF auf dem ausgewaehlten Anruf, falls er aktiv ist
    pub fn send_dtmf(&self, digit: char) -> Result<()> {
        self.inner.lock().send_dtmf(digit)
    }

    /// Text auf dem ausgewaehlten Anruf, falls er aktiv ist
    pub fn send_text(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.aktiver_ausgewaehlter() {
            Some((id, _)) => inner.send_text(id, text),
            None => Ok(()),
        }
    }

    pub fn send_text_call(&self, call: CallId, text: &str) -> Result<()> {
        self.inner.lock().send_text(call, text)
    }

    pub fn send_url(&self, url: &str, link: bool) -> Result<()> {
        self.inner.lock().send_url(url, link)
    }

    /// Sendet einen kodierten Videorahmen auf dem ausgewaehlten Anruf.
    /// Gibt die Anzahl gesendeter Slices zurueck.
    pub fn send_video_frame(&self, data: &[u8]) -> Result<usize> {
        self.inner.lock().video_senden(data)
    }

    /// Aktuelle Netzwerkstatistik, `None` wenn der Transport keine hat
    pub fn netstats(&self, call: CallId) -> Result<Option<NetStatsReport>> {
        let inner = self.inner.lock();
        let session = inner.sitzung(call)?;
        Ok(inner.transport.netstats(session))
    }

    // --- Registrierungen ---

    /// Registriert mit der konfigurierten Lease-Dauer
    pub fn register(&self, user: &str, pass: &str, host: &str) -> Result<RegistrationId> {
        let mut inner = self.inner.lock();
        let refresh = inner.registrierung_refresh;
        inner.register(user, pass, host, refresh, Instant::now())
    }

    pub fn register_ex(
        &self,
        user: &str,
        pass: &str,
        host: &str,
        refresh: u32,
    ) -> Result<RegistrationId> {
        self.inner
            .lock()
            .register(user, pass, host, refresh, Instant::now())
    }

    /// Entfernt eine Registrierung, gibt die Anzahl entfernter zurueck
    pub fn unregister(&self, id: RegistrationId) -> usize {
        self.inner.lock().unregister(id)
    }

    // --- Formate und Audio-Einstellungen ---

    pub fn set_formats(&self, preferred: Format, allowed: Format) {
        let mut inner = self.inner.lock();
        inner.audio_politik = FormatPolitik {
            bevorzugt: preferred.audio(),
            erlaubt: allowed.audio(),
        };
        debug!(%preferred, %allowed, "Audio-Formate gesetzt");
    }

    pub fn set_video_formats(&self, preferred: Format, allowed: Format) {
        let mut inner = self.inner.lock();
        inner.video_politik = FormatPolitik {
            bevorzugt: preferred.video(),
            erlaubt: allowed.video(),
        };
        debug!(%preferred, %allowed, "Video-Formate gesetzt");
    }

    pub fn set_callerid(&self, name: &str, number: &str) {
        self.inner.lock().set_callerid(name, number);
    }

    /// Mindestgroesse gesendeter Rahmen in Samples
    pub fn set_min_outgoing_framesize(&self, samples: usize) {
        self.inner.lock().audio.min_rahmen = samples.max(1);
    }

    /// Schwelle in dB, unter der ein Rahmen als Stille gilt.
    /// Werte auf oder unter dem Stille-Pegel schalten die Schwelle ab.
    pub fn set_silence_threshold(&self, db: f32) {
        let schwelle = (db > SILENCE_DB).then_some(db);
        self.inner
            .lock()
            .audio
            .pipeline
            .set_silence_threshold(schwelle);
    }

    pub fn set_filters(&self, filters: Filters) {
        self.inner.lock().audio.pipeline.set_filters(filters);
    }

    pub fn filters(&self) -> Filters {
        self.inner.lock().audio.pipeline.filters()
    }

    pub fn set_audio_prefs(&self, prefs: AudioPrefs) -> Result<()> {
        if prefs.0 & !ERLAUBTE_PREFS != 0 {
            return Err(IaxcError::Konfiguration(format!(
                "Unbekannte Audio-Einstellungen: {:#x}",
                prefs.0
            )));
        }
        self.inner.lock().audio.prefs = prefs;
        Ok(())
    }

    pub fn audio_prefs(&self) -> AudioPrefs {
        self.inner.lock().audio.prefs
    }

    /// Dekodiertes Audio nicht abspielen (dekodiert wird weiterhin)
    pub fn set_audio_output_muted(&self, muted: bool) {
        self.inner.lock().audio.ausgabe_stumm = muted;
    }

    // --- Geraete ---

    pub fn audio_devices(&self) -> Vec<AudioDevice> {
        self.inner.lock().driver.devices()
    }

    pub fn selected_audio_devices(&self) -> DeviceSelection {
        self.inner.lock().driver.selected_devices()
    }

    pub fn set_audio_devices(&self, input: usize, output: usize, ring: usize) -> Result<()> {
        self.inner
            .lock()
            .driver
            .select_devices(DeviceSelection {
                input,
                output,
                ring,
            })?;
        Ok(())
    }

    pub fn input_level(&self) -> f32 {
        self.inner.lock().driver.input_level()
    }

    pub fn set_input_level(&self, level: f32) -> Result<()> {
        self.inner.lock().driver.set_input_level(level)?;
        Ok(())
    }

    pub fn output_level(&self) -> f32 {
        self.inner.lock().driver.output_level()
    }

    pub fn set_output_level(&self, level: f32) -> Result<()> {
        self.inner.lock().driver.set_output_level(level)?;
        Ok(())
    }

    /// Mischt einen Klang in die Ausgabe (`ring` = Klingel-Geraet)
    pub fn play_sound(&self, sound: Sound, ring: bool) -> i32 {
        self.inner.lock().driver.play_sound(sound, ring)
    }

    pub fn stop_sound(&self, id: i32) -> bool {
        self.inner.lock().driver.stop_sound(id)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_processing_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iaxc_audio::MemoryDriver;
    use iaxc_protocol::{Command, MemoryTransport, MemoryTransportHandle};

    fn engine() -> (Engine, MemoryTransportHandle) {
        let (transport, handle) = MemoryTransport::neu();
        let (driver, _audio) = MemoryDriver::neu(8000);
        let engine =
            Engine::neu(&EngineConfig::default(), Box::new(transport), Box::new(driver)).unwrap();
        (engine, handle)
    }

    #[test]
    fn standard_formate_aus_registry() {
        let (engine, _) = engine();
        let inner = engine.inner.lock();
        assert_eq!(inner.audio_politik.bevorzugt, Format::ULAW);
        assert_eq!(
            inner.audio_politik.erlaubt,
            Format::ULAW | Format::ALAW | Format::SLINEAR
        );
        assert!(inner.video_politik.erlaubt.is_empty());
    }

    #[test]
    fn unbekanntes_format_in_config_ist_fehler() {
        let mut config = EngineConfig::default();
        config.formate.bevorzugt = vec!["opus".into()];
        let (transport, _) = MemoryTransport::neu();
        let (driver, _) = MemoryDriver::neu(8000);
        let ergebnis = Engine::neu(&config, Box::new(transport), Box::new(driver));
        assert!(matches!(ergebnis, Err(IaxcError::Konfiguration(_))));
    }

    #[test]
    fn audio_prefs_werden_geprueft() {
        let (engine, _) = engine();
        assert!(engine.set_audio_prefs(AudioPrefs(1 << 7)).is_err());
        let prefs = AudioPrefs::RECV_LOCAL_RAW | AudioPrefs::SEND_DISABLE;
        engine.set_audio_prefs(prefs).unwrap();
        assert_eq!(engine.audio_prefs(), prefs);
    }

    #[test]
    fn stille_schwelle_unter_boden_schaltet_ab() {
        let (engine, _) = engine();
        engine.set_silence_threshold(-40.0);
        assert_eq!(
            engine.inner.lock().audio.pipeline.silence_threshold(),
            Some(-40.0)
        );
        engine.set_silence_threshold(SILENCE_DB);
        assert_eq!(engine.inner.lock().audio.pipeline.silence_threshold(), None);
    }

    #[test]
    fn callerid_gilt_fuer_neue_anrufe() {
        let (engine, handle) = engine();
        engine.set_callerid("Alice", "555");
        engine.dial("bob/200").unwrap();
        let setup = handle
            .befehle()
            .into_iter()
            .find_map(|c| match c {
                Command::Call { setup, .. } => Some(setup),
                _ => None,
            })
            .unwrap();
        assert_eq!(setup.cid_name, "Alice");
        assert_eq!(setup.cid_number, "555");
        assert_eq!(setup.number, "bob/200");
    }

    #[test]
    fn version_ist_gesetzt() {
        assert!(!Engine::version().is_empty());
    }

    #[test]
    fn registrierung_wird_erneuert() {
        let (engine, handle) = engine();
        let start = Instant::now();
        let id = engine.register_ex("alice", "pw", "pbx", 10).unwrap();
        let erste = handle.letzte_sitzung().unwrap();

        engine.process_calls_at(start + Duration::from_secs(5));
        assert_eq!(handle.letzte_sitzung(), Some(erste));

        engine.process_calls_at(start + Duration::from_secs(8));
        let zweite = handle.letzte_sitzung().unwrap();
        assert_ne!(zweite, erste);
        assert!(!handle.sitzung_aktiv(erste));
        assert!(handle.sitzung_aktiv(zweite));

        assert_eq!(engine.unregister(id), 1);
        assert!(!handle.sitzung_aktiv(zweite));
        assert_eq!(engine.unregister(id), 0);
    }
}
