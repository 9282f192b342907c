//! Audio-Dienst fuer den ausgewaehlten Anruf
//!
//! Pro Takt werden aufgenommene Rahmen gelesen, vorverarbeitet, kodiert und
//! gesendet. Empfangene Sprache wird dekodiert und an den Treiber gegeben.
//! Nur der ausgewaehlte Anruf hat Audio; ohne ihn ruht das Geraet.

use std::time::Instant;

use iaxc_audio::AudioPipeline;
use iaxc_core::event::AudioSource;
use iaxc_core::{AudioPrefs, CallId, Filters, Format, IaxcError, IaxcEvent, TextKind};
use tracing::{debug, trace, warn};

use crate::engine::EngineInner;

/// Alle gueltigen Bits der Audio-Einstellungen
pub(crate) const ERLAUBTE_PREFS: u32 = 0x1f;

/// Im Leerlauf wird alle so viele Takte ein Stille-Pegel gemeldet
const STILLE_TAKTE: u32 = 50;

/// Nach so vielen Startfehlern in Folge gilt das Geraet als defekt
const MAX_START_FEHLER: u32 = 3;

/// Rauschpegel des Comfort-Noise-Markers in -dBov
const CNG_PEGEL: u8 = 10;

/// Obergrenze eines gelesenen Rahmens in Samples
const MAX_RAHMEN: usize = 4096;

/// Audio-Zustand der Engine
pub(crate) struct AudioZustand {
    pub(crate) pipeline: AudioPipeline,
    pub(crate) prefs: AudioPrefs,
    /// Mindestgroesse gesendeter Rahmen in Samples
    pub(crate) min_rahmen: usize,
    pub(crate) ausgabe_stumm: bool,
    start_fehler: u32,
    leerlauf_takte: u32,
    aufnahme: Vec<i16>,
    kodiert: Vec<u8>,
    dekodiert: Vec<i16>,
}

impl AudioZustand {
    pub(crate) fn new(pipeline: AudioPipeline, min_rahmen: usize) -> Self {
        Self {
            pipeline,
            prefs: AudioPrefs::default(),
            min_rahmen: min_rahmen.max(1),
            ausgabe_stumm: false,
            start_fehler: 0,
            leerlauf_takte: 0,
            aufnahme: Vec::new(),
            kodiert: Vec::new(),
            dekodiert: Vec::new(),
        }
    }
}

/// PCM als Little-Endian-Bytes fuer Audio-Ereignisse
fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Rahmengroesse: mindestens `min_rahmen`, aufgerundet auf ein Vielfaches
/// der Codec-Mindestgroesse
fn rahmen_groesse(min_rahmen: usize, codec_min: usize) -> usize {
    let cmin = codec_min.max(1);
    let mut n = min_rahmen.max(cmin);
    if n % cmin != 0 {
        n += cmin - n % cmin;
    }
    if n > MAX_RAHMEN {
        n = (MAX_RAHMEN / cmin).max(1) * cmin;
    }
    n
}

impl EngineInner {
    pub(crate) fn service_audio(&mut self, now: Instant) {
        let ausgewaehlt = self
            .calls
            .selected()
            .and_then(|id| self.calls.get(id))
            .map(|c| (c.id, c.state));

        let prefs = self.audio.prefs;
        let will_senden = ausgewaehlt.is_some_and(|(_, state)| {
            (state.is_outgoing() || state.is_complete())
                && !prefs.contains(AudioPrefs::SEND_DISABLE)
        });
        let will_lokal = ausgewaehlt.is_some() && prefs.will_lokal();

        let Some((id, _)) = ausgewaehlt.filter(|_| will_senden || will_lokal) else {
            self.audio_leerlauf();
            return;
        };

        if !self.driver.is_running() {
            if let Err(e) = self.driver.start() {
                self.audio.start_fehler += 1;
                warn!(fehler = %e, versuche = self.audio.start_fehler, "Audio-Geraet startet nicht");
                if self.audio.start_fehler == MAX_START_FEHLER {
                    self.fehler_melden(None, &IaxcError::AudioGeraetDefekt);
                }
                return;
            }
            debug!(call = %id, "Audio-Geraet gestartet");
            self.audio.start_fehler = 0;
        }

        let mut aufnahme = std::mem::take(&mut self.audio.aufnahme);
        loop {
            let codec_min = if will_senden {
                self.encoder_minimum(id)
            } else {
                1
            };
            let n = rahmen_groesse(self.audio.min_rahmen, codec_min);
            aufnahme.resize(n, 0);

            match self.driver.input(&mut aufnahme[..n]) {
                Ok(gelesen) if gelesen == n => {}
                Ok(_) => break,
                Err(e) => {
                    warn!(fehler = %e, "Aufnahme fehlgeschlagen");
                    break;
                }
            }

            if prefs.contains(AudioPrefs::RECV_LOCAL_RAW) {
                self.events.senden(IaxcEvent::Audio {
                    call: id,
                    source: AudioSource::Local,
                    encoded: false,
                    format: Format::SLINEAR,
                    data: pcm_bytes(&aufnahme[..n]),
                });
            }
            if will_senden {
                self.audio_senden(id, &mut aufnahme[..n], now);
            }
        }
        self.audio.aufnahme = aufnahme;

        if let Some((input_db, output_db)) = self.audio.pipeline.pegel_faellig(now) {
            self.events.senden(IaxcEvent::Levels {
                input_db,
                output_db,
            });
        }
    }

    fn audio_leerlauf(&mut self) {
        if self.driver.is_running() {
            match self.driver.stop() {
                Ok(()) => debug!("Audio-Geraet gestoppt"),
                Err(e) => warn!(fehler = %e, "Audio-Geraet laesst sich nicht stoppen"),
            }
        }
        if self.audio.leerlauf_takte % STILLE_TAKTE == 0 {
            self.events.senden(IaxcEvent::stille_pegel());
        }
        self.audio.leerlauf_takte = self.audio.leerlauf_takte.wrapping_add(1);
    }

    /// Mindestrahmen des Encoders, 1 solange keiner gebaut werden kann
    fn encoder_minimum(&mut self, id: CallId) -> usize {
        let Some(call) = self.calls.get_mut(id) else {
            return 1;
        };
        let format = call.format.audio();
        if format.is_empty() {
            return 1;
        }
        call.encoder_fuer(format, &self.codecs)
            .map(|c| c.minimum_frame_size())
            .unwrap_or(1)
    }

    fn audio_senden(&mut self, id: CallId, rahmen: &mut [i16], now: Instant) {
        let rate = self.driver.sample_rate();
        let silent = match self
            .audio
            .pipeline
            .input_postprocess(rahmen, rate, &mut *self.driver, now)
        {
            Ok(silent) => silent,
            Err(e) => {
                warn!(fehler = %e, "Vorverarbeitung fehlgeschlagen");
                false
            }
        };

        let cng = self.audio.pipeline.filters().contains(Filters::CN);
        let Some(call) = self.calls.get_mut(id) else {
            return;
        };
        let Some(session) = call.session else {
            return;
        };

        if silent {
            if !call.tx_silent {
                call.tx_silent = true;
                trace!(call = %id, "Stille, sende Comfort Noise");
                if cng {
                    if let Err(e) = self.transport.send_cng(session, CNG_PEGEL) {
                        debug!(call = %id, fehler = %e, "CNG nicht gesendet");
                    }
                }
            }
            return;
        }
        call.tx_silent = false;

        let format = call.format.audio();
        if format.is_empty() {
            trace!(call = %id, "Noch kein Format ausgehandelt");
            return;
        }

        let mut kodiert = std::mem::take(&mut self.audio.kodiert);
        kodiert.clear();
        let ergebnis = call
            .encoder_fuer(format, &self.codecs)
            .and_then(|encoder| encoder.encode(rahmen, &mut kodiert));

        match ergebnis {
            Ok(_) => {
                if self.audio.prefs.contains(AudioPrefs::RECV_LOCAL_ENCODED) {
                    self.events.senden(IaxcEvent::Audio {
                        call: id,
                        source: AudioSource::Local,
                        encoded: true,
                        format,
                        data: kodiert.clone(),
                    });
                }
                if let Err(e) = self
                    .transport
                    .send_voice(session, format, &kodiert, rahmen.len())
                {
                    debug!(call = %id, fehler = %e, "Sprache nicht gesendet");
                }
            }
            Err(e) => {
                self.text(
                    TextKind::Error,
                    Some(id),
                    format!("Can't encode audio for format {format}: {e}"),
                );
            }
        }
        self.audio.kodiert = kodiert;
    }

    /// Dekodiert ein Sprachpaket des ausgewaehlten Anrufs und spielt es ab
    pub(crate) fn audio_empfangen(&mut self, id: CallId, data: &[u8], now: Instant) {
        if self.calls.selected() != Some(id) {
            return;
        }
        let prefs = self.audio.prefs;
        let mut dekodiert = std::mem::take(&mut self.audio.dekodiert);
        let mut verbraucht = 0;

        loop {
            dekodiert.clear();
            let Some(call) = self.calls.get_mut(id) else {
                break;
            };
            let format = call.format.audio();
            let ergebnis = if format.is_empty() {
                Err(IaxcError::Codec("kein Format ausgehandelt".into()))
            } else {
                call.decoder_fuer(format, &self.codecs)
                    .and_then(|decoder| decoder.decode(&data[verbraucht..], &mut dekodiert))
                    .map_err(IaxcError::from)
            };
            let bytes = match ergebnis {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(call = %id, fehler = %e, "Dekodieren fehlgeschlagen");
                    self.text(
                        TextKind::Status,
                        Some(id),
                        "Bad or incomplete voice packet. Unable to decode. dropping",
                    );
                    break;
                }
            };

            if prefs.contains(AudioPrefs::RECV_REMOTE_ENCODED) {
                self.events.senden(IaxcEvent::Audio {
                    call: id,
                    source: AudioSource::Remote,
                    encoded: true,
                    format,
                    data: data[verbraucht..verbraucht + bytes].to_vec(),
                });
            }
            verbraucht += bytes;

            if prefs.contains(AudioPrefs::RECV_REMOTE_RAW) {
                self.events.senden(IaxcEvent::Audio {
                    call: id,
                    source: AudioSource::Remote,
                    encoded: false,
                    format: Format::SLINEAR,
                    data: pcm_bytes(&dekodiert),
                });
            }

            if !self.audio.ausgabe_stumm && !dekodiert.is_empty() {
                self.audio.pipeline.output_postprocess(&dekodiert, now);
                if let Err(e) = self.driver.output(&dekodiert) {
                    debug!(fehler = %e, "Wiedergabe fehlgeschlagen");
                }
            }

            if bytes == 0 || verbraucht >= data.len() {
                break;
            }
        }
        self.audio.dekodiert = dekodiert;
    }
}
