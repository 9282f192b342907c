//! Integration-Tests fuer den Audio-Dienst (Speicher-Treiber)

use std::sync::Arc;

use bytes::Bytes;
use iaxc_audio::codec::linear_zu_ulaw;
use iaxc_audio::{MemoryDriver, MemoryDriverHandle};
use iaxc_core::event::AudioSource;
use iaxc_core::{AudioPrefs, CallId, Format, IaxcEvent, TextKind, SILENCE_DB};
use iaxc_engine::{Engine, EngineConfig};
use iaxc_protocol::{
    Command, ConnectInfo, EventKind, MemoryTransport, MemoryTransportHandle, SessionId,
};
use parking_lot::Mutex;

struct Aufbau {
    engine: Engine,
    netz: MemoryTransportHandle,
    audio: MemoryDriverHandle,
    ereignisse: Arc<Mutex<Vec<IaxcEvent>>>,
}

/// Ohne Filter, damit Rahmen unveraendert kodiert werden
fn roh_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.audio.filter = Vec::new();
    config
}

fn aufbau(config: EngineConfig) -> Aufbau {
    let (transport, netz) = MemoryTransport::neu();
    let (driver, audio) = MemoryDriver::neu(8000);
    let engine = Engine::neu(&config, Box::new(transport), Box::new(driver))
        .expect("Engine konnte nicht erstellt werden");
    let ereignisse = Arc::new(Mutex::new(Vec::new()));
    let ziel = Arc::clone(&ereignisse);
    engine.set_event_callback(move |e| ziel.lock().push(e));
    Aufbau {
        engine,
        netz,
        audio,
        ereignisse,
    }
}

impl Aufbau {
    fn abholen(&self) -> Vec<IaxcEvent> {
        self.engine.flush_events();
        std::mem::take(&mut *self.ereignisse.lock())
    }

    /// Ausgehender Anruf, von der Gegenstelle mit u-law angenommen
    fn verbundener_anruf(&self) -> SessionId {
        self.engine.dial("100").unwrap();
        let session = self.netz.letzte_sitzung().unwrap();
        self.netz.event_einspeisen(
            session,
            EventKind::Accept {
                format: Format::ULAW,
            },
        );
        self.engine.process_calls();
        self.netz.befehle_abholen();
        session
    }

    /// Eingehender u-law-Anruf, ausgewaehlt und damit beantwortet
    fn angenommener_anruf(&self) -> SessionId {
        let session = self.netz.anruf_einspeisen(ConnectInfo {
            format: Format::ULAW,
            capability: Format::ULAW,
            ..ConnectInfo::default()
        });
        self.engine.process_calls();
        self.engine.select_call(Some(CallId(0))).unwrap();
        self.netz.befehle_abholen();
        session
    }

    fn sprache(&self) -> Vec<(usize, usize)> {
        self.netz
            .befehle()
            .into_iter()
            .filter_map(|c| match c {
                Command::Voice {
                    format,
                    data,
                    samples,
                    ..
                } if format == Format::ULAW => Some((data.len(), samples)),
                _ => None,
            })
            .collect()
    }
}

fn ton(n: usize) -> Vec<i16> {
    (0..n)
        .map(|i| ((i as f32 * 0.3).sin() * 8000.0) as i16)
        .collect()
}

#[test]
fn aufnahme_wird_kodiert_und_gesendet() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();

    t.audio.eingabe_einspeisen(&ton(320));
    t.engine.process_calls();

    assert!(t.audio.laeuft());
    assert_eq!(t.sprache(), vec![(160, 160), (160, 160)]);
}

#[test]
fn unvollstaendiger_rahmen_wartet() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();

    t.audio.eingabe_einspeisen(&ton(100));
    t.engine.process_calls();
    assert!(t.sprache().is_empty());

    t.audio.eingabe_einspeisen(&ton(60));
    t.engine.process_calls();
    assert_eq!(t.sprache().len(), 1);
}

#[test]
fn mindestgroesse_bestimmt_rahmen() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();
    t.engine.set_min_outgoing_framesize(240);

    t.audio.eingabe_einspeisen(&ton(480));
    t.engine.process_calls();
    assert_eq!(t.sprache(), vec![(240, 240), (240, 240)]);
}

#[test]
fn stille_sendet_einmal_comfort_noise() {
    let mut config = roh_config();
    config.audio.filter = vec!["cn".into()];
    let t = aufbau(config);
    let session = t.verbundener_anruf();
    t.engine.set_silence_threshold(-20.0);

    t.audio.eingabe_einspeisen(&[0; 480]);
    t.engine.process_calls();

    let befehle = t.netz.befehle();
    let cng = befehle
        .iter()
        .filter(|c| matches!(c, Command::Cng { session: s, .. } if *s == session))
        .count();
    assert_eq!(cng, 1);
    assert!(t.sprache().is_empty());
}

#[test]
fn stille_ohne_cn_filter_sendet_nichts() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();
    t.engine.set_silence_threshold(-20.0);

    t.audio.eingabe_einspeisen(&[0; 320]);
    t.engine.process_calls();
    assert!(t.netz.befehle().is_empty());
}

#[test]
fn senden_abgeschaltet_liefert_lokales_audio() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();
    t.engine
        .set_audio_prefs(AudioPrefs::RECV_LOCAL_RAW | AudioPrefs::SEND_DISABLE)
        .unwrap();
    t.abholen();

    t.audio.eingabe_einspeisen(&ton(160));
    t.engine.process_calls();

    assert!(t.sprache().is_empty());
    let lokal: Vec<usize> = t
        .abholen()
        .iter()
        .filter_map(|e| match e {
            IaxcEvent::Audio {
                source: AudioSource::Local,
                encoded: false,
                data,
                ..
            } => Some(data.len()),
            _ => None,
        })
        .collect();
    assert_eq!(lokal, vec![320]);
}

#[test]
fn empfangene_sprache_wird_abgespielt() {
    let t = aufbau(roh_config());
    let session = t.angenommener_anruf();

    let paket: Vec<u8> = ton(160).into_iter().map(linear_zu_ulaw).collect();
    t.netz.event_einspeisen(
        session,
        EventKind::Voice {
            format: Format::ULAW,
            data: Bytes::from(paket),
        },
    );
    t.engine.process_calls();
    assert_eq!(t.audio.wiedergabe_ausstehend(), 160);
}

#[test]
fn stumme_ausgabe_spielt_nichts() {
    let t = aufbau(roh_config());
    let session = t.angenommener_anruf();
    t.engine.set_audio_output_muted(true);
    t.engine
        .set_audio_prefs(AudioPrefs::RECV_REMOTE_ENCODED)
        .unwrap();
    t.abholen();

    t.netz.event_einspeisen(
        session,
        EventKind::Voice {
            format: Format::ULAW,
            data: Bytes::from(vec![0xff; 160]),
        },
    );
    t.engine.process_calls();

    assert_eq!(t.audio.wiedergabe_ausstehend(), 0);
    assert!(t.abholen().iter().any(|e| matches!(
        e,
        IaxcEvent::Audio {
            source: AudioSource::Remote,
            encoded: true,
            format: Format::ULAW,
            data,
            ..
        } if data.len() == 160
    )));
}

#[test]
fn sprache_fuer_nicht_ausgewaehlten_anruf_wird_ignoriert() {
    let t = aufbau(roh_config());
    let session = t.angenommener_anruf();
    t.engine.select_call(None).unwrap();

    t.netz.event_einspeisen(
        session,
        EventKind::Voice {
            format: Format::ULAW,
            data: Bytes::from(vec![0xff; 160]),
        },
    );
    t.engine.process_calls();
    assert_eq!(t.audio.wiedergabe_ausstehend(), 0);
}

#[test]
fn defektes_geraet_wird_einmal_gemeldet() {
    let t = aufbau(roh_config());
    t.audio.start_fehler(true);
    t.verbundener_anruf();
    t.abholen();

    for _ in 0..6 {
        t.engine.process_calls();
    }
    let fatal = t
        .abholen()
        .iter()
        .filter(|e| {
            matches!(
                e,
                IaxcEvent::Text {
                    kind: TextKind::FatalError,
                    ..
                }
            )
        })
        .count();
    assert_eq!(fatal, 1);
    assert!(!t.audio.laeuft());

    t.audio.start_fehler(false);
    t.engine.process_calls();
    assert!(t.audio.laeuft());
}

#[test]
fn ohne_anruf_ruht_das_geraet() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();
    assert!(t.audio.laeuft());

    t.engine.dump_call().unwrap();
    t.abholen();
    t.engine.process_calls();

    assert!(!t.audio.laeuft());
    let events = t.abholen();
    assert!(events.iter().all(|e| !matches!(
        e,
        IaxcEvent::Levels { input_db, .. } if *input_db != SILENCE_DB
    )));
}

#[test]
fn pegel_werden_gemeldet() {
    let t = aufbau(roh_config());
    t.verbundener_anruf();
    let events = t.abholen();
    assert!(events
        .iter()
        .any(|e| matches!(e, IaxcEvent::Levels { .. })));
}
