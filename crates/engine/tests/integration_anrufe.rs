//! Integration-Tests fuer Anrufsteuerung (Speicher-Transport und -Treiber)

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use iaxc_audio::{MemoryDriver, MemoryDriverHandle};
use iaxc_core::{CallId, CallState, Format, IaxcError, IaxcEvent, Lifecycle, TextKind};
use iaxc_engine::{Engine, EngineConfig};
use iaxc_protocol::{Command, EventKind, MemoryTransport, MemoryTransportHandle, SessionId};
use parking_lot::Mutex;

struct Aufbau {
    engine: Engine,
    netz: MemoryTransportHandle,
    _audio: MemoryDriverHandle,
    ereignisse: Arc<Mutex<Vec<IaxcEvent>>>,
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
        _audio: audio,
        ereignisse,
    }
}

impl Aufbau {
    fn abholen(&self) -> Vec<IaxcEvent> {
        self.engine.flush_events();
        std::mem::take(&mut *self.ereignisse.lock())
    }
}

fn zustaende(events: &[IaxcEvent]) -> Vec<(CallId, CallState)> {
    events
        .iter()
        .filter_map(|e| match e {
            IaxcEvent::CallState(s) => Some((s.call, s.state)),
            _ => None,
        })
        .collect()
}

fn texte(events: &[IaxcEvent]) -> Vec<(TextKind, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            IaxcEvent::Text { kind, message, .. } => Some((*kind, message.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn waehlen_belegt_ersten_slot_und_waehlt_aus() {
    let t = aufbau(EngineConfig::default());

    let id = t.engine.dial("100").unwrap();
    assert_eq!(id, CallId(0));
    assert_eq!(t.engine.selected_call(), Some(CallId(0)));

    let events = t.abholen();
    let bits = CallState::BIT_ACTIVE | CallState::BIT_OUTGOING | CallState::BIT_SELECTED;
    let letzter = zustaende(&events).last().copied().unwrap();
    assert_eq!(letzter.0, CallId(0));
    assert_eq!(letzter.1.bits(), bits);
    assert!(texte(&events).contains(&(
        TextKind::Notice,
        "Originating an audio only call".to_string()
    )));

    let befehle = t.netz.befehle();
    assert!(matches!(befehle[0], Command::NewSession(_)));
    assert!(matches!(befehle[1], Command::Call { .. }));
}

#[test]
fn name_und_nebenstelle_werden_getrennt() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("guest@pbx/200").unwrap();
    let snapshot = t.engine.call_snapshot(CallId(0)).unwrap();
    assert_eq!(snapshot.remote, "200");
    assert_eq!(snapshot.remote_name, "guest@pbx/200");
    assert_eq!(snapshot.local_context, "default");
}

#[test]
fn ohne_freie_leitung_keine_neue_sitzung() {
    let mut config = EngineConfig::default();
    config.anrufe.max_anrufe = 1;
    let t = aufbau(config);

    t.engine.dial("100").unwrap();
    let sitzungen = t.netz.aktive_sitzungen();
    t.abholen();

    let ergebnis = t.engine.dial("200");
    assert!(matches!(ergebnis, Err(IaxcError::KeineFreieLeitung)));
    assert_eq!(t.netz.aktive_sitzungen(), sitzungen);
    assert!(texte(&t.abholen()).contains(&(
        TextKind::Status,
        "No free call appearances".to_string()
    )));
}

#[test]
fn verweigerte_sitzung_ist_fehler() {
    let t = aufbau(EngineConfig::default());
    t.netz.sitzungen_verweigern(true);

    assert!(t.engine.dial("100").is_err());
    assert_eq!(t.engine.first_free_call(), Some(CallId(0)));
    assert!(texte(&t.abholen()).contains(&(TextKind::Error, "Can't make new session".to_string())));
}

#[test]
fn besetzt_meldet_genau_einen_zustand() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();
    t.abholen();

    t.netz.event_einspeisen(session, EventKind::Busy);
    t.engine.process_calls();
    let events = t.abholen();

    let zustaende = zustaende(&events);
    assert_eq!(zustaende.len(), 1);
    assert!(zustaende[0].1.is_busy());
    assert!(zustaende[0].1.is_active());
    assert!(texte(&events).contains(&(TextKind::Status, "Call 0 busy".to_string())));
}

#[test]
fn gegenseite_legt_auf() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();
    t.abholen();

    t.netz.event_einspeisen(session, EventKind::Hangup);
    t.engine.process_calls();
    let events = t.abholen();

    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_free());
    assert!(!t.netz.sitzung_aktiv(session));
    assert!(texte(&events).contains(&(
        TextKind::Status,
        "Call disconnected by remote".to_string()
    )));
    assert!(!t.engine.was_call_answered());
}

#[test]
fn antwort_macht_anruf_komplett() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();

    t.netz.event_einspeisen(session, EventKind::Ringing);
    t.netz.event_einspeisen(session, EventKind::Answer);
    t.engine.process_calls();

    assert!(t.engine.was_call_answered());
    let texte = texte(&t.abholen());
    assert!(texte.contains(&(TextKind::Status, "Call 0 ringing".to_string())));
    assert!(texte.contains(&(TextKind::Status, "Call 0 answered".to_string())));
}

#[test]
fn fruehe_medien_beantworten_nicht() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();

    t.netz.event_einspeisen(
        session,
        EventKind::Accept {
            format: Format::ULAW,
        },
    );
    t.netz.event_einspeisen(session, EventKind::Ringing);
    t.netz.event_einspeisen(
        session,
        EventKind::Voice {
            format: Format::ULAW,
            data: Bytes::from(vec![0xff; 160]),
        },
    );
    t.engine.process_calls();

    let state = t.engine.call_snapshot(CallId(0)).unwrap().state;
    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(state.bits() & CallState::BIT_COMPLETE, 0);
    assert!(!t.engine.was_call_answered());
    assert!(texte(&t.abholen()).contains(&(TextKind::Status, "Call 0 progress".to_string())));

    t.netz.event_einspeisen(session, EventKind::Answer);
    t.engine.process_calls();
    assert!(t.engine.was_call_answered());
}

#[test]
fn spaetes_klingeln_nach_antwort_wird_ignoriert() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();

    t.netz.event_einspeisen(session, EventKind::Answer);
    t.engine.process_calls();
    t.abholen();

    t.netz.event_einspeisen(session, EventKind::Ringing);
    t.engine.process_calls();

    assert!(t.engine.was_call_answered());
    let events = t.abholen();
    assert!(zustaende(&events).is_empty());
    assert!(!texte(&events).contains(&(TextKind::Status, "Call 0 ringing".to_string())));
}

#[test]
fn alle_auflegen_trotz_verlorener_sitzung() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let erste = t.netz.letzte_sitzung().unwrap();
    t.engine.select_call(None).unwrap();
    t.engine.dial("200").unwrap();
    t.netz.sitzung_verlieren(erste);
    t.netz.befehle_abholen();

    t.engine.dump_all_calls();

    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_free());
    assert!(t.engine.call_snapshot(CallId(1)).unwrap().state.is_free());
    let auflegen = t
        .netz
        .befehle()
        .into_iter()
        .filter(|c| matches!(c, Command::Hangup { .. }))
        .count();
    assert_eq!(auflegen, 1);
}

#[test]
fn auflegen_und_alle_auflegen() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    t.engine.select_call(None).unwrap();
    t.engine.dial("200").unwrap();
    assert_eq!(t.engine.selected_call(), Some(CallId(1)));

    t.engine.dump_call().unwrap();
    assert!(t.engine.call_snapshot(CallId(1)).unwrap().state.is_free());
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_active());

    t.engine.dump_all_calls();
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_free());
    let auflegen = t
        .netz
        .befehle()
        .into_iter()
        .filter(|c| matches!(c, Command::Hangup { reason, .. } if reason == "Dumped Call"))
        .count();
    assert_eq!(auflegen, 2);
    // freie Slots werden still uebersprungen
    t.engine.dump_call_number(CallId(1)).unwrap();
}

#[test]
fn ungueltige_anrufnummer() {
    let t = aufbau(EngineConfig::default());
    assert!(matches!(
        t.engine.select_call(Some(CallId(7))),
        Err(IaxcError::UngueltigerAnruf(_))
    ));
    assert!(texte(&t.abholen()).contains(&(
        TextKind::Error,
        "Error: tried to select out_of_range call 7".to_string()
    )));
    assert!(t.engine.dump_call_number(CallId(7)).is_err());
    assert!(t.engine.call_snapshot(CallId(7)).is_err());
}

#[test]
fn befehle_auf_freiem_slot_sind_fehler() {
    let t = aufbau(EngineConfig::default());
    assert!(matches!(
        t.engine.answer_call(CallId(0)),
        Err(IaxcError::UngueltigerZustand { .. })
    ));
    assert!(t.engine.blind_transfer_call(CallId(0), "300").is_err());
    assert!(t.engine.quelch(CallId(0), true).is_err());
    // ohne ausgewaehlten Anruf passiert nichts
    t.engine.send_dtmf('5').unwrap();
    t.engine.send_url("http://example.org", true).unwrap();
    t.engine.send_text("hallo").unwrap();
    assert!(t.netz.befehle().is_empty());
}

#[test]
fn steuerbefehle_erreichen_den_transport() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let a = t.netz.letzte_sitzung().unwrap();
    t.engine.select_call(None).unwrap();
    t.engine.dial("200").unwrap();
    let b = t.netz.letzte_sitzung().unwrap();
    t.netz.befehle_abholen();

    t.engine.send_dtmf('#').unwrap();
    t.engine.send_text("hallo").unwrap();
    t.engine.send_url("http://example.org", false).unwrap();
    t.engine.quelch(CallId(0), true).unwrap();
    t.engine.unquelch(CallId(0)).unwrap();
    t.engine.blind_transfer_call(CallId(1), "300").unwrap();
    t.engine.setup_call_transfer(CallId(0), CallId(1)).unwrap();
    t.engine.send_text_call(CallId(0), "an a").unwrap();

    assert_eq!(
        t.netz.befehle(),
        vec![
            Command::Dtmf {
                session: b,
                digit: '#'
            },
            Command::Text {
                session: b,
                text: "hallo".into()
            },
            Command::Url {
                session: b,
                url: "http://example.org".into(),
                link: false
            },
            Command::Quelch {
                session: a,
                music_on_hold: true
            },
            Command::Unquelch(a),
            Command::Transfer {
                session: b,
                destination: "300".into()
            },
            Command::SetupTransfer { from: a, to: b },
            Command::Text {
                session: a,
                text: "an a".into()
            },
        ]
    );
}

#[test]
fn weitervermittlung_setzt_und_loescht_flag() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();

    t.netz.event_einspeisen(session, EventKind::Transfer);
    t.engine.process_calls();
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.in_transfer);

    t.netz.event_einspeisen(session, EventKind::TransferReleased);
    t.engine.process_calls();
    assert!(!t.engine.call_snapshot(CallId(0)).unwrap().state.in_transfer);
    assert!(texte(&t.abholen()).contains(&(
        TextKind::Status,
        "Call 0 transfer released".to_string()
    )));
}

#[test]
fn inaktiver_anruf_laeuft_ab() {
    let mut config = EngineConfig::default();
    config.anrufe.zeitlimit_sekunden = 2;
    let t = aufbau(config);
    t.engine.dial("100").unwrap();
    let session = t.netz.letzte_sitzung().unwrap();

    t.engine.process_calls_at(Instant::now() + Duration::from_secs(1));
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_active());

    t.engine.process_calls_at(Instant::now() + Duration::from_secs(5));
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_free());
    assert!(t.netz.befehle().contains(&Command::Hangup {
        session,
        reason: "Call timed out".into()
    }));
    assert!(texte(&t.abholen()).contains(&(TextKind::Status, "Call 0 timed out.".to_string())));
}

#[test]
fn zeitlimit_null_schaltet_ab() {
    let mut config = EngineConfig::default();
    config.anrufe.zeitlimit_sekunden = 0;
    let t = aufbau(config);
    t.engine.dial("100").unwrap();
    t.engine
        .process_calls_at(Instant::now() + Duration::from_secs(3600));
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_active());
}

#[test]
fn herunterfahren_raeumt_auf() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("100").unwrap();
    t.engine.register("alice", "geheim", "pbx").unwrap();
    assert_eq!(t.netz.aktive_sitzungen(), 2);

    t.engine.shutdown();
    assert_eq!(t.netz.aktive_sitzungen(), 0);
    assert!(t.engine.call_snapshot(CallId(0)).unwrap().state.is_free());
}

#[test]
fn ereignis_sitzung_ohne_anruf() {
    let t = aufbau(EngineConfig::default());
    t.netz.event_einspeisen(SessionId(500), EventKind::RegRequest);
    t.engine.process_calls();
    assert!(texte(&t.abholen()).contains(&(
        TextKind::Error,
        "Registration request for a non-existent session".to_string()
    )));
}

#[test]
fn zustandsereignis_als_json() {
    let t = aufbau(EngineConfig::default());
    t.engine.dial("guest/300").unwrap();
    let ereignis = t
        .abholen()
        .into_iter()
        .filter(|e| matches!(e, IaxcEvent::CallState(_)))
        .last()
        .unwrap();

    let json = serde_json::to_string(&ereignis).unwrap();
    assert!(json.contains("\"remote\":\"300\""));
    let zurueck: IaxcEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(zurueck, ereignis);
}
