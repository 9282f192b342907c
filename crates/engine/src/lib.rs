//! iaxc-engine – Anruf-Engine eines Softphones
//!
//! Die [`Engine`] verwaltet eine feste Zahl von Anruf-Slots, handelt Codecs
//! mit der Gegenstelle aus, verarbeitet Protokoll-Ereignisse des
//! [`iaxc_protocol::Transport`] und treibt den Audio-Dienst ueber einen
//! [`iaxc_audio::AudioDriver`]. Die Anwendung erhaelt alles ueber einen
//! einzigen Ereignis-Callback.
//!
//! ```no_run
//! use iaxc_engine::{Engine, EngineConfig};
//! use iaxc_audio::MemoryDriver;
//! use iaxc_protocol::MemoryTransport;
//!
//! let (transport, _netz) = MemoryTransport::neu();
//! let (driver, _audio) = MemoryDriver::neu(8000);
//! let engine = Engine::neu(&EngineConfig::default(), Box::new(transport), Box::new(driver))?;
//! engine.set_event_callback(|event| println!("{event:?}"));
//! engine.start_processing_thread()?;
//! engine.dial("guest@pbx/100")?;
//! # Ok::<(), iaxc_core::IaxcError>(())
//! ```

pub mod call;
pub mod config;
pub mod logging;
pub mod negotiate;
pub mod registration;

mod audio_service;
mod engine;
mod events;
mod network;
mod service;
mod video;

pub use call::{Call, CallTable};
pub use config::EngineConfig;
pub use engine::Engine;
pub use events::EventCallback;
pub use logging::logging_initialisieren;
pub use negotiate::{audio_aushandeln, codec_waehlen, video_aushandeln, FormatPolitik};
pub use registration::Registration;

// Typen, die in der Schnittstelle der Engine vorkommen
pub use iaxc_audio::{AudioDevice, DeviceSelection, Sound};
pub use iaxc_core::{
    AudioPrefs, CallId, CallSnapshot, CallState, Filters, Format, IaxcError, IaxcEvent,
    RegistrationId, Result, TextKind,
};
pub use iaxc_protocol::NetStatsReport;
