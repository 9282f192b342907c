//! iaxc-audio – Audio-Seite der Anruf-Engine
//!
//! - Lock-freier SPSC-Ringpuffer fuer PCM zwischen Treiber und Dienst
//! - Codec-Schnittstelle mit G.711 (u-law/A-law) und linearem PCM
//! - Treiber-Schnittstelle, Speicher-Treiber fuer Tests, cpal-Treiber (Feature `cpal`)
//! - DSP: VAD, AGC, Rauschunterdrueckung, MDF-Echo-Unterdrueckung
//! - Pegelmessung, Klaenge und die Eingangs-/Ausgangs-Pipeline

pub mod codec;
#[cfg(feature = "cpal")]
pub mod cpal_driver;
pub mod device;
pub mod driver;
pub mod dsp;
pub mod error;
pub mod level;
pub mod pipeline;
pub mod ringbuffer;
pub mod sound;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{Codec, CodecRegistry, DECODE_BLOCK};
#[cfg(feature = "cpal")]
pub use cpal_driver::CpalDriver;
pub use device::{AudioDevice, DeviceCaps, DeviceSelection};
pub use driver::{AudioDriver, MemoryDriver, MemoryDriverHandle};
pub use dsp::echo_cancel::{EchoCanceller, MdfState};
pub use dsp::preprocess::{Preprocessor, SpeechPreprocessor};
pub use dsp::AudioProcessor;
pub use error::{AudioError, AudioResult};
pub use level::LevelMeter;
pub use pipeline::AudioPipeline;
pub use ringbuffer::RingBuffer;
pub use sound::{Sound, SoundMixer};
