//! DSP-Module fuer die Eingangsseite
//!
//! VAD, AGC und Rauschunterdrueckung arbeiten auf normalisierten
//! `f32`-Rahmen und implementieren `AudioProcessor`. Echo-Unterdrueckung
//! und Preprocessor arbeiten direkt auf 16-Bit-PCM.

pub mod agc;
pub mod echo_cancel;
pub mod noise_suppression;
pub mod preprocess;
pub mod vad;

/// Gemeinsames Trait der rahmenweisen DSP-Bausteine
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck
    fn reset(&mut self);

    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}
