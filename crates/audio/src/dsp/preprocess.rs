//! Sprach-Vorverarbeitung vor dem Kodieren
//!
//! Buendelt VAD, AGC und Rauschunterdrueckung hinter einer austauschbaren
//! Schnittstelle. Die Pipeline richtet den Preprocessor neu ein, sobald
//! sich Rahmengroesse oder Abtastrate aendern.

use super::agc::{Agc, AgcConfig};
use super::noise_suppression::{NoiseSuppressor, SuppressionLevel};
use super::vad::{Vad, VadConfig};
use super::AudioProcessor;

/// Austauschbarer Sprach-Preprocessor
pub trait Preprocessor: Send {
    /// Richtet den Preprocessor fuer Rahmengroesse und Abtastrate ein
    fn configure(&mut self, frame_size: usize, sample_rate: u32);
    fn set_denoise(&mut self, on: bool);
    fn set_agc(&mut self, on: bool);
    fn set_vad(&mut self, on: bool);

    /// Verarbeitet einen Rahmen in-place; `true` wenn Sprache erkannt wurde
    fn run(&mut self, frame: &mut [i16]) -> bool;

    /// Sprachwahrscheinlichkeit des letzten Rahmens
    fn speech_probability(&self) -> f32;
    /// Geschaetzte Sprachlautheit in 16-Bit-Amplitudeneinheiten
    fn loudness(&self) -> f32;
}

/// Standard-Preprocessor aus den eingebauten DSP-Bausteinen
pub struct SpeechPreprocessor {
    vad: Vad,
    agc: Agc,
    denoise: NoiseSuppressor,
    puffer: Vec<f32>,
}

impl SpeechPreprocessor {
    pub fn new() -> Self {
        Self {
            vad: Vad::new(VadConfig::default()),
            agc: Agc::new(AgcConfig::default()),
            denoise: NoiseSuppressor::new(SuppressionLevel::Medium),
            puffer: Vec::new(),
        }
    }
}

impl Default for SpeechPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for SpeechPreprocessor {
    fn configure(&mut self, frame_size: usize, sample_rate: u32) {
        let frame_ms = if sample_rate > 0 {
            frame_size as f32 * 1000.0 / sample_rate as f32
        } else {
            20.0
        };
        let agc_an = self.agc.is_enabled();
        self.agc = Agc::new(AgcConfig::speech(frame_ms));
        self.agc.set_enabled(agc_an);
        self.vad.reset();
        self.denoise.configure(frame_size);
        self.puffer = vec![0.0; frame_size];
    }

    fn set_denoise(&mut self, on: bool) {
        self.denoise.set_enabled(on);
    }

    fn set_agc(&mut self, on: bool) {
        self.agc.set_enabled(on);
    }

    fn set_vad(&mut self, on: bool) {
        self.vad.set_enabled(on);
    }

    fn run(&mut self, frame: &mut [i16]) -> bool {
        self.puffer.clear();
        self.puffer
            .extend(frame.iter().map(|&s| s as f32 / i16::MAX as f32));

        let voice = self.vad.detect(&self.puffer);
        if voice && self.vad.is_enabled() {
            self.agc.update_loudness(&self.puffer);
        }

        self.denoise.set_voice(voice);
        self.denoise.process(&mut self.puffer);
        self.agc.process(&mut self.puffer);

        for (out, s) in frame.iter_mut().zip(&self.puffer) {
            *out = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
        voice
    }

    fn speech_probability(&self) -> f32 {
        self.vad.speech_probability()
    }

    fn loudness(&self) -> f32 {
        self.agc.loudness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ton(amplitude: f32, n: usize) -> Vec<i16> {
        (0..n)
            .map(|i| {
                (amplitude * 32767.0 * (i as f32 * 2.0 * std::f32::consts::PI * 400.0 / 8000.0).sin())
                    as i16
            })
            .collect()
    }

    #[test]
    fn stille_ohne_sprache() {
        let mut pp = SpeechPreprocessor::new();
        pp.configure(160, 8000);
        pp.set_vad(true);
        let mut frame = vec![0i16; 160];
        assert!(!pp.run(&mut frame));
    }

    #[test]
    fn ton_ist_sprache_und_hat_lautheit() {
        let mut pp = SpeechPreprocessor::new();
        pp.configure(160, 8000);
        pp.set_vad(true);
        pp.set_agc(false);
        pp.set_denoise(false);
        let mut voiced = false;
        for _ in 0..30 {
            let mut frame = ton(0.5, 160);
            voiced = pp.run(&mut frame);
        }
        assert!(voiced);
        assert!(pp.speech_probability() > 0.9);
        assert!(pp.loudness() > 15000.0);
    }

    #[test]
    fn ohne_filter_bleibt_signal() {
        let mut pp = SpeechPreprocessor::new();
        pp.configure(160, 8000);
        pp.set_agc(false);
        pp.set_denoise(false);
        pp.set_vad(false);
        let original = ton(0.3, 160);
        let mut frame = original.clone();
        assert!(pp.run(&mut frame));
        for (a, b) in frame.iter().zip(&original) {
            assert!((a - b).abs() <= 1);
        }
    }
}
