//! Rauschunterdrueckung via spektrale Subtraktion
//!
//! Drei Stufen: Niedrig, Mittel, Hoch. Das Rauschspektrum wird in
//! Sprachpausen gelernt und pro Frequenzbin vom Signal abgezogen.

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use super::AudioProcessor;

/// Stufe der Rauschunterdrueckung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SuppressionLevel {
    /// Subtraktions-Faktor (alpha)
    fn alpha(&self) -> f32 {
        match self {
            Self::Low => 1.5,
            Self::Medium => 2.5,
            Self::High => 4.0,
        }
    }

    /// Minimaler Gain nach Subtraktion, verhindert musical noise
    fn spectral_floor(&self) -> f32 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.1,
            Self::High => 0.05,
        }
    }
}

/// Frames, in denen das Rauschen unabhaengig von der VAD gelernt wird
const LERN_FRAMES: u32 = 8;

struct Spektrum {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    zeit: Vec<f32>,
    frequenz: Vec<Complex<f32>>,
}

/// Spektraler Rauschunterdruecker
pub struct NoiseSuppressor {
    level: SuppressionLevel,
    spektrum: Option<Spektrum>,
    /// Geschaetzte Rauschleistung pro Bin
    noise_psd: Vec<f32>,
    noise_smoothing: f32,
    frames: u32,
    /// Vom Aufrufer gesetzt: aktueller Rahmen enthaelt Sprache
    voice: bool,
    enabled: bool,
}

impl NoiseSuppressor {
    pub fn new(level: SuppressionLevel) -> Self {
        Self {
            level,
            spektrum: None,
            noise_psd: Vec::new(),
            noise_smoothing: 0.9,
            frames: 0,
            voice: false,
            enabled: true,
        }
    }

    /// Richtet die FFT fuer die Rahmengroesse ein (setzt die Schaetzung zurueck)
    pub fn configure(&mut self, frame_size: usize) {
        if frame_size == 0 {
            self.spektrum = None;
            return;
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);
        let zeit = forward.make_input_vec();
        let frequenz = forward.make_output_vec();
        self.noise_psd = vec![0.0; frequenz.len()];
        self.spektrum = Some(Spektrum {
            forward,
            inverse,
            zeit,
            frequenz,
        });
        self.frames = 0;
    }

    /// Sprachentscheidung fuer den naechsten Rahmen
    pub fn set_voice(&mut self, voice: bool) {
        self.voice = voice;
    }

    /// Mittlere geschaetzte Rauschleistung
    pub fn noise_estimate(&self) -> f32 {
        if self.noise_psd.is_empty() {
            return 0.0;
        }
        self.noise_psd.iter().sum::<f32>() / self.noise_psd.len() as f32
    }

    pub fn set_level(&mut self, level: SuppressionLevel) {
        self.level = level;
    }
}

impl AudioProcessor for NoiseSuppressor {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        let Some(sp) = self.spektrum.as_mut() else {
            return;
        };
        if samples.len() != sp.zeit.len() {
            return;
        }

        sp.zeit.copy_from_slice(samples);
        if sp.forward.process(&mut sp.zeit, &mut sp.frequenz).is_err() {
            return;
        }

        let lernen = self.frames < LERN_FRAMES || !self.voice;
        self.frames = self.frames.saturating_add(1);
        let alpha = self.level.alpha();
        let floor = self.level.spectral_floor();

        for (bin, psd_noise) in sp.frequenz.iter_mut().zip(self.noise_psd.iter_mut()) {
            let psd = bin.norm_sqr();
            if lernen {
                *psd_noise = self.noise_smoothing * *psd_noise + (1.0 - self.noise_smoothing) * psd;
            }
            let gain = if psd > 1e-12 {
                (1.0 - alpha * *psd_noise / psd).max(floor)
            } else {
                floor
            };
            *bin *= gain;
        }

        let n = sp.zeit.len();
        sp.frequenz[0].im = 0.0;
        if n % 2 == 0 {
            if let Some(letzter) = sp.frequenz.last_mut() {
                letzter.im = 0.0;
            }
        }
        if sp.inverse.process(&mut sp.frequenz, &mut sp.zeit).is_err() {
            return;
        }
        let skalierung = 1.0 / n as f32;
        for (out, s) in samples.iter_mut().zip(&sp.zeit) {
            *out = s * skalierung;
        }
    }

    fn reset(&mut self) {
        self.noise_psd.iter_mut().for_each(|p| *p = 0.0);
        self.frames = 0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministisches Pseudo-Rauschen
    fn rauschen(seed: &mut u32, amplitude: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|_| {
                *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((*seed >> 16) as f32 / 32768.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn energie(s: &[f32]) -> f32 {
        s.iter().map(|x| x * x).sum()
    }

    #[test]
    fn gelerntes_rauschen_wird_gedaempft() {
        let mut ns = NoiseSuppressor::new(SuppressionLevel::High);
        ns.configure(160);
        let mut seed = 1;
        for _ in 0..30 {
            let mut frame = rauschen(&mut seed, 0.01, 160);
            ns.process(&mut frame);
        }
        let original = rauschen(&mut seed, 0.01, 160);
        let mut frame = original.clone();
        ns.process(&mut frame);
        assert!(energie(&frame) < 0.5 * energie(&original));
    }

    #[test]
    fn sprache_ueber_rauschen_bleibt_erhalten() {
        let mut ns = NoiseSuppressor::new(SuppressionLevel::Medium);
        ns.configure(160);
        let mut seed = 7;
        for _ in 0..20 {
            let mut frame = rauschen(&mut seed, 0.001, 160);
            ns.process(&mut frame);
        }
        ns.set_voice(true);
        // 500 Hz liegt bei 8 kHz / 160 Samples genau auf Bin 10
        let ton: Vec<f32> = (0..160)
            .map(|i| 0.3 * (i as f32 * 2.0 * std::f32::consts::PI * 500.0 / 8000.0).sin())
            .collect();
        let mut frame = ton.clone();
        ns.process(&mut frame);
        assert!(energie(&frame) > 0.9 * energie(&ton));
    }

    #[test]
    fn stufen_sind_geordnet() {
        assert!(SuppressionLevel::High.alpha() > SuppressionLevel::Medium.alpha());
        assert!(SuppressionLevel::High.spectral_floor() < SuppressionLevel::Low.spectral_floor());
    }

    #[test]
    fn deaktiviert_unveraendert() {
        let mut ns = NoiseSuppressor::new(SuppressionLevel::Medium);
        ns.configure(160);
        ns.set_enabled(false);
        let original = vec![0.01f32; 160];
        let mut samples = original.clone();
        ns.process(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn reset_vergisst_rauschen() {
        let mut ns = NoiseSuppressor::new(SuppressionLevel::Low);
        ns.configure(80);
        let mut frame = vec![0.01f32; 80];
        ns.process(&mut frame);
        assert!(ns.noise_estimate() > 0.0);
        ns.reset();
        assert_eq!(ns.noise_estimate(), 0.0);
    }
}
