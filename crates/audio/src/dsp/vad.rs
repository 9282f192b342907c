//! Voice Activity Detection (VAD)
//!
//! Energie-basierte Erkennung mit Zero-Crossing-Plausibilisierung und
//! Hangover. Zusaetzlich wird eine Sprachwahrscheinlichkeit geschaetzt,
//! die die analoge Verstaerkungsregelung als Freigabe nutzt.

use super::AudioProcessor;

/// Konfiguration fuer die VAD
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Energie-Schwellenwert (RMS, normalisiert 0.0..1.0)
    pub energy_threshold: f32,
    /// Obergrenze der Zero-Crossing-Rate fuer Sprache
    pub zcr_threshold: f32,
    /// Frames die nach letzter Aktivitaet noch als aktiv gelten
    pub hangover_frames: u32,
    /// Glaettung der Energie (0.0 = keine)
    pub smoothing: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.003,
            zcr_threshold: 0.5,
            hangover_frames: 4,
            smoothing: 0.6,
        }
    }
}

/// Voice Activity Detector
pub struct Vad {
    config: VadConfig,
    smoothed_energy: f32,
    hangover_counter: u32,
    voice_active: bool,
    probability: f32,
    enabled: bool,
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            smoothed_energy: 0.0,
            hangover_counter: 0,
            voice_active: false,
            probability: 0.0,
            enabled: true,
        }
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice_active
    }

    /// Sprachwahrscheinlichkeit des letzten Frames (0.0..1.0)
    pub fn speech_probability(&self) -> f32 {
        self.probability
    }

    /// Analysiert einen Frame, veraendert die Samples nicht.
    /// Deaktiviert gilt jeder Frame als Sprache.
    pub fn detect(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return self.voice_active;
        }

        let energy = rms_energy(samples);
        self.smoothed_energy =
            self.config.smoothing * self.smoothed_energy + (1.0 - self.config.smoothing) * energy;

        // 0 dB ueber Schwelle -> 0.5, +/- 12 dB -> 1.0 / 0.0
        let abstand_db = if self.smoothed_energy > 0.0 {
            20.0 * (self.smoothed_energy / self.config.energy_threshold).log10()
        } else {
            -100.0
        };
        let zcr = zero_crossing_rate(samples);
        let zcr_plausibel = zcr < self.config.zcr_threshold;
        self.probability = if zcr_plausibel {
            (0.5 + abstand_db / 24.0).clamp(0.0, 1.0)
        } else {
            (0.25 + abstand_db / 48.0).clamp(0.0, 0.5)
        };

        if !self.enabled {
            self.voice_active = true;
            return true;
        }

        if self.smoothed_energy > self.config.energy_threshold && zcr_plausibel {
            self.hangover_counter = self.config.hangover_frames;
            self.voice_active = true;
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            self.voice_active = true;
        } else {
            self.voice_active = false;
        }

        self.voice_active
    }

    pub fn smoothed_energy(&self) -> f32 {
        self.smoothed_energy
    }
}

impl AudioProcessor for Vad {
    fn process(&mut self, samples: &mut [f32]) {
        self.detect(samples);
    }

    fn reset(&mut self) {
        self.smoothed_energy = 0.0;
        self.hangover_counter = 0;
        self.voice_active = false;
        self.probability = 0.0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// RMS-Energie eines Frames
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Normalisierte Zero-Crossing-Rate
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
