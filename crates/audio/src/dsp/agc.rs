//! Automatic Gain Control (AGC)
//!
//! Regelt den Pegel rahmenweise auf einen Zielwert (schnell runter,
//! langsam hoch) und begrenzt hart. Nebenbei wird die Lautheit der
//! unverstaerkten Sprache geschaetzt; die analoge Regelung des
//! Eingangspegels orientiert sich daran.

use super::AudioProcessor;

/// Konfiguration fuer den AGC
#[derive(Debug, Clone)]
pub struct AgcConfig {
    /// Ziel-RMS-Pegel (normalisiert)
    pub target_level: f32,
    pub max_gain: f32,
    pub min_gain: f32,
    /// Glaettung pro Rahmen wenn der Gain sinken muss
    pub attack_coeff: f32,
    /// Glaettung pro Rahmen wenn der Gain steigen darf
    pub release_coeff: f32,
    pub limiter_threshold: f32,
    /// Rahmen unterhalb dieses RMS werden nicht nachgeregelt
    pub noise_floor: f32,
}

impl AgcConfig {
    /// Sprachprofil fuer die gegebene Rahmendauer
    pub fn speech(frame_ms: f32) -> Self {
        Self {
            target_level: 0.25,
            max_gain: 30.0,
            min_gain: 0.1,
            attack_coeff: Self::time_to_coeff(0.02, frame_ms),
            release_coeff: Self::time_to_coeff(0.8, frame_ms),
            limiter_threshold: 0.97,
            noise_floor: 0.002,
        }
    }

    fn time_to_coeff(time_secs: f32, frame_ms: f32) -> f32 {
        if time_secs <= 0.0 || frame_ms <= 0.0 {
            return 0.0;
        }
        (-frame_ms / 1000.0 / time_secs).exp()
    }
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self::speech(20.0)
    }
}

/// Automatic Gain Control Prozessor
pub struct Agc {
    config: AgcConfig,
    current_gain: f32,
    /// Geschaetzte Sprachlautheit vor der Verstaerkung (normalisiert)
    loudness: f32,
    enabled: bool,
}

impl Agc {
    pub fn new(config: AgcConfig) -> Self {
        Self {
            current_gain: 1.0,
            config,
            loudness: 0.0,
            enabled: true,
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    /// Lautheit in 16-Bit-Amplitudeneinheiten (0..32767)
    pub fn loudness(&self) -> f32 {
        self.loudness * i16::MAX as f32
    }

    /// Aktualisiert die Lautheitsschaetzung mit einem Sprachrahmen
    pub fn update_loudness(&mut self, samples: &[f32]) {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        self.loudness = 0.9 * self.loudness + 0.1 * peak;
    }

    pub fn set_target_level(&mut self, level: f32) {
        self.config.target_level = level.clamp(0.001, 1.0);
    }
}

impl AudioProcessor for Agc {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled || samples.is_empty() {
            return;
        }

        let rms = super::vad::rms_energy(samples);
        if rms > self.config.noise_floor {
            let desired =
                (self.config.target_level / rms).clamp(self.config.min_gain, self.config.max_gain);
            let coeff = if desired < self.current_gain {
                self.config.attack_coeff
            } else {
                self.config.release_coeff
            };
            self.current_gain = coeff * self.current_gain + (1.0 - coeff) * desired;
        }

        let limit = self.config.limiter_threshold;
        for sample in samples.iter_mut() {
            *sample = (*sample * self.current_gain).clamp(-limit, limit);
        }
    }

    fn reset(&mut self) {
        self.current_gain = 1.0;
        self.loudness = 0.0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
