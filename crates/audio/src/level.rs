//! Pegelmessung fuer Ein- und Ausgang
//!
//! Die Huellkurve folgt dem normierten Spitzenwert jedes Blocks mit
//! `level += (peak - level) / 5` und wird in dB gemeldet. Ohne Verkehr
//! seit mehr als einer Sekunde oder bei Pegel 0 gilt der Boden von -99 dB.

use iaxc_core::SILENCE_DB;
use std::time::{Duration, Instant};

const VERALTET_NACH: Duration = Duration::from_secs(1);

/// Huellkurven-Pegelmesser
#[derive(Debug, Default, Clone)]
pub struct LevelMeter {
    level: f32,
    letztes_update: Option<Instant>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuehrt die Huellkurve mit dem Spitzenwert von `samples` nach
    pub fn update(&mut self, samples: &[i16], now: Instant) {
        let peak = samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0) as f32
            / 32767.0;
        self.level += (peak - self.level) / 5.0;
        self.letztes_update = Some(now);
    }

    /// Aktueller Pegel in dB
    pub fn db(&self, now: Instant) -> f32 {
        let aktuell = self
            .letztes_update
            .is_some_and(|t| now.saturating_duration_since(t) <= VERALTET_NACH);
        if !aktuell || self.level <= 0.0 {
            return SILENCE_DB;
        }
        20.0 * self.level.log10()
    }

    /// Roher Huellkurvenwert (0.0..~1.0)
    pub fn level(&self) -> f32 {
        self.level
    }
}
