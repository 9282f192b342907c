//! Signalweg zwischen Audio-Treiber und Codec
//!
//! Eingangsseite: Echo-Unterdrueckung -> Pegelmessung -> Preprocessor
//! (VAD/AGC/Rauschunterdrueckung) -> analoge Verstaerkungsregelung ->
//! Stille-Entscheidung. Ausgangsseite: Pegelmessung und Echo-Referenz.

use std::time::{Duration, Instant};

use iaxc_core::Filters;
use tracing::debug;

use crate::driver::AudioDriver;
use crate::dsp::echo_cancel::EchoCanceller;
use crate::dsp::preprocess::{Preprocessor, SpeechPreprocessor};
use crate::error::AudioResult;
use crate::level::LevelMeter;

/// Mindestabstand zwischen zwei Pegel-Ereignissen
pub const PEGEL_INTERVALL: Duration = Duration::from_millis(100);

/// Jeder wievielte Sprachrahmen die analoge Regelung prueft
const AAGC_RAHMEN: u32 = 64;
const AAGC_MIN_SPRACHE: f32 = 0.2;

/// Audio-Verarbeitung fuer den gewaehlten Anruf
pub struct AudioPipeline {
    preprocessor: Box<dyn Preprocessor>,
    /// Rahmengroesse und Abtastrate, fuer die der Preprocessor eingerichtet ist
    pp_format: Option<(usize, u32)>,
    echo: EchoCanceller,
    input_meter: LevelMeter,
    output_meter: LevelMeter,
    filters: Filters,
    silence_threshold: Option<f32>,
    aagc_zaehler: u32,
    letzte_pegel: Option<Instant>,
}

impl AudioPipeline {
    pub fn new(filters: Filters, echo_tail: usize) -> Self {
        Self::mit_preprocessor(Box::new(SpeechPreprocessor::new()), filters, echo_tail)
    }

    /// Pipeline mit eigenem Preprocessor
    pub fn mit_preprocessor(
        preprocessor: Box<dyn Preprocessor>,
        filters: Filters,
        echo_tail: usize,
    ) -> Self {
        Self {
            preprocessor,
            pp_format: None,
            echo: EchoCanceller::new(echo_tail),
            input_meter: LevelMeter::new(),
            output_meter: LevelMeter::new(),
            filters,
            silence_threshold: None,
            aagc_zaehler: 0,
            letzte_pegel: None,
        }
    }

    pub fn filters(&self) -> Filters {
        self.filters
    }

    pub fn set_filters(&mut self, filters: Filters) {
        if filters != self.filters {
            debug!(alt = self.filters.0, neu = filters.0, "Filter geaendert");
        }
        self.filters = filters;
    }

    /// Schwelle in dB, unter der ein Rahmen als Stille gilt (`None` = aus)
    pub fn set_silence_threshold(&mut self, db: Option<f32>) {
        self.silence_threshold = db;
    }

    pub fn silence_threshold(&self) -> Option<f32> {
        self.silence_threshold
    }

    fn braucht_preprocessor(&self) -> bool {
        self.filters.contains(Filters::AGC)
            || self.filters.contains(Filters::DENOISE)
            || self.filters.contains(Filters::CN)
    }

    /// Bearbeitet einen aufgenommenen Rahmen in-place.
    ///
    /// Gibt `true` zurueck, wenn der Rahmen als Stille gilt und statt
    /// kodierter Sprache hoechstens ein Comfort-Noise-Marker gesendet wird.
    pub fn input_postprocess(
        &mut self,
        frame: &mut [i16],
        sample_rate: u32,
        driver: &mut dyn AudioDriver,
        now: Instant,
    ) -> AudioResult<bool> {
        self.echo
            .cancel(frame, self.filters.contains(Filters::ECHO))?;
        self.input_meter.update(frame, now);

        let mut silent = false;
        if self.braucht_preprocessor() {
            if self.pp_format != Some((frame.len(), sample_rate)) {
                debug!(
                    rahmen = frame.len(),
                    rate = sample_rate,
                    "Preprocessor neu eingerichtet"
                );
                self.preprocessor.configure(frame.len(), sample_rate);
                self.pp_format = Some((frame.len(), sample_rate));
            }
            self.preprocessor
                .set_denoise(self.filters.contains(Filters::DENOISE));
            self.preprocessor.set_agc(self.filters.contains(Filters::AGC));
            self.preprocessor.set_vad(self.filters.contains(Filters::CN));

            let voice = self.preprocessor.run(frame);
            silent = !voice;
            if voice {
                self.analoge_regelung(driver)?;
            }
        }

        if let Some(schwelle) = self.silence_threshold {
            if self.input_meter.db(now) < schwelle {
                silent = true;
            }
        }
        Ok(silent)
    }

    /// Stellt den Eingangspegel des Treibers in kleinen Schritten nach.
    /// Runter geht es schnell und gestaffelt, hoch nur wenn es leise ist.
    fn analoge_regelung(&mut self, driver: &mut dyn AudioDriver) -> AudioResult<()> {
        if !self.filters.contains(Filters::AGC) || !self.filters.contains(Filters::AAGC) {
            return Ok(());
        }
        if self.preprocessor.speech_probability() <= AAGC_MIN_SPRACHE {
            return Ok(());
        }
        self.aagc_zaehler = self.aagc_zaehler.wrapping_add(1);
        if self.aagc_zaehler % AAGC_RAHMEN != 0 {
            return Ok(());
        }

        let loudness = self.preprocessor.loudness();
        let level = driver.input_level();
        let schritt = if loudness > 16000.0 {
            if level > 0.5 {
                -0.2
            } else if level > 0.15 {
                -0.1
            } else if level > 0.05 {
                -0.02
            } else {
                0.0
            }
        } else if loudness > 8000.0 && level >= 0.15 {
            -0.05
        } else if loudness > 100.0 && loudness < 4000.0 && level <= 0.9 {
            0.1
        } else {
            0.0
        };

        if schritt != 0.0 {
            debug!(loudness, alt = level, neu = level + schritt, "Eingangspegel nachgeregelt");
            driver.set_input_level(level + schritt)?;
        }
        Ok(())
    }

    /// Vermerkt abgespielte Samples fuer Pegel und Echo-Referenz
    pub fn output_postprocess(&mut self, samples: &[i16], now: Instant) {
        self.output_meter.update(samples, now);
        if self.filters.contains(Filters::ECHO) {
            self.echo.playback(samples);
        }
    }

    /// Aktuelle Pegel (Eingang, Ausgang) in dB
    pub fn levels(&self, now: Instant) -> (f32, f32) {
        (self.input_meter.db(now), self.output_meter.db(now))
    }

    /// Pegel, falls seit dem letzten Aufruf genug Zeit vergangen ist
    pub fn pegel_faellig(&mut self, now: Instant) -> Option<(f32, f32)> {
        if let Some(letzte) = self.letzte_pegel {
            if now.saturating_duration_since(letzte) < PEGEL_INTERVALL {
                return None;
            }
        }
        self.letzte_pegel = Some(now);
        Some(self.levels(now))
    }

    pub fn echo_aktiv(&self) -> bool {
        self.echo.ist_aktiv()
    }
}
