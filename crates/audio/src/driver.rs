//! Audio-Treiber-Schnittstelle
//!
//! Die Engine spricht Audio-Hardware nur ueber [`AudioDriver`] an. Der
//! Treiber-eigene Callback beruehrt ausschliesslich seine Ring-Buffer, nie
//! die Anruftabelle.
//!
//! [`MemoryDriver`] ist ein deterministischer Treiber ohne Hardware: Tests
//! speisen Aufnahme-Samples ueber den [`MemoryDriverHandle`] ein und holen
//! die Wiedergabe dort ab.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::device::{AudioDevice, DeviceCaps, DeviceSelection};
use crate::error::{AudioError, AudioResult};
use crate::sound::{Sound, SoundMixer};

/// Faehigkeiten eines Audio-Back-Ends
pub trait AudioDriver: Send {
    /// Oeffnet die Geraete und startet Aufnahme und Wiedergabe
    fn start(&mut self) -> AudioResult<()>;
    fn stop(&mut self) -> AudioResult<()>;
    fn is_running(&self) -> bool;

    /// Fuellt `buf` vollstaendig mit aufgenommenen Samples und gibt
    /// `buf.len()` zurueck, oder 0 wenn noch nicht genug vorliegen.
    fn input(&mut self, buf: &mut [i16]) -> AudioResult<usize>;
    /// Reiht Samples zur Wiedergabe ein
    fn output(&mut self, samples: &[i16]) -> AudioResult<()>;

    /// Eingangspegel 0.0..1.0
    fn input_level(&self) -> f32;
    fn set_input_level(&mut self, level: f32) -> AudioResult<()>;
    fn output_level(&self) -> f32;
    fn set_output_level(&mut self, level: f32) -> AudioResult<()>;

    fn devices(&self) -> Vec<AudioDevice>;
    fn selected_devices(&self) -> DeviceSelection;
    fn select_devices(&mut self, selection: DeviceSelection) -> AudioResult<()>;

    /// Mischt einen Klang in die Ausgabe, gibt seine Kennung zurueck
    fn play_sound(&mut self, sound: Sound, ring: bool) -> i32;
    fn stop_sound(&mut self, id: i32) -> bool;

    fn sample_rate(&self) -> u32;
}

#[derive(Default)]
struct MemoryDriverState {
    running: bool,
    start_fehler: bool,
    starts: usize,
    aufnahme: VecDeque<i16>,
    wiedergabe: VecDeque<i16>,
    input_level: f32,
    output_level: f32,
    auswahl: DeviceSelection,
    mixer: SoundMixer,
}

/// Treiber ohne Hardware (geht an die Engine)
pub struct MemoryDriver {
    state: Arc<Mutex<MemoryDriverState>>,
    sample_rate: u32,
}

/// Test-Seite des [`MemoryDriver`]
#[derive(Clone)]
pub struct MemoryDriverHandle {
    state: Arc<Mutex<MemoryDriverState>>,
}

impl MemoryDriver {
    /// Erstellt Treiber und zugehoerigen Handle
    pub fn neu(sample_rate: u32) -> (Self, MemoryDriverHandle) {
        let state = Arc::new(Mutex::new(MemoryDriverState {
            input_level: 0.5,
            output_level: 0.5,
            auswahl: DeviceSelection {
                input: 0,
                output: 1,
                ring: 1,
            },
            ..MemoryDriverState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
                sample_rate,
            },
            MemoryDriverHandle { state },
        )
    }
}

impl MemoryDriverHandle {
    /// Haengt Samples an die Aufnahme an
    pub fn eingabe_einspeisen(&self, samples: &[i16]) {
        self.state.lock().aufnahme.extend(samples.iter().copied());
    }

    /// Entnimmt `n` Samples der Wiedergabe (mit Nullen aufgefuellt)
    /// und mischt laufende Klaenge hinein, wie es ein Geraete-Callback tut
    pub fn abspielen(&self, n: usize) -> Vec<i16> {
        let mut state = self.state.lock();
        let vorhanden = n.min(state.wiedergabe.len());
        let mut out: Vec<i16> = state.wiedergabe.drain(..vorhanden).collect();
        out.resize(n, 0);
        state.mixer.mix(&mut out);
        out
    }

    /// Anzahl noch nicht abgespielter Samples
    pub fn wiedergabe_ausstehend(&self) -> usize {
        self.state.lock().wiedergabe.len()
    }

    /// Laesst `start()` fehlschlagen solange `true`
    pub fn start_fehler(&self, fehler: bool) {
        self.state.lock().start_fehler = fehler;
    }

    pub fn laeuft(&self) -> bool {
        self.state.lock().running
    }

    /// Anzahl erfolgreicher Starts
    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    pub fn input_level(&self) -> f32 {
        self.state.lock().input_level
    }

    pub fn set_input_level(&self, level: f32) {
        self.state.lock().input_level = level;
    }
}

impl AudioDriver for MemoryDriver {
    fn start(&mut self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.running {
            return Ok(());
        }
        if state.start_fehler {
            return Err(AudioError::StreamFehler(
                "Geraet kann nicht geoeffnet werden".into(),
            ));
        }
        state.running = true;
        state.starts += 1;
        debug!("Speicher-Treiber gestartet");
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.running {
            state.running = false;
            debug!("Speicher-Treiber gestoppt");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn input(&mut self, buf: &mut [i16]) -> AudioResult<usize> {
        let n = buf.len();
        let mut state = self.state.lock();
        if !state.running || state.aufnahme.len() < n {
            return Ok(0);
        }
        for (ziel, s) in buf.iter_mut().zip(state.aufnahme.drain(..n)) {
            *ziel = s;
        }
        Ok(n)
    }

    fn output(&mut self, samples: &[i16]) -> AudioResult<()> {
        self.state.lock().wiedergabe.extend(samples.iter().copied());
        Ok(())
    }

    fn input_level(&self) -> f32 {
        self.state.lock().input_level
    }

    fn set_input_level(&mut self, level: f32) -> AudioResult<()> {
        self.state.lock().input_level = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn output_level(&self) -> f32 {
        self.state.lock().output_level
    }

    fn set_output_level(&mut self, level: f32) -> AudioResult<()> {
        self.state.lock().output_level = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn devices(&self) -> Vec<AudioDevice> {
        vec![
            AudioDevice {
                id: 0,
                name: "Speicher-Aufnahme".into(),
                capabilities: DeviceCaps::INPUT | DeviceCaps::INPUT_DEFAULT,
            },
            AudioDevice {
                id: 1,
                name: "Speicher-Wiedergabe".into(),
                capabilities: DeviceCaps::OUTPUT
                    | DeviceCaps::RING
                    | DeviceCaps::OUTPUT_DEFAULT
                    | DeviceCaps::RING_DEFAULT,
            },
        ]
    }

    fn selected_devices(&self) -> DeviceSelection {
        self.state.lock().auswahl
    }

    fn select_devices(&mut self, selection: DeviceSelection) -> AudioResult<()> {
        if !selection.gueltig(&self.devices()) {
            return Err(AudioError::GeraetNichtGefunden(format!("{selection:?}")));
        }
        self.state.lock().auswahl = selection;
        Ok(())
    }

    fn play_sound(&mut self, sound: Sound, ring: bool) -> i32 {
        self.state.lock().mixer.play(sound, ring)
    }

    fn stop_sound(&mut self, id: i32) -> bool {
        self.state.lock().mixer.stop(id)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eingabe_nur_vollstaendig() {
        let (mut driver, handle) = MemoryDriver::neu(8000);
        driver.start().unwrap();
        handle.eingabe_einspeisen(&[7; 100]);
        let mut buf = [0i16; 160];
        assert_eq!(driver.input(&mut buf).unwrap(), 0);
        handle.eingabe_einspeisen(&[7; 60]);
        assert_eq!(driver.input(&mut buf).unwrap(), 160);
        assert!(buf.iter().all(|&s| s == 7));
    }

    #[test]
    fn gestoppt_liefert_nichts() {
        let (mut driver, handle) = MemoryDriver::neu(8000);
        handle.eingabe_einspeisen(&[1; 160]);
        let mut buf = [0i16; 160];
        assert_eq!(driver.input(&mut buf).unwrap(), 0);
    }

    #[test]
    fn startfehler() {
        let (mut driver, handle) = MemoryDriver::neu(8000);
        handle.start_fehler(true);
        assert!(driver.start().is_err());
        assert!(!handle.laeuft());
        handle.start_fehler(false);
        driver.start().unwrap();
        assert_eq!(handle.starts(), 1);
    }

    #[test]
    fn wiedergabe_mit_klang() {
        let (mut driver, handle) = MemoryDriver::neu(8000);
        driver.output(&[10, 20]).unwrap();
        driver.play_sound(Sound::new(vec![1i16; 3], 0), false);
        assert_eq!(handle.abspielen(4), vec![11, 21, 1, 0]);
    }

    #[test]
    fn geraeteauswahl_wird_geprueft() {
        let (mut driver, _handle) = MemoryDriver::neu(8000);
        assert!(driver
            .select_devices(DeviceSelection {
                input: 1,
                output: 1,
                ring: 1
            })
            .is_err());
        assert_eq!(driver.selected_devices().output, 1);
    }
}
