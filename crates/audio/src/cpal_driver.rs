//! Audio-Treiber fuer echte Hardware via cpal
//!
//! Die cpal-Streams leben in einem eigenen Thread (`iaxc-audio`), weil sie
//! nicht auf allen Plattformen `Send` sind. Mit der Engine sind sie nur
//! ueber zwei Ring-Buffer verbunden: Aufnahme (Callback schreibt, Engine
//! liest) und Wiedergabe (Engine schreibt, Callback liest).

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use ringbuf::traits::Observer;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::device::{
    list_cpal_devices, load_cpal_input_device, load_cpal_output_device, AudioDevice,
    DeviceSelection,
};
use crate::driver::AudioDriver;
use crate::error::{AudioError, AudioResult};
use crate::ringbuffer::{read_samples, write_samples, RingBuffer, RingConsumer, RingProducer};
use crate::sound::{Sound, SoundMixer};

/// Ring-Buffer-Kapazitaet in Bytes je Richtung
const RING_BYTES: usize = 1 << 15;
/// Mehr gepufferte Wiedergabe als das wird verworfen
const MAX_AUSGABE_MS: usize = 80;

/// Gemeinsame Parameter zwischen Engine und Callbacks
struct Gemeinsam {
    input_level: Mutex<f32>,
    output_level: Mutex<f32>,
    mixer: Mutex<SoundMixer>,
}

struct LaufendeStreams {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
    aufnahme: RingConsumer,
    wiedergabe: RingProducer,
}

/// cpal-basierter Treiber
pub struct CpalDriver {
    sample_rate: u32,
    gemeinsam: Arc<Gemeinsam>,
    geraete: Vec<AudioDevice>,
    auswahl: DeviceSelection,
    laufend: Option<LaufendeStreams>,
}

impl CpalDriver {
    pub fn new(sample_rate: u32) -> AudioResult<Self> {
        let geraete = list_cpal_devices()?;
        let auswahl = DeviceSelection::standard(&geraete);
        info!(geraete = geraete.len(), sample_rate, "cpal-Treiber initialisiert");
        Ok(Self {
            sample_rate,
            gemeinsam: Arc::new(Gemeinsam {
                input_level: Mutex::new(1.0),
                output_level: Mutex::new(1.0),
                mixer: Mutex::new(SoundMixer::new()),
            }),
            geraete,
            auswahl,
            laufend: None,
        })
    }

    fn geraetename(&self, id: usize) -> Option<String> {
        self.geraete.iter().find(|d| d.id == id).map(|d| d.name.clone())
    }
}

impl AudioDriver for CpalDriver {
    fn start(&mut self) -> AudioResult<()> {
        if self.laufend.is_some() {
            return Ok(());
        }

        let (aufnahme_prod, aufnahme_cons) = RingBuffer::new(RING_BYTES)?.split();
        let (wiedergabe_prod, wiedergabe_cons) = RingBuffer::new(RING_BYTES)?.split();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (bereit_tx, bereit_rx) = bounded::<Result<(), String>>(1);

        let eingabe = self.geraetename(self.auswahl.input);
        let ausgabe = self.geraetename(self.auswahl.output);
        let gemeinsam = Arc::clone(&self.gemeinsam);
        let sample_rate = self.sample_rate;

        let thread = std::thread::Builder::new()
            .name("iaxc-audio".to_string())
            .spawn(move || {
                let streams = streams_oeffnen(
                    eingabe.as_deref(),
                    ausgabe.as_deref(),
                    sample_rate,
                    aufnahme_prod,
                    wiedergabe_cons,
                    gemeinsam,
                );
                match streams {
                    Ok(_streams) => {
                        let _ = bereit_tx.send(Ok(()));
                        // Streams bleiben bis zum Stopp-Signal am Leben
                        let _ = stop_rx.recv();
                        debug!("Audio-Streams geschlossen");
                    }
                    Err(e) => {
                        let _ = bereit_tx.send(Err(e.to_string()));
                    }
                }
            })
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

        match bereit_rx.recv() {
            Ok(Ok(())) => {
                self.laufend = Some(LaufendeStreams {
                    stop_tx,
                    thread,
                    aufnahme: aufnahme_cons,
                    wiedergabe: wiedergabe_prod,
                });
                info!("cpal-Treiber gestartet");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(AudioError::StreamFehler(e))
            }
            Err(e) => {
                let _ = thread.join();
                Err(AudioError::StreamFehler(e.to_string()))
            }
        }
    }

    fn stop(&mut self) -> AudioResult<()> {
        if let Some(laufend) = self.laufend.take() {
            let _ = laufend.stop_tx.send(());
            if laufend.thread.join().is_err() {
                error!("Audio-Thread ist abgestuerzt");
            }
            info!("cpal-Treiber gestoppt");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.laufend.is_some()
    }

    fn input(&mut self, buf: &mut [i16]) -> AudioResult<usize> {
        let Some(laufend) = self.laufend.as_mut() else {
            return Ok(0);
        };
        if laufend.aufnahme.occupied_len() < buf.len() * 2 {
            return Ok(0);
        }
        Ok(read_samples(&mut laufend.aufnahme, buf))
    }

    fn output(&mut self, samples: &[i16]) -> AudioResult<()> {
        let Some(laufend) = self.laufend.as_mut() else {
            return Ok(());
        };
        let max_bytes = self.sample_rate as usize * MAX_AUSGABE_MS / 1000 * 2;
        if laufend.wiedergabe.occupied_len() > max_bytes {
            trace!("Wiedergabe-Puffer voll, Block verworfen");
            return Ok(());
        }
        let geschrieben = write_samples(&mut laufend.wiedergabe, samples);
        if geschrieben < samples.len() {
            warn!(
                "Wiedergabe Ring-Buffer voll, {} Samples verworfen",
                samples.len() - geschrieben
            );
        }
        Ok(())
    }

    fn input_level(&self) -> f32 {
        *self.gemeinsam.input_level.lock()
    }

    fn set_input_level(&mut self, level: f32) -> AudioResult<()> {
        *self.gemeinsam.input_level.lock() = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn output_level(&self) -> f32 {
        *self.gemeinsam.output_level.lock()
    }

    fn set_output_level(&mut self, level: f32) -> AudioResult<()> {
        *self.gemeinsam.output_level.lock() = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn devices(&self) -> Vec<AudioDevice> {
        self.geraete.clone()
    }

    fn selected_devices(&self) -> DeviceSelection {
        self.auswahl
    }

    fn select_devices(&mut self, selection: DeviceSelection) -> AudioResult<()> {
        if !selection.gueltig(&self.geraete) {
            return Err(AudioError::GeraetNichtGefunden(format!("{selection:?}")));
        }
        self.auswahl = selection;
        // Laufende Streams mit den neuen Geraeten neu oeffnen
        if self.laufend.is_some() {
            self.stop()?;
            self.start()?;
        }
        Ok(())
    }

    fn play_sound(&mut self, sound: Sound, ring: bool) -> i32 {
        self.gemeinsam.mixer.lock().play(sound, ring)
    }

    fn stop_sound(&mut self, id: i32) -> bool {
        self.gemeinsam.mixer.lock().stop(id)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn stream_config(sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn streams_oeffnen(
    eingabe: Option<&str>,
    ausgabe: Option<&str>,
    sample_rate: u32,
    aufnahme: RingProducer,
    wiedergabe: RingConsumer,
    gemeinsam: Arc<Gemeinsam>,
) -> AudioResult<(Stream, Stream)> {
    let eingabe = load_cpal_input_device(eingabe)?;
    let ausgabe = load_cpal_output_device(ausgabe)?;
    let capture = capture_stream(&eingabe, sample_rate, aufnahme, Arc::clone(&gemeinsam))?;
    let playback = playback_stream(&ausgabe, sample_rate, wiedergabe, gemeinsam)?;
    capture
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    playback
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    debug!("Audio-Streams geoeffnet: {}Hz mono", sample_rate);
    Ok((capture, playback))
}

fn capture_stream(
    device: &Device,
    sample_rate: u32,
    mut producer: RingProducer,
    gemeinsam: Arc<Gemeinsam>,
) -> AudioResult<Stream> {
    let err_fn = |err| error!("Capture-Fehler: {}", err);
    let sample_format = device
        .default_input_config()
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config(sample_rate),
            move |data: &[f32], _| {
                let gain = *gemeinsam.input_level.lock();
                let samples: Vec<i16> = data
                    .iter()
                    .map(|&s| (s * gain * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
                    .collect();
                if write_samples(&mut producer, &samples) < samples.len() {
                    warn!("Capture Ring-Buffer voll");
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config(sample_rate),
            move |data: &[i16], _| {
                let gain = *gemeinsam.input_level.lock();
                let samples: Vec<i16> = data
                    .iter()
                    .map(|&s| (s as f32 * gain) as i16)
                    .collect();
                if write_samples(&mut producer, &samples) < samples.len() {
                    warn!("Capture Ring-Buffer voll");
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                sample_format
            )))
        }
    };
    stream.map_err(|e| AudioError::StreamFehler(e.to_string()))
}

fn playback_stream(
    device: &Device,
    sample_rate: u32,
    mut consumer: RingConsumer,
    gemeinsam: Arc<Gemeinsam>,
) -> AudioResult<Stream> {
    let err_fn = |err| error!("Playback-Fehler: {}", err);
    let sample_format = device
        .default_output_config()
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    // Liest aus dem Ring, fuellt Luecken mit Stille, mischt Klaenge
    let mut naechster_block = move |n: usize| -> (Vec<i16>, f32) {
        let mut block = vec![0i16; n];
        read_samples(&mut consumer, &mut block);
        gemeinsam.mixer.lock().mix(&mut block);
        (block, *gemeinsam.output_level.lock())
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config(sample_rate),
            move |data: &mut [f32], _| {
                let (block, gain) = naechster_block(data.len());
                for (out, s) in data.iter_mut().zip(block) {
                    *out = s as f32 / i16::MAX as f32 * gain;
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config(sample_rate),
            move |data: &mut [i16], _| {
                let (block, gain) = naechster_block(data.len());
                for (out, s) in data.iter_mut().zip(block) {
                    *out = (s as f32 * gain) as i16;
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                sample_format
            )))
        }
    };
    stream.map_err(|e| AudioError::StreamFehler(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn treiber_starten_und_stoppen() {
        let mut driver = CpalDriver::new(8000).expect("Treiber sollte erstellbar sein");
        driver.start().expect("Start sollte gelingen");
        assert!(driver.is_running());
        driver.output(&[0; 160]).unwrap();
        driver.stop().unwrap();
        assert!(!driver.is_running());
    }
}
