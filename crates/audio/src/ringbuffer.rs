//! Lock-free Byte-Ring-Buffer
//!
//! Ein Schreiber, ein Leser. Die Kapazitaet muss eine Zweierpotenz sein.
//! Schreiben und Lesen sind jeweils durch den verfuegbaren Platz begrenzt;
//! ein Zugriff ueber das physische Pufferende wird intern in zwei Bereiche
//! aufgeteilt. Die Speicherordnung (Daten vor Index veroeffentlichen)
//! uebernimmt `ringbuf`.
//!
//! Fuer die Nutzung ueber Thread-Grenzen hinweg wird der Puffer mit
//! [`RingBuffer::split`] in Produzent und Konsument zerlegt.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::{AudioError, AudioResult};

/// Schreibende Haelfte eines geteilten Ring-Buffers
pub type RingProducer = HeapProd<u8>;
/// Lesende Haelfte eines geteilten Ring-Buffers
pub type RingConsumer = HeapCons<u8>;

/// Bytes pro 16-Bit-Sample
const SAMPLE_BYTES: usize = 2;

/// SPSC Byte-Queue mit Zweierpotenz-Kapazitaet
pub struct RingBuffer {
    producer: RingProducer,
    consumer: RingConsumer,
}

impl RingBuffer {
    /// Erstellt einen leeren Ring-Buffer
    pub fn new(capacity: usize) -> AudioResult<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(AudioError::KeineZweierpotenz(capacity));
        }
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        Ok(Self { producer, consumer })
    }

    /// Schreibt so viele Bytes wie Platz ist, gibt die Anzahl zurueck
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.producer.push_slice(data)
    }

    /// Liest hoechstens `buf.len()` Bytes, gibt die Anzahl zurueck
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.consumer.pop_slice(buf)
    }

    pub fn write_available(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn read_available(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }

    /// Verwirft alle gepufferten Bytes
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    /// Schreibt 16-Bit-Samples (little endian), nur vollstaendige Samples
    pub fn write_samples(&mut self, samples: &[i16]) -> usize {
        write_samples(&mut self.producer, samples)
    }

    /// Liest 16-Bit-Samples (little endian), nur vollstaendige Samples
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        read_samples(&mut self.consumer, out)
    }

    /// Zerlegt den Puffer in Produzent und Konsument
    pub fn split(self) -> (RingProducer, RingConsumer) {
        (self.producer, self.consumer)
    }
}

/// Schreibt Samples in einen Produzenten; verworfen wird, was nicht passt
pub fn write_samples(producer: &mut RingProducer, samples: &[i16]) -> usize {
    let platz = producer.vacant_len() / SAMPLE_BYTES;
    let anzahl = samples.len().min(platz);
    let mut chunk = [0u8; 512];
    for block in samples[..anzahl].chunks(chunk.len() / SAMPLE_BYTES) {
        for (i, s) in block.iter().enumerate() {
            chunk[i * SAMPLE_BYTES..(i + 1) * SAMPLE_BYTES].copy_from_slice(&s.to_le_bytes());
        }
        producer.push_slice(&chunk[..block.len() * SAMPLE_BYTES]);
    }
    anzahl
}

/// Liest Samples aus einem Konsumenten
pub fn read_samples(consumer: &mut RingConsumer, out: &mut [i16]) -> usize {
    let vorhanden = consumer.occupied_len() / SAMPLE_BYTES;
    let anzahl = out.len().min(vorhanden);
    let mut chunk = [0u8; 512];
    for block in out[..anzahl].chunks_mut(chunk.len() / SAMPLE_BYTES) {
        let bytes = block.len() * SAMPLE_BYTES;
        consumer.pop_slice(&mut chunk[..bytes]);
        for (i, s) in block.iter_mut().enumerate() {
            *s = i16::from_le_bytes([chunk[i * SAMPLE_BYTES], chunk[i * SAMPLE_BYTES + 1]]);
        }
    }
    anzahl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kapazitaet_muss_zweierpotenz_sein() {
        assert!(matches!(
            RingBuffer::new(1000),
            Err(AudioError::KeineZweierpotenz(1000))
        ));
        assert!(RingBuffer::new(0).is_err());
        assert_eq!(RingBuffer::new(1024).unwrap().capacity(), 1024);
    }

    #[test]
    fn schreiben_begrenzt_durch_platz() {
        let mut rb = RingBuffer::new(8).unwrap();
        assert_eq!(rb.write(&[1; 12]), 8);
        assert_eq!(rb.write_available(), 0);
        assert_eq!(rb.read_available(), 8);
    }

    #[test]
    fn rundlauf_ueber_pufferende() {
        let mut rb = RingBuffer::new(16).unwrap();
        // Indizes nahe ans Ende schieben
        let mut muell = [0u8; 11];
        rb.write(&[0xAA; 11]);
        assert_eq!(rb.read(&mut muell), 11);

        for n in 1..=16usize {
            let daten: Vec<u8> = (0..n as u8).map(|b| b.wrapping_mul(7)).collect();
            assert_eq!(rb.write(&daten), n);
            let mut gelesen = vec![0u8; n];
            assert_eq!(rb.read(&mut gelesen), n);
            assert_eq!(gelesen, daten, "n = {n}");
            assert_eq!(rb.read_available(), 0);
        }
    }

    #[test]
    fn lesen_aus_leerem_puffer() {
        let mut rb = RingBuffer::new(64).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(rb.read(&mut buf), 0);
    }

    #[test]
    fn samples_little_endian() {
        let mut rb = RingBuffer::new(1024).unwrap();
        let samples: Vec<i16> = (-300..300).step_by(3).collect();
        assert_eq!(rb.write_samples(&samples), samples.len());
        assert_eq!(rb.read_available(), samples.len() * 2);

        let mut roh = [0u8; 2];
        rb.read(&mut roh);
        assert_eq!(i16::from_le_bytes(roh), -300);

        let mut rest = vec![0i16; samples.len() - 1];
        assert_eq!(rb.read_samples(&mut rest), samples.len() - 1);
        assert_eq!(&rest[..], &samples[1..]);
    }

    #[test]
    fn geteilt_ueber_threads() {
        let rb = RingBuffer::new(4096).unwrap();
        let (mut prod, mut cons) = rb.split();
        let schreiber = std::thread::spawn(move || {
            let mut gesendet = 0i16;
            while gesendet < 2000 {
                let block: Vec<i16> = (gesendet..gesendet + 100).collect();
                let mut offset = 0;
                while offset < block.len() {
                    offset += write_samples(&mut prod, &block[offset..]);
                }
                gesendet += 100;
            }
        });

        let mut erwartet = 0i16;
        let mut buf = [0i16; 64];
        while erwartet < 2000 {
            let n = read_samples(&mut cons, &mut buf);
            for s in &buf[..n] {
                assert_eq!(*s, erwartet);
                erwartet += 1;
            }
        }
        schreiber.join().unwrap();
    }
}
