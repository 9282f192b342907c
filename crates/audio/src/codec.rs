//! Sprach-Codecs
//!
//! Jeder Codec implementiert das [`Codec`] Trait und gehoert genau einem
//! Anruf (Encoder und Decoder sind getrennte Instanzen). Mitgeliefert werden
//! G.711 u-law/A-law und Signed Linear; weitere Codecs werden ueber die
//! [`CodecRegistry`] eingehaengt.
//!
//! Dekodieren einer leeren Eingabe erzeugt Ersatz-Audio fuer verlorene
//! Pakete (Packet Loss Concealment).

use iaxc_core::Format;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

use crate::error::{AudioError, AudioResult};

/// Samples pro Dekodier-Aufruf (20 ms bei 8 kHz)
pub const DECODE_BLOCK: usize = 160;

/// Encode/Decode-Vertrag eines Sprach-Codecs
pub trait Codec: Send {
    /// Format-Bit dieses Codecs
    fn format(&self) -> Format;

    /// Kleinste sinnvolle Rahmengroesse in Samples
    fn minimum_frame_size(&self) -> usize;

    /// Kodiert `input` und haengt die Bytes an `out` an.
    /// Gibt die Anzahl verbrauchter Samples zurueck.
    fn encode(&mut self, input: &[i16], out: &mut Vec<u8>) -> AudioResult<usize>;

    /// Dekodiert einen Teil von `input` und haengt die Samples an `out` an.
    /// Gibt die Anzahl verbrauchter Bytes zurueck; ein Aufruf darf nur
    /// einen Teil der Eingabe verbrauchen. Leere Eingabe erzeugt PLC-Audio.
    fn decode(&mut self, input: &[u8], out: &mut Vec<i16>) -> AudioResult<usize>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("format", &self.format())
            .field("minimum_frame_size", &self.minimum_frame_size())
            .finish()
    }
}

/// Verschleierung verlorener Pakete: letzten Block gedaempft wiederholen
#[derive(Debug, Default)]
struct Plc {
    letzter_block: Vec<i16>,
}

impl Plc {
    fn merken(&mut self, block: &[i16]) {
        self.letzter_block.clear();
        self.letzter_block.extend_from_slice(block);
    }

    fn ersatz(&mut self, out: &mut Vec<i16>) {
        if self.letzter_block.is_empty() {
            out.extend(std::iter::repeat(0).take(DECODE_BLOCK));
            return;
        }
        // Jede Wiederholung halbiert die Amplitude
        for s in self.letzter_block.iter_mut() {
            *s /= 2;
        }
        out.extend_from_slice(&self.letzter_block);
    }
}

// ---------------------------------------------------------------------------
// G.711
// ---------------------------------------------------------------------------

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Linear 16 Bit -> u-law
pub fn linear_zu_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let vorzeichen = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7;
    let mut maske = 0x4000;
    while exponent > 0 && pcm & maske == 0 {
        exponent -= 1;
        maske >>= 1;
    }
    let mantisse = (pcm >> (exponent + 3)) & 0x0F;
    !(vorzeichen | (exponent << 4) | mantisse) as u8
}

/// u-law -> linear 16 Bit
pub fn ulaw_zu_linear(byte: u8) -> i16 {
    let u = !byte;
    let vorzeichen = u & 0x80;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantisse = (u & 0x0F) as i32;
    let betrag = (((mantisse << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if vorzeichen != 0 {
        -betrag as i16
    } else {
        betrag as i16
    }
}

/// Linear 16 Bit -> A-law
pub fn linear_zu_alaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 3;
    let maske = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let segment_enden = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];
    let segment = segment_enden
        .iter()
        .position(|&ende| pcm <= ende)
        .unwrap_or(8);

    let wert = if segment >= 8 {
        0x7F
    } else {
        let verschiebung = if segment < 2 { 1 } else { segment };
        ((segment as i32) << 4) | ((pcm >> verschiebung) & 0x0F)
    };
    (wert ^ maske) as u8
}

/// A-law -> linear 16 Bit
pub fn alaw_zu_linear(byte: u8) -> i16 {
    let a = (byte ^ 0x55) as i32;
    let mut t = (a & 0x0F) << 4;
    let segment = (a & 0x70) >> 4;
    match segment {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= segment - 1;
        }
    }
    if a & 0x80 != 0 {
        t as i16
    } else {
        -t as i16
    }
}

/// G.711 u-law
#[derive(Debug, Default)]
pub struct UlawCodec {
    plc: Plc,
}

impl Codec for UlawCodec {
    fn format(&self) -> Format {
        Format::ULAW
    }

    fn minimum_frame_size(&self) -> usize {
        1
    }

    fn encode(&mut self, input: &[i16], out: &mut Vec<u8>) -> AudioResult<usize> {
        out.extend(input.iter().map(|&s| linear_zu_ulaw(s)));
        Ok(input.len())
    }

    fn decode(&mut self, input: &[u8], out: &mut Vec<i16>) -> AudioResult<usize> {
        if input.is_empty() {
            self.plc.ersatz(out);
            return Ok(0);
        }
        let n = input.len().min(DECODE_BLOCK);
        let start = out.len();
        out.extend(input[..n].iter().map(|&b| ulaw_zu_linear(b)));
        self.plc.merken(&out[start..]);
        Ok(n)
    }
}

/// G.711 A-law
#[derive(Debug, Default)]
pub struct AlawCodec {
    plc: Plc,
}

impl Codec for AlawCodec {
    fn format(&self) -> Format {
        Format::ALAW
    }

    fn minimum_frame_size(&self) -> usize {
        1
    }

    fn encode(&mut self, input: &[i16], out: &mut Vec<u8>) -> AudioResult<usize> {
        out.extend(input.iter().map(|&s| linear_zu_alaw(s)));
        Ok(input.len())
    }

    fn decode(&mut self, input: &[u8], out: &mut Vec<i16>) -> AudioResult<usize> {
        if input.is_empty() {
            self.plc.ersatz(out);
            return Ok(0);
        }
        let n = input.len().min(DECODE_BLOCK);
        let start = out.len();
        out.extend(input[..n].iter().map(|&b| alaw_zu_linear(b)));
        self.plc.merken(&out[start..]);
        Ok(n)
    }
}

/// Signed Linear, 16 Bit little endian
#[derive(Debug, Default)]
pub struct SlinearCodec {
    plc: Plc,
}

impl Codec for SlinearCodec {
    fn format(&self) -> Format {
        Format::SLINEAR
    }

    fn minimum_frame_size(&self) -> usize {
        1
    }

    fn encode(&mut self, input: &[i16], out: &mut Vec<u8>) -> AudioResult<usize> {
        out.reserve(input.len() * 2);
        for s in input {
            out.extend_from_slice(&s.to_le_bytes());
        }
        Ok(input.len())
    }

    fn decode(&mut self, input: &[u8], out: &mut Vec<i16>) -> AudioResult<usize> {
        if input.is_empty() {
            self.plc.ersatz(out);
            return Ok(0);
        }
        if input.len() < 2 {
            return Err(AudioError::CodecFehler(
                "Signed Linear: unvollstaendiges Sample".into(),
            ));
        }
        let n = (input.len() / 2).min(DECODE_BLOCK);
        let start = out.len();
        out.extend(
            input[..n * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        self.plc.merken(&out[start..]);
        Ok(n * 2)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type CodecFabrik = Box<dyn Fn() -> Box<dyn Codec> + Send + Sync>;

/// Bildet Format-Bits auf Codec-Konstruktoren ab
pub struct CodecRegistry {
    fabriken: BTreeMap<u32, CodecFabrik>,
}

impl CodecRegistry {
    /// Leere Registry
    pub fn leer() -> Self {
        Self {
            fabriken: BTreeMap::new(),
        }
    }

    /// Registry mit den eingebauten Codecs
    pub fn standard() -> Self {
        let mut registry = Self::leer();
        registry.registrieren(Format::ULAW, || Box::new(UlawCodec::default()));
        registry.registrieren(Format::ALAW, || Box::new(AlawCodec::default()));
        registry.registrieren(Format::SLINEAR, || Box::new(SlinearCodec::default()));
        registry
    }

    /// Haengt einen Codec fuer ein einzelnes Format-Bit ein
    pub fn registrieren<F>(&mut self, format: Format, fabrik: F)
    where
        F: Fn() -> Box<dyn Codec> + Send + Sync + 'static,
    {
        self.fabriken.insert(format.bits(), Box::new(fabrik));
    }

    /// Alle Formate, fuer die ein Codec gebaut werden kann
    pub fn formate(&self) -> Format {
        self.fabriken
            .keys()
            .fold(Format::NONE, |acc, &bits| acc | Format(bits))
    }

    /// Erzeugt eine neue Codec-Instanz
    pub fn erzeugen(&self, format: Format) -> AudioResult<Box<dyn Codec>> {
        let fabrik = self
            .fabriken
            .get(&format.bits())
            .ok_or(AudioError::CodecNichtVerfuegbar(format))?;
        trace!(%format, "Codec erzeugt");
        Ok(fabrik())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
