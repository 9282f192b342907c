//! Gemeinsame Identifikations- und Flag-Typen
//!
//! Alle IDs und Bitmasken verwenden das Newtype-Pattern, damit Anruf-Nummern,
//! Registrierungs-IDs und Formatmasken zur Compilezeit nicht verwechselt
//! werden koennen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Index eines Anruf-Slots in der festen Anruftabelle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub usize);

impl CallId {
    /// Gibt den Tabellenindex zurueck
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kennung einer Registrierung (fortlaufend ab 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub u32);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Bitmaske von Audio- und Video-Formaten
///
/// Die Bits 0..15 sind Audio-Codecs, die Bits 16..24 Video-Codecs. Eine
/// einzelne ausgehandelte Codec-Wahl ist immer genau ein gesetztes Bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Format(pub u32);

impl Format {
    pub const NONE: Format = Format(0);

    pub const G723_1: Format = Format(1 << 0);
    pub const GSM: Format = Format(1 << 1);
    pub const ULAW: Format = Format(1 << 2);
    pub const ALAW: Format = Format(1 << 3);
    pub const G726: Format = Format(1 << 4);
    pub const ADPCM: Format = Format(1 << 5);
    pub const SLINEAR: Format = Format(1 << 6);
    pub const LPC10: Format = Format(1 << 7);
    pub const G729A: Format = Format(1 << 8);
    pub const SPEEX: Format = Format(1 << 9);
    pub const ILBC: Format = Format(1 << 10);

    pub const JPEG: Format = Format(1 << 16);
    pub const PNG: Format = Format(1 << 17);
    pub const H261: Format = Format(1 << 18);
    pub const H263: Format = Format(1 << 19);
    pub const H263_PLUS: Format = Format(1 << 20);
    pub const H264: Format = Format(1 << 21);
    pub const MPEG4: Format = Format(1 << 22);
    pub const THEORA: Format = Format(1 << 24);

    /// Alle Audio-Bits
    pub const AUDIO_MASK: Format = Format((1 << 16) - 1);
    /// Alle Video-Bits
    pub const VIDEO_MASK: Format = Format(((1 << 25) - 1) & !((1 << 16) - 1));

    /// Tabelle der benannten Formate (Name fuer Konfiguration und Logs)
    const NAMEN: [(Format, &'static str); 19] = [
        (Format::G723_1, "g723.1"),
        (Format::GSM, "gsm"),
        (Format::ULAW, "ulaw"),
        (Format::ALAW, "alaw"),
        (Format::G726, "g726"),
        (Format::ADPCM, "adpcm"),
        (Format::SLINEAR, "slinear"),
        (Format::LPC10, "lpc10"),
        (Format::G729A, "g729a"),
        (Format::SPEEX, "speex"),
        (Format::ILBC, "ilbc"),
        (Format::JPEG, "jpeg"),
        (Format::PNG, "png"),
        (Format::H261, "h261"),
        (Format::H263, "h263"),
        (Format::H263_PLUS, "h263+"),
        (Format::H264, "h264"),
        (Format::MPEG4, "mpeg4"),
        (Format::THEORA, "theora"),
    ];

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// true wenn alle Bits von `other` gesetzt sind
    pub fn contains(&self, other: Format) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    /// true wenn mindestens ein Bit gemeinsam ist
    pub fn intersects(&self, other: Format) -> bool {
        self.0 & other.0 != 0
    }

    /// Nur die Audio-Bits
    pub fn audio(&self) -> Format {
        *self & Format::AUDIO_MASK
    }

    /// Nur die Video-Bits
    pub fn video(&self) -> Format {
        *self & Format::VIDEO_MASK
    }

    /// Liefert das Format zu einem Konfigurationsnamen (Gross-/Kleinschreibung egal)
    pub fn aus_name(name: &str) -> Option<Format> {
        let name = name.trim().to_ascii_lowercase();
        Self::NAMEN
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(f, _)| *f)
    }

    /// Name eines einzelnen Formats, `None` bei Masken oder unbekannten Bits
    pub fn name(&self) -> Option<&'static str> {
        Self::NAMEN
            .iter()
            .find(|(f, _)| f == self)
            .map(|(_, n)| *n)
    }

    /// Zerlegt die Maske in ihre einzelnen bekannten Formate
    pub fn einzelformate(&self) -> Vec<Format> {
        Self::NAMEN
            .iter()
            .map(|(f, _)| *f)
            .filter(|f| self.contains(*f))
            .collect()
    }
}

impl BitAnd for Format {
    type Output = Format;
    fn bitand(self, rhs: Format) -> Format {
        Format(self.0 & rhs.0)
    }
}

impl BitOr for Format {
    type Output = Format;
    fn bitor(self, rhs: Format) -> Format {
        Format(self.0 | rhs.0)
    }
}

impl BitOrAssign for Format {
    fn bitor_assign(&mut self, rhs: Format) {
        self.0 |= rhs.0;
    }
}

impl Not for Format {
    type Output = Format;
    fn not(self) -> Format {
        Format(!self.0)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        let namen: Vec<&str> = self.einzelformate().iter().filter_map(|f| f.name()).collect();
        if namen.is_empty() {
            write!(f, "0x{:x}", self.0)
        } else {
            f.write_str(&namen.join("|"))
        }
    }
}

// ---------------------------------------------------------------------------
// Filter- und Audio-Flags
// ---------------------------------------------------------------------------

/// Aktivierte Signalverarbeitungs-Stufen der Eingangsseite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filters(pub u32);

impl Filters {
    pub const DENOISE: Filters = Filters(1 << 0);
    pub const AGC: Filters = Filters(1 << 1);
    pub const ECHO: Filters = Filters(1 << 2);
    /// Analoge (Mixer-basierte) Verstaerkungsregelung
    pub const AAGC: Filters = Filters(1 << 3);
    /// Comfort-Noise-Marker bei Stille senden
    pub const CN: Filters = Filters(1 << 4);

    pub fn contains(&self, other: Filters) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn aus_name(name: &str) -> Option<Filters> {
        match name.trim().to_ascii_lowercase().as_str() {
            "denoise" => Some(Self::DENOISE),
            "agc" => Some(Self::AGC),
            "echo" => Some(Self::ECHO),
            "aagc" => Some(Self::AAGC),
            "cn" => Some(Self::CN),
            _ => None,
        }
    }
}

impl BitOr for Filters {
    type Output = Filters;
    fn bitor(self, rhs: Filters) -> Filters {
        Filters(self.0 | rhs.0)
    }
}

/// Welche Audio-Puffer der Anwendung zusaetzlich als Ereignis gemeldet werden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioPrefs(pub u32);

impl AudioPrefs {
    pub const RECV_LOCAL_RAW: AudioPrefs = AudioPrefs(1 << 0);
    pub const RECV_LOCAL_ENCODED: AudioPrefs = AudioPrefs(1 << 1);
    pub const RECV_REMOTE_RAW: AudioPrefs = AudioPrefs(1 << 2);
    pub const RECV_REMOTE_ENCODED: AudioPrefs = AudioPrefs(1 << 3);
    /// Kein Audio ins Netz senden
    pub const SEND_DISABLE: AudioPrefs = AudioPrefs(1 << 4);

    pub fn contains(&self, other: AudioPrefs) -> bool {
        self.0 & other.0 == other.0
    }

    /// true wenn lokales Audio (roh oder kodiert) gemeldet werden soll
    pub fn will_lokal(&self) -> bool {
        self.contains(Self::RECV_LOCAL_RAW) || self.contains(Self::RECV_LOCAL_ENCODED)
    }
}

impl BitOr for AudioPrefs {
    type Output = AudioPrefs;
    fn bitor(self, rhs: AudioPrefs) -> AudioPrefs {
        AudioPrefs(self.0 | rhs.0)
    }
}
