//! Frame-Slicer und -Assembler
//!
//! Teilt uebergrosse Frames (typisch Video) in UDP-taugliche Slices und setzt
//! sie beim Empfaenger wieder zusammen. Verlust und Umsortierung werden
//! toleriert: ein unvollstaendiger Frame wird verworfen, nie falsch geliefert.
//!
//! ## Slice-Header (6 Bytes)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version (immer 0)
//!  1       2   Source-ID (big-endian), aendert sich bei Stream-Neustart
//!  3       1   Frame-Index (untere 4 Bits, laeuft ueber)
//!  4       1   Slice-Index
//!  5       1   Anzahl Slices des Frames
//!  6+      N   Nutzdaten
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{ProtocolError, ProtocolResult};

/// Aktuelle Slice-Header-Version
pub const SLICE_VERSION: u8 = 0;

/// Maximale Groesse eines zusammengesetzten Frames
pub const MAX_FRAME_SIZE: usize = 48 * 1024;

/// Standard-Nutzlast pro Slice
pub const STANDARD_SLICE_GROESSE: usize = 1200;

// ---------------------------------------------------------------------------
// SliceHeader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub version: u8,
    pub source_id: u16,
    pub frame_index: u8,
    pub slice_index: u8,
    pub slice_count: u8,
}

impl SliceHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = 6;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let id = self.source_id.to_be_bytes();
        [
            self.version,
            id[0],
            id[1],
            self.frame_index & 0x0f,
            self.slice_index,
            self.slice_count,
        ]
    }

    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::UngueltigesSlice(format!(
                "Header zu kurz: {} Bytes (erwartet {})",
                buf.len(),
                Self::SIZE
            )));
        }
        if buf[0] != SLICE_VERSION {
            return Err(ProtocolError::UngueltigesSlice(format!(
                "Ungueltige Version: {} (erwartet {})",
                buf[0], SLICE_VERSION
            )));
        }
        let header = Self {
            version: buf[0],
            source_id: u16::from_be_bytes([buf[1], buf[2]]),
            frame_index: buf[3] & 0x0f,
            slice_index: buf[4],
            slice_count: buf[5],
        };
        if header.slice_count == 0 || header.slice_index >= header.slice_count {
            return Err(ProtocolError::UngueltigesSlice(format!(
                "Slice {} von {}",
                header.slice_index, header.slice_count
            )));
        }
        Ok(header)
    }
}

// ---------------------------------------------------------------------------
// FrameSlicer
// ---------------------------------------------------------------------------

/// Zerlegt Frames in Slices mit fortlaufendem Frame-Index
#[derive(Debug, Clone)]
pub struct FrameSlicer {
    source_id: u16,
    frame_index: u8,
    slice_size: usize,
}

impl FrameSlicer {
    pub fn new(source_id: u16, slice_size: usize) -> Self {
        Self {
            source_id,
            frame_index: 0,
            slice_size: slice_size.max(1),
        }
    }

    /// Neue Source-ID, z.B. nach Kamerawechsel
    pub fn set_source_id(&mut self, source_id: u16) {
        self.source_id = source_id;
    }

    pub fn source_id(&self) -> u16 {
        self.source_id
    }

    /// Index, den der naechste Frame bekommt
    pub fn frame_index(&self) -> u8 {
        self.frame_index
    }

    /// Zerlegt `data` in `ceil(len / slice_size)` Slices
    ///
    /// Der Frame-Index steigt pro Aufruf genau einmal (mod 16), egal wie
    /// viele Slices entstehen.
    pub fn slice(&mut self, data: &[u8]) -> ProtocolResult<Vec<Bytes>> {
        if data.is_empty() {
            return Err(ProtocolError::UngueltigesSlice("leerer Frame".into()));
        }
        if data.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameZuGross {
                groesse: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let count = (data.len() - 1) / self.slice_size + 1;
        let slice_count = u8::try_from(count).map_err(|_| {
            ProtocolError::UngueltigesSlice(format!("{count} Slices passen nicht in den Header"))
        })?;

        let mut slices = Vec::with_capacity(count);
        for (index, chunk) in data.chunks(self.slice_size).enumerate() {
            let header = SliceHeader {
                version: SLICE_VERSION,
                source_id: self.source_id,
                frame_index: self.frame_index,
                slice_index: index as u8,
                slice_count,
            };
            let mut buf = BytesMut::with_capacity(SliceHeader::SIZE + chunk.len());
            buf.put_slice(&header.encode());
            buf.put_slice(chunk);
            slices.push(buf.freeze());
        }

        trace!(
            frame_index = self.frame_index,
            slices = count,
            bytes = data.len(),
            "Frame zerlegt"
        );
        self.frame_index = (self.frame_index + 1) & 0x0f;
        Ok(slices)
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Setzt Slices wieder zu Frames zusammen
#[derive(Debug)]
pub struct FrameAssembler {
    slice_size: usize,
    source_id: Option<u16>,
    frame_index: u8,
    buffer: Vec<u8>,
    received: Vec<bool>,
    received_count: usize,
    slice_count: u8,
    frame_len: Option<usize>,
}

impl FrameAssembler {
    pub fn new(slice_size: usize) -> Self {
        Self {
            slice_size: slice_size.max(1),
            source_id: None,
            frame_index: 0,
            buffer: vec![0; MAX_FRAME_SIZE],
            received: Vec::new(),
            received_count: 0,
            slice_count: 0,
            frame_len: None,
        }
    }

    fn frame_verwerfen(&mut self) {
        self.received.clear();
        self.received_count = 0;
        self.slice_count = 0;
        self.frame_len = None;
    }

    /// Verarbeitet ein Slice, liefert den Frame sobald er vollstaendig ist
    ///
    /// Veraltete Slices (Frame-Abstand > 8) werden still verworfen. Ein
    /// neuer Frame-Index verwirft den unvollstaendigen Frame in Arbeit.
    pub fn assemble(&mut self, packet: &[u8]) -> ProtocolResult<Option<Vec<u8>>> {
        let header = SliceHeader::decode(packet)?;
        let payload = &packet[SliceHeader::SIZE..];

        if self.source_id != Some(header.source_id) {
            if self.source_id.is_some() {
                debug!(
                    alt = ?self.source_id,
                    neu = header.source_id,
                    "Stream-Neustart, verwerfe Frame in Arbeit"
                );
            }
            self.source_id = Some(header.source_id);
            self.frame_index = header.frame_index;
            self.frame_verwerfen();
        } else {
            let frame_delta = header.frame_index.wrapping_sub(self.frame_index) & 0x0f;
            if frame_delta > 8 {
                trace!(
                    frame_index = header.frame_index,
                    erwartet = self.frame_index,
                    "Veraltetes Slice verworfen"
                );
                return Ok(None);
            }
            if frame_delta > 0 {
                if self.received_count > 0 {
                    debug!(
                        frame_index = self.frame_index,
                        empfangen = self.received_count,
                        "Unvollstaendiger Frame verworfen"
                    );
                }
                self.frame_index = header.frame_index;
                self.frame_verwerfen();
            }
        }

        if self.received.is_empty() {
            self.slice_count = header.slice_count;
            self.received = vec![false; header.slice_count as usize];
        } else if header.slice_count != self.slice_count {
            return Err(ProtocolError::UngueltigesSlice(format!(
                "Slice-Anzahl {} passt nicht zum Frame ({})",
                header.slice_count, self.slice_count
            )));
        }

        if payload.len() > self.slice_size {
            return Err(ProtocolError::UngueltigesSlice(format!(
                "Nutzlast {} Bytes groesser als Slice-Groesse {}",
                payload.len(),
                self.slice_size
            )));
        }
        let offset = header.slice_index as usize * self.slice_size;
        let ende = offset + payload.len();
        if ende > MAX_FRAME_SIZE {
            self.frame_verwerfen();
            return Err(ProtocolError::FrameZuGross {
                groesse: ende,
                max: MAX_FRAME_SIZE,
            });
        }

        self.buffer[offset..ende].copy_from_slice(payload);
        let index = header.slice_index as usize;
        if !self.received[index] {
            self.received[index] = true;
            self.received_count += 1;
        }
        // Laenge erst mit dem letzten Slice bekannt, Reihenfolge ist beliebig
        if header.slice_index == header.slice_count - 1 {
            self.frame_len = Some(ende);
        }

        match self.frame_len {
            Some(len) if self.received_count == self.slice_count as usize => {
                let frame = self.buffer[..len].to_vec();
                self.frame_index = (self.frame_index + 1) & 0x0f;
                self.frame_verwerfen();
                Ok(Some(frame))
            }
            _ => Ok(None),
        }
    }
}
