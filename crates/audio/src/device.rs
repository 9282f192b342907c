//! Audio-Geraete-Enumeration und -Auswahl
//!
//! Geraete werden ueber ihre Kennung im Treiber angesprochen. Mit dem
//! Feature `cpal` liefert [`list_cpal_devices`] die Geraete des
//! Standard-Hosts.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Faehigkeiten eines Geraets (kombinierbare Bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceCaps(pub u32);

impl DeviceCaps {
    pub const INPUT: Self = Self(1 << 0);
    pub const OUTPUT: Self = Self(1 << 1);
    pub const RING: Self = Self(1 << 2);
    pub const INPUT_DEFAULT: Self = Self(1 << 3);
    pub const OUTPUT_DEFAULT: Self = Self(1 << 4);
    pub const RING_DEFAULT: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeviceCaps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Repraesentiert ein Audio-Geraet mit seinen Eigenschaften
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Kennung im Treiber
    pub id: usize,
    /// Anzeigename des Geraets
    pub name: String,
    pub capabilities: DeviceCaps,
}

/// Gewaehlte Geraete fuer Aufnahme, Wiedergabe und Klingeln
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub input: usize,
    pub output: usize,
    pub ring: usize,
}

impl DeviceSelection {
    /// Waehlt die als Standard markierten Geraete
    pub fn standard(devices: &[AudioDevice]) -> Self {
        let finde = |caps: DeviceCaps| {
            devices
                .iter()
                .find(|d| d.capabilities.contains(caps))
                .map(|d| d.id)
                .unwrap_or(0)
        };
        Self {
            input: finde(DeviceCaps::INPUT_DEFAULT),
            output: finde(DeviceCaps::OUTPUT_DEFAULT),
            ring: finde(DeviceCaps::RING_DEFAULT),
        }
    }

    /// Prueft ob jede Kennung ein Geraet mit passender Faehigkeit bezeichnet
    pub fn gueltig(&self, devices: &[AudioDevice]) -> bool {
        let hat = |id: usize, caps: DeviceCaps| {
            devices
                .iter()
                .any(|d| d.id == id && d.capabilities.contains(caps))
        };
        hat(self.input, DeviceCaps::INPUT)
            && hat(self.output, DeviceCaps::OUTPUT)
            && hat(self.ring, DeviceCaps::OUTPUT)
    }
}

#[cfg(feature = "cpal")]
mod host {
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::{debug, warn};

    use super::{AudioDevice, DeviceCaps};
    use crate::error::{AudioError, AudioResult};

    /// Listet die Ein- und Ausgabegeraete des Standard-Hosts auf
    ///
    /// Eingabegeraete erhalten die Kennungen ab 0, Ausgabegeraete direkt
    /// danach. Ausgabegeraete koennen auch klingeln.
    pub fn list_cpal_devices() -> AudioResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let standard_ein = host.default_input_device().and_then(|d| d.name().ok());
        let standard_aus = host.default_output_device().and_then(|d| d.name().ok());

        let mut result = Vec::new();
        let eingaben = host
            .input_devices()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
        for device in eingaben {
            match device.name() {
                Ok(name) => {
                    let mut caps = DeviceCaps::INPUT;
                    if standard_ein.as_deref() == Some(name.as_str()) {
                        caps = caps | DeviceCaps::INPUT_DEFAULT;
                    }
                    result.push(AudioDevice {
                        id: result.len(),
                        name,
                        capabilities: caps,
                    });
                }
                Err(e) => warn!("Eingabegeraet konnte nicht gelesen werden: {}", e),
            }
        }

        let ausgaben = host
            .output_devices()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
        for device in ausgaben {
            match device.name() {
                Ok(name) => {
                    let mut caps = DeviceCaps::OUTPUT | DeviceCaps::RING;
                    if standard_aus.as_deref() == Some(name.as_str()) {
                        caps = caps | DeviceCaps::OUTPUT_DEFAULT | DeviceCaps::RING_DEFAULT;
                    }
                    result.push(AudioDevice {
                        id: result.len(),
                        name,
                        capabilities: caps,
                    });
                }
                Err(e) => warn!("Ausgabegeraet konnte nicht gelesen werden: {}", e),
            }
        }

        debug!("Gefundene Audio-Geraete: {}", result.len());
        Ok(result)
    }

    /// Laedt das cpal-Eingabegeraet mit dem gegebenen Namen
    pub fn load_cpal_input_device(name: Option<&str>) -> AudioResult<cpal::Device> {
        let host = cpal::default_host();
        match name {
            None => host
                .default_input_device()
                .ok_or(AudioError::KeinStandardEingabegeraet),
            Some(n) => host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?
                .find(|d| d.name().map(|dn| dn == n).unwrap_or(false))
                .ok_or_else(|| AudioError::GeraetNichtGefunden(n.to_string())),
        }
    }

    /// Laedt das cpal-Ausgabegeraet mit dem gegebenen Namen
    pub fn load_cpal_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
        let host = cpal::default_host();
        match name {
            None => host
                .default_output_device()
                .ok_or(AudioError::KeinStandardAusgabegeraet),
            Some(n) => host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?
                .find(|d| d.name().map(|dn| dn == n).unwrap_or(false))
                .ok_or_else(|| AudioError::GeraetNichtGefunden(n.to_string())),
        }
    }
}

#[cfg(feature = "cpal")]
pub use host::{list_cpal_devices, load_cpal_input_device, load_cpal_output_device};
