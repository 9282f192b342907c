//! Engine-Konfiguration
//!
//! Wird optional aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass die Engine ohne Konfigurationsdatei laeuft.
//! Formate und Filter werden als Namen angegeben (`"ulaw"`, `"agc"`).

use std::time::Duration;

use iaxc_core::{Filters, Format, IaxcError};
use serde::{Deserialize, Serialize};

/// Vollstaendige Engine-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub anrufe: AnrufEinstellungen,
    pub formate: FormatEinstellungen,
    pub audio: AudioEinstellungen,
    /// Eigene Rufnummernanzeige
    pub anrufer: AnruferEinstellungen,
    pub registrierung: RegistrierungsEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Anruftabelle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnrufEinstellungen {
    /// Anzahl gleichzeitiger Leitungen; Werte <= 0 werden zu 1
    pub max_anrufe: i32,
    /// Anrufe ohne Aktivitaet werden nach dieser Zeit aufgelegt
    pub zeitlimit_sekunden: u64,
}

impl Default for AnrufEinstellungen {
    fn default() -> Self {
        Self {
            max_anrufe: 2,
            zeitlimit_sekunden: 60,
        }
    }
}

/// Codec-Politik
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatEinstellungen {
    pub bevorzugt: Vec<String>,
    /// Leer = alles, was die Codec-Registry bauen kann
    pub erlaubt: Vec<String>,
    pub video_bevorzugt: Vec<String>,
    pub video_erlaubt: Vec<String>,
}

impl Default for FormatEinstellungen {
    fn default() -> Self {
        Self {
            bevorzugt: vec!["ulaw".into()],
            erlaubt: Vec::new(),
            video_bevorzugt: Vec::new(),
            video_erlaubt: Vec::new(),
        }
    }
}

/// Audio-Verarbeitung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    pub abtastrate: u32,
    /// Mindestgroesse eines gesendeten Rahmens in Samples
    pub min_rahmen_groesse: usize,
    pub filter: Vec<String>,
    /// Unter diesem Pegel (dB) gilt ein Rahmen als Stille
    pub stille_schwelle_db: Option<f32>,
    /// Laenge des Echo-Filters in Samples
    pub echo_laenge: usize,
    pub ausgabe_stumm: bool,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            abtastrate: 8000,
            min_rahmen_groesse: 160,
            filter: vec!["agc".into(), "denoise".into(), "cn".into()],
            stille_schwelle_db: None,
            echo_laenge: 4096,
            ausgabe_stumm: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnruferEinstellungen {
    pub name: String,
    pub nummer: String,
}

impl Default for AnruferEinstellungen {
    fn default() -> Self {
        Self {
            name: "Not Available".into(),
            nummer: "7005551212".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrierungsEinstellungen {
    /// Gewuenschte Lease-Dauer in Sekunden
    pub erneuerung_sekunden: u32,
}

impl Default for RegistrierungsEinstellungen {
    fn default() -> Self {
        Self {
            erneuerung_sekunden: 60,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl EngineConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Anzahl der Leitungen, mindestens 1
    pub fn max_anrufe(&self) -> usize {
        self.anrufe.max_anrufe.max(1) as usize
    }

    pub fn zeitlimit(&self) -> Duration {
        Duration::from_secs(self.anrufe.zeitlimit_sekunden)
    }

    pub fn filter(&self) -> Result<Filters, IaxcError> {
        self.audio.filter.iter().try_fold(Filters::default(), |acc, name| {
            Filters::aus_name(name)
                .map(|f| acc | f)
                .ok_or_else(|| IaxcError::Konfiguration(format!("Unbekannter Filter '{name}'")))
        })
    }
}

/// Setzt eine Formatmaske aus Namen zusammen
pub fn formate_aufloesen(namen: &[String]) -> Result<Format, IaxcError> {
    namen.iter().try_fold(Format::NONE, |acc, name| {
        Format::aus_name(name)
            .map(|f| acc | f)
            .ok_or_else(|| IaxcError::Konfiguration(format!("Unbekanntes Format '{name}'")))
    })
}
