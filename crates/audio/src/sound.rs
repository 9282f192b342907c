//! Klaenge (Klingelton, Hinweistoene) die in die Ausgabe gemischt werden

use std::sync::Arc;

/// Ein PCM-Klang mit Wiederholungszaehler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sound {
    /// 16-Bit Mono-Samples in Abtastrate des Treibers
    pub data: Arc<[i16]>,
    /// Anzahl Wiederholungen, -1 = endlos
    pub repeat: i32,
}

impl Sound {
    pub fn new(data: impl Into<Arc<[i16]>>, repeat: i32) -> Self {
        Self {
            data: data.into(),
            repeat,
        }
    }
}

struct AktiverKlang {
    id: i32,
    sound: Sound,
    position: usize,
    verbleibend: i32,
    /// Auf dem Klingel-Geraet statt der normalen Ausgabe
    ring: bool,
}

/// Mischt laufende Klaenge in einen Ausgabepuffer
#[derive(Default)]
pub struct SoundMixer {
    naechste_id: i32,
    aktiv: Vec<AktiverKlang>,
}

impl SoundMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startet einen Klang und gibt seine Kennung zurueck
    pub fn play(&mut self, sound: Sound, ring: bool) -> i32 {
        let id = self.naechste_id;
        self.naechste_id = self.naechste_id.wrapping_add(1);
        if sound.data.is_empty() {
            return id;
        }
        let verbleibend = sound.repeat;
        self.aktiv.push(AktiverKlang {
            id,
            sound,
            position: 0,
            verbleibend,
            ring,
        });
        id
    }

    /// Stoppt einen Klang; `false` wenn er nicht (mehr) laeuft
    pub fn stop(&mut self, id: i32) -> bool {
        let vorher = self.aktiv.len();
        self.aktiv.retain(|k| k.id != id);
        self.aktiv.len() != vorher
    }

    pub fn ist_leer(&self) -> bool {
        self.aktiv.is_empty()
    }

    pub fn klingelt(&self) -> bool {
        self.aktiv.iter().any(|k| k.ring)
    }

    /// Addiert alle laufenden Klaenge saettigend auf `out`
    pub fn mix(&mut self, out: &mut [i16]) {
        for klang in self.aktiv.iter_mut() {
            let mut i = 0;
            while i < out.len() {
                if klang.position == klang.sound.data.len() {
                    if klang.verbleibend == 0 {
                        break;
                    }
                    if klang.verbleibend > 0 {
                        klang.verbleibend -= 1;
                    }
                    klang.position = 0;
                }
                let n = (out.len() - i).min(klang.sound.data.len() - klang.position);
                for (o, s) in out[i..i + n]
                    .iter_mut()
                    .zip(&klang.sound.data[klang.position..klang.position + n])
                {
                    *o = o.saturating_add(*s);
                }
                klang.position += n;
                i += n;
            }
        }
        self.aktiv
            .retain(|k| k.verbleibend != 0 || k.position < k.sound.data.len());
    }
}
