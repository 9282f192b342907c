//! Codec-Aushandlung fuer eingehende Anrufe
//!
//! Reihenfolge der Versuche:
//! 1. Bevorzugtes Format der Gegenstelle, sofern wir es erlauben
//! 2. Unser bevorzugtes Format, sofern die Gegenstelle es kann
//! 3. Das erste gemeinsame Format aus der festen Prioritaetsliste
//!
//! Audio und Video werden getrennt ausgehandelt, jeweils nur ueber die
//! eigenen Format-Bits und mit eigener Prioritaetsliste.

use iaxc_core::Format;

/// Audio-Fallback in Prioritaetsreihenfolge
pub const AUDIO_PRIORITAET: [Format; 11] = [
    Format::ULAW,
    Format::ALAW,
    Format::SLINEAR,
    Format::G726,
    Format::ADPCM,
    Format::GSM,
    Format::ILBC,
    Format::SPEEX,
    Format::LPC10,
    Format::G729A,
    Format::G723_1,
];

/// Video-Fallback in Prioritaetsreihenfolge
pub const VIDEO_PRIORITAET: [Format; 8] = [
    Format::JPEG,
    Format::PNG,
    Format::H261,
    Format::H263,
    Format::H263_PLUS,
    Format::MPEG4,
    Format::H264,
    Format::THEORA,
];

/// Eigene Formatpolitik einer Medienart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatPolitik {
    pub bevorzugt: Format,
    pub erlaubt: Format,
}

/// Erstes Format aus `prioritaet`, das in `formate` enthalten ist
pub fn codec_waehlen(formate: Format, prioritaet: &[Format]) -> Format {
    prioritaet
        .iter()
        .copied()
        .find(|f| formate.contains(*f))
        .unwrap_or(Format::NONE)
}

fn aushandeln(
    lokal: FormatPolitik,
    peer_format: Format,
    peer_capability: Format,
    maske: Format,
    prioritaet: &[Format],
) -> Option<Format> {
    let erlaubt = lokal.erlaubt & maske;
    let bevorzugt = lokal.bevorzugt & maske;
    let peer_format = peer_format & maske;
    let peer_capability = peer_capability & maske;

    [
        erlaubt & peer_format,
        bevorzugt & peer_capability,
        erlaubt & peer_capability,
    ]
    .into_iter()
    .map(|kandidaten| codec_waehlen(kandidaten, prioritaet))
    .find(|f| !f.is_empty())
}

/// Handelt das Audio-Format aus; `None` wenn es kein gemeinsames gibt
pub fn audio_aushandeln(
    lokal: FormatPolitik,
    peer_format: Format,
    peer_capability: Format,
) -> Option<Format> {
    aushandeln(
        lokal,
        peer_format,
        peer_capability,
        Format::AUDIO_MASK,
        &AUDIO_PRIORITAET,
    )
}

/// Handelt das Video-Format aus
pub fn video_aushandeln(
    lokal: FormatPolitik,
    peer_format: Format,
    peer_capability: Format,
) -> Option<Format> {
    aushandeln(
        lokal,
        peer_format,
        peer_capability,
        Format::VIDEO_MASK,
        &VIDEO_PRIORITAET,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn politik(bevorzugt: Format, erlaubt: Format) -> FormatPolitik {
        FormatPolitik {
            bevorzugt,
            erlaubt,
        }
    }

    #[test]
    fn peer_wunsch_gewinnt_wenn_erlaubt() {
        let lokal = politik(Format::ULAW, Format::ULAW | Format::GSM);
        assert_eq!(
            audio_aushandeln(lokal, Format::GSM, Format::GSM | Format::ULAW),
            Some(Format::GSM)
        );
    }

    #[test]
    fn eigener_wunsch_vor_prioritaetsliste() {
        let lokal = politik(Format::ULAW | Format::SPEEX, Format::ULAW | Format::SPEEX);
        assert_eq!(
            audio_aushandeln(lokal, Format::GSM, Format::GSM | Format::SPEEX),
            Some(Format::SPEEX)
        );
    }

    #[test]
    fn prioritaetsliste_als_letzter_versuch() {
        let lokal = politik(Format::ILBC, Format::ALAW | Format::GSM | Format::SPEEX);
        assert_eq!(
            audio_aushandeln(lokal, Format::G729A, Format::SPEEX | Format::GSM),
            Some(Format::GSM)
        );
    }

    #[test]
    fn kein_gemeinsamer_codec() {
        let lokal = politik(Format::ULAW, Format::ULAW);
        assert_eq!(audio_aushandeln(lokal, Format::GSM, Format::GSM), None);
    }

    #[test]
    fn aushandlung_ist_deterministisch() {
        let lokal = politik(Format::ULAW, Format::ULAW | Format::ALAW | Format::GSM);
        let peer = Format::ALAW | Format::GSM;
        let erstes = audio_aushandeln(lokal, Format::NONE, peer);
        for _ in 0..10 {
            assert_eq!(audio_aushandeln(lokal, Format::NONE, peer), erstes);
        }
        assert_eq!(erstes, Some(Format::ALAW));
    }

    #[test]
    fn video_bits_stoeren_audio_nicht() {
        let lokal = politik(Format::ULAW | Format::THEORA, Format::ULAW | Format::THEORA);
        let peer = Format::ULAW | Format::THEORA;
        assert_eq!(audio_aushandeln(lokal, peer, peer), Some(Format::ULAW));
        assert_eq!(video_aushandeln(lokal, peer, peer), Some(Format::THEORA));
    }

    #[test]
    fn video_ohne_gemeinsames_format() {
        let lokal = politik(Format::H264, Format::H264);
        assert_eq!(video_aushandeln(lokal, Format::THEORA, Format::THEORA), None);
    }

    #[test]
    fn mehrere_kandidaten_werden_nach_prioritaet_reduziert() {
        let lokal = politik(Format::NONE, Format::SPEEX | Format::ALAW);
        assert_eq!(
            audio_aushandeln(lokal, Format::SPEEX | Format::ALAW, Format::SPEEX | Format::ALAW),
            Some(Format::ALAW)
        );
    }
}
