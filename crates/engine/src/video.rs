//! Video-Rahmen senden und empfangen
//!
//! Kodierte Rahmen werden in Slices zerlegt und einzeln gesendet; die
//! Gegenseite setzt sie pro Anruf wieder zusammen. Video laeuft wie Audio
//! nur fuer den ausgewaehlten Anruf.

use iaxc_core::{CallId, Format, IaxcEvent, Result, TextKind};
use iaxc_protocol::slice::STANDARD_SLICE_GROESSE;
use iaxc_protocol::{FrameAssembler, FrameSlicer};
use tracing::{debug, trace};

use crate::engine::EngineInner;

pub(crate) struct VideoZustand {
    slicer: FrameSlicer,
}

impl VideoZustand {
    pub(crate) fn new() -> Self {
        // Prozess-ID unterscheidet Streams nach einem Neustart
        let source_id = (std::process::id() & 0xffff) as u16;
        Self {
            slicer: FrameSlicer::new(source_id, STANDARD_SLICE_GROESSE),
        }
    }
}

impl EngineInner {
    /// Sendet einen Rahmen auf dem ausgewaehlten aktiven Anruf mit
    /// ausgehandeltem Videoformat, gibt die Anzahl Slices zurueck
    pub(crate) fn video_senden(&mut self, data: &[u8]) -> Result<usize> {
        let Some((session, format)) = self
            .calls
            .selected()
            .and_then(|id| self.calls.get(id))
            .filter(|c| c.state.is_active() && !c.video_format.is_empty())
            .and_then(|c| c.session.map(|s| (s, c.video_format)))
        else {
            trace!("Kein Anruf mit Video ausgewaehlt, Rahmen verworfen");
            return Ok(0);
        };

        let slices = self.video.slicer.slice(data)?;
        for slice in &slices {
            self.transport.send_video(session, format, slice)?;
        }
        trace!(%session, slices = slices.len(), bytes = data.len(), "Videorahmen gesendet");
        Ok(slices.len())
    }

    pub(crate) fn video_empfangen(&mut self, id: CallId, format: Format, data: &[u8]) {
        if data.is_empty() {
            self.text(
                TextKind::Status,
                Some(id),
                "Received 0-size packet. Unable to decode.",
            );
            return;
        }
        if self.calls.selected() != Some(id) {
            return;
        }
        let Some(call) = self.calls.get_mut(id) else {
            return;
        };
        if call.video_format.is_empty() {
            return;
        }
        let format = if format.video().is_empty() {
            call.video_format
        } else {
            format.video()
        };

        let assembler = call
            .video_empfang
            .get_or_insert_with(|| FrameAssembler::new(STANDARD_SLICE_GROESSE));
        match assembler.assemble(data) {
            Ok(Some(rahmen)) => {
                self.events.senden(IaxcEvent::Video {
                    call: id,
                    format,
                    data: rahmen,
                });
            }
            Ok(None) => {}
            Err(e) => {
                debug!(call = %id, fehler = %e, "Video-Slice verworfen");
                self.text(
                    TextKind::Status,
                    Some(id),
                    "Bad or incomplete video packet. Unable to decode.",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicer_nutzt_standard_groesse() {
        let mut video = VideoZustand::new();
        let slices = video.slicer.slice(&vec![7u8; 2500]).unwrap();
        assert_eq!(slices.len(), 3);
    }
}
